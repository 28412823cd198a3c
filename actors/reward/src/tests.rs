// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::HashMap;

use fvm_ipld_blockstore::MemoryBlockstore;
use poi_actor_participant_state::{Participant, ParticipantStatus, State as ParticipantState};
use poi_actor_power_state::{
    EpochGroupData, MLNodeInfo, SeedSignature, State as PowerState, ValidationWeight,
};
use poi_actors_shared::builtin::{
    ESCROW_MODULE_ACCOUNT, GOVERNANCE_SINK_ACCOUNT, REWARD_POOL_ACCOUNT,
};
use poi_actors_shared::math::{decay, Decimal};
use poi_actors_shared::runtime::{BankLedger, Policy, SubAccount};
use poi_actors_shared::ActorError;

use crate::*;
use pretty_assertions::assert_eq;

struct MockLedger {
    modules: HashMap<&'static str, i64>,
    users: HashMap<String, i64>,
    minted: i64,
}

impl MockLedger {
    fn new() -> Self {
        Self {
            modules: HashMap::new(),
            users: HashMap::new(),
            minted: 0,
        }
    }

    fn module(&self, name: &'static str) -> i64 {
        *self.modules.get(name).unwrap_or(&0)
    }
}

impl BankLedger for MockLedger {
    fn mint_to_module(&mut self, module: &'static str, amount: i64) -> Result<(), ActorError> {
        self.minted += amount;
        *self.modules.entry(module).or_insert(0) += amount;
        Ok(())
    }

    fn transfer_module_to_module(
        &mut self,
        from: &'static str,
        to: &'static str,
        amount: i64,
    ) -> Result<(), ActorError> {
        let balance = self.modules.entry(from).or_insert(0);
        if *balance < amount {
            return Err(ActorError::insufficient_funds(format!(
                "module {} holds {} < {}",
                from, balance, amount
            )));
        }
        *balance -= amount;
        *self.modules.entry(to).or_insert(0) += amount;
        Ok(())
    }

    fn transfer_to_module(
        &mut self,
        from: &str,
        module: &'static str,
        amount: i64,
    ) -> Result<(), ActorError> {
        *self.users.entry(from.to_string()).or_insert(0) -= amount;
        *self.modules.entry(module).or_insert(0) += amount;
        Ok(())
    }

    fn transfer_from_module(
        &mut self,
        module: &'static str,
        to: &str,
        amount: i64,
    ) -> Result<(), ActorError> {
        let balance = self.modules.entry(module).or_insert(0);
        if *balance < amount {
            return Err(ActorError::insufficient_funds(format!(
                "module {} holds {} < {}",
                module, balance, amount
            )));
        }
        *balance -= amount;
        *self.users.entry(to.to_string()).or_insert(0) += amount;
        Ok(())
    }

    fn log_sub_account_transaction(
        &mut self,
        _owner: &str,
        _sub_account: SubAccount,
        _amount: i64,
        _memo: &str,
    ) {
    }
}

struct Member {
    address: &'static str,
    weight: i64,
    confirmation_weight: i64,
    nodes: Vec<MLNodeInfo>,
    coin_balance: i64,
    inference_count: u64,
    missed_requests: u64,
    status: ParticipantStatus,
}

impl Member {
    fn new(address: &'static str, weight: i64) -> Self {
        Self {
            address,
            weight,
            confirmation_weight: weight,
            nodes: Vec::new(),
            coin_balance: 0,
            inference_count: 0,
            missed_requests: 0,
            status: ParticipantStatus::Active,
        }
    }
}

fn node(id: &str, poc_weight: i64, preserved: bool) -> MLNodeInfo {
    MLNodeInfo {
        node_id: id.to_string(),
        poc_weight,
        timeslot_allocation: vec![false, preserved],
    }
}

struct Harness {
    store: MemoryBlockstore,
    reward: State,
    participants: ParticipantState,
    power: PowerState,
    ledger: MockLedger,
}

fn setup(epoch: u64, members: &[Member]) -> Harness {
    let store = MemoryBlockstore::new();
    let reward = State::new(&store).unwrap();
    let mut participants = ParticipantState::new(&store).unwrap();
    let mut power = PowerState::new(&store).unwrap();

    let mut parent = EpochGroupData::new(epoch, String::new());
    let mut subgroup = EpochGroupData::new(epoch, "llama".to_string());
    let mut active = Vec::new();

    for member in members {
        let mut participant = Participant::new(member.address.to_string());
        participant.status = member.status;
        participant.coin_balance = member.coin_balance;
        participant.current_epoch_stats.inference_count = member.inference_count;
        participant.current_epoch_stats.missed_requests = member.missed_requests;
        participants.register_participant(&store, participant).unwrap();

        parent.upsert_member(ValidationWeight {
            address: member.address.to_string(),
            weight: member.weight,
            reputation: 0,
            confirmation_weight: member.confirmation_weight,
            ml_nodes: Vec::new(),
        });
        parent.member_seed_signatures.push(SeedSignature {
            address: member.address.to_string(),
            signature: member.address.as_bytes().to_vec(),
        });
        subgroup.upsert_member(ValidationWeight {
            address: member.address.to_string(),
            weight: member.weight,
            reputation: 0,
            confirmation_weight: member.confirmation_weight,
            ml_nodes: member.nodes.clone(),
        });
        active.push(member.address.to_string());
    }

    power.set_epoch_group(&store, parent).unwrap();
    power.set_epoch_group(&store, subgroup).unwrap();
    power.set_active_participants(&store, epoch, active).unwrap();

    Harness {
        store,
        reward,
        participants,
        power,
        ledger: MockLedger::new(),
    }
}

fn settle(harness: &mut Harness, policy: &Policy, epoch: u64, previous: u64) -> SettleResult {
    settle_epoch(
        &mut harness.reward,
        &mut harness.participants,
        &harness.power,
        &harness.store,
        &mut harness.ledger,
        policy,
        epoch,
        previous,
    )
    .unwrap()
}

fn reward_of(result: &SettleResult, address: &str) -> u64 {
    result
        .entries
        .iter()
        .find(|entry| entry.participant == address)
        .map(|entry| entry.reward_coins)
        .unwrap_or(0)
}

#[test]
fn epoch_zero_is_a_noop() {
    let mut harness = setup(0, &[]);
    let result = settle(&mut harness, &Policy::default(), 0, 0);
    assert_eq!(result, SettleResult::default());
    assert_eq!(harness.ledger.minted, 0);
}

// Two participants with even confirmation weight split the epoch emission,
// the odd coin going to the first address in order.
#[test]
fn even_weights_split_the_emission() {
    let epoch = 10;
    let mut members = vec![Member::new("poi1a", 500), Member::new("poi1b", 500)];
    for member in &mut members {
        member.confirmation_weight = 500;
        member.nodes = vec![node("n0", 500, false)];
    }
    members[0].coin_balance = 500;
    members[1].coin_balance = 1_000;

    let policy = Policy::default();
    let mut harness = setup(epoch, &members);
    // Pre-fund escrow with the accrued fees.
    harness.ledger.mint_to_module(ESCROW_MODULE_ACCOUNT, 1_500).unwrap();
    let result = settle(&mut harness, &policy, epoch, epoch - 1);

    let expected = decay(
        policy.initial_epoch_reward,
        Some(&policy.decay_rate),
        epoch - policy.genesis_epoch,
    );
    assert_eq!(result.bitcoin.amount, expected);
    assert!(result.bitcoin.decay_applied);
    assert_eq!(result.minted, expected);

    let half = expected / 2;
    let odd = expected % 2;
    assert_eq!(reward_of(&result, "poi1a"), half + odd);
    assert_eq!(reward_of(&result, "poi1b"), half);

    let a = result.entries.iter().find(|e| e.participant == "poi1a").unwrap();
    let b = result.entries.iter().find(|e| e.participant == "poi1b").unwrap();
    assert_eq!(a.work_coins, 500);
    assert_eq!(b.work_coins, 1_000);
    assert_eq!(a.seed_signature, b"poi1a".to_vec());

    // No coin is created or destroyed in distribution.
    let total: u64 = result.entries.iter().map(|e| e.reward_coins).sum();
    assert_eq!(total, result.minted);
    assert_eq!(result.undistributed, 0);
    assert_eq!(harness.ledger.minted, expected as i64);
}

// An odd prime emission over three equal weights leaves the remainder with
// the first participant.
#[test]
fn odd_prime_emission_distributes_exactly() {
    let epoch = 1;
    let members = vec![
        Member::new("poi1a", 10),
        Member::new("poi1b", 10),
        Member::new("poi1c", 10),
    ];
    let mut policy = Policy::default();
    policy.initial_epoch_reward = 97;
    policy.decay_rate = Decimal::zero();
    policy.genesis_epoch = 1;

    let mut harness = setup(epoch, &members);
    let result = settle(&mut harness, &policy, epoch, 0);

    assert_eq!(result.bitcoin.amount, 97);
    assert!(!result.bitcoin.decay_applied);
    assert_eq!(reward_of(&result, "poi1a"), 33);
    assert_eq!(reward_of(&result, "poi1b"), 32);
    assert_eq!(reward_of(&result, "poi1c"), 32);
    let total: u64 = result.entries.iter().map(|e| e.reward_coins).sum();
    assert_eq!(total, 97);
}

// The dominant participant is power-capped and its final share stays
// strictly under half the reward.
#[test]
fn dominant_weight_is_capped_before_distribution() {
    let epoch = 1;
    let members = vec![
        Member::new("poi1a", 1_000),
        Member::new("poi1b", 2_000),
        Member::new("poi1c", 1_000),
    ];
    let mut policy = Policy::default();
    policy.initial_epoch_reward = 9_999;
    policy.decay_rate = Decimal::zero();

    let mut harness = setup(epoch, &members);
    let result = settle(&mut harness, &policy, epoch, 0);

    // Capped weights: {1000, 1333, 1000}.
    let total: u64 = result.entries.iter().map(|e| e.reward_coins).sum();
    assert_eq!(total, result.minted);
    let middle = reward_of(&result, "poi1b");
    assert!(middle * 2 < total, "middle share {} of {}", middle, total);
    assert_eq!(reward_of(&result, "poi1a"), reward_of(&result, "poi1c"));
}

// A 50% miss rate fails the downtime test at the default p0 = 0.10 and
// forfeits the whole emission to governance.
#[test]
fn downtime_punishment_zeroes_the_reward() {
    let epoch = 5;
    let mut member = Member::new("poi1a", 1_000);
    member.inference_count = 50;
    member.missed_requests = 50;
    member.coin_balance = 250;

    let policy = Policy::default();
    let mut harness = setup(epoch, &[member]);
    harness.ledger.mint_to_module(ESCROW_MODULE_ACCOUNT, 250).unwrap();
    let result = settle(&mut harness, &policy, epoch, epoch - 1);

    assert!(result.minted > 0);
    assert_eq!(reward_of(&result, "poi1a"), 0);
    assert_eq!(result.undistributed, result.minted);
    assert_eq!(
        harness.ledger.module(GOVERNANCE_SINK_ACCOUNT),
        result.minted as i64
    );
    // Work coins still pay out.
    assert_eq!(result.entries[0].work_coins, 250);
}

// A grace-epoch override relaxes the downtime test.
#[test]
fn grace_epoch_overrides_the_null_hypothesis() {
    let epoch = 5;
    let mut member = Member::new("poi1a", 1_000);
    member.inference_count = 50;
    member.missed_requests = 50;

    let policy = Policy::default();
    let mut harness = setup(epoch, &[member]);
    harness
        .reward
        .set_grace_epoch(
            &harness.store,
            GraceEpochParams {
                epoch_index: epoch,
                binom_test_p0: Some(Decimal::new(5, -1)),
                upgrade_protection_window: 0,
            },
        )
        .unwrap();
    let result = settle(&mut harness, &policy, epoch, epoch - 1);

    assert!(reward_of(&result, "poi1a") > 0);
    assert_eq!(result.undistributed, 0);
}

// Near supply exhaustion only the remaining subsidy is minted, distributed
// exactly.
#[test]
fn supply_cap_clamps_the_emission() {
    let epoch = 2;
    let members = vec![Member::new("poi1a", 500), Member::new("poi1b", 500)];
    let policy = Policy::default();
    let mut harness = setup(epoch, &members);
    harness.reward.total_subsidies = policy.total_subsidy_supply - 100_000;

    let result = settle(&mut harness, &policy, epoch, epoch - 1);
    assert!(result.bitcoin.amount > 100_000);
    assert_eq!(result.minted, 100_000);
    let total: u64 = result.entries.iter().map(|e| e.reward_coins).sum();
    assert_eq!(total, 100_000);
    assert_eq!(harness.reward.total_subsidies, policy.total_subsidy_supply);

    // The next epoch mints nothing.
    let mut next = EpochGroupData::new(epoch + 1, String::new());
    for member in ["poi1a", "poi1b"] {
        next.upsert_member(ValidationWeight {
            address: member.to_string(),
            weight: 500,
            reputation: 0,
            confirmation_weight: 500,
            ml_nodes: Vec::new(),
        });
    }
    harness.power.set_epoch_group(&harness.store, next).unwrap();
    harness
        .power
        .set_active_participants(
            &harness.store,
            epoch + 1,
            vec!["poi1a".to_string(), "poi1b".to_string()],
        )
        .unwrap();
    let result = settle(&mut harness, &policy, epoch + 1, epoch);
    assert_eq!(result.minted, 0);
    assert!(result.entries.iter().all(|e| e.reward_coins == 0));
}

// Preserved nodes keep serving through confirmation PoC: effective weight
// is preserved plus confirmation-capped weight.
#[test]
fn preserved_nodes_count_toward_effective_weight() {
    let epoch = 1;
    let mut a = Member::new("poi1a", 1_000);
    // 400 preserved, confirmation re-verified the rest at 300.
    a.nodes = vec![node("n0", 400, true), node("n1", 600, false)];
    a.confirmation_weight = 300;
    let mut b = Member::new("poi1b", 700);
    b.nodes = vec![node("n2", 700, false)];
    b.confirmation_weight = 700;

    let mut policy = Policy::default();
    policy.initial_epoch_reward = 1_400;
    policy.decay_rate = Decimal::zero();

    let mut harness = setup(epoch, &[a, b]);
    let result = settle(&mut harness, &policy, epoch, 0);

    // Effective weights: a = 400 + 300 = 700, b = 0 + 700 = 700.
    assert_eq!(reward_of(&result, "poi1a"), 700);
    assert_eq!(reward_of(&result, "poi1b"), 700);
}

// Non-active participants settle to zero and forfeit their work coins.
#[test]
fn non_active_participants_settle_to_zero() {
    let epoch = 4;
    let mut a = Member::new("poi1a", 500);
    a.coin_balance = 400;
    let mut b = Member::new("poi1b", 500);
    b.coin_balance = 700;
    b.status = ParticipantStatus::Inactive;

    let policy = Policy::default();
    let mut harness = setup(epoch, &[a, b]);
    harness.ledger.mint_to_module(ESCROW_MODULE_ACCOUNT, 1_100).unwrap();
    let result = settle(&mut harness, &policy, epoch, epoch - 1);

    assert_eq!(reward_of(&result, "poi1b"), 0);
    assert!(result.entries.iter().all(|e| e.participant != "poi1b"));
    assert_eq!(result.forfeited_work, 700);
    assert_eq!(harness.ledger.module(GOVERNANCE_SINK_ACCOUNT), 700);
    // The active participant takes the whole emission.
    assert_eq!(reward_of(&result, "poi1a"), result.minted);

    let b = harness
        .participants
        .must_get_participant(&harness.store, "poi1b")
        .unwrap();
    assert_eq!(b.coin_balance, 0);
    // Only active participants advance their reputation counter.
    assert_eq!(b.epochs_completed, 0);
    let a = harness
        .participants
        .must_get_participant(&harness.store, "poi1a")
        .unwrap();
    assert_eq!(a.epochs_completed, 1);
}

// Settlement resets per-epoch stats and writes performance summaries.
#[test]
fn settlement_resets_stats_and_records_performance() {
    let epoch = 6;
    let mut member = Member::new("poi1a", 100);
    member.inference_count = 40;
    member.missed_requests = 2;
    member.coin_balance = 900;

    let policy = Policy::default();
    let mut harness = setup(epoch, &[member]);
    harness.ledger.mint_to_module(ESCROW_MODULE_ACCOUNT, 900).unwrap();
    let result = settle(&mut harness, &policy, epoch, epoch - 1);

    let summary = harness
        .reward
        .get_performance(&harness.store, epoch, "poi1a")
        .unwrap()
        .unwrap();
    assert_eq!(summary.inference_count, 40);
    assert_eq!(summary.missed_requests, 2);
    assert_eq!(summary.work_coins, 900);
    assert_eq!(summary.reward_coins, reward_of(&result, "poi1a"));

    let participant = harness
        .participants
        .must_get_participant(&harness.store, "poi1a")
        .unwrap();
    assert_eq!(participant.current_epoch_stats.inference_count, 0);
    assert_eq!(participant.current_epoch_stats.missed_requests, 0);
    assert_eq!(participant.coin_balance, 0);
}

#[test]
fn grace_epoch_extends_the_timestamp_window() {
    let harness = setup(3, &[]);
    let mut reward = harness.reward.clone();
    assert_eq!(reward.timestamp_allowance(&harness.store, 3).unwrap(), 0);
    reward
        .set_grace_epoch(
            &harness.store,
            GraceEpochParams {
                epoch_index: 3,
                binom_test_p0: None,
                upgrade_protection_window: 30_000_000_000,
            },
        )
        .unwrap();
    assert_eq!(
        reward.timestamp_allowance(&harness.store, 3).unwrap(),
        30_000_000_000
    );
    assert_eq!(reward.timestamp_allowance(&harness.store, 4).unwrap(), 0);
}

// A claim left over from an earlier epoch expires to governance when the
// new settle amount lands, and stale claims sweep at the epoch boundary.
#[test]
fn expired_claims_route_to_governance() {
    let epoch = 9;
    let member = Member::new("poi1a", 100);
    let policy = Policy::default();
    let mut harness = setup(epoch, &[member]);

    // Pending claim from three epochs ago, never redeemed.
    harness.ledger.mint_to_module(REWARD_POOL_ACCOUNT, 5_000).unwrap();
    harness.ledger.mint_to_module(ESCROW_MODULE_ACCOUNT, 1_000).unwrap();
    let mut settle_amounts = harness.reward.load_settle_amounts(&harness.store).unwrap();
    settle_amounts
        .set(
            &"poi1a".to_string(),
            SettleAmount {
                participant: "poi1a".to_string(),
                epoch_index: epoch - 3,
                work_coins: 1_000,
                reward_coins: 5_000,
                seed_signature: Vec::new(),
            },
        )
        .unwrap();
    harness.reward.settle_amounts = settle_amounts.flush().unwrap();

    let result = settle(&mut harness, &policy, epoch, epoch - 1);
    assert!(result.minted > 0);

    // The stale claim's coins sit with governance; the fresh claim
    // replaced it.
    assert_eq!(harness.ledger.module(GOVERNANCE_SINK_ACCOUNT), 6_000);
    let claim = harness
        .reward
        .get_settle_amount(&harness.store, "poi1a")
        .unwrap()
        .unwrap();
    assert_eq!(claim.epoch_index, epoch);
    assert_eq!(claim.reward_coins, result.minted);
}
