// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! End-of-epoch settlement: effective weights, power capping, downtime
//! punishment, emission, proportional distribution and payout records.

use fvm_ipld_blockstore::Blockstore;
use log::warn;
use poi_actors_shared::builtin::{
    ESCROW_MODULE_ACCOUNT, GOVERNANCE_SINK_ACCOUNT, REWARD_POOL_ACCOUNT,
};
use poi_actors_shared::runtime::{BankLedger, Policy, SubAccount};
use poi_actors_shared::stats::missed_requests_acceptable;
use poi_actors_shared::ActorError;

use poi_actor_participant_state::{Participant, State as ParticipantState};
use poi_actor_power_state::State as PowerState;

use crate::capping::{cap_weights, max_power_fraction, WeightEntry};
use crate::logic::{clamp_to_supply, epoch_reward, proportional_share};
use crate::state::State;
use crate::types::{BitcoinResult, EpochPerformanceSummary, SettleAmount};

/// Settlement output for one epoch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SettleResult {
    pub bitcoin: BitcoinResult,
    /// Emission actually minted after the supply-cap clamp.
    pub minted: u64,
    /// Payout entries written, in active-participant order.
    pub entries: Vec<SettleAmount>,
    /// Minted coins with no recipient, routed to governance.
    pub undistributed: u64,
    /// Forfeited work coins of non-active participants, routed to
    /// governance.
    pub forfeited_work: u64,
}

/// Settles an epoch: computes every active participant's work and reward
/// coins, mints the emission and persists the claimable payouts.
///
/// Runs exactly once at the epoch boundary. Any store or mint failure
/// aborts before participants mutate; downtime-test errors degrade to
/// keeping the participant's reward.
#[allow(clippy::too_many_arguments)]
pub fn settle_epoch<BS: Blockstore, L: BankLedger>(
    reward_state: &mut State,
    participant_state: &mut ParticipantState,
    power_state: &PowerState,
    store: &BS,
    ledger: &mut L,
    policy: &Policy,
    current_epoch: u64,
    previous_epoch: u64,
) -> Result<SettleResult, ActorError> {
    if current_epoch == 0 {
        return Ok(SettleResult::default());
    }

    // The active list is stored sorted; it fixes every iteration order
    // below, including who receives distribution remainders.
    let active = power_state.active_participants(store, current_epoch)?;
    let parent = power_state.parent_group(store, current_epoch)?;
    let ml_nodes = power_state.aggregate_ml_nodes(store, current_epoch)?;

    let mut participants: Vec<Participant> = Vec::with_capacity(active.len());
    for address in &active {
        match participant_state.get_participant(store, address)? {
            Some(participant) => participants.push(participant),
            None => {
                warn!("active participant {} has no record, skipping", address);
            }
        }
    }

    // Effective weight per active participant: preserved node weight plus
    // the confirmation-capped remainder. Non-active participants weigh
    // nothing.
    let mut weight_entries: Vec<WeightEntry> = Vec::new();
    for participant in &participants {
        if !participant.is_active() {
            continue;
        }
        let entry = match parent.member(&participant.address) {
            Some(entry) if entry.weight > 0 => entry,
            _ => continue,
        };
        let nodes = ml_nodes
            .get(&participant.address)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        weight_entries.push(WeightEntry {
            address: participant.address.clone(),
            weight: entry.effective_weight(nodes),
        });
    }

    let fraction = max_power_fraction(policy, weight_entries.len());
    let mut capped = cap_weights(weight_entries, &fraction);

    // Downtime punishment zeroes a participant's capped weight. A test
    // error keeps the reward: the safe fallback.
    let p0 = reward_state
        .get_grace_epoch(store, current_epoch)?
        .and_then(|grace| grace.binom_test_p0)
        .unwrap_or(policy.binom_test_p0);
    for entry in &mut capped.entries {
        let Some(participant) = participants.iter().find(|p| p.address == entry.address) else {
            continue;
        };
        let stats = &participant.current_epoch_stats;
        let missed = stats.missed_requests as i64;
        let total = missed + stats.inference_count as i64;
        match missed_requests_acceptable(missed, total, &p0) {
            Ok(true) => {}
            Ok(false) => entry.weight = 0,
            Err(err) => {
                warn!(
                    "downtime test failed for {}: {}, keeping reward",
                    entry.address,
                    err.msg()
                );
            }
        }
    }
    let total_weight: i64 = capped.entries.iter().map(|e| e.weight).sum();

    let bitcoin = epoch_reward(policy, current_epoch);
    let minted = clamp_to_supply(policy, reward_state.total_subsidies, bitcoin.amount);

    // Base shares are computed against the nominal emission; a supply-cap
    // clamp scales them in float64 and reconciles the integer gap.
    let mut rewards: Vec<u64> = capped
        .entries
        .iter()
        .map(|entry| proportional_share(entry.weight, bitcoin.amount, total_weight))
        .collect();
    if total_weight > 0 && bitcoin.amount > 0 {
        let distributed: u64 = rewards.iter().sum();
        let remainder = bitcoin.amount - distributed;
        if remainder > 0 {
            if let Some(first) = rewards.iter_mut().find(|r| **r > 0) {
                *first += remainder;
            }
        }
    }
    if minted < bitcoin.amount {
        let scale = if bitcoin.amount > 0 {
            minted as f64 / bitcoin.amount as f64
        } else {
            0.0
        };
        for reward in &mut rewards {
            *reward = (*reward as f64 * scale).floor() as u64;
        }
        let scaled: u64 = rewards.iter().sum();
        let gap = minted.saturating_sub(scaled);
        if gap > 0 {
            if let Some(first) = rewards.iter_mut().find(|r| **r > 0) {
                *first += gap;
            }
        }
    }

    // Mint before any participant mutates, so a failure aborts cleanly.
    if minted > 0 {
        ledger.mint_to_module(REWARD_POOL_ACCOUNT, minted as i64)?;
        reward_state.total_subsidies += minted;
    }

    let reward_of = |address: &str, rewards: &[u64]| -> u64 {
        capped
            .entries
            .iter()
            .position(|entry| entry.address == address)
            .map(|idx| rewards[idx])
            .unwrap_or(0)
    };

    let mut entries = Vec::new();
    let mut distributed_total: u64 = 0;
    let mut forfeited_work: u64 = 0;
    for mut participant in participants {
        let address = participant.address.clone();
        let work_coins = if participant.is_active() {
            participant.coin_balance.max(0) as u64
        } else {
            let forfeited = participant.coin_balance.max(0) as u64;
            forfeited_work += forfeited;
            0
        };
        let reward_coins = if participant.is_active() {
            reward_of(&address, &rewards)
        } else {
            0
        };
        distributed_total += reward_coins;

        if work_coins > 0 {
            ledger.log_sub_account_transaction(
                &address,
                SubAccount::Owed,
                -(work_coins as i64),
                "epoch work settled",
            );
        }
        if reward_coins > 0 {
            ledger.log_sub_account_transaction(
                &address,
                SubAccount::Earned,
                reward_coins as i64,
                "epoch reward settled",
            );
        }

        reward_state.record_performance(
            store,
            EpochPerformanceSummary {
                participant: address.clone(),
                epoch_index: current_epoch,
                inference_count: participant.current_epoch_stats.inference_count,
                missed_requests: participant.current_epoch_stats.missed_requests,
                work_coins,
                reward_coins,
            },
        )?;

        participant.coin_balance = 0;
        if participant.is_active() {
            participant.epochs_completed += 1;
        }
        participant.reset_epoch_stats();
        participant_state.put_participant(store, participant)?;
        reward_state.total_fees += work_coins;

        if work_coins + reward_coins > 0 {
            let seed_signature = parent
                .seed_signature(&address)
                .map(|sig| sig.signature.clone())
                .unwrap_or_default();
            entries.push(SettleAmount {
                participant: address,
                epoch_index: current_epoch,
                work_coins,
                reward_coins,
                seed_signature,
            });
        }
    }

    // Persist the payouts; a claim still pending at this key has expired
    // and its coins move to governance.
    let mut settle_amounts = reward_state.load_settle_amounts(store)?;
    for entry in &entries {
        if let Some(stale) = settle_amounts.get(&entry.participant)? {
            transfer_expired_claim(ledger, stale)?;
        }
        settle_amounts.set(&entry.participant.clone(), entry.clone())?;
    }
    reward_state.settle_amounts = settle_amounts.flush()?;

    // Sweep claims older than the previous epoch.
    if previous_epoch != 0 {
        let mut settle_amounts = reward_state.load_settle_amounts(store)?;
        let mut stale_keys = Vec::new();
        settle_amounts.for_each(|key, amount| {
            if amount.epoch_index < previous_epoch {
                stale_keys.push(key);
            }
            Ok(())
        })?;
        stale_keys.sort();
        for key in stale_keys {
            if let Some(stale) = settle_amounts.delete(&key)? {
                transfer_expired_claim(ledger, &stale)?;
            }
        }
        reward_state.settle_amounts = settle_amounts.flush()?;
    }

    // Coins minted but not distributed (downtime punishment, zero weight)
    // and forfeited work coins route to the governance sink.
    let undistributed = minted.saturating_sub(distributed_total);
    if undistributed > 0 {
        ledger.transfer_module_to_module(
            REWARD_POOL_ACCOUNT,
            GOVERNANCE_SINK_ACCOUNT,
            undistributed as i64,
        )?;
    }
    if forfeited_work > 0 {
        ledger.transfer_module_to_module(
            ESCROW_MODULE_ACCOUNT,
            GOVERNANCE_SINK_ACCOUNT,
            forfeited_work as i64,
        )?;
    }

    Ok(SettleResult {
        bitcoin,
        minted,
        entries,
        undistributed,
        forfeited_work,
    })
}

/// Moves an expired claim's coins to governance: the reward share from the
/// reward pool, the work share from escrow.
fn transfer_expired_claim<L: BankLedger>(
    ledger: &mut L,
    claim: &SettleAmount,
) -> Result<(), ActorError> {
    if claim.reward_coins > 0 {
        ledger.transfer_module_to_module(
            REWARD_POOL_ACCOUNT,
            GOVERNANCE_SINK_ACCOUNT,
            claim.reward_coins as i64,
        )?;
    }
    if claim.work_coins > 0 {
        ledger.transfer_module_to_module(
            ESCROW_MODULE_ACCOUNT,
            GOVERNANCE_SINK_ACCOUNT,
            claim.work_coins as i64,
        )?;
    }
    Ok(())
}
