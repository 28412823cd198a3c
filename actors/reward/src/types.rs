// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::tuple::*;
use poi_actors_shared::math::Decimal;

/// A participant's finalized payout for an epoch, claimable until the
/// following settlement sweeps it to governance.
#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
pub struct SettleAmount {
    pub participant: String,
    pub epoch_index: u64,
    /// Accrued inference fees for the epoch.
    pub work_coins: u64,
    /// Share of the epoch's emission.
    pub reward_coins: u64,
    /// The member's signature over the epoch seed, copied from the parent
    /// group.
    pub seed_signature: Vec<u8>,
}

impl SettleAmount {
    pub fn total(&self) -> u64 {
        self.work_coins.saturating_add(self.reward_coins)
    }
}

/// Per-epoch governance overrides protecting participants across planned
/// upgrades.
#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
pub struct GraceEpochParams {
    pub epoch_index: u64,
    /// Relaxed downtime null hypothesis, when present.
    pub binom_test_p0: Option<Decimal>,
    /// Extra nanoseconds granted to message timestamp checks.
    pub upgrade_protection_window: i64,
}

/// Outcome of the emission computation for an epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BitcoinResult {
    pub amount: u64,
    pub decay_applied: bool,
}

/// Per-participant performance figures persisted at settlement.
#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
pub struct EpochPerformanceSummary {
    pub participant: String,
    pub epoch_index: u64,
    pub inference_count: u64,
    pub missed_requests: u64,
    pub work_coins: u64,
    pub reward_coins: u64,
}
