// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_shared4::bigint::BigInt;
use num_traits::ToPrimitive;
use poi_actors_shared::math::decay;
use poi_actors_shared::runtime::Policy;

use crate::types::BitcoinResult;

/// Emission for an epoch: the initial reward decayed over the epochs since
/// genesis. Epochs before genesis emit the undecayed initial reward.
pub fn epoch_reward(policy: &Policy, epoch: u64) -> BitcoinResult {
    let elapsed = epoch.saturating_sub(policy.genesis_epoch);
    let amount = decay(policy.initial_epoch_reward, Some(&policy.decay_rate), elapsed);
    BitcoinResult {
        amount,
        decay_applied: elapsed > 0,
    }
}

/// Clamps an epoch emission to the remaining subsidy supply.
pub fn clamp_to_supply(policy: &Policy, total_subsidies_paid: u64, fixed_reward: u64) -> u64 {
    if total_subsidies_paid >= policy.total_subsidy_supply {
        return 0;
    }
    let remaining = policy.total_subsidy_supply - total_subsidies_paid;
    fixed_reward.min(remaining)
}

/// Base reward share `weight * minted / total_weight`, exact in big-int
/// arithmetic. A result beyond the u64 range indicates parameter
/// misconfiguration and caps at `u64::MAX`.
pub fn proportional_share(weight: i64, minted: u64, total_weight: i64) -> u64 {
    if weight <= 0 || total_weight <= 0 {
        return 0;
    }
    let share = BigInt::from(weight) * BigInt::from(minted) / BigInt::from(total_weight);
    share.to_u64().unwrap_or(u64::MAX)
}
