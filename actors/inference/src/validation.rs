// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Per-inference validator sampling.

use poi_actors_shared::math::Decimal;
use poi_actors_shared::randomness::deterministic_unit;
use poi_actors_shared::runtime::Policy;

use crate::types::InferenceValidationDetails;

/// Validation rate floor for the given traffic: the maximum average at or
/// below the full-validation cutoff, the halfway floor at or beyond the
/// min-validation cutoff, linear in between.
pub fn min_validation_average(policy: &Policy, traffic_basis: i64) -> Decimal {
    let full = policy.full_validation_traffic_cutoff;
    let min = policy.min_validation_traffic_cutoff;
    if traffic_basis <= full || min <= full {
        return policy.max_validation_average;
    }
    if traffic_basis >= min {
        return policy.min_validation_halfway;
    }
    let span = policy.max_validation_average.sub(&policy.min_validation_halfway);
    let fraction = match Decimal::ratio(traffic_basis - full, min - full) {
        Ok(fraction) => fraction,
        Err(_) => return policy.max_validation_average,
    };
    policy.max_validation_average.sub(&span.mul(&fraction))
}

/// Decides whether this validator samples the inference for validation.
///
/// Every replica evaluates this for every validator with identical state
/// and must reach identical decisions, hence the exact decimal arithmetic
/// and the deterministic unit draw keyed by `(seed, inference_id)`.
pub fn should_validate(
    policy: &Policy,
    seed: i64,
    details: &InferenceValidationDetails,
    validator_power: i64,
) -> bool {
    if details.total_power <= details.executor_power {
        return false;
    }

    // Reputation on [0, 1], exponent -2 by construction.
    let reputation = Decimal::new(details.executor_reputation.clamp(0, 100) as i64, -2);

    let min_avg = min_validation_average(policy, details.traffic_basis);
    let range = policy.max_validation_average.sub(&min_avg);
    // Reputation 1 targets the minimum average, reputation 0 the maximum.
    let target = policy.max_validation_average.sub(&range.mul(&reputation));

    let power_share = match Decimal::ratio(validator_power, details.total_power - details.executor_power)
    {
        Ok(share) => share,
        Err(_) => return false,
    };
    let probability = target.mul(&power_share).clamp01();

    let draw = deterministic_unit(seed, &details.inference_id);
    draw < probability
}
