// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use serde::{Deserialize, Serialize};

use crate::math::Decimal;

// A trait for runtime policy configuration
pub trait RuntimePolicy {
    fn policy(&self) -> &Policy;
}

/// Network policy for the proof-of-inference actors.
///
/// Persisted under the `params` key; every tunable that feeds a consensus
/// computation lives here.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Policy {
    //
    // --- inference policy ---
    //
    /// Completion-token allowance assumed when a request does not name one.
    pub default_max_tokens: u64,

    /// Per-token price used when a model carries no governance price.
    pub legacy_per_token_price: u64,

    /// Blocks an inference may stay unresolved before it expires.
    pub expiration_blocks: i64,

    /// Tolerated distance between block time and a message timestamp, in
    /// nanoseconds.
    pub timestamp_expiration_ns: i64,

    /// Tolerated forward distance for future-dated message timestamps, in
    /// nanoseconds.
    pub timestamp_advance_ns: i64,

    //
    // --- validation policy ---
    //
    /// Validation probability for a zero-reputation executor when traffic is
    /// at or below the full-validation cutoff.
    pub max_validation_average: Decimal,

    /// Validation probability floor reached at the min-validation traffic
    /// cutoff.
    pub min_validation_halfway: Decimal,

    /// Traffic at or below which every inference is validated at the
    /// maximum average.
    pub full_validation_traffic_cutoff: i64,

    /// Traffic at or beyond which the validation average bottoms out.
    pub min_validation_traffic_cutoff: i64,

    //
    // --- participant status policy ---
    //
    /// Null-hypothesis miss rate for the downtime binomial test.
    pub binom_test_p0: Decimal,

    /// Log-likelihood-ratio level at which a participant turns INVALID.
    pub invalid_llr_threshold: Decimal,

    /// Log-likelihood-ratio level at which a participant turns INACTIVE.
    pub inactive_llr_threshold: Decimal,

    /// Consecutive invalidated inferences that force INVALID regardless of
    /// the likelihood ratio.
    pub max_consecutive_invalid: u32,

    /// Collateral fraction slashed on an ACTIVE -> INVALID crossing.
    pub slash_fraction_invalid: Decimal,

    /// Collateral fraction slashed on an ACTIVE -> INACTIVE crossing.
    pub slash_fraction_downtime: Decimal,

    /// Multiplier applied to `epochs_completed` when a participant turns
    /// INVALID. Clamped to [0, 1].
    pub invalid_reputation_preserve: Decimal,

    /// Multiplier applied to `epochs_completed` when a participant turns
    /// INACTIVE. Clamped to [0, 1].
    pub downtime_reputation_preserve: Decimal,

    /// Reputation at which an executor's validation probability bottoms
    /// out; `epochs_completed` counts toward it.
    pub full_reputation_epochs: u32,

    //
    // --- settlement policy ---
    //
    /// Largest share of post-cap power a single participant may hold.
    /// Networks of one, two or three participants override this to 100%,
    /// 50% and 40% respectively.
    pub max_individual_power_percentage: Decimal,

    /// Reward minted for the genesis epoch, in the smallest denomination.
    pub initial_epoch_reward: u64,

    /// Per-epoch exponential decay rate of the emission.
    pub decay_rate: Decimal,

    /// Epoch index of the first emission.
    pub genesis_epoch: u64,

    /// Hard cap on cumulative emission.
    pub total_subsidy_supply: u64,
}

impl Default for Policy {
    fn default() -> Policy {
        Policy {
            default_max_tokens: policy_constants::DEFAULT_MAX_TOKENS,
            legacy_per_token_price: policy_constants::LEGACY_PER_TOKEN_PRICE,
            expiration_blocks: policy_constants::EXPIRATION_BLOCKS,
            timestamp_expiration_ns: policy_constants::TIMESTAMP_EXPIRATION_NS,
            timestamp_advance_ns: policy_constants::TIMESTAMP_ADVANCE_NS,
            max_validation_average: policy_constants::MAX_VALIDATION_AVERAGE,
            min_validation_halfway: policy_constants::MIN_VALIDATION_HALFWAY,
            full_validation_traffic_cutoff: policy_constants::FULL_VALIDATION_TRAFFIC_CUTOFF,
            min_validation_traffic_cutoff: policy_constants::MIN_VALIDATION_TRAFFIC_CUTOFF,
            binom_test_p0: policy_constants::BINOM_TEST_P0,
            invalid_llr_threshold: policy_constants::INVALID_LLR_THRESHOLD,
            inactive_llr_threshold: policy_constants::INACTIVE_LLR_THRESHOLD,
            max_consecutive_invalid: policy_constants::MAX_CONSECUTIVE_INVALID,
            slash_fraction_invalid: policy_constants::SLASH_FRACTION_INVALID,
            slash_fraction_downtime: policy_constants::SLASH_FRACTION_DOWNTIME,
            invalid_reputation_preserve: policy_constants::INVALID_REPUTATION_PRESERVE,
            downtime_reputation_preserve: policy_constants::DOWNTIME_REPUTATION_PRESERVE,
            full_reputation_epochs: policy_constants::FULL_REPUTATION_EPOCHS,
            max_individual_power_percentage: policy_constants::MAX_INDIVIDUAL_POWER_PERCENTAGE,
            initial_epoch_reward: policy_constants::INITIAL_EPOCH_REWARD,
            decay_rate: policy_constants::DECAY_RATE,
            genesis_epoch: policy_constants::GENESIS_EPOCH,
            total_subsidy_supply: policy_constants::TOTAL_SUBSIDY_SUPPLY,
        }
    }
}

pub mod policy_constants {
    use crate::math::Decimal;

    //
    // --- inference policy ---
    //

    // See comments on Policy struct.
    pub const DEFAULT_MAX_TOKENS: u64 = 5_000;

    pub const LEGACY_PER_TOKEN_PRICE: u64 = 1_000;

    pub const EXPIRATION_BLOCKS: i64 = 20;

    pub const TIMESTAMP_EXPIRATION_NS: i64 = 60_000_000_000;

    pub const TIMESTAMP_ADVANCE_NS: i64 = 10_000_000_000;

    //
    // --- validation policy ---
    //

    pub const MAX_VALIDATION_AVERAGE: Decimal = Decimal::new(1, 0);

    pub const MIN_VALIDATION_HALFWAY: Decimal = Decimal::new(5, -2);

    pub const FULL_VALIDATION_TRAFFIC_CUTOFF: i64 = 10;

    pub const MIN_VALIDATION_TRAFFIC_CUTOFF: i64 = 1_000;

    //
    // --- participant status policy ---
    //

    pub const BINOM_TEST_P0: Decimal = Decimal::new(10, -2);

    pub const INVALID_LLR_THRESHOLD: Decimal = Decimal::new(3, 0);

    pub const INACTIVE_LLR_THRESHOLD: Decimal = Decimal::new(3, 0);

    pub const MAX_CONSECUTIVE_INVALID: u32 = 10;

    pub const SLASH_FRACTION_INVALID: Decimal = Decimal::new(20, -2);

    pub const SLASH_FRACTION_DOWNTIME: Decimal = Decimal::new(10, -2);

    pub const INVALID_REPUTATION_PRESERVE: Decimal = Decimal::new(25, -2);

    pub const DOWNTIME_REPUTATION_PRESERVE: Decimal = Decimal::new(80, -2);

    /// Reputation saturates after 100 completed epochs.
    pub const FULL_REPUTATION_EPOCHS: u32 = 100;

    //
    // --- settlement policy ---
    //

    pub const MAX_INDIVIDUAL_POWER_PERCENTAGE: Decimal = Decimal::new(30, -2);

    /// 2.85e14 smallest units for the genesis epoch.
    pub const INITIAL_EPOCH_REWARD: u64 = 285_000_000_000_000;

    /// Halves the emission roughly every 1460 epochs.
    pub const DECAY_RATE: Decimal = Decimal::new(-475, -6);

    pub const GENESIS_EPOCH: u64 = 1;

    /// Geometric-series bound of the decaying emission, rounded up to a
    /// round figure.
    pub const TOTAL_SUBSIDY_SUPPLY: u64 = 600_000_000_000_000_000;
}
