// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::tuple::*;
use fvm_shared4::clock::ChainEpoch;
use num_derive::FromPrimitive;
use poi_actors_shared::math::Decimal;
use serde_repr::{Deserialize_repr, Serialize_repr};
use std::fmt;

/// Participant standing; only ACTIVE participants earn rewards.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, Serialize_repr, Deserialize_repr, Default,
)]
#[repr(u8)]
pub enum ParticipantStatus {
    #[default]
    Active = 0,
    Inactive = 1,
    Invalid = 2,
}

/// Why a participant was excluded from its epoch groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ExclusionReason {
    InvalidInferences = 0,
    Downtime = 1,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::InvalidInferences => write!(f, "invalid inferences"),
            ExclusionReason::Downtime => write!(f, "downtime"),
        }
    }
}

/// Per-epoch performance counters, reset at settlement.
///
/// `inference_count + missed_requests` only ever grows within an epoch; the
/// likelihood ratios accumulate evidence toward the INVALID and INACTIVE
/// classifications.
#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
pub struct CurrentEpochStats {
    pub inference_count: u64,
    pub missed_requests: u64,
    pub validated_inferences: u64,
    pub invalidated_inferences: u64,
    pub invalid_llr: Decimal,
    pub inactive_llr: Decimal,
}

impl Default for CurrentEpochStats {
    fn default() -> Self {
        Self {
            inference_count: 0,
            missed_requests: 0,
            validated_inferences: 0,
            invalidated_inferences: 0,
            invalid_llr: Decimal::zero(),
            inactive_llr: Decimal::zero(),
        }
    }
}

/// A registered network participant.
#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
pub struct Participant {
    /// Bech32 account address; also the state key.
    pub address: String,
    pub status: ParticipantStatus,
    /// Work coins owed for the current epoch, paid out and reset at
    /// settlement.
    pub coin_balance: i64,
    /// Reputation counter; scaled down on punishment crossings.
    pub epochs_completed: u32,
    pub consecutive_invalid_inferences: u32,
    pub current_epoch_stats: CurrentEpochStats,
}

impl Participant {
    pub fn new(address: String) -> Self {
        Self {
            address,
            status: ParticipantStatus::Active,
            coin_balance: 0,
            epochs_completed: 0,
            consecutive_invalid_inferences: 0,
            current_epoch_stats: CurrentEpochStats::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ParticipantStatus::Active
    }

    /// Reputation on the unit interval: `epochs_completed / full`, capped
    /// at one. Exact decimal arithmetic.
    pub fn reputation(&self, full_reputation_epochs: u32) -> Decimal {
        if full_reputation_epochs == 0 || self.epochs_completed >= full_reputation_epochs {
            return Decimal::one();
        }
        Decimal::ratio(self.epochs_completed as i64, full_reputation_epochs as i64)
            .unwrap_or_else(|_| Decimal::zero())
    }
}

/// Exclusion record written when a participant leaves its epoch groups.
#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
pub struct ExclusionRecord {
    pub address: String,
    pub epoch_index: u64,
    pub reason: ExclusionReason,
    pub block_height: ChainEpoch,
}
