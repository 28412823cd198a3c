// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_blockstore::Blockstore;
use fvm_shared4::clock::ChainEpoch;
use poi_actors_shared::math::Decimal;
use poi_actors_shared::runtime::{CollateralSlasher, Policy};
use poi_actors_shared::ActorError;

use crate::state::State;
use crate::types::{CurrentEpochStats, ExclusionReason, ExclusionRecord, Participant, ParticipantStatus};

/// Likelihood-ratio evidence added per invalidated inference.
const INVALIDATED_LLR_STEP: Decimal = Decimal::new(5, -1);
/// Evidence removed per validated inference.
const VALIDATED_LLR_RECOVERY: Decimal = Decimal::new(25, -2);
/// Evidence added per missed request.
const MISSED_LLR_STEP: Decimal = Decimal::new(2, -1);
/// Evidence removed per completed inference.
const COMPLETED_LLR_RECOVERY: Decimal = Decimal::new(5, -2);

impl Participant {
    /// Accounts a completed inference.
    pub fn record_inference_completed(&mut self) {
        self.current_epoch_stats.inference_count += 1;
        self.current_epoch_stats.inactive_llr =
            floor_zero(self.current_epoch_stats.inactive_llr.sub(&COMPLETED_LLR_RECOVERY));
    }

    /// Accounts a request the participant failed to serve.
    pub fn record_missed_request(&mut self) {
        self.current_epoch_stats.missed_requests += 1;
        self.current_epoch_stats.inactive_llr =
            self.current_epoch_stats.inactive_llr.add(&MISSED_LLR_STEP);
    }

    /// Accounts a validation verdict on one of this participant's
    /// inferences.
    pub fn record_validation_outcome(&mut self, passed: bool) {
        let stats = &mut self.current_epoch_stats;
        if passed {
            stats.validated_inferences += 1;
            stats.invalid_llr = floor_zero(stats.invalid_llr.sub(&VALIDATED_LLR_RECOVERY));
            self.consecutive_invalid_inferences = 0;
        } else {
            stats.invalidated_inferences += 1;
            stats.invalid_llr = stats.invalid_llr.add(&INVALIDATED_LLR_STEP);
            self.consecutive_invalid_inferences += 1;
        }
    }

    /// Resets per-epoch counters at settlement.
    pub fn reset_epoch_stats(&mut self) {
        self.current_epoch_stats = CurrentEpochStats::default();
    }
}

/// Evidence never goes negative.
fn floor_zero(d: Decimal) -> Decimal {
    if d.is_negative() {
        Decimal::zero()
    } else {
        d
    }
}

/// Classification produced by [`compute_status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusDecision {
    pub status: ParticipantStatus,
    pub reason: Option<ExclusionReason>,
}

/// Classifies a participant from its per-epoch stats. Pure and total; the
/// caller delegates side-effects to [`apply_status_transition`].
///
/// A participant that is already INVALID or INACTIVE keeps its status even
/// if the stats still satisfy a triggering predicate.
pub fn compute_status(policy: &Policy, participant: &Participant) -> StatusDecision {
    if participant.status != ParticipantStatus::Active {
        return StatusDecision {
            status: participant.status,
            reason: None,
        };
    }

    let stats = &participant.current_epoch_stats;
    if stats.invalid_llr >= policy.invalid_llr_threshold
        || participant.consecutive_invalid_inferences >= policy.max_consecutive_invalid
    {
        return StatusDecision {
            status: ParticipantStatus::Invalid,
            reason: Some(ExclusionReason::InvalidInferences),
        };
    }
    if stats.inactive_llr >= policy.inactive_llr_threshold {
        return StatusDecision {
            status: ParticipantStatus::Inactive,
            reason: Some(ExclusionReason::Downtime),
        };
    }
    StatusDecision {
        status: ParticipantStatus::Active,
        reason: None,
    }
}

/// Outcome of a status crossing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransitionOutcome {
    /// Whether an ACTIVE -> {INVALID, INACTIVE} crossing happened.
    pub crossed: bool,
    /// Collateral slashed by the crossing.
    pub slashed: i64,
    /// The caller must drop the address from all current-epoch groups.
    pub remove_from_epoch_groups: bool,
}

/// Executes the side-effects of a status crossing exactly once: slashing,
/// exclusion record, reputation preservation. Group removal is signalled to
/// the caller, which owns the epoch-group state.
pub fn apply_status_transition<BS: Blockstore, SL: CollateralSlasher>(
    state: &mut State,
    store: &BS,
    slasher: &mut SL,
    policy: &Policy,
    current_epoch: u64,
    block_height: ChainEpoch,
    address: &str,
    decision: &StatusDecision,
) -> Result<TransitionOutcome, ActorError> {
    let mut participant = state.must_get_participant(store, address)?;
    if participant.status != ParticipantStatus::Active
        || decision.status == ParticipantStatus::Active
    {
        // Not a crossing; never refresh punishments.
        return Ok(TransitionOutcome::default());
    }

    let (fraction, preserve, fallback_reason) = match decision.status {
        ParticipantStatus::Invalid => (
            &policy.slash_fraction_invalid,
            &policy.invalid_reputation_preserve,
            ExclusionReason::InvalidInferences,
        ),
        ParticipantStatus::Inactive => (
            &policy.slash_fraction_downtime,
            &policy.downtime_reputation_preserve,
            ExclusionReason::Downtime,
        ),
        ParticipantStatus::Active => return Ok(TransitionOutcome::default()),
    };
    let reason = decision.reason.unwrap_or(fallback_reason);

    // The transfer side of slashing must land before the participant record
    // mutates, so a ledger failure leaves a consistent state.
    let slashed = slasher.slash(address, fraction, &reason.to_string())?;

    state.record_exclusion(
        store,
        ExclusionRecord {
            address: address.to_string(),
            epoch_index: current_epoch,
            reason,
            block_height,
        },
    )?;

    participant.status = decision.status;
    participant.epochs_completed = preserve_reputation(participant.epochs_completed, preserve);
    state.put_participant(store, participant)?;

    Ok(TransitionOutcome {
        crossed: true,
        slashed,
        remove_from_epoch_groups: true,
    })
}

/// `epochs_completed * preserve`, rounded to nearest, preserve clamped to
/// [0, 1].
fn preserve_reputation(epochs_completed: u32, preserve: &Decimal) -> u32 {
    let scaled = preserve.clamp01().mul_int_round(epochs_completed as i64);
    scaled.clamp(0, u32::MAX as i64) as u32
}
