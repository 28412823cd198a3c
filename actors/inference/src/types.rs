// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::tuple::*;
use fvm_shared4::clock::ChainEpoch;
use num_derive::FromPrimitive;
use poi_actors_shared::math::Decimal;
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Lifecycle states of an inference request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum InferenceStatus {
    Started = 0,
    Finished = 1,
    Validated = 2,
    Invalidated = 3,
    Voting = 4,
    Expired = 5,
}

/// A governance-registered model.
#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
pub struct Model {
    pub id: String,
    /// Governance-set price per prompt/completion token.
    pub per_token_price: u64,
    /// Validation verdicts at or above this value pass.
    pub validation_threshold: Decimal,
    /// Recent request volume, the traffic input to validation sampling.
    pub traffic_basis: i64,
}

/// An inference record. Created by whichever of the start and finish
/// messages arrives first, enriched by the second.
#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
pub struct Inference {
    pub id: String,
    pub status: InferenceStatus,
    pub model: String,
    /// Price locked on first message arrival; never re-read afterwards.
    pub per_token_price: u64,
    pub prompt_token_count: u64,
    pub completion_token_count: u64,
    pub max_tokens: u64,
    /// Requester coins held in escrow (net of refunds).
    pub escrow_amount: i64,
    /// Cost charged for the completed inference; sizes any later
    /// invalidation refund.
    pub actual_cost: i64,
    pub executed_by: String,
    pub requested_by: String,
    pub transferred_by: String,
    pub epoch_id: u64,
    pub start_block_height: ChainEpoch,
    pub start_block_time_ns: i64,
    pub end_block_height: ChainEpoch,
    pub end_block_time_ns: i64,
    pub prompt_hash: String,
    pub response_hash: String,
    pub transfer_signature: String,
    pub executor_signature: String,
    pub validated_by: Vec<String>,
}

impl Inference {
    /// Whether the StartInference half has been applied.
    pub fn start_processed(&self) -> bool {
        !self.prompt_hash.is_empty()
    }

    /// Whether the FinishInference half has been applied.
    pub fn finished_processed(&self) -> bool {
        !self.executed_by.is_empty()
    }
}

/// StartInference message body (wire encoding external).
#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
pub struct StartInferenceParams {
    pub inference_id: String,
    pub creator: String,
    pub requested_by: String,
    pub assigned_to: String,
    pub model: String,
    pub prompt_token_count: u64,
    pub max_tokens: u64,
    pub prompt_hash: String,
    pub original_prompt_hash: String,
    pub transfer_signature: String,
    pub request_timestamp_ns: i64,
    pub node_version: String,
}

/// FinishInference message body (wire encoding external).
#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
pub struct FinishInferenceParams {
    pub inference_id: String,
    pub executed_by: String,
    pub transferred_by: String,
    pub prompt_token_count: u64,
    pub completion_token_count: u64,
    pub prompt_hash: String,
    pub response_hash: String,
    pub executor_signature: String,
    pub transfer_signature: String,
    pub request_timestamp_ns: i64,
    pub model: String,
}

/// Validation message body.
#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
pub struct ValidationMsgParams {
    pub inference_id: String,
    pub creator: String,
    /// Verdict in [0, 1], compared against the model threshold.
    pub value: Decimal,
    pub revalidation: bool,
}

/// Snapshot captured when an inference completes, feeding the
/// should-validate sampling decision.
#[derive(Clone, Debug, PartialEq, Serialize_tuple, Deserialize_tuple)]
pub struct InferenceValidationDetails {
    pub inference_id: String,
    pub executor_id: String,
    pub executor_reputation: i32,
    pub executor_power: i64,
    pub total_power: i64,
    pub traffic_basis: i64,
    pub model: String,
    pub epoch_id: u64,
    pub created_at_block_height: ChainEpoch,
}

/// Ledger consequences of processing a lifecycle message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InferenceOutcome {
    /// Positive: requester coins moved into escrow. Negative: refunded.
    pub escrow_delta: i64,
    /// Coins to add to the executor's owed work balance.
    pub executor_payment: i64,
    /// Both message halves have now been applied.
    pub completed: bool,
}

/// Ledger consequences of invalidating an inference.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvalidationOutcome {
    /// Refund returned to the requester; zero once claims are frozen.
    pub refund: i64,
    /// Owed balance to remove from the executor; zero once claims are
    /// frozen. Only applied after the refund transfer succeeded.
    pub executor_debit: i64,
}
