// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use poi_actors_shared::builtin::ESCROW_MODULE_ACCOUNT;
use poi_actors_shared::math::{checked_coin_mul, checked_token_add, Decimal};
use poi_actors_shared::runtime::{BankLedger, BlockContext, Policy, SubAccount};
use poi_actors_shared::{actor_error, ActorError, Config, Map2, DEFAULT_HAMT_CONFIG};

use crate::types::{
    FinishInferenceParams, Inference, InferenceOutcome, InferenceStatus,
    InferenceValidationDetails, InvalidationOutcome, Model, StartInferenceParams,
    ValidationMsgParams,
};

pub type InferencesMap<BS> = Map2<BS, String, Inference>;
pub const INFERENCES_CONFIG: Config = DEFAULT_HAMT_CONFIG;

pub type ModelsMap<BS> = Map2<BS, String, Model>;
pub const MODELS_CONFIG: Config = DEFAULT_HAMT_CONFIG;

pub type ValidationDetailsMap<BS> = Map2<BS, String, InferenceValidationDetails>;
pub const VALIDATION_DETAILS_CONFIG: Config = DEFAULT_HAMT_CONFIG;

pub type TimeoutsMap<BS> = Map2<BS, i64, Vec<String>>;
pub const TIMEOUTS_CONFIG: Config = DEFAULT_HAMT_CONFIG;

/// Requester coins held for an inference: `(prompt + max_tokens) * price`.
pub fn escrow_amount(
    prompt_token_count: u64,
    max_tokens: u64,
    per_token_price: u64,
) -> Result<i64, ActorError> {
    let tokens = checked_token_add(prompt_token_count, max_tokens)?;
    checked_coin_mul(tokens, per_token_price)
}

/// Cost of a completed inference: `(prompt + completion) * price`.
pub fn inference_cost(
    prompt_token_count: u64,
    completion_token_count: u64,
    per_token_price: u64,
) -> Result<i64, ActorError> {
    let tokens = checked_token_add(prompt_token_count, completion_token_count)?;
    checked_coin_mul(tokens, per_token_price)
}

/// Bounds the distance between a message timestamp and block time.
/// `extra_ns` widens the backward window, e.g. during upgrade protection.
pub fn check_timestamp(
    policy: &Policy,
    ctx: &BlockContext,
    timestamp_ns: i64,
    extra_ns: i64,
) -> Result<(), ActorError> {
    if timestamp_ns > ctx.block_time_ns {
        if timestamp_ns - ctx.block_time_ns > policy.timestamp_advance_ns {
            return Err(actor_error!(
                illegal_argument,
                "message timestamp {} too far ahead of block time {}",
                timestamp_ns,
                ctx.block_time_ns
            ));
        }
    } else if ctx.block_time_ns - timestamp_ns > policy.timestamp_expiration_ns + extra_ns {
        return Err(actor_error!(
            too_late,
            "message timestamp {} expired at block time {}",
            timestamp_ns,
            ctx.block_time_ns
        ));
    }
    Ok(())
}

/// Inference actor state.
#[derive(Clone, Debug, Serialize_tuple, Deserialize_tuple)]
pub struct State {
    /// Inference records. HAMT[id]Inference
    pub inferences: Cid,
    /// Governance model registry. HAMT[id]Model
    pub models: Cid,
    /// Completion snapshots for validator sampling. HAMT[id]Details
    pub validation_details: Cid,
    /// Expiration queue, ids per expiry height. HAMT[height]Vec<id>
    pub timeouts: Cid,
}

impl State {
    pub fn new<BS: Blockstore>(store: &BS) -> Result<State, ActorError> {
        Ok(State {
            inferences: InferencesMap::flush_empty(store, INFERENCES_CONFIG)?,
            models: ModelsMap::flush_empty(store, MODELS_CONFIG)?,
            validation_details: ValidationDetailsMap::flush_empty(store, VALIDATION_DETAILS_CONFIG)?,
            timeouts: TimeoutsMap::flush_empty(store, TIMEOUTS_CONFIG)?,
        })
    }

    pub fn register_model<BS: Blockstore>(
        &mut self,
        store: &BS,
        model: Model,
    ) -> Result<(), ActorError> {
        let mut models = ModelsMap::load(store, &self.models, MODELS_CONFIG, "models")?;
        models.set(&model.id.clone(), model)?;
        self.models = models.flush()?;
        Ok(())
    }

    pub fn get_model<BS: Blockstore>(
        &self,
        store: &BS,
        model_id: &str,
    ) -> Result<Option<Model>, ActorError> {
        let models = ModelsMap::load(store, &self.models, MODELS_CONFIG, "models")?;
        Ok(models.get(&model_id.to_string())?.cloned())
    }

    /// Governance price of a model, with the legacy fallback for models
    /// registered before pricing went on-chain.
    pub fn model_price<BS: Blockstore>(
        &self,
        store: &BS,
        model_id: &str,
        policy: &Policy,
    ) -> Result<u64, ActorError> {
        Ok(self
            .get_model(store, model_id)?
            .map(|model| model.per_token_price)
            .unwrap_or(policy.legacy_per_token_price))
    }

    pub fn get_inference<BS: Blockstore>(
        &self,
        store: &BS,
        inference_id: &str,
    ) -> Result<Option<Inference>, ActorError> {
        let inferences =
            InferencesMap::load(store, &self.inferences, INFERENCES_CONFIG, "inferences")?;
        Ok(inferences.get(&inference_id.to_string())?.cloned())
    }

    pub fn must_get_inference<BS: Blockstore>(
        &self,
        store: &BS,
        inference_id: &str,
    ) -> Result<Inference, ActorError> {
        self.get_inference(store, inference_id)?
            .ok_or_else(|| actor_error!(not_found, "inference {} not found", inference_id))
    }

    fn put_inference<BS: Blockstore>(
        &mut self,
        store: &BS,
        inference: Inference,
    ) -> Result<(), ActorError> {
        let mut inferences =
            InferencesMap::load(store, &self.inferences, INFERENCES_CONFIG, "inferences")?;
        inferences.set(&inference.id.clone(), inference)?;
        self.inferences = inferences.flush()?;
        Ok(())
    }

    /// Applies a StartInference message. Creates the record, or enriches a
    /// record created by an earlier FinishInference; in the latter case the
    /// escrow taken and the executor payment are both `min(cost, escrow)`.
    ///
    /// `timestamp_allowance_ns` widens the timestamp window, e.g. from an
    /// upgrade-protection grace epoch.
    pub fn process_start_inference<BS: Blockstore, L: BankLedger>(
        &mut self,
        store: &BS,
        ledger: &mut L,
        policy: &Policy,
        ctx: &BlockContext,
        epoch_id: u64,
        params: &StartInferenceParams,
        timestamp_allowance_ns: i64,
    ) -> Result<InferenceOutcome, ActorError> {
        check_timestamp(policy, ctx, params.request_timestamp_ns, timestamp_allowance_ns)?;
        if params.prompt_hash.is_empty() {
            return Err(actor_error!(illegal_argument, "empty prompt hash"));
        }

        let existing = self.get_inference(store, &params.inference_id)?;
        if let Some(inference) = &existing {
            if inference.start_processed() {
                return Err(actor_error!(
                    illegal_state,
                    "duplicate StartInference for {}",
                    params.inference_id
                ));
            }
        }

        let max_tokens = if params.max_tokens == 0 {
            policy.default_max_tokens
        } else {
            params.max_tokens
        };

        match existing {
            // Finish arrived first: settle both sides now. The escrow taken
            // equals the executor payment, so a later invalidation can
            // refund exactly `actual_cost`.
            Some(mut inference) => {
                let escrow =
                    escrow_amount(params.prompt_token_count, max_tokens, inference.per_token_price)?;
                let cost = inference_cost(
                    inference.prompt_token_count,
                    inference.completion_token_count,
                    inference.per_token_price,
                )?;
                let amount_to_pay = cost.min(escrow);

                inference.prompt_hash = params.prompt_hash.clone();
                inference.requested_by = params.requested_by.clone();
                inference.transfer_signature = params.transfer_signature.clone();
                inference.max_tokens = max_tokens;
                inference.start_block_height = ctx.block_height;
                inference.start_block_time_ns = ctx.block_time_ns;
                inference.escrow_amount = amount_to_pay;
                inference.actual_cost = amount_to_pay;

                if amount_to_pay > 0 {
                    ledger.transfer_to_module(
                        &inference.requested_by,
                        ESCROW_MODULE_ACCOUNT,
                        amount_to_pay,
                    )?;
                }
                ledger.log_sub_account_transaction(
                    &inference.executed_by,
                    SubAccount::Owed,
                    amount_to_pay,
                    "inference payment",
                );

                self.put_inference(store, inference)?;
                Ok(InferenceOutcome {
                    escrow_delta: amount_to_pay,
                    executor_payment: amount_to_pay,
                    completed: true,
                })
            }
            // Normal order: take the full escrow, wait for the finish.
            None => {
                let per_token_price = self.model_price(store, &params.model, policy)?;
                let escrow = escrow_amount(params.prompt_token_count, max_tokens, per_token_price)?;

                let inference = Inference {
                    id: params.inference_id.clone(),
                    status: InferenceStatus::Started,
                    model: params.model.clone(),
                    per_token_price,
                    prompt_token_count: params.prompt_token_count,
                    completion_token_count: 0,
                    max_tokens,
                    escrow_amount: escrow,
                    actual_cost: 0,
                    executed_by: String::new(),
                    requested_by: params.requested_by.clone(),
                    transferred_by: String::new(),
                    epoch_id,
                    start_block_height: ctx.block_height,
                    start_block_time_ns: ctx.block_time_ns,
                    end_block_height: 0,
                    end_block_time_ns: 0,
                    prompt_hash: params.prompt_hash.clone(),
                    response_hash: String::new(),
                    transfer_signature: params.transfer_signature.clone(),
                    executor_signature: String::new(),
                    validated_by: Vec::new(),
                };

                if escrow > 0 {
                    ledger.transfer_to_module(
                        &inference.requested_by,
                        ESCROW_MODULE_ACCOUNT,
                        escrow,
                    )?;
                }
                self.register_timeout(
                    store,
                    ctx.block_height + policy.expiration_blocks,
                    &params.inference_id,
                )?;
                self.put_inference(store, inference)?;
                Ok(InferenceOutcome {
                    escrow_delta: escrow,
                    executor_payment: 0,
                    completed: false,
                })
            }
        }
    }

    /// Applies a FinishInference message. Completes a started record and
    /// settles payment, or creates a pre-start finished record whose
    /// payments wait for the StartInference half.
    pub fn process_finish_inference<BS: Blockstore, L: BankLedger>(
        &mut self,
        store: &BS,
        ledger: &mut L,
        policy: &Policy,
        ctx: &BlockContext,
        epoch_id: u64,
        params: &FinishInferenceParams,
        timestamp_allowance_ns: i64,
    ) -> Result<InferenceOutcome, ActorError> {
        check_timestamp(policy, ctx, params.request_timestamp_ns, timestamp_allowance_ns)?;
        if params.executed_by.is_empty() {
            return Err(actor_error!(illegal_argument, "empty executor"));
        }

        let existing = self.get_inference(store, &params.inference_id)?;
        if let Some(inference) = &existing {
            if inference.finished_processed() {
                return Err(actor_error!(
                    illegal_state,
                    "duplicate FinishInference for {}",
                    params.inference_id
                ));
            }
        }

        match existing {
            // Start arrived first: charge actual cost, refund the unused
            // escrow, pay the executor.
            Some(mut inference) => {
                let cost = inference_cost(
                    inference.prompt_token_count,
                    params.completion_token_count,
                    inference.per_token_price,
                )?;
                let amount_to_pay = cost.min(inference.escrow_amount);
                let refund = inference.escrow_amount - amount_to_pay;

                inference.status = InferenceStatus::Finished;
                inference.executed_by = params.executed_by.clone();
                inference.transferred_by = params.transferred_by.clone();
                inference.completion_token_count = params.completion_token_count;
                inference.response_hash = params.response_hash.clone();
                inference.executor_signature = params.executor_signature.clone();
                inference.end_block_height = ctx.block_height;
                inference.end_block_time_ns = ctx.block_time_ns;
                inference.actual_cost = cost;
                inference.escrow_amount = amount_to_pay;

                if refund > 0 {
                    ledger.transfer_from_module(
                        ESCROW_MODULE_ACCOUNT,
                        &inference.requested_by,
                        refund,
                    )?;
                }
                ledger.log_sub_account_transaction(
                    &params.executed_by,
                    SubAccount::Owed,
                    amount_to_pay,
                    "inference payment",
                );

                self.put_inference(store, inference)?;
                Ok(InferenceOutcome {
                    escrow_delta: -refund,
                    executor_payment: amount_to_pay,
                    completed: true,
                })
            }
            // Finish before start: record what the executor reports; all
            // coin movement waits for the StartInference half.
            None => {
                let per_token_price = self.model_price(store, &params.model, policy)?;
                let inference = Inference {
                    id: params.inference_id.clone(),
                    status: InferenceStatus::Finished,
                    model: params.model.clone(),
                    per_token_price,
                    prompt_token_count: params.prompt_token_count,
                    completion_token_count: params.completion_token_count,
                    max_tokens: policy.default_max_tokens,
                    escrow_amount: 0,
                    actual_cost: 0,
                    executed_by: params.executed_by.clone(),
                    requested_by: String::new(),
                    transferred_by: params.transferred_by.clone(),
                    epoch_id,
                    start_block_height: 0,
                    start_block_time_ns: 0,
                    end_block_height: ctx.block_height,
                    end_block_time_ns: ctx.block_time_ns,
                    prompt_hash: String::new(),
                    response_hash: params.response_hash.clone(),
                    transfer_signature: params.transfer_signature.clone(),
                    executor_signature: params.executor_signature.clone(),
                    validated_by: Vec::new(),
                };
                self.put_inference(store, inference)?;
                Ok(InferenceOutcome::default())
            }
        }
    }

    /// Stores the completion snapshot used by validator sampling.
    pub fn record_validation_details<BS: Blockstore>(
        &mut self,
        store: &BS,
        details: InferenceValidationDetails,
    ) -> Result<(), ActorError> {
        let mut map = ValidationDetailsMap::load(
            store,
            &self.validation_details,
            VALIDATION_DETAILS_CONFIG,
            "validation details",
        )?;
        map.set(&details.inference_id.clone(), details)?;
        self.validation_details = map.flush()?;
        Ok(())
    }

    pub fn get_validation_details<BS: Blockstore>(
        &self,
        store: &BS,
        inference_id: &str,
    ) -> Result<Option<InferenceValidationDetails>, ActorError> {
        let map = ValidationDetailsMap::load(
            store,
            &self.validation_details,
            VALIDATION_DETAILS_CONFIG,
            "validation details",
        )?;
        Ok(map.get(&inference_id.to_string())?.cloned())
    }

    /// Applies a validator's verdict. Returns whether the verdict passed
    /// the model threshold; a failing verdict moves the inference to
    /// VOTING for the invalidation machinery to decide.
    pub fn apply_validation<BS: Blockstore>(
        &mut self,
        store: &BS,
        params: &ValidationMsgParams,
    ) -> Result<bool, ActorError> {
        if params.value.is_negative() || params.value > Decimal::one() {
            return Err(actor_error!(
                illegal_argument,
                "validation value {} outside [0, 1]",
                params.value
            ));
        }

        let mut inference = self.must_get_inference(store, &params.inference_id)?;
        if !inference.finished_processed() {
            return Err(actor_error!(
                illegal_state,
                "inference {} not finished",
                params.inference_id
            ));
        }
        match inference.status {
            InferenceStatus::Finished | InferenceStatus::Voting | InferenceStatus::Validated => {}
            status => {
                return Err(actor_error!(
                    illegal_state,
                    "inference {} not validatable in status {:?}",
                    params.inference_id,
                    status
                ))
            }
        }
        if !params.revalidation && inference.validated_by.iter().any(|v| v == &params.creator) {
            return Err(actor_error!(
                illegal_state,
                "duplicate validation of {} by {}",
                params.inference_id,
                params.creator
            ));
        }

        let model = self.get_model(store, &inference.model)?.ok_or_else(|| {
            actor_error!(not_found, "model {} not registered", inference.model)
        })?;
        let passed = params.value >= model.validation_threshold;

        if !inference.validated_by.iter().any(|v| v == &params.creator) {
            inference.validated_by.push(params.creator.clone());
        }
        inference.status = if passed {
            InferenceStatus::Validated
        } else {
            InferenceStatus::Voting
        };
        self.put_inference(store, inference)?;
        Ok(passed)
    }

    /// Invalidates an inference after a failed vote. Refunds the requester
    /// and debits the executor only while claims for the inference's epoch
    /// are still open; afterwards only the status changes. The refund
    /// transfer lands before any executor debit is reported.
    pub fn invalidate_inference<BS: Blockstore, L: BankLedger>(
        &mut self,
        store: &BS,
        ledger: &mut L,
        inference_id: &str,
        claims_frozen: bool,
    ) -> Result<InvalidationOutcome, ActorError> {
        let mut inference = self.must_get_inference(store, inference_id)?;
        if !inference.finished_processed() {
            return Err(actor_error!(illegal_state, "inference {} not finished", inference_id));
        }
        if inference.status == InferenceStatus::Invalidated {
            return Err(actor_error!(illegal_state, "inference {} already invalidated", inference_id));
        }

        inference.status = InferenceStatus::Invalidated;
        let outcome = if claims_frozen {
            InvalidationOutcome::default()
        } else {
            // Sized by actual_cost, which out-of-order settlement may have
            // clamped below the nominal cost.
            let refund = inference.actual_cost;
            if refund > 0 {
                ledger.transfer_from_module(ESCROW_MODULE_ACCOUNT, &inference.requested_by, refund)?;
                ledger.log_sub_account_transaction(
                    &inference.executed_by,
                    SubAccount::Owed,
                    -refund,
                    "inference invalidated",
                );
            }
            inference.escrow_amount -= refund;
            InvalidationOutcome {
                refund,
                executor_debit: refund,
            }
        };
        self.put_inference(store, inference)?;
        Ok(outcome)
    }

    /// Restores an inference after a vote decided in its favor.
    pub fn revalidate_inference<BS: Blockstore>(
        &mut self,
        store: &BS,
        inference_id: &str,
    ) -> Result<(), ActorError> {
        let mut inference = self.must_get_inference(store, inference_id)?;
        match inference.status {
            InferenceStatus::Voting | InferenceStatus::Invalidated => {
                inference.status = InferenceStatus::Validated;
                self.put_inference(store, inference)
            }
            status => Err(actor_error!(
                illegal_state,
                "inference {} not revalidatable in status {:?}",
                inference_id,
                status
            )),
        }
    }

    fn register_timeout<BS: Blockstore>(
        &mut self,
        store: &BS,
        expiry_height: i64,
        inference_id: &str,
    ) -> Result<(), ActorError> {
        let mut timeouts = TimeoutsMap::load(store, &self.timeouts, TIMEOUTS_CONFIG, "timeouts")?;
        let mut due = timeouts.get(&expiry_height)?.cloned().unwrap_or_default();
        due.push(inference_id.to_string());
        timeouts.set(&expiry_height, due)?;
        self.timeouts = timeouts.flush()?;
        Ok(())
    }

    /// Expires inferences whose timeout lands on this block. A started
    /// inference that never finished refunds its full escrow; an unresolved
    /// vote merely expires. Returns the expired ids in deterministic order.
    pub fn expire_inferences<BS: Blockstore, L: BankLedger>(
        &mut self,
        store: &BS,
        ledger: &mut L,
        ctx: &BlockContext,
    ) -> Result<Vec<String>, ActorError> {
        let mut timeouts = TimeoutsMap::load(store, &self.timeouts, TIMEOUTS_CONFIG, "timeouts")?;
        let mut due = match timeouts.get(&ctx.block_height)? {
            Some(ids) => ids.clone(),
            None => return Ok(Vec::new()),
        };
        timeouts.delete(&ctx.block_height)?;
        self.timeouts = timeouts.flush()?;
        due.sort();

        let mut expired = Vec::new();
        for inference_id in due {
            let mut inference = self.must_get_inference(store, &inference_id)?;
            match inference.status {
                InferenceStatus::Started => {
                    let refund = inference.escrow_amount;
                    if refund > 0 {
                        ledger.transfer_from_module(
                            ESCROW_MODULE_ACCOUNT,
                            &inference.requested_by,
                            refund,
                        )?;
                    }
                    inference.escrow_amount = 0;
                    inference.status = InferenceStatus::Expired;
                    self.put_inference(store, inference)?;
                    expired.push(inference_id);
                }
                InferenceStatus::Voting => {
                    inference.status = InferenceStatus::Expired;
                    self.put_inference(store, inference)?;
                    expired.push(inference_id);
                }
                _ => {}
            }
        }
        Ok(expired)
    }
}
