// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::tuple::*;

/// Index of the POC_SLOT bit in a node's timeslot allocation. A set bit
/// means the node keeps serving during confirmation PoC and is not
/// re-verified.
pub const POC_SLOT: usize = 1;

/// A participant's ML node as registered for an epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct MLNodeInfo {
    pub node_id: String,
    pub poc_weight: i64,
    /// Timeslot allocation bits; length at least two.
    pub timeslot_allocation: Vec<bool>,
}

impl MLNodeInfo {
    /// Whether the node is preserved through confirmation PoC.
    pub fn is_preserved(&self) -> bool {
        self.timeslot_allocation.get(POC_SLOT).copied().unwrap_or(false)
    }
}

/// Sum of `poc_weight` over preserved nodes.
pub fn preserved_weight(nodes: &[MLNodeInfo]) -> i64 {
    nodes
        .iter()
        .filter(|node| node.is_preserved())
        .map(|node| node.poc_weight)
        .sum()
}

/// A participant's weight entry inside an epoch group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct ValidationWeight {
    pub address: String,
    pub weight: i64,
    pub reputation: i32,
    /// Post-confirmation sum of weights for non-preserved nodes. Equals the
    /// pre-confirmation sum when no confirmation PoC ran.
    pub confirmation_weight: i64,
    pub ml_nodes: Vec<MLNodeInfo>,
}

impl ValidationWeight {
    /// Weight entering power capping: preserved node weight plus the
    /// confirmation-capped remainder, never negative. Confirmation only
    /// reveals weight, it never inflates it.
    pub fn effective_weight(&self, nodes: &[MLNodeInfo]) -> i64 {
        (preserved_weight(nodes) + self.confirmation_weight).max(0)
    }
}

/// A member's signature over the epoch seed, copied into settle amounts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct SeedSignature {
    pub address: String,
    pub signature: Vec<u8>,
}

/// Weight registry for one epoch and model. The entry with an empty
/// `model_id` is the parent group covering all models.
#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct EpochGroupData {
    pub epoch_index: u64,
    pub model_id: String,
    pub validation_weights: Vec<ValidationWeight>,
    pub total_weight: i64,
    pub number_of_requests: u64,
    pub previous_epoch_requests: u64,
    pub member_seed_signatures: Vec<SeedSignature>,
}

impl EpochGroupData {
    pub fn new(epoch_index: u64, model_id: String) -> Self {
        Self {
            epoch_index,
            model_id,
            validation_weights: Vec::new(),
            total_weight: 0,
            number_of_requests: 0,
            previous_epoch_requests: 0,
            member_seed_signatures: Vec::new(),
        }
    }

    pub fn is_parent(&self) -> bool {
        self.model_id.is_empty()
    }

    pub fn member(&self, address: &str) -> Option<&ValidationWeight> {
        self.validation_weights
            .iter()
            .find(|entry| entry.address == address)
    }

    pub fn seed_signature(&self, address: &str) -> Option<&SeedSignature> {
        self.member_seed_signatures
            .iter()
            .find(|sig| sig.address == address)
    }

    /// Adds or replaces a member entry, keeping `total_weight` consistent.
    pub fn upsert_member(&mut self, entry: ValidationWeight) {
        if let Some(existing) = self
            .validation_weights
            .iter_mut()
            .find(|existing| existing.address == entry.address)
        {
            self.total_weight -= existing.weight;
            self.total_weight += entry.weight;
            *existing = entry;
        } else {
            self.total_weight += entry.weight;
            self.validation_weights.push(entry);
        }
    }

    /// Removes a member entry, keeping `total_weight` consistent.
    /// Returns whether the member was present.
    pub fn remove_member(&mut self, address: &str) -> bool {
        let before = self.validation_weights.len();
        self.validation_weights.retain(|entry| {
            if entry.address == address {
                self.total_weight -= entry.weight;
                false
            } else {
                true
            }
        });
        before != self.validation_weights.len()
    }
}
