// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeMap;

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use poi_actors_shared::{actor_error, ActorError, Config, Map2, DEFAULT_HAMT_CONFIG};

use crate::types::{EpochGroupData, MLNodeInfo};

pub type EpochGroupsMap<BS> = Map2<BS, String, EpochGroupData>;
pub const EPOCH_GROUPS_CONFIG: Config = DEFAULT_HAMT_CONFIG;

pub type ActiveParticipantsMap<BS> = Map2<BS, u64, Vec<String>>;
pub const ACTIVE_PARTICIPANTS_CONFIG: Config = DEFAULT_HAMT_CONFIG;

/// Key of an epoch group: `"{epoch}/{model}"`; the parent group uses the
/// empty model id.
pub fn epoch_group_key(epoch: u64, model_id: &str) -> String {
    format!("{}/{}", epoch, model_id)
}

/// Epoch-group actor state.
#[derive(Clone, Debug, Serialize_tuple, Deserialize_tuple)]
pub struct State {
    /// Epoch groups, keyed `"{epoch}/{model}"`. HAMT[String]EpochGroupData
    pub epoch_groups: Cid,
    /// Addresses eligible for rewards, per epoch. HAMT[u64]Vec<String>
    pub active_participants: Cid,
}

impl State {
    pub fn new<BS: Blockstore>(store: &BS) -> Result<State, ActorError> {
        Ok(State {
            epoch_groups: EpochGroupsMap::flush_empty(store, EPOCH_GROUPS_CONFIG)?,
            active_participants: ActiveParticipantsMap::flush_empty(
                store,
                ACTIVE_PARTICIPANTS_CONFIG,
            )?,
        })
    }

    pub fn load_epoch_groups<'bs, BS: Blockstore>(
        &self,
        store: &'bs BS,
    ) -> Result<EpochGroupsMap<&'bs BS>, ActorError> {
        EpochGroupsMap::load(store, &self.epoch_groups, EPOCH_GROUPS_CONFIG, "epoch groups")
    }

    pub fn save_epoch_groups<BS: Blockstore>(
        &mut self,
        groups: &mut EpochGroupsMap<&BS>,
    ) -> Result<(), ActorError> {
        self.epoch_groups = groups.flush()?;
        Ok(())
    }

    pub fn get_epoch_group<BS: Blockstore>(
        &self,
        store: &BS,
        epoch: u64,
        model_id: &str,
    ) -> Result<Option<EpochGroupData>, ActorError> {
        let groups = self.load_epoch_groups(store)?;
        Ok(groups.get(&epoch_group_key(epoch, model_id))?.cloned())
    }

    /// The parent group covering all models for an epoch.
    pub fn parent_group<BS: Blockstore>(
        &self,
        store: &BS,
        epoch: u64,
    ) -> Result<EpochGroupData, ActorError> {
        self.get_epoch_group(store, epoch, "")?
            .ok_or_else(|| actor_error!(not_found, "no parent epoch group for epoch {}", epoch))
    }

    pub fn set_epoch_group<BS: Blockstore>(
        &mut self,
        store: &BS,
        group: EpochGroupData,
    ) -> Result<(), ActorError> {
        let key = epoch_group_key(group.epoch_index, &group.model_id);
        let mut groups = self.load_epoch_groups(store)?;
        groups.set(&key, group)?;
        self.save_epoch_groups(&mut groups)
    }

    /// Every per-model subgroup of an epoch, ascending by model id.
    pub fn sub_groups<BS: Blockstore>(
        &self,
        store: &BS,
        epoch: u64,
    ) -> Result<Vec<EpochGroupData>, ActorError> {
        let groups = self.load_epoch_groups(store)?;
        let mut found = Vec::new();
        groups.for_each(|_, group| {
            if group.epoch_index == epoch && !group.is_parent() {
                found.push(group.clone());
            }
            Ok(())
        })?;
        found.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(found)
    }

    /// Aggregates each participant's ML nodes across every subgroup of the
    /// epoch; the authoritative node set for preserved-weight computation.
    pub fn aggregate_ml_nodes<BS: Blockstore>(
        &self,
        store: &BS,
        epoch: u64,
    ) -> Result<BTreeMap<String, Vec<MLNodeInfo>>, ActorError> {
        let mut nodes: BTreeMap<String, Vec<MLNodeInfo>> = BTreeMap::new();
        for group in self.sub_groups(store, epoch)? {
            for entry in &group.validation_weights {
                nodes
                    .entry(entry.address.clone())
                    .or_default()
                    .extend(entry.ml_nodes.iter().cloned());
            }
        }
        Ok(nodes)
    }

    /// Removes a participant from the parent group and every subgroup of
    /// the epoch.
    pub fn remove_from_epoch_groups<BS: Blockstore>(
        &mut self,
        store: &BS,
        epoch: u64,
        address: &str,
    ) -> Result<(), ActorError> {
        let mut groups = self.load_epoch_groups(store)?;
        let mut keys = Vec::new();
        groups.for_each(|key, group| {
            if group.epoch_index == epoch {
                keys.push(key);
            }
            Ok(())
        })?;
        keys.sort();
        for key in keys {
            let mut group = groups
                .get(&key)?
                .cloned()
                .ok_or_else(|| actor_error!(illegal_state, "epoch group {} vanished", key))?;
            if group.remove_member(address) {
                groups.set(&key, group)?;
            }
        }
        self.save_epoch_groups(&mut groups)
    }

    pub fn active_participants<BS: Blockstore>(
        &self,
        store: &BS,
        epoch: u64,
    ) -> Result<Vec<String>, ActorError> {
        let map = ActiveParticipantsMap::load(
            store,
            &self.active_participants,
            ACTIVE_PARTICIPANTS_CONFIG,
            "active participants",
        )?;
        Ok(map.get(&epoch)?.cloned().unwrap_or_default())
    }

    pub fn set_active_participants<BS: Blockstore>(
        &mut self,
        store: &BS,
        epoch: u64,
        mut participants: Vec<String>,
    ) -> Result<(), ActorError> {
        participants.sort();
        participants.dedup();
        let mut map = ActiveParticipantsMap::load(
            store,
            &self.active_participants,
            ACTIVE_PARTICIPANTS_CONFIG,
            "active participants",
        )?;
        map.set(&epoch, participants)?;
        self.active_participants = map.flush()?;
        Ok(())
    }
}
