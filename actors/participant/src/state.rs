// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use poi_actors_shared::{actor_error, ActorError, Config, Map2, DEFAULT_HAMT_CONFIG};

use crate::types::{ExclusionRecord, Participant};

pub type ParticipantsMap<BS> = Map2<BS, String, Participant>;
pub const PARTICIPANTS_CONFIG: Config = DEFAULT_HAMT_CONFIG;

pub type ExcludedMap<BS> = Map2<BS, String, ExclusionRecord>;
pub const EXCLUDED_CONFIG: Config = DEFAULT_HAMT_CONFIG;

/// Key of an exclusion record.
pub fn exclusion_key(epoch: u64, address: &str) -> String {
    format!("{}/{}", epoch, address)
}

/// Participant registry state.
#[derive(Clone, Debug, Serialize_tuple, Deserialize_tuple)]
pub struct State {
    /// Registered participants. HAMT[address]Participant
    pub participants: Cid,
    /// Punishment exclusions, keyed `"{epoch}/{address}"`.
    /// HAMT[String]ExclusionRecord
    pub excluded: Cid,
}

impl State {
    pub fn new<BS: Blockstore>(store: &BS) -> Result<State, ActorError> {
        Ok(State {
            participants: ParticipantsMap::flush_empty(store, PARTICIPANTS_CONFIG)?,
            excluded: ExcludedMap::flush_empty(store, EXCLUDED_CONFIG)?,
        })
    }

    pub fn load_participants<'bs, BS: Blockstore>(
        &self,
        store: &'bs BS,
    ) -> Result<ParticipantsMap<&'bs BS>, ActorError> {
        ParticipantsMap::load(store, &self.participants, PARTICIPANTS_CONFIG, "participants")
    }

    pub fn get_participant<BS: Blockstore>(
        &self,
        store: &BS,
        address: &str,
    ) -> Result<Option<Participant>, ActorError> {
        let participants = self.load_participants(store)?;
        Ok(participants.get(&address.to_string())?.cloned())
    }

    /// Fetches a participant that must exist.
    pub fn must_get_participant<BS: Blockstore>(
        &self,
        store: &BS,
        address: &str,
    ) -> Result<Participant, ActorError> {
        self.get_participant(store, address)?
            .ok_or_else(|| actor_error!(not_found, "participant {} not registered", address))
    }

    pub fn put_participant<BS: Blockstore>(
        &mut self,
        store: &BS,
        participant: Participant,
    ) -> Result<(), ActorError> {
        let mut participants = self.load_participants(store)?;
        participants.set(&participant.address.clone(), participant)?;
        self.participants = participants.flush()?;
        Ok(())
    }

    /// Registers a participant; rejects a duplicate registration.
    pub fn register_participant<BS: Blockstore>(
        &mut self,
        store: &BS,
        participant: Participant,
    ) -> Result<(), ActorError> {
        let mut participants = self.load_participants(store)?;
        let inserted = participants.set_if_absent(&participant.address.clone(), participant)?;
        if !inserted {
            return Err(actor_error!(illegal_state, "participant already registered"));
        }
        self.participants = participants.flush()?;
        Ok(())
    }

    pub fn record_exclusion<BS: Blockstore>(
        &mut self,
        store: &BS,
        record: ExclusionRecord,
    ) -> Result<(), ActorError> {
        let key = exclusion_key(record.epoch_index, &record.address);
        let mut excluded =
            ExcludedMap::load(store, &self.excluded, EXCLUDED_CONFIG, "excluded participants")?;
        excluded.set(&key, record)?;
        self.excluded = excluded.flush()?;
        Ok(())
    }

    pub fn get_exclusion<BS: Blockstore>(
        &self,
        store: &BS,
        epoch: u64,
        address: &str,
    ) -> Result<Option<ExclusionRecord>, ActorError> {
        let excluded =
            ExcludedMap::load(store, &self.excluded, EXCLUDED_CONFIG, "excluded participants")?;
        Ok(excluded.get(&exclusion_key(epoch, address))?.cloned())
    }
}
