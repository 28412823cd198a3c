// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use poi_actors_shared::{ActorError, Config, Map2, DEFAULT_HAMT_CONFIG};

use crate::types::{EpochPerformanceSummary, GraceEpochParams, SettleAmount};

pub type SettleAmountsMap<BS> = Map2<BS, String, SettleAmount>;
pub const SETTLE_AMOUNTS_CONFIG: Config = DEFAULT_HAMT_CONFIG;

pub type GraceEpochsMap<BS> = Map2<BS, u64, GraceEpochParams>;
pub const GRACE_EPOCHS_CONFIG: Config = DEFAULT_HAMT_CONFIG;

pub type PerformanceMap<BS> = Map2<BS, String, EpochPerformanceSummary>;
pub const PERFORMANCE_CONFIG: Config = DEFAULT_HAMT_CONFIG;

/// Key of a performance summary.
pub fn performance_key(epoch: u64, address: &str) -> String {
    format!("{}/{}", epoch, address)
}

/// Reward actor state: settle amounts, grace epochs and the tokenomics
/// totals.
#[derive(Clone, Debug, Serialize_tuple, Deserialize_tuple)]
pub struct State {
    /// Claimable payouts, one per participant. HAMT[address]SettleAmount
    pub settle_amounts: Cid,
    /// Upgrade-protection overrides. HAMT[epoch]GraceEpochParams
    pub grace_epochs: Cid,
    /// Settled per-epoch figures. HAMT["{epoch}/{address}"]Summary
    pub performance: Cid,

    /// Cumulative emission paid out, bounded by the supply cap.
    pub total_subsidies: u64,
    pub total_burned: u64,
    /// Cumulative inference fees settled as work coins.
    pub total_fees: u64,
    /// Cumulative escrow refunded to requesters.
    pub total_refunded: u64,
}

impl State {
    pub fn new<BS: Blockstore>(store: &BS) -> Result<State, ActorError> {
        Ok(State {
            settle_amounts: SettleAmountsMap::flush_empty(store, SETTLE_AMOUNTS_CONFIG)?,
            grace_epochs: GraceEpochsMap::flush_empty(store, GRACE_EPOCHS_CONFIG)?,
            performance: PerformanceMap::flush_empty(store, PERFORMANCE_CONFIG)?,
            total_subsidies: 0,
            total_burned: 0,
            total_fees: 0,
            total_refunded: 0,
        })
    }

    pub fn load_settle_amounts<'bs, BS: Blockstore>(
        &self,
        store: &'bs BS,
    ) -> Result<SettleAmountsMap<&'bs BS>, ActorError> {
        SettleAmountsMap::load(store, &self.settle_amounts, SETTLE_AMOUNTS_CONFIG, "settle amounts")
    }

    pub fn get_settle_amount<BS: Blockstore>(
        &self,
        store: &BS,
        participant: &str,
    ) -> Result<Option<SettleAmount>, ActorError> {
        let map = self.load_settle_amounts(store)?;
        Ok(map.get(&participant.to_string())?.cloned())
    }

    pub fn set_grace_epoch<BS: Blockstore>(
        &mut self,
        store: &BS,
        params: GraceEpochParams,
    ) -> Result<(), ActorError> {
        let mut map =
            GraceEpochsMap::load(store, &self.grace_epochs, GRACE_EPOCHS_CONFIG, "grace epochs")?;
        let epoch = params.epoch_index;
        map.set(&epoch, params)?;
        self.grace_epochs = map.flush()?;
        Ok(())
    }

    pub fn get_grace_epoch<BS: Blockstore>(
        &self,
        store: &BS,
        epoch: u64,
    ) -> Result<Option<GraceEpochParams>, ActorError> {
        let map =
            GraceEpochsMap::load(store, &self.grace_epochs, GRACE_EPOCHS_CONFIG, "grace epochs")?;
        Ok(map.get(&epoch)?.cloned())
    }

    /// Extra message-timestamp allowance granted by an upgrade-protection
    /// grace epoch, in nanoseconds.
    pub fn timestamp_allowance<BS: Blockstore>(
        &self,
        store: &BS,
        epoch: u64,
    ) -> Result<i64, ActorError> {
        Ok(self
            .get_grace_epoch(store, epoch)?
            .map(|grace| grace.upgrade_protection_window)
            .unwrap_or(0))
    }

    pub fn record_performance<BS: Blockstore>(
        &mut self,
        store: &BS,
        summary: EpochPerformanceSummary,
    ) -> Result<(), ActorError> {
        let key = performance_key(summary.epoch_index, &summary.participant);
        let mut map =
            PerformanceMap::load(store, &self.performance, PERFORMANCE_CONFIG, "performance")?;
        map.set(&key, summary)?;
        self.performance = map.flush()?;
        Ok(())
    }

    /// Accounts requester escrow returned by refunds and expirations.
    pub fn note_refund(&mut self, amount: u64) {
        self.total_refunded += amount;
    }

    /// Accounts coins burned out of circulation.
    pub fn note_burn(&mut self, amount: u64) {
        self.total_burned += amount;
    }

    pub fn get_performance<BS: Blockstore>(
        &self,
        store: &BS,
        epoch: u64,
        participant: &str,
    ) -> Result<Option<EpochPerformanceSummary>, ActorError> {
        let map =
            PerformanceMap::load(store, &self.performance, PERFORMANCE_CONFIG, "performance")?;
        Ok(map.get(&performance_key(epoch, participant))?.cloned())
    }
}
