// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

/// Module account holding requester escrows until inferences resolve.
pub const ESCROW_MODULE_ACCOUNT: &str = "inference_escrow";

/// Module account the per-epoch emission is minted into and work/reward
/// coins are paid out of.
pub const REWARD_POOL_ACCOUNT: &str = "reward_pool";

/// Module-owned account receiving undistributed rewards, expired claims and
/// punishment-forfeited rewards.
pub const GOVERNANCE_SINK_ACCOUNT: &str = "governance_sink";
