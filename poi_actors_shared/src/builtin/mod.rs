// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub use self::singletons::*;

mod singletons;

/// Default bit width of HAMT maps in actor state.
pub const HAMT_BIT_WIDTH: u32 = 5;
