// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub use self::capping::*;
pub use self::logic::*;
pub use self::settlement::*;
pub use self::state::*;
pub use self::types::*;

mod capping;
mod logic;
mod settlement;
mod state;
mod types;

#[cfg(test)]
mod tests;
