// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub use self::state::*;
pub use self::types::*;
pub use self::validation::*;

mod state;
mod types;
mod validation;
