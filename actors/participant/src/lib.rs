// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub use self::state::*;
pub use self::status::*;
pub use self::types::*;

mod state;
mod status;
mod types;
