// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub use self::actor_error::*;
pub use self::util::*;

pub mod builtin;
pub mod math;
pub mod randomness;
pub mod runtime;
pub mod sampling;
pub mod stats;

mod actor_error;
mod util;

// Re-exports
pub extern crate cid;
pub extern crate fvm_ipld_blockstore;
pub extern crate fvm_ipld_encoding;
pub extern crate fvm_ipld_hamt;
pub extern crate fvm_shared4;
