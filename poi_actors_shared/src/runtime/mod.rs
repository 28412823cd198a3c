// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub use self::policy::{Policy, RuntimePolicy};

pub mod policy;

use fvm_shared4::clock::ChainEpoch;

use crate::math::Decimal;
use crate::ActorError;

/// Execution context of the enclosing transaction: the only notion of time
/// and identity the actors may consult.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockContext {
    pub block_height: ChainEpoch,
    /// Block timestamp in nanoseconds. Never wall-clock time.
    pub block_time_ns: i64,
    pub chain_id: String,
}

/// Double-entry sub-account a coin movement is logged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubAccount {
    Owed,
    Earned,
    Refunded,
}

/// Account ledger of the embedding platform.
///
/// The actors never hold balances themselves; they instruct the ledger and
/// surface its failures. A failed transfer aborts the enclosing transaction,
/// so partial mutations are never observable.
pub trait BankLedger {
    /// Mints freshly emitted coins into a module account.
    fn mint_to_module(&mut self, module: &'static str, amount: i64) -> Result<(), ActorError>;

    /// Moves coins between module accounts.
    fn transfer_module_to_module(
        &mut self,
        from: &'static str,
        to: &'static str,
        amount: i64,
    ) -> Result<(), ActorError>;

    /// Debits a user account into a module account.
    fn transfer_to_module(
        &mut self,
        from: &str,
        module: &'static str,
        amount: i64,
    ) -> Result<(), ActorError>;

    /// Credits a user account from a module account.
    fn transfer_from_module(
        &mut self,
        module: &'static str,
        to: &str,
        amount: i64,
    ) -> Result<(), ActorError>;

    /// Records a double-entry bookkeeping line against a participant's
    /// sub-account. Logging never fails the transaction.
    fn log_sub_account_transaction(
        &mut self,
        owner: &str,
        sub_account: SubAccount,
        amount: i64,
        memo: &str,
    );
}

/// Collateral service of the embedding platform.
pub trait CollateralSlasher {
    /// Burns the given fraction of a participant's collateral and returns
    /// the slashed amount.
    fn slash(&mut self, address: &str, fraction: &Decimal, reason: &str)
        -> Result<i64, ActorError>;
}

/// Cryptographic verifier of the embedding platform. Message handlers
/// check transfer and executor signatures through it before touching
/// state; the state layer itself treats signatures as opaque strings.
pub trait SignatureVerifier {
    fn verify(&self, signature: &[u8], message: &[u8], pubkey: &[u8]) -> bool;
}
