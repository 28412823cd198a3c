// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_shared4::error::ExitCode;
use std::fmt::Display;
use thiserror::Error;

/// Exit codes below this one are reserved for generic user errors defined by
/// the platform; module-specific conditions start here.
pub const FIRST_ACTOR_SPECIFIC_EXIT_CODE: u32 = 32;

/// Token-count or price arithmetic exceeded the 64-bit range.
pub const EX_ARITHMETIC_OVERFLOW: ExitCode = ExitCode::new(FIRST_ACTOR_SPECIFIC_EXIT_CODE);
/// A token-count addition carried out of 64 bits.
pub const EX_TOKEN_COUNT_OUT_OF_RANGE: ExitCode = ExitCode::new(FIRST_ACTOR_SPECIFIC_EXIT_CODE + 1);
/// A PoC-window message arrived after the window closed.
pub const EX_TOO_LATE: ExitCode = ExitCode::new(FIRST_ACTOR_SPECIFIC_EXIT_CODE + 2);
/// A PoC message named a start height that does not match the window.
pub const EX_WRONG_START_BLOCK_HEIGHT: ExitCode = ExitCode::new(FIRST_ACTOR_SPECIFIC_EXIT_CODE + 3);
/// Message retained only for binary compatibility after a version switch.
pub const EX_DEPRECATED: ExitCode = ExitCode::new(FIRST_ACTOR_SPECIFIC_EXIT_CODE + 4);
pub const EX_NOT_SUPPORTED: ExitCode = ExitCode::new(FIRST_ACTOR_SPECIFIC_EXIT_CODE + 5);
pub const EX_INVALID_SIGNATURE: ExitCode = ExitCode::new(FIRST_ACTOR_SPECIFIC_EXIT_CODE + 6);
pub const EX_INVALID_SIGNER: ExitCode = ExitCode::new(FIRST_ACTOR_SPECIFIC_EXIT_CODE + 7);

/// The error type returned by actor state transitions.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("ActorError(exit_code: {exit_code:?}, msg: {msg})")]
pub struct ActorError {
    /// The exit code for this invocation.
    exit_code: ExitCode,
    /// Message for debugging purposes,
    msg: String,
}

/// Convenience macro for generating Actor Errors
#[macro_export]
macro_rules! actor_error {
    // Error with only one stringable expression
    ( $code:ident; $msg:expr ) => { $crate::ActorError::$code($msg.to_string()) };

    // String with positional arguments
    ( $code:ident; $msg:literal $(, $ex:expr)+ ) => {
        $crate::ActorError::$code(format!($msg, $($ex,)*))
    };

    // Error with only one stringable expression, with comma separator
    ( $code:ident, $msg:expr ) => { $crate::actor_error!($code; $msg) };

    // String with positional arguments, with comma separator
    ( $code:ident, $msg:literal $(, $ex:expr)+ ) => {
        $crate::actor_error!($code; $msg $(, $ex)*)
    };
}

impl ActorError {
    /// Creates a new `ActorError`. This method does not check that the code is in the
    /// range of valid actor abort codes.
    pub fn unchecked(code: ExitCode, msg: String) -> Self {
        Self {
            exit_code: code,
            msg,
        }
    }

    pub fn illegal_argument(msg: String) -> Self {
        Self {
            exit_code: ExitCode::USR_ILLEGAL_ARGUMENT,
            msg,
        }
    }
    pub fn not_found(msg: String) -> Self {
        Self {
            exit_code: ExitCode::USR_NOT_FOUND,
            msg,
        }
    }
    pub fn forbidden(msg: String) -> Self {
        Self {
            exit_code: ExitCode::USR_FORBIDDEN,
            msg,
        }
    }
    pub fn insufficient_funds(msg: String) -> Self {
        Self {
            exit_code: ExitCode::USR_INSUFFICIENT_FUNDS,
            msg,
        }
    }
    pub fn illegal_state(msg: String) -> Self {
        Self {
            exit_code: ExitCode::USR_ILLEGAL_STATE,
            msg,
        }
    }
    pub fn serialization(msg: String) -> Self {
        Self {
            exit_code: ExitCode::USR_SERIALIZATION,
            msg,
        }
    }
    pub fn unspecified(msg: String) -> Self {
        Self {
            exit_code: ExitCode::USR_UNSPECIFIED,
            msg,
        }
    }
    pub fn assertion_failed(msg: String) -> Self {
        Self {
            exit_code: ExitCode::USR_ASSERTION_FAILED,
            msg,
        }
    }

    pub fn arithmetic_overflow(msg: String) -> Self {
        Self {
            exit_code: EX_ARITHMETIC_OVERFLOW,
            msg,
        }
    }
    pub fn token_count_out_of_range(msg: String) -> Self {
        Self {
            exit_code: EX_TOKEN_COUNT_OUT_OF_RANGE,
            msg,
        }
    }
    pub fn too_late(msg: String) -> Self {
        Self {
            exit_code: EX_TOO_LATE,
            msg,
        }
    }
    pub fn wrong_start_block_height(msg: String) -> Self {
        Self {
            exit_code: EX_WRONG_START_BLOCK_HEIGHT,
            msg,
        }
    }
    pub fn deprecated(msg: String) -> Self {
        Self {
            exit_code: EX_DEPRECATED,
            msg,
        }
    }
    pub fn not_supported(msg: String) -> Self {
        Self {
            exit_code: EX_NOT_SUPPORTED,
            msg,
        }
    }
    pub fn invalid_signature(msg: String) -> Self {
        Self {
            exit_code: EX_INVALID_SIGNATURE,
            msg,
        }
    }
    pub fn invalid_signer(msg: String) -> Self {
        Self {
            exit_code: EX_INVALID_SIGNER,
            msg,
        }
    }

    /// Returns the exit code of the error.
    pub fn exit_code(&self) -> ExitCode {
        self.exit_code
    }

    /// Error message of the actor error.
    pub fn msg(&self) -> &str {
        &self.msg
    }

    /// Prefix error message with a string message.
    pub fn wrap(mut self, msg: impl AsRef<str>) -> Self {
        self.msg = format!("{}: {}", msg.as_ref(), self.msg);
        self
    }
}

/// Converts a raw encoding error into an `ErrSerialization`.
impl From<fvm_ipld_encoding::Error> for ActorError {
    fn from(e: fvm_ipld_encoding::Error) -> Self {
        Self {
            exit_code: ExitCode::USR_SERIALIZATION,
            msg: e.to_string(),
        }
    }
}

// Adapts a target into an actor error.
pub trait AsActorError<T>: Sized {
    fn exit_code(self, code: ExitCode) -> Result<T, ActorError>;

    fn context_code<C>(self, code: ExitCode, context: C) -> Result<T, ActorError>
    where
        C: Display + 'static;

    fn with_context_code<C, F>(self, code: ExitCode, f: F) -> Result<T, ActorError>
    where
        C: Display + 'static,
        F: FnOnce() -> C;
}

impl<T, E: Display> AsActorError<T> for Result<T, E> {
    fn exit_code(self, code: ExitCode) -> Result<T, ActorError> {
        self.map_err(|err| ActorError {
            exit_code: code,
            msg: err.to_string(),
        })
    }

    fn context_code<C>(self, code: ExitCode, context: C) -> Result<T, ActorError>
    where
        C: Display + 'static,
    {
        self.map_err(|err| ActorError {
            exit_code: code,
            msg: format!("{}: {}", context, err),
        })
    }

    fn with_context_code<C, F>(self, code: ExitCode, f: F) -> Result<T, ActorError>
    where
        C: Display + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|err| ActorError {
            exit_code: code,
            msg: format!("{}: {}", f(), err),
        })
    }
}

impl<T> AsActorError<T> for Option<T> {
    fn exit_code(self, code: ExitCode) -> Result<T, ActorError> {
        self.ok_or_else(|| ActorError {
            exit_code: code,
            msg: "None".to_string(),
        })
    }

    fn context_code<C>(self, code: ExitCode, context: C) -> Result<T, ActorError>
    where
        C: Display + 'static,
    {
        self.ok_or_else(|| ActorError {
            exit_code: code,
            msg: context.to_string(),
        })
    }

    fn with_context_code<C, F>(self, code: ExitCode, f: F) -> Result<T, ActorError>
    where
        C: Display + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| ActorError {
            exit_code: code,
            msg: f().to_string(),
        })
    }
}

/// Adds context to an actor error's descriptive message.
pub trait ActorContext<T> {
    fn context<C>(self, context: C) -> Result<T, ActorError>
    where
        C: Display + 'static;

    fn with_context<C, F>(self, f: F) -> Result<T, ActorError>
    where
        C: Display + 'static,
        F: FnOnce() -> C;
}

impl<T> ActorContext<T> for Result<T, ActorError> {
    fn context<C>(self, context: C) -> Result<T, ActorError>
    where
        C: Display + 'static,
    {
        self.map_err(|err| ActorError {
            exit_code: err.exit_code,
            msg: format!("{}: {}", context, err.msg),
        })
    }

    fn with_context<C, F>(self, f: F) -> Result<T, ActorError>
    where
        C: Display + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|err| ActorError {
            exit_code: err.exit_code,
            msg: format!("{}: {}", f(), err.msg),
        })
    }
}
