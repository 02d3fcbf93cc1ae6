// A flat, coded error enumeration replacing the deep C++ exception
// hierarchy the original chain used (see spec.md's "Deep inheritance of
// exception types" design note): every error carries a numeric code from a
// closed enumeration plus a message, and belongs to exactly one of two
// propagation classes.

use num_derive::FromPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed enumeration of error codes. Reversion codes and failure codes
/// share one numeric space so a code is never ambiguous on the wire.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive, Serialize, Deserialize)]
pub enum ErrorCode {
    // -- Reversion: unrecoverable within the current scope --
    Reverted = 1,
    AuthorizationFailureSystem = 2,
    InvalidContract = 3,
    InsufficientPrivileges = 4,
    InsufficientRc = 5,
    InsufficientReturnBuffer = 6,
    UnknownThunk = 7,
    UnknownOperation = 8,
    ReadOnlyContext = 9,
    InternalError = 10,
    WasmTrap = 11,
    StackOverflow = 12,
    StateNodeNotFound = 13,
    CannotDiscard = 14,
    UnexpectedState = 15,
    UnexpectedAccess = 16,
    ModuleParse = 17,

    // -- Failure: recoverable at the transaction boundary --
    FieldNotFound = 100,
    UnknownHashCode = 101,
    UnknownSignatureAlgorithm = 102,
    UnknownSystemCall = 103,
    AuthorizationFailureUser = 104,
    InvalidNonce = 105,
    InvalidSignature = 106,
    MalformedBlock = 107,
    MalformedTransaction = 108,
    BlockResourceFailure = 109,
    PendingTransactionExceedsResources = 110,
    StateMerkleMismatch = 111,
    PreIrreversibilityBlock = 112,
    IndexerFailure = 113,
    DiskStorageLimitExceeded = 114,
    NetworkBandwidthLimitExceeded = 115,
    ComputeBandwidthLimitExceeded = 116,
}

impl ErrorCode {
    /// Reversion codes unwind the whole containing scope (block or
    /// transaction); failure codes are recorded and execution continues.
    pub fn class(self) -> ErrorClass {
        if (self as u32) < 100 {
            ErrorClass::Reversion
        } else {
            ErrorClass::Failure
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Reversion,
    Failure,
}

/// A coded, message-carrying chain error with an optional cause chain.
#[derive(Debug, Error)]
#[error("{code:?}: {message}")]
pub struct ChainError {
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub cause: Option<anyhow::Error>,
}

impl ChainError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ChainError {
            code,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(code: ErrorCode, message: impl Into<String>, cause: anyhow::Error) -> Self {
        ChainError {
            code,
            message: message.into(),
            cause: Some(cause),
        }
    }

    pub fn class(&self) -> ErrorClass {
        self.code.class()
    }

    pub fn is_reversion(&self) -> bool {
        self.class() == ErrorClass::Reversion
    }

    pub fn is_failure(&self) -> bool {
        self.class() == ErrorClass::Failure
    }
}

/// Convenience macro for building a [`ChainError`] with a formatted message
/// in one line at the call site (after the original `syscall_error!`/
/// `KOINOS_THROW` idiom, flattened to the two-class model of spec.md §7).
#[macro_export]
macro_rules! chain_error {
    ($code:ident; $msg:expr) => {
        $crate::error::ChainError::new($crate::error::ErrorCode::$code, $msg.to_string())
    };
    ($code:ident; $msg:literal $(, $arg:expr)+) => {
        $crate::error::ChainError::new($crate::error::ErrorCode::$code, format!($msg, $($arg,)*))
    };
}

pub type Result<T> = std::result::Result<T, ChainError>;
