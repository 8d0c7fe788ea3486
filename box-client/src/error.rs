//! Error types for box administrative commands
//!
//! Every operation returns [`BoxResult`]. The variants of [`BoxError`] keep the
//! layers apart: the transport failing, the engine refusing a call (with its
//! numeric code preserved), a reply that does not have the expected shape, and
//! caller misuse.

use std::fmt;
use thiserror::Error;

/// Result type for box operations
pub type BoxResult<T> = Result<T, BoxError>;

/// Numeric error code from the engine's fixed error-code space.
///
/// Only the codes this crate inspects or that callers commonly match on have
/// named constants; any other code is carried through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    pub const UNKNOWN: ErrorCode = ErrorCode(0);
    pub const ILLEGAL_PARAMS: ErrorCode = ErrorCode(1);
    pub const UNSUPPORTED: ErrorCode = ErrorCode(5);
    pub const PROC_LUA: ErrorCode = ErrorCode(32);
    pub const NO_SUCH_PROC: ErrorCode = ErrorCode(33);
    pub const NO_SUCH_SPACE: ErrorCode = ErrorCode(36);
    pub const ACCESS_DENIED: ErrorCode = ErrorCode(42);
    pub const DROP_USER: ErrorCode = ErrorCode(44);
    pub const NO_SUCH_USER: ErrorCode = ErrorCode(45);
    pub const USER_EXISTS: ErrorCode = ErrorCode(46);
    pub const CREDS_MISMATCH: ErrorCode = ErrorCode(47);
    pub const NO_SUCH_FUNCTION: ErrorCode = ErrorCode(51);
    pub const NO_SUCH_ROLE: ErrorCode = ErrorCode(82);
    pub const ROLE_EXISTS: ErrorCode = ErrorCode(83);
    pub const PRIV_GRANTED: ErrorCode = ErrorCode(89);
    pub const ROLE_GRANTED: ErrorCode = ErrorCode(90);
    pub const PRIV_NOT_GRANTED: ErrorCode = ErrorCode(91);
    pub const ROLE_NOT_GRANTED: ErrorCode = ErrorCode(92);

    /// Returns the engine's symbolic name for known codes
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::UNKNOWN => "ER_UNKNOWN",
            Self::ILLEGAL_PARAMS => "ER_ILLEGAL_PARAMS",
            Self::UNSUPPORTED => "ER_UNSUPPORTED",
            Self::PROC_LUA => "ER_PROC_LUA",
            Self::NO_SUCH_PROC => "ER_NO_SUCH_PROC",
            Self::NO_SUCH_SPACE => "ER_NO_SUCH_SPACE",
            Self::ACCESS_DENIED => "ER_ACCESS_DENIED",
            Self::DROP_USER => "ER_DROP_USER",
            Self::NO_SUCH_USER => "ER_NO_SUCH_USER",
            Self::USER_EXISTS => "ER_USER_EXISTS",
            Self::CREDS_MISMATCH => "ER_CREDS_MISMATCH",
            Self::NO_SUCH_FUNCTION => "ER_NO_SUCH_FUNCTION",
            Self::NO_SUCH_ROLE => "ER_NO_SUCH_ROLE",
            Self::ROLE_EXISTS => "ER_ROLE_EXISTS",
            Self::PRIV_GRANTED => "ER_PRIV_GRANTED",
            Self::ROLE_GRANTED => "ER_ROLE_GRANTED",
            Self::PRIV_NOT_GRANTED => "ER_PRIV_NOT_GRANTED",
            Self::ROLE_NOT_GRANTED => "ER_ROLE_NOT_GRANTED",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "code {}", self.0),
        }
    }
}

impl From<u32> for ErrorCode {
    fn from(code: u32) -> Self {
        ErrorCode(code)
    }
}

/// The connection failed before a reply was obtained
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection was closed by the caller
    #[error("connection is closed")]
    Closed,

    /// Connection was lost or refused
    #[error("connection lost: {reason}")]
    Disconnected { reason: String },

    /// The caller's cancellation token fired while waiting
    #[error("request cancelled")]
    Cancelled,

    /// The caller's deadline passed while waiting
    #[error("request deadline exceeded")]
    Timeout,
}

impl TransportError {
    /// Create a disconnected error
    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::Disconnected {
            reason: reason.into(),
        }
    }
}

/// Structured error returned by the engine for a call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct RemoteCallError {
    /// Engine error code
    pub code: ErrorCode,

    /// Human-readable message as reported by the engine
    pub message: String,
}

impl RemoteCallError {
    pub fn new(code: impl Into<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// The reply did not have the expected shape
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("at {path}: {reason}")]
pub struct DecodeError {
    /// Path of the offending field, e.g. `$[0].replication.1.uuid`
    pub path: String,

    /// What was wrong with it
    pub reason: String,
}

impl DecodeError {
    pub fn new(path: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an error describing a shape mismatch
    pub fn mismatch(path: impl fmt::Display, expected: &str, found: &str) -> Self {
        Self::new(path, format!("expected {}, found {}", expected, found))
    }
}

/// Errors that can occur during box operations
#[derive(Debug, Clone, Error)]
pub enum BoxError {
    /// Transport failed; never retried here
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Engine rejected the call
    #[error("remote call failed: {0}")]
    RemoteCall(#[from] RemoteCallError),

    /// Reply shape mismatch
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Caller misuse detected before any request was sent
    #[error("contract violation: {reason}")]
    ContractViolation { reason: String },

    /// Recognized but intentionally unimplemented request shape
    #[error("unsupported: {what}")]
    Unsupported { what: String },
}

impl BoxError {
    /// Create a contract violation error
    pub fn contract(reason: impl Into<String>) -> Self {
        Self::ContractViolation {
            reason: reason.into(),
        }
    }

    /// Create an unsupported error
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported { what: what.into() }
    }

    /// Returns the engine error code, if the engine produced this error
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::RemoteCall(err) => Some(err.code),
            _ => None,
        }
    }

    /// Returns whether the engine rejected the call with exactly `code`
    pub fn is_code(&self, code: ErrorCode) -> bool {
        self.code() == Some(code)
    }

    /// Returns the engine error, if any
    pub fn remote(&self) -> Option<&RemoteCallError> {
        match self {
            Self::RemoteCall(err) => Some(err),
            _ => None,
        }
    }

    /// Returns whether the failure happened below the engine
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
