//! Error types.
//!
//! Every error maps onto the shared [`ResultCode`] vocabulary so callers
//! that only care about the code can treat all subsystems uniformly.

use thiserror::Error;

use super::result::ResultCode;
use crate::config::{ConfigKey, ConfigScope, ScopeKind, ValueType};

/// Errors from the config scope store.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Value has a different type than the key declares.
    #[error("config key {key} expects a {expected} value, got {actual}")]
    TypeMismatch {
        /// Key being written or read.
        key: ConfigKey,
        /// Declared type of the key.
        expected: ValueType,
        /// Type that was supplied or requested.
        actual: ValueType,
    },

    /// Key cannot be stored at this scope.
    #[error("config key {key} cannot be set at {scope} scope")]
    ScopeNotApplicable {
        /// Key being written.
        key: ConfigKey,
        /// Scope kind that was targeted.
        scope: ScopeKind,
    },

    /// Scope was never created or has been torn down.
    #[error("config scope {0} does not exist")]
    UnknownScope(ConfigScope),

    /// Numeric value outside the key's accepted range.
    #[error("value {value} out of range for config key {key}")]
    OutOfRange {
        /// Key being written.
        key: ConfigKey,
        /// Rejected value.
        value: f64,
    },
}

impl ConfigError {
    /// Result code for this error.
    pub fn result_code(&self) -> ResultCode {
        match self {
            ConfigError::UnknownScope(_) => ResultCode::InvalidParam,
            ConfigError::OutOfRange { .. } => ResultCode::ValueOutOfRange,
            ConfigError::TypeMismatch { .. } | ConfigError::ScopeNotApplicable { .. } => {
                ResultCode::InvalidParam
            }
        }
    }
}

/// Errors from socket, connection and message operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SocketError {
    /// Bad or stale handle, or a parameter out of range.
    #[error("invalid parameter: {0}")]
    InvalidParam(&'static str),

    /// Object exists but is not in a state that allows the operation.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// Connection has already ended.
    #[error("connection has ended")]
    NoConnection,

    /// Send-now-or-drop message could not be sent right away.
    #[error("message could not be sent immediately and was dropped")]
    Ignored,

    /// Outbound buffer quota would be exceeded.
    #[error("send buffer limit exceeded: {pending} bytes pending, limit {limit}")]
    LimitExceeded {
        /// Bytes already queued.
        pending: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Address or virtual port is already bound by another listen socket.
    #[error("address already bound: {0}")]
    AddressInUse(String),

    /// Config override was rejected.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl SocketError {
    /// Result code for this error.
    pub fn result_code(&self) -> ResultCode {
        match self {
            SocketError::InvalidParam(_) => ResultCode::InvalidParam,
            SocketError::InvalidState(_) => ResultCode::InvalidState,
            SocketError::NoConnection => ResultCode::NoConnection,
            SocketError::Ignored => ResultCode::Ignored,
            SocketError::LimitExceeded { .. } => ResultCode::LimitExceeded,
            SocketError::AddressInUse(_) => ResultCode::Busy,
            SocketError::Config(err) => err.result_code(),
        }
    }

    /// Check if this error is a caller mistake (bad handle, bad argument).
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            SocketError::InvalidParam(_) | SocketError::InvalidState(_) | SocketError::Config(_)
        )
    }

    /// Check if this error asks the caller to back off and retry or shed load.
    pub fn is_backpressure(&self) -> bool {
        matches!(self, SocketError::LimitExceeded { .. } | SocketError::Ignored)
    }
}

/// Result type for socket operations.
pub type SocketResult<T> = Result<T, SocketError>;
