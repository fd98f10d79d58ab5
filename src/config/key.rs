//! Config key declarations and typed values.
//!
//! Each key statically declares its value type, the scopes it may be stored
//! at, its default and whether connections snapshot it at creation. Values
//! are a tagged union checked against that declaration on every write.

use std::fmt;

use crate::core::ConfigError;
use crate::core::constants::*;
use crate::events::EventHandler;

/// Value type of a config key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// 32-bit signed integer.
    Int32,
    /// 32-bit float.
    Float,
    /// 64-bit signed integer.
    Int64,
    /// UTF-8 string.
    String,
    /// Event handler reference.
    Handler,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Int32 => "int32",
            ValueType::Float => "float",
            ValueType::Int64 => "int64",
            ValueType::String => "string",
            ValueType::Handler => "handler",
        };
        f.write_str(name)
    }
}

/// Kind of scope a value is stored at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// Process-wide defaults.
    Global,
    /// A listen socket; inherited by connections accepted through it.
    Socket,
    /// A single connection.
    Connection,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScopeKind::Global => "global",
            ScopeKind::Socket => "socket",
            ScopeKind::Connection => "connection",
        };
        f.write_str(name)
    }
}

/// Scopes a key may be stored at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applicability {
    /// Only the global scope.
    GlobalOnly,
    /// Socket and connection scopes, never global.
    ConnectionOnly,
    /// Any scope.
    Any,
}

impl Applicability {
    /// Whether a value may be stored at `scope`.
    pub fn allows(self, scope: ScopeKind) -> bool {
        match self {
            Applicability::GlobalOnly => scope == ScopeKind::Global,
            Applicability::ConnectionOnly => scope != ScopeKind::Global,
            Applicability::Any => true,
        }
    }
}

/// Declared configuration keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigKey {
    /// Time allowed for a connection attempt before it fails (ms).
    TimeoutInitial,
    /// Upper bound on buffered-but-unsent bytes per connection.
    SendBufferSize,
    /// Upper bound on received-but-unread bytes per connection.
    RecvBufferSize,
    /// Upper bound on received-but-unread messages per connection.
    RecvBufferMessages,
    /// Largest message a connection accepts from its peer.
    RecvMaxMessageSize,
    /// Nagle coalescing delay (µs).
    NagleTime,
    /// Lower bound on the send rate (bytes/sec).
    SendRateMin,
    /// Upper bound on the send rate (bytes/sec).
    SendRateMax,
    /// Percentage of unreliable messages dropped on the send path.
    FakePacketLossSend,
    /// Initial user data of new connections.
    ConnectionUserData,
    /// Handler for connection state changes.
    ConnectionStatusChanged,
    /// Handler for async call completions.
    AsyncCallCompleted,
    /// Period of the background service task (ms).
    ServiceInterval,
    /// Comma-separated STUN servers, stored for collaborators.
    P2PStunServerList,
}

impl ConfigKey {
    /// Every declared key.
    pub const ALL: &'static [ConfigKey] = &[
        ConfigKey::TimeoutInitial,
        ConfigKey::SendBufferSize,
        ConfigKey::RecvBufferSize,
        ConfigKey::RecvBufferMessages,
        ConfigKey::RecvMaxMessageSize,
        ConfigKey::NagleTime,
        ConfigKey::SendRateMin,
        ConfigKey::SendRateMax,
        ConfigKey::FakePacketLossSend,
        ConfigKey::ConnectionUserData,
        ConfigKey::ConnectionStatusChanged,
        ConfigKey::AsyncCallCompleted,
        ConfigKey::ServiceInterval,
        ConfigKey::P2PStunServerList,
    ];

    /// Symbolic name of the key.
    pub fn name(self) -> &'static str {
        match self {
            ConfigKey::TimeoutInitial => "TimeoutInitial",
            ConfigKey::SendBufferSize => "SendBufferSize",
            ConfigKey::RecvBufferSize => "RecvBufferSize",
            ConfigKey::RecvBufferMessages => "RecvBufferMessages",
            ConfigKey::RecvMaxMessageSize => "RecvMaxMessageSize",
            ConfigKey::NagleTime => "NagleTime",
            ConfigKey::SendRateMin => "SendRateMin",
            ConfigKey::SendRateMax => "SendRateMax",
            ConfigKey::FakePacketLossSend => "FakePacketLoss_Send",
            ConfigKey::ConnectionUserData => "ConnectionUserData",
            ConfigKey::ConnectionStatusChanged => "Callback_ConnectionStatusChanged",
            ConfigKey::AsyncCallCompleted => "Callback_AsyncCallCompleted",
            ConfigKey::ServiceInterval => "ServiceInterval",
            ConfigKey::P2PStunServerList => "P2P_STUN_ServerList",
        }
    }

    /// Declared value type.
    pub fn value_type(self) -> ValueType {
        match self {
            ConfigKey::TimeoutInitial
            | ConfigKey::SendBufferSize
            | ConfigKey::RecvBufferSize
            | ConfigKey::RecvBufferMessages
            | ConfigKey::RecvMaxMessageSize
            | ConfigKey::NagleTime
            | ConfigKey::SendRateMin
            | ConfigKey::SendRateMax
            | ConfigKey::ServiceInterval => ValueType::Int32,
            ConfigKey::FakePacketLossSend => ValueType::Float,
            ConfigKey::ConnectionUserData => ValueType::Int64,
            ConfigKey::P2PStunServerList => ValueType::String,
            ConfigKey::ConnectionStatusChanged | ConfigKey::AsyncCallCompleted => {
                ValueType::Handler
            }
        }
    }

    /// Declared scope applicability.
    pub fn applicability(self) -> Applicability {
        match self {
            ConfigKey::ServiceInterval | ConfigKey::P2PStunServerList => Applicability::GlobalOnly,
            ConfigKey::ConnectionUserData => Applicability::ConnectionOnly,
            _ => Applicability::Any,
        }
    }

    /// Whether connections resolve and pin this key when they are created.
    pub fn snapshot_on_create(self) -> bool {
        matches!(self, ConfigKey::TimeoutInitial | ConfigKey::SendBufferSize)
    }

    /// Declared default. Handler keys have none.
    pub fn default_value(self) -> Option<ConfigValue> {
        let value = match self {
            ConfigKey::TimeoutInitial => ConfigValue::Int32(DEFAULT_TIMEOUT_INITIAL_MS),
            ConfigKey::SendBufferSize => ConfigValue::Int32(DEFAULT_SEND_BUFFER_SIZE),
            ConfigKey::RecvBufferSize => ConfigValue::Int32(DEFAULT_RECV_BUFFER_SIZE),
            ConfigKey::RecvBufferMessages => ConfigValue::Int32(DEFAULT_RECV_BUFFER_MESSAGES),
            ConfigKey::RecvMaxMessageSize => ConfigValue::Int32(DEFAULT_RECV_MAX_MESSAGE_SIZE),
            ConfigKey::NagleTime => ConfigValue::Int32(DEFAULT_NAGLE_TIME_US),
            ConfigKey::SendRateMin => ConfigValue::Int32(DEFAULT_SEND_RATE_MIN),
            ConfigKey::SendRateMax => ConfigValue::Int32(DEFAULT_SEND_RATE_MAX),
            ConfigKey::FakePacketLossSend => ConfigValue::Float(0.0),
            ConfigKey::ConnectionUserData => ConfigValue::Int64(USER_DATA_UNSET),
            ConfigKey::ServiceInterval => ConfigValue::Int32(DEFAULT_SERVICE_INTERVAL_MS),
            ConfigKey::P2PStunServerList => ConfigValue::String(String::new()),
            ConfigKey::ConnectionStatusChanged | ConfigKey::AsyncCallCompleted => return None,
        };
        Some(value)
    }

    /// Check a value against the key's type and range.
    pub fn validate(self, value: &ConfigValue) -> Result<(), ConfigError> {
        let actual = value.value_type();
        if actual != self.value_type() {
            return Err(ConfigError::TypeMismatch {
                key: self,
                expected: self.value_type(),
                actual,
            });
        }

        let in_range = match (self, value) {
            (
                ConfigKey::SendRateMin
                | ConfigKey::SendRateMax
                | ConfigKey::ServiceInterval
                | ConfigKey::RecvBufferMessages
                | ConfigKey::RecvMaxMessageSize,
                ConfigValue::Int32(v),
            ) => *v >= 1,
            (_, ConfigValue::Int32(v)) => *v >= 0,
            (ConfigKey::FakePacketLossSend, ConfigValue::Float(v)) => (0.0..=100.0).contains(v),
            _ => true,
        };
        if !in_range {
            return Err(ConfigError::OutOfRange {
                key: self,
                value: value.as_f64().unwrap_or(f64::NAN),
            });
        }
        Ok(())
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed config value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// 32-bit signed integer.
    Int32(i32),
    /// 32-bit float.
    Float(f32),
    /// 64-bit signed integer.
    Int64(i64),
    /// UTF-8 string.
    String(String),
    /// Event handler reference.
    Handler(EventHandler),
}

impl ConfigValue {
    /// Type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            ConfigValue::Int32(_) => ValueType::Int32,
            ConfigValue::Float(_) => ValueType::Float,
            ConfigValue::Int64(_) => ValueType::Int64,
            ConfigValue::String(_) => ValueType::String,
            ConfigValue::Handler(_) => ValueType::Handler,
        }
    }

    /// The value as `i32`, if it is one.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            ConfigValue::Int32(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as `f32`, if it is one.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            ConfigValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as `i64`, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as a string slice, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// The value as a handler, if it is one.
    pub fn as_handler(&self) -> Option<&EventHandler> {
        match self {
            ConfigValue::Handler(h) => Some(h),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Int32(v) => Some(f64::from(*v)),
            ConfigValue::Float(v) => Some(f64::from(*v)),
            ConfigValue::Int64(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl From<i32> for ConfigValue {
    fn from(v: i32) -> Self {
        ConfigValue::Int32(v)
    }
}

impl From<f32> for ConfigValue {
    fn from(v: f32) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int64(v)
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::String(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::String(v.to_owned())
    }
}

impl From<EventHandler> for ConfigValue {
    fn from(h: EventHandler) -> Self {
        ConfigValue::Handler(h)
    }
}
