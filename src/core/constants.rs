//! Fixed limits and defaults.
//!
//! Tunables that applications may change live in the config store; the
//! values here are either hard limits or the declared defaults of those
//! tunables.

use std::time::Duration;

// =============================================================================
// MESSAGE LIMITS
// =============================================================================

/// Largest payload a single `send` will accept.
pub const MAX_MESSAGE_SIZE_SEND: usize = 512 * 1024;

/// Maximum number of lanes a connection may be configured with.
pub const MAX_LANES: usize = 255;

/// Value returned for user data on an invalid handle.
pub const USER_DATA_UNSET: i64 = -1;

/// First message number assigned on every lane.
pub const FIRST_MESSAGE_NUMBER: i64 = 1;

// =============================================================================
// CONFIG DEFAULTS
// =============================================================================

/// Default time allowed for a connection attempt (ms).
pub const DEFAULT_TIMEOUT_INITIAL_MS: i32 = 10_000;

/// Default cap on buffered-but-unsent bytes per connection.
pub const DEFAULT_SEND_BUFFER_SIZE: i32 = 512 * 1024;

/// Default cap on received-but-unread bytes per connection.
pub const DEFAULT_RECV_BUFFER_SIZE: i32 = 1024 * 1024;

/// Default cap on received-but-unread messages per connection.
pub const DEFAULT_RECV_BUFFER_MESSAGES: i32 = 1000;

/// Default largest message a connection will accept from its peer.
pub const DEFAULT_RECV_MAX_MESSAGE_SIZE: i32 = 512 * 1024;

/// Default Nagle coalescing delay (microseconds).
pub const DEFAULT_NAGLE_TIME_US: i32 = 5_000;

/// Default lower bound on the send rate (bytes/sec).
pub const DEFAULT_SEND_RATE_MIN: i32 = 128 * 1024;

/// Default upper bound on the send rate (bytes/sec).
pub const DEFAULT_SEND_RATE_MAX: i32 = 256 * 1024;

/// Default background service period (ms).
pub const DEFAULT_SERVICE_INTERVAL_MS: i32 = 10;

// =============================================================================
// LANE SCHEDULING
// =============================================================================

/// Fixed-point scale for weighted virtual time.
pub const LANE_WEIGHT_SCALE: u64 = 1 << 16;

// =============================================================================
// PACING
// =============================================================================

/// How much unused send credit the pacer may bank.
pub const SEND_BURST_WINDOW: Duration = Duration::from_secs(1);
