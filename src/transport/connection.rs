//! Connection state machine and per-connection bookkeeping.

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::debug;

use super::channel::MessageChannel;
use crate::core::constants::USER_DATA_UNSET;
use crate::core::{ConnectionHandle, ListenSocketHandle, PeerIdentity, PollGroupHandle};

/// Connection lifecycle state, as reported to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum ConnectionState {
    /// Fully released, or the handle is invalid.
    #[default]
    None = 0,
    /// Handshake in progress; inbound connections wait here for accept.
    Connecting = 1,
    /// Accepted on a relayed path, negotiating a route.
    FindingRoute = 2,
    /// Data can flow.
    Connected = 3,
    /// The peer closed the connection.
    ClosedByPeer = 4,
    /// Timeout or local failure.
    ProblemDetectedLocally = 5,
}

impl ConnectionState {
    /// Whether the connection has ended and only awaits a local close.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConnectionState::ClosedByPeer | ConnectionState::ProblemDetectedLocally
        )
    }

    /// Whether the connection is still in progress or established.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::FindingRoute | ConnectionState::Connected
        )
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// `None` is reached by freeing the connection, never by a transition.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, FindingRoute)
                | (Connecting, Connected)
                | (FindingRoute, Connected)
                | (Connecting | FindingRoute | Connected, ClosedByPeer)
                | (Connecting | FindingRoute | Connected, ProblemDetectedLocally)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::None => "none",
            ConnectionState::Connecting => "connecting",
            ConnectionState::FindingRoute => "finding-route",
            ConnectionState::Connected => "connected",
            ConnectionState::ClosedByPeer => "closed-by-peer",
            ConnectionState::ProblemDetectedLocally => "problem-detected-locally",
        };
        f.write_str(name)
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EndReason(pub i32);

impl EndReason {
    /// Not ended.
    pub const INVALID: Self = Self(0);

    /// Start of the application range.
    pub const APP_MIN: Self = Self(1000);
    /// Generic application close.
    pub const APP_GENERIC: Self = Self(1000);
    /// End of the normal application range.
    pub const APP_MAX: Self = Self(1999);
    /// Start of the application-exception range.
    pub const APP_EXCEPTION_MIN: Self = Self(2000);
    /// Generic application exception.
    pub const APP_EXCEPTION_GENERIC: Self = Self(2000);
    /// End of the application-exception range.
    pub const APP_EXCEPTION_MAX: Self = Self(2999);

    /// Local host has no usable network path.
    pub const LOCAL_OFFLINE_MODE: Self = Self(3001);
    /// Connections on this host saturated.
    pub const LOCAL_MANY_RELAY_CONNECTIVITY: Self = Self(3002);

    /// Remote host stopped responding.
    pub const REMOTE_TIMEOUT: Self = Self(4001);
    /// Remote host misbehaved.
    pub const REMOTE_BAD_PROTOCOL: Self = Self(4002);
    /// Remote host sent a message larger than allowed.
    pub const REMOTE_MESSAGE_TOO_LARGE: Self = Self(4003);

    /// Unspecified failure.
    pub const MISC_GENERIC: Self = Self(5001);
    /// Internal error.
    pub const MISC_INTERNAL_ERROR: Self = Self(5002);
    /// Connection attempt timed out.
    pub const MISC_TIMEOUT: Self = Self(5003);
    /// No route to the peer could be found.
    pub const MISC_NO_ROUTE: Self = Self(5004);

    /// Whether the code lies in the range applications may use.
    pub fn is_application(self) -> bool {
        (Self::APP_MIN.0..=Self::APP_EXCEPTION_MAX.0).contains(&self.0)
    }

    /// Whether the application flagged the close as abnormal.
    pub fn is_application_exception(self) -> bool {
        (Self::APP_EXCEPTION_MIN.0..=Self::APP_EXCEPTION_MAX.0).contains(&self.0)
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side initiated the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Created by a connect call.
    Outbound,
    /// Arrived on a listen socket; must be accepted.
    Inbound,
}

/// How the two ends reach each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// In-process pair.
    Loopback,
    /// Addressed by IP.
    Direct,
    /// Peer-to-peer through a relay; needs route finding after accept.
    Relayed,
}

/// Snapshot of a connection for the application.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectionInfo {
    /// State at the time of the snapshot.
    pub state: ConnectionState,
    /// Listen socket the connection arrived on, for inbound connections.
    pub listen_socket: Option<ListenSocketHandle>,
    /// Identity of the remote end.
    pub remote_identity: PeerIdentity,
    /// Remote address, when known.
    pub remote_address: Option<SocketAddr>,
    /// Why the connection ended.
    pub end_reason: EndReason,
    /// Diagnostic text that came with the end reason.
    pub end_debug: String,
    /// Human-readable description.
    pub description: String,
    /// Application user data.
    pub user_data: i64,
}

/// Queue depth of one lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LaneStatus {
    /// Unreliable bytes waiting.
    pub pending_unreliable: usize,
    /// Reliable bytes waiting.
    pub pending_reliable: usize,
    /// Messages waiting.
    pub queued_messages: usize,
}

/// Live statistics of a connection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectionRealTimeStatus {
    /// Current state.
    pub state: ConnectionState,
    /// Round-trip estimate in milliseconds. Both ends live in the same
    /// process, so this is always 0.
    pub ping_ms: i32,
    /// Current send rate in bytes per second.
    pub send_rate_bytes_per_sec: u32,
    /// Unreliable bytes waiting across all lanes.
    pub pending_unreliable: usize,
    /// Reliable bytes waiting across all lanes.
    pub pending_reliable: usize,
    /// Messages waiting to be received by the application.
    pub inbound_messages: usize,
    /// Messages placed on the wire so far.
    pub messages_sent: u64,
    /// Messages received from the peer so far.
    pub messages_received: u64,
    /// Per-lane queue depth.
    pub lanes: Vec<LaneStatus>,
}

/// One connection end, owned by the connection table.
#[derive(Debug)]
pub(crate) struct Connection {
    pub state: ConnectionState,
    pub direction: Direction,
    pub path: PathKind,
    pub listen_socket: Option<ListenSocketHandle>,
    /// The other end, while it exists.
    pub peer: Option<ConnectionHandle>,
    pub remote_identity: PeerIdentity,
    pub remote_address: Option<SocketAddr>,
    pub end_reason: EndReason,
    pub end_debug: String,
    pub name: String,
    pub user_data: i64,
    pub poll_group: Option<PollGroupHandle>,
    pub channel: MessageChannel,
    pub timeout: Duration,
    pub state_entered_at: Instant,
    /// Closed locally but still draining reliable data to the peer.
    pub lingering: bool,
}

impl Connection {
    pub fn new(
        direction: Direction,
        path: PathKind,
        channel: MessageChannel,
        timeout: Duration,
        now: Instant,
    ) -> Self {
        Self {
            state: ConnectionState::Connecting,
            direction,
            path,
            listen_socket: None,
            peer: None,
            remote_identity: PeerIdentity::Invalid,
            remote_address: None,
            end_reason: EndReason::INVALID,
            end_debug: String::new(),
            name: String::new(),
            user_data: USER_DATA_UNSET,
            poll_group: None,
            channel,
            timeout,
            state_entered_at: now,
            lingering: false,
        }
    }

    /// Move to `next`. Returns the previous state if the move was allowed.
    pub fn transition(&mut self, next: ConnectionState, now: Instant) -> Option<ConnectionState> {
        let old = self.state;
        if !old.can_transition_to(next) {
            return None;
        }
        debug!(name = %self.description(), from = %old, to = %next, "connection state change");
        self.state = next;
        self.state_entered_at = now;
        Some(old)
    }

    /// Record why the connection ended and move to a terminal state.
    pub fn end(
        &mut self,
        next: ConnectionState,
        reason: EndReason,
        debug_text: &str,
        now: Instant,
    ) -> Option<ConnectionState> {
        let old = self.transition(next, now)?;
        self.end_reason = reason;
        self.end_debug = debug_text.to_owned();
        Some(old)
    }

    /// Whether the connect timeout has run out.
    pub fn timed_out(&self, now: Instant) -> bool {
        matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::FindingRoute
        ) && now.saturating_duration_since(self.state_entered_at) >= self.timeout
    }

    pub fn description(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        let dir = match self.direction {
            Direction::Outbound => "to",
            Direction::Inbound => "from",
        };
        format!("{dir} {}", self.remote_identity)
    }

    /// State as the application sees it. A lingering connection is already gone.
    pub fn visible_state(&self) -> ConnectionState {
        if self.lingering {
            ConnectionState::None
        } else {
            self.state
        }
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            state: self.visible_state(),
            listen_socket: self.listen_socket,
            remote_identity: self.remote_identity.clone(),
            remote_address: self.remote_address,
            end_reason: self.end_reason,
            end_debug: self.end_debug.clone(),
            description: self.description(),
            user_data: self.user_data,
        }
    }

    pub fn real_time_status(&self) -> ConnectionRealTimeStatus {
        let lanes = self.channel.lane_status();
        ConnectionRealTimeStatus {
            state: self.visible_state(),
            ping_ms: 0,
            send_rate_bytes_per_sec: self.channel.send_rate(),
            pending_unreliable: lanes.iter().map(|l| l.pending_unreliable).sum(),
            pending_reliable: lanes.iter().map(|l| l.pending_reliable).sum(),
            inbound_messages: self.channel.inbound_len(),
            messages_sent: self.channel.stats().messages_sent,
            messages_received: self.channel.stats().messages_received,
            lanes,
        }
    }
}
