//! The `NetworkingSockets` facade: shared state, connection lifecycle and
//! per-connection accessors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, warn};

use super::builder::NetworkingSocketsBuilder;
use super::listen::ListenSocket;
use crate::config::{ConfigKey, ConfigScope, ConfigStore, ConfigValue, ScopeKind};
use crate::core::constants::USER_DATA_UNSET;
use crate::core::{
    Arena, ConnectionHandle, HandleStatus, ListenSocketHandle, PeerIdentity, ResultCode,
    SocketError, SocketResult,
};
use crate::events::{
    AsyncCallHandle, AsyncCallRegistry, CallPayload, ConnectionStatusChanged, DeliveryMode, Event,
    EventDispatcher,
};
use crate::transport::{
    Connection, ConnectionInfo, ConnectionRealTimeStatus, ConnectionState, Direction, EndReason,
    MessageChannel, PathKind, PollGroup, SendPacer,
};

/// First port handed out when a listen socket binds port 0.
const EPHEMERAL_PORT_START: u16 = 49152;

/// Connection, listen socket and poll group tables.
#[derive(Debug)]
pub(super) struct SocketsState {
    pub connections: Arena<Connection>,
    pub listen_sockets: Arena<ListenSocket>,
    pub poll_groups: Arena<PollGroup>,
    pub next_arrival: u64,
    pub next_port: u16,
    pub rng: StdRng,
}

impl SocketsState {
    fn new(rng: StdRng) -> Self {
        Self {
            connections: Arena::new(),
            listen_sockets: Arena::new(),
            poll_groups: Arena::new(),
            next_arrival: 0,
            next_port: EPHEMERAL_PORT_START,
            rng,
        }
    }

    /// A connection the application may still use. Lingering connections
    /// are already closed as far as the application is concerned.
    pub fn conn(&self, h: ConnectionHandle) -> SocketResult<&Connection> {
        match self.connections.get(h.raw()) {
            Some(conn) if !conn.lingering => Ok(conn),
            _ => Err(SocketError::InvalidParam("connection handle")),
        }
    }

    pub fn conn_mut(&mut self, h: ConnectionHandle) -> SocketResult<&mut Connection> {
        match self.connections.get_mut(h.raw()) {
            Some(conn) if !conn.lingering => Ok(conn),
            _ => Err(SocketError::InvalidParam("connection handle")),
        }
    }

    /// Next free in-process port.
    pub fn allocate_port(&mut self) -> u16 {
        loop {
            let port = self.next_port;
            self.next_port = match self.next_port.checked_add(1) {
                Some(next) => next,
                None => EPHEMERAL_PORT_START,
            };
            let taken = self
                .listen_sockets
                .iter()
                .any(|(_, s)| s.address.port() == Some(port));
            if !taken {
                return port;
            }
        }
    }
}

/// Connection-oriented, message-oriented sockets.
///
/// One instance hosts listen sockets, connections and poll groups. Both ends
/// of a connection made through it live in the same instance, which makes it
/// a loopback transport for everything the connection and message contracts
/// cover.
///
/// All methods take `&self` and may be called from any thread.
#[derive(Debug)]
pub struct NetworkingSockets {
    pub(super) config: Arc<ConfigStore>,
    pub(super) dispatcher: EventDispatcher,
    pub(super) calls: AsyncCallRegistry,
    pub(super) state: Mutex<SocketsState>,
    pub(super) local_identity: PeerIdentity,
}

impl Default for NetworkingSockets {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkingSockets {
    /// Instance with default settings, queued event delivery and the local
    /// host as identity.
    pub fn new() -> Self {
        Self::from_parts(
            PeerIdentity::LocalHost,
            DeliveryMode::Queued,
            StdRng::from_entropy(),
            Arc::new(ConfigStore::new()),
        )
    }

    /// Start building a configured instance.
    pub fn builder() -> NetworkingSocketsBuilder {
        NetworkingSocketsBuilder::new()
    }

    pub(super) fn from_parts(
        local_identity: PeerIdentity,
        mode: DeliveryMode,
        rng: StdRng,
        config: Arc<ConfigStore>,
    ) -> Self {
        Self {
            dispatcher: EventDispatcher::new(Arc::clone(&config), mode),
            config,
            calls: AsyncCallRegistry::new(),
            state: Mutex::new(SocketsState::new(rng)),
            local_identity,
        }
    }

    /// Identity of this host.
    pub fn local_identity(&self) -> &PeerIdentity {
        &self.local_identity
    }

    /// Event delivery mode.
    pub fn delivery_mode(&self) -> DeliveryMode {
        self.dispatcher.mode()
    }

    // =========================================================================
    // CONFIG
    // =========================================================================

    /// Store a config value.
    ///
    /// A write at Connection scope also updates what the live connection
    /// pinned at creation (send buffer size, connect timeout, user data), so
    /// the value read back is the value enforced.
    pub fn set_config_value(
        &self,
        scope: ConfigScope,
        key: ConfigKey,
        value: impl Into<ConfigValue>,
    ) -> SocketResult<()> {
        let value = value.into();
        let ConfigScope::Connection(h) = scope else {
            self.config.set(scope, key, value)?;
            return Ok(());
        };

        let mut guard = self.state.lock();
        let conn = guard.conn_mut(h)?;
        self.config.set(scope, key, value.clone())?;
        match (key, value) {
            (ConfigKey::SendBufferSize, ConfigValue::Int32(limit)) => {
                conn.channel.set_send_buffer_limit(limit as usize);
            }
            (ConfigKey::TimeoutInitial, ConfigValue::Int32(ms)) => {
                conn.timeout = Duration::from_millis(ms as u64);
            }
            (ConfigKey::ConnectionUserData, ConfigValue::Int64(user_data)) => {
                conn.user_data = user_data;
            }
            _ => {}
        }
        Ok(())
    }

    /// Resolve a config value through the scope chain.
    pub fn get_config_value(
        &self,
        scope: ConfigScope,
        key: ConfigKey,
    ) -> SocketResult<Option<ConfigValue>> {
        Ok(self.config.get(scope, key)?)
    }

    // =========================================================================
    // EVENTS AND ASYNC CALLS
    // =========================================================================

    /// Dispatch queued events. Returns how many were taken off the queue.
    ///
    /// Only meaningful with [`DeliveryMode::Queued`]; should be called
    /// regularly since inbound connections must be accepted promptly.
    pub fn run_callbacks(&self) -> usize {
        self.dispatcher.run_callbacks()
    }

    /// Events dropped because their scope was torn down before dispatch.
    pub fn dropped_event_count(&self) -> u64 {
        self.dispatcher.dropped_count()
    }

    /// Start an async call bound to `scope`. The call is cancelled if the
    /// scope is torn down before it completes.
    pub fn begin_async_call(&self, scope: ConfigScope) -> SocketResult<AsyncCallHandle> {
        // Teardown removes the scope and cancels its calls under this lock.
        let _guard = self.state.lock();
        if !self.config.contains_scope(scope) {
            return Err(SocketError::InvalidParam("scope"));
        }
        Ok(self.calls.begin(scope))
    }

    /// Complete a call and post its event. False if the call is not pending.
    pub fn complete_async_call(
        &self,
        call: AsyncCallHandle,
        result: ResultCode,
        payload: CallPayload,
    ) -> bool {
        match self.calls.complete(call, result, payload) {
            Some(event) => {
                self.dispatcher.post(event);
                true
            }
            None => false,
        }
    }

    /// Whether `call` has not completed yet.
    pub fn is_async_call_pending(&self, call: AsyncCallHandle) -> bool {
        self.calls.is_pending(call)
    }

    // =========================================================================
    // CONNECTION LIFECYCLE
    // =========================================================================

    /// Accept an inbound connection that is waiting in `Connecting`.
    ///
    /// Direct paths become `Connected` on both ends; relayed paths go through
    /// `FindingRoute` and connect on the next service pass.
    pub fn accept_connection(&self, h: ConnectionHandle) -> SocketResult<()> {
        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let conn = state.conn_mut(h)?;
        if conn.direction != Direction::Inbound || conn.state != ConnectionState::Connecting {
            return Err(SocketError::InvalidState("connection is not awaiting accept"));
        }
        let next = match conn.path {
            PathKind::Relayed => ConnectionState::FindingRoute,
            PathKind::Direct | PathKind::Loopback => ConnectionState::Connected,
        };

        let mut events = Vec::new();
        if let Some(old) = conn.transition(next, now) {
            events.push(status_event(h, conn, old));
        }
        let peer = conn.peer;

        if let Some(p) = peer {
            if let Some(out) = state.connections.get_mut(p.raw()) {
                if out.remote_identity.is_invalid() {
                    out.remote_identity = self.local_identity.clone();
                }
                if let Some(old) = out.transition(next, now) {
                    events.push(status_event(p, out, old));
                }
            }
        }
        drop(guard);

        self.post(events);
        Ok(())
    }

    /// Close a connection.
    ///
    /// With `linger`, queued reliable data keeps flowing and the peer learns
    /// of the close once it has drained; otherwise unsent data is discarded
    /// and the peer is told right away. Closing an ended connection just
    /// releases it. Returns false only for a handle that was never issued.
    pub fn close_connection(
        &self,
        h: ConnectionHandle,
        reason: EndReason,
        debug_text: &str,
        linger: bool,
    ) -> bool {
        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        match state.connections.status(h.raw()) {
            HandleStatus::Unknown => return false,
            HandleStatus::Stale => return true,
            HandleStatus::Live => {}
        }
        let Some(conn) = state.connections.get_mut(h.raw()) else {
            return false;
        };
        if conn.lingering {
            return true;
        }

        let mut events = Vec::new();
        if conn.state.is_terminal() {
            debug!(connection = %h, state = %conn.state, "releasing ended connection");
            events.extend(self.release_connection(state, h));
        } else {
            let reason = if reason.is_application() {
                reason
            } else {
                warn!(connection = %h, %reason, "close reason outside application range, using generic");
                EndReason::APP_GENERIC
            };
            conn.end_reason = reason;
            conn.end_debug = debug_text.to_owned();

            let drain = linger && conn.state == ConnectionState::Connected && {
                conn.channel.discard_unreliable();
                conn.channel.has_outbound()
            };

            if drain {
                debug!(connection = %h, pending = conn.channel.pending_bytes(), "lingering to flush reliable data");
                conn.lingering = true;
                conn.channel.clear_inbound();
                conn.channel.request_flush();
                let group = conn.poll_group.take();
                if let Some(g) = group {
                    if let Some(group) = state.poll_groups.get_mut(g.raw()) {
                        group.remove(h);
                    }
                }
                events.extend(self.calls.cancel_scope(ConfigScope::Connection(h)));
                self.pump(state, h, now, &mut events);
                self.finish_linger(state, h, now, &mut events);
            } else {
                debug!(connection = %h, %reason, "closing connection");
                conn.channel.discard_outbound();
                let peer = conn.peer;
                if let Some(p) = peer {
                    self.end_peer(state, p, reason, debug_text, now, &mut events);
                }
                events.extend(self.release_connection(state, h));
            }
        }
        drop(guard);

        self.post(events);
        true
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Set the application's user data. False for an invalid handle.
    pub fn set_connection_user_data(&self, h: ConnectionHandle, user_data: i64) -> bool {
        self.set_config_value(
            ConfigScope::Connection(h),
            ConfigKey::ConnectionUserData,
            user_data,
        )
        .is_ok()
    }

    /// The application's user data, or [`USER_DATA_UNSET`] for an invalid handle.
    pub fn get_connection_user_data(&self, h: ConnectionHandle) -> i64 {
        self.state
            .lock()
            .conn(h)
            .map_or(USER_DATA_UNSET, |conn| conn.user_data)
    }

    /// Set a name used in diagnostics. False for an invalid handle.
    pub fn set_connection_name(&self, h: ConnectionHandle, name: &str) -> bool {
        match self.state.lock().conn_mut(h) {
            Ok(conn) => {
                conn.name = name.to_owned();
                true
            }
            Err(_) => false,
        }
    }

    /// Name set with [`NetworkingSockets::set_connection_name`].
    pub fn get_connection_name(&self, h: ConnectionHandle) -> Option<String> {
        self.state.lock().conn(h).ok().map(|conn| conn.name.clone())
    }

    /// Snapshot of a connection.
    pub fn get_connection_info(&self, h: ConnectionHandle) -> Option<ConnectionInfo> {
        self.state.lock().conn(h).ok().map(Connection::info)
    }

    /// Live statistics of a connection, including per-lane queue depth.
    pub fn get_connection_real_time_status(
        &self,
        h: ConnectionHandle,
    ) -> SocketResult<ConnectionRealTimeStatus> {
        Ok(self.state.lock().conn(h)?.real_time_status())
    }

    /// Number of connections the application can still use.
    pub fn connection_count(&self) -> usize {
        self.state
            .lock()
            .connections
            .iter()
            .filter(|(_, c)| !c.lingering)
            .count()
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    pub(super) fn post(&self, events: Vec<Event>) {
        self.dispatcher.post_all(events);
    }

    pub(super) fn setting_i32(&self, h: ConnectionHandle, key: ConfigKey) -> i32 {
        self.config
            .get_i32(ConfigScope::Connection(h), key)
            .or_else(|_| self.config.get_i32(ConfigScope::Global, key))
            .unwrap_or_default()
    }

    pub(super) fn setting_f32(&self, h: ConnectionHandle, key: ConfigKey) -> f32 {
        self.config
            .get_f32(ConfigScope::Connection(h), key)
            .or_else(|_| self.config.get_f32(ConfigScope::Global, key))
            .unwrap_or_default()
    }

    /// Send rate for a connection: the configured maximum, never below the minimum.
    pub(super) fn send_rate(&self, h: ConnectionHandle) -> u32 {
        let max = self.setting_i32(h, ConfigKey::SendRateMax);
        let min = self.setting_i32(h, ConfigKey::SendRateMin);
        max.max(min).max(1) as u32
    }

    /// Create a connection, its config scope and apply `overrides` to it.
    /// Overrides must already be validated for connection scope.
    pub(super) fn insert_connection(
        &self,
        state: &mut SocketsState,
        direction: Direction,
        path: PathKind,
        parent: Option<ListenSocketHandle>,
        overrides: &[(ConfigKey, ConfigValue)],
        now: Instant,
    ) -> SocketResult<ConnectionHandle> {
        let from = match parent {
            Some(socket) => ConfigScope::Socket(socket),
            None => ConfigScope::Global,
        };
        let resolve = |key: ConfigKey| -> Option<ConfigValue> {
            overrides
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
                .or_else(|| self.config.get(from, key).ok().flatten())
        };
        let int = |key: ConfigKey| resolve(key).and_then(|v| v.as_i32()).unwrap_or_default();

        let rate = int(ConfigKey::SendRateMax).max(int(ConfigKey::SendRateMin)).max(1) as u32;
        let nagle = Duration::from_micros(int(ConfigKey::NagleTime) as u64);
        let channel = MessageChannel::new(
            int(ConfigKey::SendBufferSize) as usize,
            SendPacer::new(rate, nagle, now),
        );
        let timeout = Duration::from_millis(int(ConfigKey::TimeoutInitial) as u64);

        let mut conn = Connection::new(direction, path, channel, timeout, now);
        conn.listen_socket = parent;
        conn.user_data = resolve(ConfigKey::ConnectionUserData)
            .and_then(|v| v.as_i64())
            .unwrap_or(USER_DATA_UNSET);
        let user_data = (ConfigKey::ConnectionUserData, ConfigValue::Int64(conn.user_data));

        let h = ConnectionHandle::from(state.connections.insert(conn));
        self.config.create_connection_scope(h, parent);
        // The resolved user data is pinned so the scope and the record agree.
        for (key, value) in overrides.iter().chain(std::iter::once(&user_data)) {
            if let Err(err) = self
                .config
                .set(ConfigScope::Connection(h), *key, value.clone())
            {
                state.connections.remove(h.raw());
                self.config.remove_scope(ConfigScope::Connection(h));
                return Err(err.into());
            }
        }
        Ok(h)
    }

    /// Free a connection and everything attached to it.
    ///
    /// The final event is generated after the scope is gone, so it has no
    /// handler to reach.
    pub(super) fn release_connection(
        &self,
        state: &mut SocketsState,
        h: ConnectionHandle,
    ) -> Vec<Event> {
        let Some(conn) = state.connections.remove(h.raw()) else {
            return Vec::new();
        };
        if let Some(g) = conn.poll_group {
            if let Some(group) = state.poll_groups.get_mut(g.raw()) {
                group.remove(h);
            }
        }
        if let Some(s) = conn.listen_socket {
            if let Some(socket) = state.listen_sockets.get_mut(s.raw()) {
                socket.detach(h);
            }
        }
        if let Some(p) = conn.peer {
            if let Some(peer) = state.connections.get_mut(p.raw()) {
                if peer.peer == Some(h) {
                    peer.peer = None;
                }
            }
        }

        let scope = ConfigScope::Connection(h);
        self.config.remove_scope(scope);
        let mut events = self.calls.cancel_scope(scope);
        debug!(connection = %h, "connection released");

        let info = ConnectionInfo {
            state: ConnectionState::None,
            ..conn.info()
        };
        events.push(Event::ConnectionStatusChanged(ConnectionStatusChanged {
            connection: h,
            old_state: conn.state,
            info,
        }));
        events
    }

    /// Tell the other end of a connection that its peer went away.
    pub(super) fn end_peer(
        &self,
        state: &mut SocketsState,
        p: ConnectionHandle,
        reason: EndReason,
        debug_text: &str,
        now: Instant,
        events: &mut Vec<Event>,
    ) {
        let Some(peer) = state.connections.get_mut(p.raw()) else {
            return;
        };
        peer.peer = None;
        if peer.lingering {
            // Nobody is left to drain to.
            events.extend(self.release_connection(state, p));
            return;
        }
        if let Some(old) = peer.end(ConnectionState::ClosedByPeer, reason, debug_text, now) {
            events.push(status_event(p, peer, old));
        }
    }

    /// Release a lingering connection once its reliable data is gone.
    pub(super) fn finish_linger(
        &self,
        state: &mut SocketsState,
        h: ConnectionHandle,
        now: Instant,
        events: &mut Vec<Event>,
    ) {
        let Some(conn) = state.connections.get(h.raw()) else {
            return;
        };
        if !conn.lingering {
            return;
        }
        let ended = conn.state.is_terminal() || conn.peer.is_none();
        if !ended && conn.channel.has_outbound() {
            return;
        }

        let peer = conn.peer;
        let reason = conn.end_reason;
        let debug_text = conn.end_debug.clone();
        if !ended {
            if let Some(p) = peer {
                self.end_peer(state, p, reason, &debug_text, now, events);
            }
        }
        debug!(connection = %h, "linger complete");
        events.extend(self.release_connection(state, h));
    }
}

/// Event for a state change of `conn`.
pub(super) fn status_event(
    h: ConnectionHandle,
    conn: &Connection,
    old_state: ConnectionState,
) -> Event {
    Event::ConnectionStatusChanged(ConnectionStatusChanged {
        connection: h,
        old_state,
        info: conn.info(),
    })
}

/// Check overrides for a socket or connection before anything is created.
pub(super) fn validate_overrides(
    kind: ScopeKind,
    overrides: &[(ConfigKey, ConfigValue)],
) -> SocketResult<()> {
    for (key, value) in overrides {
        if !key.applicability().allows(kind) {
            return Err(crate::core::ConfigError::ScopeNotApplicable { key: *key, scope: kind }.into());
        }
        key.validate(value)?;
    }
    Ok(())
}
