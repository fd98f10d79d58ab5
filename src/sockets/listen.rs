//! Listen sockets and connection establishment.

use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Instant;

use tracing::{debug, info};

use super::networking::{NetworkingSockets, SocketsState, status_event, validate_overrides};
use crate::config::{ConfigKey, ConfigScope, ConfigValue, ScopeKind};
use crate::core::{
    ConnectionHandle, HandleStatus, ListenSocketHandle, PeerIdentity, SocketError, SocketResult,
};
use crate::transport::{ConnectionState, Direction, EndReason, PathKind};

/// What a listen socket is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenAddress {
    /// IP address and port. An unspecified IP accepts any local address.
    Ip(SocketAddr),
    /// Virtual port for identity-addressed peer-to-peer connections.
    VirtualPort(i32),
}

impl ListenAddress {
    /// Port number for IP bindings.
    pub fn port(&self) -> Option<u16> {
        match self {
            ListenAddress::Ip(addr) => Some(addr.port()),
            ListenAddress::VirtualPort(_) => None,
        }
    }

    /// Whether two bindings would claim the same traffic.
    fn conflicts(&self, other: &ListenAddress) -> bool {
        match (self, other) {
            (ListenAddress::Ip(a), ListenAddress::Ip(b)) => {
                a.port() == b.port()
                    && (a.ip() == b.ip() || a.ip().is_unspecified() || b.ip().is_unspecified())
            }
            (ListenAddress::VirtualPort(a), ListenAddress::VirtualPort(b)) => a == b,
            _ => false,
        }
    }

    /// Whether a connection aimed at `target` lands on this binding.
    fn accepts(&self, target: &ListenAddress) -> bool {
        match (self, target) {
            (ListenAddress::Ip(bound), ListenAddress::Ip(dest)) => {
                bound.port() == dest.port()
                    && (bound.ip().is_unspecified()
                        || bound.ip() == dest.ip()
                        || (bound.ip().is_loopback() && dest.ip().is_loopback()))
            }
            (ListenAddress::VirtualPort(a), ListenAddress::VirtualPort(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenAddress::Ip(addr) => write!(f, "{addr}"),
            ListenAddress::VirtualPort(port) => write!(f, "vport:{port}"),
        }
    }
}

/// A bound listen socket and the connections that arrived on it.
#[derive(Debug)]
pub(crate) struct ListenSocket {
    pub address: ListenAddress,
    connections: BTreeSet<ConnectionHandle>,
}

impl ListenSocket {
    fn new(address: ListenAddress) -> Self {
        Self {
            address,
            connections: BTreeSet::new(),
        }
    }

    pub fn attach(&mut self, connection: ConnectionHandle) {
        self.connections.insert(connection);
    }

    pub fn detach(&mut self, connection: ConnectionHandle) {
        self.connections.remove(&connection);
    }

    pub fn connections(&self) -> Vec<ConnectionHandle> {
        self.connections.iter().copied().collect()
    }
}

impl NetworkingSockets {
    /// Listen for connections on an IP address. Port 0 picks a free port.
    ///
    /// `overrides` are stored on the new socket's scope and inherited by
    /// every connection that arrives on it.
    pub fn create_listen_socket_ip(
        &self,
        address: SocketAddr,
        overrides: &[(ConfigKey, ConfigValue)],
    ) -> SocketResult<ListenSocketHandle> {
        self.create_listen_socket(ListenAddress::Ip(address), overrides)
    }

    /// Listen for peer-to-peer connections on a virtual port.
    pub fn create_listen_socket_p2p(
        &self,
        virtual_port: i32,
        overrides: &[(ConfigKey, ConfigValue)],
    ) -> SocketResult<ListenSocketHandle> {
        if virtual_port < 0 {
            return Err(SocketError::InvalidParam("virtual port"));
        }
        self.create_listen_socket(ListenAddress::VirtualPort(virtual_port), overrides)
    }

    fn create_listen_socket(
        &self,
        address: ListenAddress,
        overrides: &[(ConfigKey, ConfigValue)],
    ) -> SocketResult<ListenSocketHandle> {
        validate_overrides(ScopeKind::Socket, overrides)?;

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let address = match address {
            ListenAddress::Ip(addr) if addr.port() == 0 => {
                ListenAddress::Ip(SocketAddr::new(addr.ip(), state.allocate_port()))
            }
            other => other,
        };
        if state
            .listen_sockets
            .iter()
            .any(|(_, s)| s.address.conflicts(&address))
        {
            return Err(SocketError::AddressInUse(address.to_string()));
        }

        let h = ListenSocketHandle::from(state.listen_sockets.insert(ListenSocket::new(address)));
        self.config.create_socket_scope(h);
        for (key, value) in overrides {
            if let Err(err) = self.config.set(ConfigScope::Socket(h), *key, value.clone()) {
                state.listen_sockets.remove(h.raw());
                self.config.remove_scope(ConfigScope::Socket(h));
                return Err(err.into());
            }
        }
        info!(socket = %h, %address, "listen socket created");
        Ok(h)
    }

    /// Address a listen socket is bound to.
    pub fn get_listen_socket_address(&self, h: ListenSocketHandle) -> Option<ListenAddress> {
        self.state
            .lock()
            .listen_sockets
            .get(h.raw())
            .map(|s| s.address)
    }

    /// Destroy a listen socket.
    ///
    /// Every connection that arrived on it and has not been closed is closed
    /// without linger, and async calls bound to the socket are cancelled.
    /// Returns false only for a handle that was never issued.
    pub fn close_listen_socket(&self, h: ListenSocketHandle) -> bool {
        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        match state.listen_sockets.status(h.raw()) {
            HandleStatus::Unknown => return false,
            HandleStatus::Stale => return true,
            HandleStatus::Live => {}
        }
        let Some(socket) = state.listen_sockets.get(h.raw()) else {
            return false;
        };
        let attached = socket.connections();
        let address = socket.address;

        let mut events = Vec::new();
        for c in attached {
            let Some(conn) = state.connections.get_mut(c.raw()) else {
                continue;
            };
            if conn.state.is_active() && !conn.lingering {
                conn.channel.discard_outbound();
                conn.end_reason = EndReason::MISC_GENERIC;
                conn.end_debug = "listen socket closed".to_owned();
                let peer = conn.peer;
                if let Some(p) = peer {
                    self.end_peer(state, p, EndReason::MISC_GENERIC, "listen socket closed", now, &mut events);
                }
            }
            events.extend(self.release_connection(state, c));
        }

        state.listen_sockets.remove(h.raw());
        let scope = ConfigScope::Socket(h);
        events.extend(self.calls.cancel_scope(scope));
        self.config.remove_scope(scope);
        drop(guard);

        info!(socket = %h, %address, "listen socket closed");
        self.post(events);
        true
    }

    /// Connect to a listen socket by IP address.
    ///
    /// The connection starts in `Connecting`. If nothing listens at
    /// `address` it times out. `overrides` are stored on the connection scope
    /// before any event for it can fire.
    pub fn connect_by_ip_address(
        &self,
        address: SocketAddr,
        overrides: &[(ConfigKey, ConfigValue)],
    ) -> SocketResult<ConnectionHandle> {
        if address.port() == 0 || address.ip().is_unspecified() {
            return Err(SocketError::InvalidParam("remote address"));
        }
        self.connect(
            ListenAddress::Ip(address),
            PathKind::Direct,
            PeerIdentity::Invalid,
            true,
            overrides,
        )
    }

    /// Connect to a peer by identity and virtual port. The path is relayed,
    /// so an accepted connection passes through `FindingRoute`.
    pub fn connect_p2p(
        &self,
        identity: PeerIdentity,
        virtual_port: i32,
        overrides: &[(ConfigKey, ConfigValue)],
    ) -> SocketResult<ConnectionHandle> {
        if identity.is_invalid() {
            return Err(SocketError::InvalidParam("remote identity"));
        }
        if virtual_port < 0 {
            return Err(SocketError::InvalidParam("virtual port"));
        }
        let reachable = identity.is_local_host() || identity == self.local_identity;
        self.connect(
            ListenAddress::VirtualPort(virtual_port),
            PathKind::Relayed,
            identity,
            reachable,
            overrides,
        )
    }

    fn connect(
        &self,
        target: ListenAddress,
        path: PathKind,
        remote_identity: PeerIdentity,
        reachable: bool,
        overrides: &[(ConfigKey, ConfigValue)],
    ) -> SocketResult<ConnectionHandle> {
        validate_overrides(ScopeKind::Connection, overrides)?;

        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let out = self.insert_connection(state, Direction::Outbound, path, None, overrides, now)?;
        let local_port = state.allocate_port();
        if let Some(conn) = state.connections.get_mut(out.raw()) {
            conn.remote_identity = remote_identity;
            if let ListenAddress::Ip(addr) = target {
                conn.remote_address = Some(addr);
            }
        }

        let listener = if reachable {
            state
                .listen_sockets
                .iter()
                .find(|(_, s)| s.address.accepts(&target))
                .map(|(raw, _)| ListenSocketHandle::from(raw))
        } else {
            None
        };

        let mut events = Vec::new();
        match listener {
            Some(socket) => {
                let inbound =
                    self.attach_inbound(state, socket, out, path, local_port, &target, now)?;
                debug!(connection = %out, inbound = %inbound, %target, "connection arrived on listen socket");
                if let Some(conn) = state.connections.get(inbound.raw()) {
                    events.push(status_event(inbound, conn, ConnectionState::None));
                }
            }
            None => debug!(connection = %out, %target, "no listener at target, connection will time out"),
        }
        drop(guard);

        self.post(events);
        Ok(out)
    }

    /// Create the accepting end of `out` on `socket`.
    #[allow(clippy::too_many_arguments)]
    fn attach_inbound(
        &self,
        state: &mut SocketsState,
        socket: ListenSocketHandle,
        out: ConnectionHandle,
        path: PathKind,
        local_port: u16,
        target: &ListenAddress,
        now: Instant,
    ) -> SocketResult<ConnectionHandle> {
        let inbound =
            self.insert_connection(state, Direction::Inbound, path, Some(socket), &[], now)?;
        if let Some(conn) = state.connections.get_mut(inbound.raw()) {
            conn.peer = Some(out);
            conn.remote_identity = self.local_identity.clone();
            if let ListenAddress::Ip(dest) = target {
                conn.remote_address = Some(SocketAddr::new(dest.ip(), local_port));
            }
        }
        if let Some(conn) = state.connections.get_mut(out.raw()) {
            conn.peer = Some(inbound);
        }
        if let Some(listen) = state.listen_sockets.get_mut(socket.raw()) {
            listen.attach(inbound);
        }
        Ok(inbound)
    }

    /// Create two connected ends in this process.
    ///
    /// With `use_network_loopback` each end reports a loopback address as
    /// its remote address. An invalid identity is replaced by the local one.
    pub fn create_socket_pair(
        &self,
        use_network_loopback: bool,
        identity1: PeerIdentity,
        identity2: PeerIdentity,
    ) -> SocketResult<(ConnectionHandle, ConnectionHandle)> {
        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let resolve = |id: PeerIdentity| {
            if id.is_invalid() {
                self.local_identity.clone()
            } else {
                id
            }
        };
        let identity1 = resolve(identity1);
        let identity2 = resolve(identity2);

        let a = self.insert_connection(state, Direction::Outbound, PathKind::Loopback, None, &[], now)?;
        let b = self.insert_connection(state, Direction::Inbound, PathKind::Loopback, None, &[], now)?;
        let (port_a, port_b) = (state.allocate_port(), state.allocate_port());
        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);

        for (h, peer, remote, port) in [(a, b, identity2, port_b), (b, a, identity1, port_a)] {
            if let Some(conn) = state.connections.get_mut(h.raw()) {
                conn.peer = Some(peer);
                conn.remote_identity = remote;
                if use_network_loopback {
                    conn.remote_address = Some(SocketAddr::new(loopback, port));
                }
                conn.transition(ConnectionState::Connected, now);
            }
        }
        debug!(first = %a, second = %b, "socket pair created");
        Ok((a, b))
    }
}
