//! Peer identities.
//!
//! Identities are supplied by an external authentication subsystem; this
//! crate only carries and compares them.

use std::fmt;
use std::net::SocketAddr;

/// Identity of one end of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum PeerIdentity {
    /// Not known (yet). Outbound connections start here until the handshake resolves it.
    #[default]
    Invalid,
    /// The local host, used for loopback connections.
    LocalHost,
    /// Identified only by network address.
    Ip(SocketAddr),
    /// Opaque 64-bit account or device id.
    Id(u64),
    /// Application-defined string identity.
    Generic(String),
}

impl PeerIdentity {
    /// Whether the identity is unresolved.
    pub fn is_invalid(&self) -> bool {
        matches!(self, PeerIdentity::Invalid)
    }

    /// Whether the identity refers to the local host.
    pub fn is_local_host(&self) -> bool {
        matches!(self, PeerIdentity::LocalHost)
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerIdentity::Invalid => write!(f, "invalid"),
            PeerIdentity::LocalHost => write!(f, "localhost"),
            PeerIdentity::Ip(addr) => write!(f, "ip:{addr}"),
            PeerIdentity::Id(id) => write!(f, "id:{id:016x}"),
            PeerIdentity::Generic(name) => write!(f, "str:{name}"),
        }
    }
}

impl From<SocketAddr> for PeerIdentity {
    fn from(addr: SocketAddr) -> Self {
        PeerIdentity::Ip(addr)
    }
}
