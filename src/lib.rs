//! # netsockets
//!
//! Connection-oriented, message-oriented sockets.
//!
//! Applications listen, connect, accept and close connections, then exchange
//! discrete messages over them. It provides:
//!
//! - **Lifecycle**: listen sockets, IP and peer-to-peer connects, socket pairs,
//!   and a connection state machine with explicit accept
//! - **Messages**: reliable and unreliable delivery, Nagle coalescing, rate
//!   pacing and per-connection send quotas
//! - **Lanes**: per-connection sub-streams ordered by priority, then weight
//! - **Poll groups**: receive from many connections in arrival order
//! - **Scoped config**: values set globally, per listen socket or per
//!   connection, inherited down that chain
//! - **Events**: connection state changes and async call completions routed
//!   to the handler configured for the affected object
//!
//! ## Feature Flags
//!
//! - `service` (default): a tokio task that runs the service pass periodically
//!
//! ## Modules
//!
//! - [`core`]: handles, identities, result codes, error types and constants
//! - [`config`]: config keys and the scope store
//! - [`events`]: events, the dispatcher and async calls
//! - [`transport`]: connection state, lane scheduling, pacing and messages
//! - [`sockets`]: the [`NetworkingSockets`] API
//!
//! ## Example Usage
//!
//! ```rust
//! use netsockets::prelude::*;
//!
//! let sockets = NetworkingSockets::new();
//! let (a, b) = sockets.create_socket_pair(false, PeerIdentity::LocalHost, PeerIdentity::LocalHost)?;
//!
//! sockets.send_message(a, b"hello".to_vec(), SendFlags::RELIABLE_NO_NAGLE)?;
//!
//! let messages = sockets.receive_messages_on_connection(b, 16)?;
//! assert_eq!(messages[0].data(), b"hello");
//! # Ok::<(), netsockets::SocketError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod core;
pub mod events;
pub mod sockets;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{ConfigKey, ConfigScope, ConfigStore, ConfigValue};
    pub use crate::core::*;
    pub use crate::events::{
        AsyncCallHandle, CallPayload, DeliveryMode, Event, EventHandler,
    };
    pub use crate::sockets::{
        FlushStatus, ListenAddress, NetworkingSockets, NetworkingSocketsBuilder,
    };
    pub use crate::transport::{
        ConnectionInfo, ConnectionRealTimeStatus, ConnectionState, EndReason, LaneConfig,
        Message, OutboundMessage, SendFlags,
    };
}

// Re-export commonly used items at crate root
pub use crate::core::{
    ConnectionHandle, ListenSocketHandle, PeerIdentity, PollGroupHandle, ResultCode, SocketError,
    SocketResult,
};
pub use config::{ConfigKey, ConfigScope, ConfigValue};
pub use events::{DeliveryMode, Event, EventHandler};
pub use sockets::{FlushStatus, NetworkingSockets, NetworkingSocketsBuilder};
pub use transport::{ConnectionState, EndReason, LaneConfig, Message, SendFlags};
