//! The sockets API.
//!
//! [`NetworkingSockets`] owns listen sockets, connections and poll groups
//! and exposes every operation on them. It is split by concern:
//!
//! - **builder**: instance construction
//! - **networking**: shared state, accept/close, accessors, config and async calls
//! - **listen**: listen sockets, connect calls and socket pairs
//! - **messaging**: send, receive, flush, lanes and poll groups
//! - **service**: the periodic service pass and its tokio driver

mod builder;
mod listen;
mod messaging;
mod networking;
mod service;

pub use builder::{NetworkingSocketsBuilder, SocketsConfig};
pub use listen::ListenAddress;
pub use messaging::FlushStatus;
pub use networking::NetworkingSockets;
