//! Transport layer.
//!
//! Everything that happens to a connection below the sockets API:
//!
//! - **Connection state machine**: [`ConnectionState`] and end reasons
//! - **Messages**: [`SendFlags`], received [`Message`]s, batched [`OutboundMessage`]s
//! - **Lane scheduling**: [`LaneScheduler`] orders the wire by priority then weight
//! - **Pacing**: [`SendPacer`] applies the Nagle delay and the send rate cap
//! - **Channels**: per-connection outbound lanes and inbound queue
//! - **Poll groups**: membership sets drained together

mod channel;
mod connection;
mod lanes;
mod message;
mod pacing;
mod poll_group;

pub(crate) use channel::MessageChannel;
pub use connection::{
    ConnectionInfo, ConnectionRealTimeStatus, ConnectionState, Direction, EndReason, LaneStatus,
    PathKind,
};
pub(crate) use connection::Connection;
pub use lanes::{LaneConfig, LaneScheduler};
pub use message::{Message, OutboundMessage, SendFlags};
pub use pacing::{PacerAction, SendPacer};
pub(crate) use poll_group::{PollGroup, next_ready};
