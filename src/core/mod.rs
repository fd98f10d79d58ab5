//! Core types shared by every layer: constants, the result-code vocabulary,
//! error enums, generation-checked handles and peer identities.

pub mod constants;
mod error;
mod handle;
mod identity;
mod result;

pub use error::*;
pub use handle::{ConnectionHandle, ListenSocketHandle, PollGroupHandle, RawHandle};
pub(crate) use handle::{Arena, HandleStatus};
pub use identity::PeerIdentity;
pub use result::ResultCode;
