//! Event dispatch and the async-call primitive.
//!
//! - [`Event`]: connection state changes and async call completions
//! - [`EventDispatcher`]: routes events to the handler resolved from the
//!   config store at dispatch time
//! - [`AsyncCallRegistry`]: "remote call that eventually completes" bookkeeping

mod call_result;
mod dispatcher;
mod event;

pub use call_result::{AsyncCallHandle, AsyncCallRegistry};
pub use dispatcher::{DeliveryMode, EventDispatcher};
pub use event::{AsyncCallCompleted, CallPayload, ConnectionStatusChanged, Event, EventHandler};
