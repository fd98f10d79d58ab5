//! Event variants and handler references.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::call_result::AsyncCallHandle;
use crate::config::{ConfigKey, ConfigScope};
use crate::core::{ConnectionHandle, ResultCode};
use crate::transport::{ConnectionInfo, ConnectionState};

type HandlerFn = dyn Fn(&Event) + Send + Sync;

/// Reference to an application event handler, stored in the config store.
///
/// Handlers may run on any thread, including the service task, and must
/// return quickly.
#[derive(Clone)]
pub struct EventHandler(Arc<HandlerFn>);

impl EventHandler {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invoke the handler.
    pub fn call(&self, event: &Event) {
        (self.0)(event)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

// Two references are equal when they point at the same closure.
impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Typed, shareable payload of a completed async call.
#[derive(Clone, Default)]
pub struct CallPayload(Option<Arc<dyn Any + Send + Sync>>);

impl CallPayload {
    /// A call that completed without data.
    pub fn none() -> Self {
        Self(None)
    }

    /// Wrap a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    /// Borrow the payload as `T`, if that is what it holds.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|v| v.downcast_ref::<T>())
    }

    /// Whether the call carried no payload.
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for CallPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(_) => f.write_str("CallPayload(..)"),
            None => f.write_str("CallPayload(None)"),
        }
    }
}

/// A connection changed state.
#[derive(Debug, Clone)]
pub struct ConnectionStatusChanged {
    /// Connection that changed.
    pub connection: ConnectionHandle,
    /// State before the change.
    pub old_state: ConnectionState,
    /// Snapshot taken when the change happened; `info.state` is the new state.
    pub info: ConnectionInfo,
}

/// An async call finished.
#[derive(Debug, Clone)]
pub struct AsyncCallCompleted {
    /// Call that finished.
    pub call: AsyncCallHandle,
    /// Scope the call was started in.
    pub scope: ConfigScope,
    /// Outcome.
    pub result: ResultCode,
    /// Result data, if any.
    pub payload: CallPayload,
}

/// Asynchronous notification routed to a scoped handler.
#[derive(Debug, Clone)]
pub enum Event {
    /// A connection changed state.
    ConnectionStatusChanged(ConnectionStatusChanged),
    /// An async call finished.
    AsyncCallCompleted(AsyncCallCompleted),
}

impl Event {
    /// Scope the event is routed from.
    pub fn scope(&self) -> ConfigScope {
        match self {
            Event::ConnectionStatusChanged(e) => ConfigScope::Connection(e.connection),
            Event::AsyncCallCompleted(e) => e.scope,
        }
    }

    /// Config key holding the handler for this kind of event.
    pub fn handler_key(&self) -> ConfigKey {
        match self {
            Event::ConnectionStatusChanged(_) => ConfigKey::ConnectionStatusChanged,
            Event::AsyncCallCompleted(_) => ConfigKey::AsyncCallCompleted,
        }
    }

    /// The state change, if this is one.
    pub fn as_status_changed(&self) -> Option<&ConnectionStatusChanged> {
        match self {
            Event::ConnectionStatusChanged(e) => Some(e),
            _ => None,
        }
    }

    /// The call completion, if this is one.
    pub fn as_call_completed(&self) -> Option<&AsyncCallCompleted> {
        match self {
            Event::AsyncCallCompleted(e) => Some(e),
            _ => None,
        }
    }
}
