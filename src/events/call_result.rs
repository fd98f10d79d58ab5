//! Async call primitive.
//!
//! A call is started in a scope and later completed with a result code and
//! a payload. Tearing the scope down completes every call still pending in
//! it with [`ResultCode::Cancelled`] instead of dropping it.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;

use super::event::{AsyncCallCompleted, CallPayload, Event};
use crate::config::ConfigScope;
use crate::core::ResultCode;

/// Identifier of an outstanding async call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AsyncCallHandle(u64);

impl AsyncCallHandle {
    /// The handle that never refers to a call.
    pub const INVALID: Self = Self(0);

    /// Raw value.
    pub fn to_u64(self) -> u64 {
        self.0
    }

    /// Rebuild from [`AsyncCallHandle::to_u64`].
    pub fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    /// Whether this is the reserved invalid handle.
    pub fn is_invalid(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for AsyncCallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call#{}", self.0)
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    last: u64,
    pending: HashMap<AsyncCallHandle, ConfigScope>,
}

/// Tracks calls that have started but not completed.
#[derive(Debug, Default)]
pub struct AsyncCallRegistry {
    inner: Mutex<RegistryInner>,
}

impl AsyncCallRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a call bound to `scope`. Handles are never reused.
    pub fn begin(&self, scope: ConfigScope) -> AsyncCallHandle {
        let mut inner = self.inner.lock();
        inner.last += 1;
        let call = AsyncCallHandle(inner.last);
        inner.pending.insert(call, scope);
        call
    }

    /// Finish a pending call. `None` if the call is unknown or already finished.
    pub fn complete(
        &self,
        call: AsyncCallHandle,
        result: ResultCode,
        payload: CallPayload,
    ) -> Option<Event> {
        let scope = self.inner.lock().pending.remove(&call)?;
        Some(Event::AsyncCallCompleted(AsyncCallCompleted {
            call,
            scope,
            result,
            payload,
        }))
    }

    /// Cancel every call bound to `scope`, oldest first.
    pub fn cancel_scope(&self, scope: ConfigScope) -> Vec<Event> {
        let mut inner = self.inner.lock();
        let mut calls: Vec<AsyncCallHandle> = inner
            .pending
            .iter()
            .filter(|(_, s)| **s == scope)
            .map(|(call, _)| *call)
            .collect();
        calls.sort();

        calls
            .into_iter()
            .map(|call| {
                inner.pending.remove(&call);
                Event::AsyncCallCompleted(AsyncCallCompleted {
                    call,
                    scope,
                    result: ResultCode::Cancelled,
                    payload: CallPayload::none(),
                })
            })
            .collect()
    }

    /// Whether `call` is still outstanding.
    pub fn is_pending(&self, call: AsyncCallHandle) -> bool {
        self.inner.lock().pending.contains_key(&call)
    }

    /// Number of outstanding calls.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ConnectionHandle, RawHandle};

    #[test]
    fn test_begin_complete() {
        let registry = AsyncCallRegistry::new();
        let a = registry.begin(ConfigScope::Global);
        let b = registry.begin(ConfigScope::Global);
        assert!(a < b);
        assert!(!a.is_invalid());
        assert_eq!(registry.pending_count(), 2);

        let event = registry
            .complete(a, ResultCode::Ok, CallPayload::new(7u32))
            .unwrap();
        let done = event.as_call_completed().unwrap();
        assert_eq!(done.call, a);
        assert_eq!(done.result, ResultCode::Ok);
        assert_eq!(done.payload.downcast_ref::<u32>(), Some(&7));

        assert!(registry.complete(a, ResultCode::Ok, CallPayload::none()).is_none());
        assert!(registry.is_pending(b));
    }

    #[test]
    fn test_cancel_scope() {
        let registry = AsyncCallRegistry::new();
        let conn = ConnectionHandle::from(RawHandle::from_u64((1 << 32) | 3));
        let scope = ConfigScope::Connection(conn);

        let a = registry.begin(scope);
        let other = registry.begin(ConfigScope::Global);
        let b = registry.begin(scope);

        let events = registry.cancel_scope(scope);
        let calls: Vec<_> = events
            .iter()
            .map(|e| e.as_call_completed().unwrap())
            .collect();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].call, a);
        assert_eq!(calls[1].call, b);
        assert!(calls.iter().all(|c| c.result == ResultCode::Cancelled));

        assert!(registry.is_pending(other));
        assert!(registry.cancel_scope(scope).is_empty());
    }
}
