//! Event dispatcher.
//!
//! Events are routed by resolving the handler for their scope at the moment
//! of dispatch, not when they were generated. In [`DeliveryMode::Queued`]
//! events wait in a queue until the application calls
//! [`EventDispatcher::run_callbacks`]; in [`DeliveryMode::Immediate`] they
//! are dispatched on the thread that produced them.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{trace, warn};

use super::event::{Event, EventHandler};
use crate::config::{ConfigScope, ConfigStore};

/// How events reach their handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Held until the application pumps [`EventDispatcher::run_callbacks`].
    #[default]
    Queued,
    /// Dispatched as soon as they are posted.
    Immediate,
}

/// Routes events to the handler registered for their scope.
#[derive(Debug)]
pub struct EventDispatcher {
    mode: DeliveryMode,
    config: Arc<ConfigStore>,
    queue: Mutex<VecDeque<Event>>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl EventDispatcher {
    /// Create a dispatcher resolving handlers from `config`.
    pub fn new(config: Arc<ConfigStore>, mode: DeliveryMode) -> Self {
        Self {
            mode,
            config,
            queue: Mutex::new(VecDeque::new()),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Delivery mode.
    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Post one event. Must not be called while holding a lock a handler could need.
    pub fn post(&self, event: Event) {
        match self.mode {
            DeliveryMode::Queued => self.queue.lock().push_back(event),
            DeliveryMode::Immediate => {
                self.dispatch(&event);
            }
        }
    }

    /// Post events in order.
    pub fn post_all(&self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            self.post(event);
        }
    }

    /// Dispatch every event queued before this call. Events posted by the
    /// handlers themselves wait for the next call.
    ///
    /// Returns the number of events taken off the queue.
    pub fn run_callbacks(&self) -> usize {
        let batch = std::mem::take(&mut *self.queue.lock());
        let count = batch.len();
        for event in batch {
            self.dispatch(&event);
        }
        count
    }

    /// Resolve and invoke the handler for `event`. Returns whether one ran.
    pub fn dispatch(&self, event: &Event) -> bool {
        match self.resolve_handler(event) {
            Some(handler) => {
                trace!(scope = %event.scope(), key = %event.handler_key(), "dispatching event");
                handler.call(event);
                self.delivered.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// The handler `event` would be routed to right now.
    ///
    /// Connection events whose scope has been torn down have nowhere to go.
    /// Async completions fall back to the global handler when their scope is
    /// gone, so a cancelled call is still reported.
    pub fn resolve_handler(&self, event: &Event) -> Option<EventHandler> {
        let key = event.handler_key();
        let scope = event.scope();

        match self.config.get_handler(scope, key) {
            Ok(handler) => handler,
            Err(_) => match event {
                Event::AsyncCallCompleted(_) => self
                    .config
                    .get_handler(ConfigScope::Global, key)
                    .ok()
                    .flatten(),
                Event::ConnectionStatusChanged(e) => {
                    warn!(
                        connection = %e.connection,
                        state = ?e.info.state,
                        "dropping event for torn-down scope"
                    );
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
        }
    }

    /// Number of events waiting for [`EventDispatcher::run_callbacks`].
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Number of events a handler was invoked for.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Number of events dropped because their scope no longer existed.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
