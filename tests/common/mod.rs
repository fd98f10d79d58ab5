//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use netsockets::events::ConnectionStatusChanged;
use netsockets::prelude::*;
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

/// Route `tracing` output to the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Records every event handed to its handler.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler(&self) -> EventHandler {
        let events = Arc::clone(&self.events);
        EventHandler::new(move |event| events.lock().push(event.clone()))
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn status_changes(&self) -> Vec<ConnectionStatusChanged> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| e.as_status_changed().cloned())
            .collect()
    }
}

/// A connected loopback pair.
pub fn pair(sockets: &NetworkingSockets) -> (ConnectionHandle, ConnectionHandle) {
    sockets
        .create_socket_pair(false, PeerIdentity::LocalHost, PeerIdentity::LocalHost)
        .expect("socket pair")
}
