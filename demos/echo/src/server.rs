//! Echo server: accepts every inbound connection and sends each message
//! back on the connection and lane it arrived on.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Weak};
use std::time::Duration;

use netsockets::prelude::*;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::EchoError;

/// Messages drained from the poll group per pass.
const BATCH: usize = 64;

/// A running echo server.
pub struct EchoServer {
    sockets: Arc<NetworkingSockets>,
    listen: ListenSocketHandle,
    group: PollGroupHandle,
    task: JoinHandle<()>,
}

impl EchoServer {
    /// Listen on `port` and start echoing.
    pub fn start(sockets: &Arc<NetworkingSockets>, port: u16) -> Result<Self, EchoError> {
        let group = sockets.create_poll_group();
        let handler = status_handler(Arc::downgrade(sockets), group);
        let address = SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), port);
        let listen = sockets.create_listen_socket_ip(
            address,
            &[(ConfigKey::ConnectionStatusChanged, ConfigValue::from(handler))],
        )?;
        info!(%address, "echo server listening");

        let task = tokio::spawn(echo_loop(Arc::downgrade(sockets), group));
        Ok(Self {
            sockets: Arc::clone(sockets),
            listen,
            group,
            task,
        })
    }

    /// Close the listen socket and stop echoing.
    pub async fn stop(self) {
        self.task.abort();
        let _ = self.task.await;
        self.sockets.close_listen_socket(self.listen);
        self.sockets.destroy_poll_group(self.group);
        info!("echo server stopped");
    }
}

/// Accept new connections into `group`; release ended ones.
fn status_handler(sockets: Weak<NetworkingSockets>, group: PollGroupHandle) -> EventHandler {
    EventHandler::new(move |event| {
        let Some(change) = event.as_status_changed() else {
            return;
        };
        let Some(sockets) = sockets.upgrade() else {
            return;
        };
        let conn = change.connection;
        match change.info.state {
            ConnectionState::Connecting => {
                if let Err(err) = sockets.accept_connection(conn) {
                    warn!(connection = %conn, %err, "accept failed");
                    return;
                }
                if let Err(err) = sockets.set_connection_poll_group(conn, group) {
                    warn!(connection = %conn, %err, "could not join poll group");
                }
                info!(connection = %conn, peer = %change.info.remote_identity, "client accepted");
            }
            ConnectionState::ClosedByPeer | ConnectionState::ProblemDetectedLocally => {
                info!(connection = %conn, reason = %change.info.end_reason, "client gone");
                sockets.close_connection(conn, EndReason::APP_GENERIC, "", false);
            }
            _ => {}
        }
    })
}

async fn echo_loop(sockets: Weak<NetworkingSockets>, group: PollGroupHandle) {
    let mut ticker = tokio::time::interval(Duration::from_millis(1));
    loop {
        ticker.tick().await;
        let Some(sockets) = sockets.upgrade() else {
            break;
        };
        sockets.run_callbacks();

        let messages = match sockets.receive_messages_on_poll_group(group, BATCH) {
            Ok(messages) => messages,
            Err(err) => {
                warn!(%err, "poll group gone");
                break;
            }
        };
        for msg in messages {
            let (conn, lane, len) = (msg.connection, msg.lane, msg.len());
            let flags = if msg.flags.is_reliable() {
                SendFlags::RELIABLE_NO_NAGLE
            } else {
                SendFlags::UNRELIABLE_NO_NAGLE
            };
            match sockets.send_message_on_lane(conn, msg.into_payload(), flags, lane) {
                Ok(number) => debug!(connection = %conn, lane, len, number, "echoed"),
                Err(err) => warn!(connection = %conn, %err, "echo failed"),
            }
        }
    }
}
