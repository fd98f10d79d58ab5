//! Echo client: connects, sends numbered messages and counts the replies.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use netsockets::prelude::*;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::EchoError;

/// How long to wait for the connection and for the replies.
const DEADLINE: Duration = Duration::from_secs(5);

/// Run the client against `port`. Returns the number of echoes received.
pub async fn run(sockets: &NetworkingSockets, port: u16, count: usize) -> Result<usize, EchoError> {
    let address = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port);
    let conn = sockets.connect_by_ip_address(address, &[])?;
    sockets.set_connection_name(conn, "echo-client");
    info!(%address, connection = %conn, "connecting");

    wait_connected(sockets, conn).await?;

    for i in 0..count {
        let payload = format!("echo #{i}");
        sockets.send_message(conn, payload.into_bytes(), SendFlags::RELIABLE)?;
    }
    sockets.flush_messages_on_connection(conn)?;

    let start = Instant::now();
    let mut echoed = 0;
    while echoed < count {
        if start.elapsed() > DEADLINE {
            return Err(EchoError::Timeout("echo replies"));
        }
        for msg in sockets.receive_messages_on_connection(conn, count)? {
            debug!(reply = %String::from_utf8_lossy(msg.data()), number = msg.message_number, "reply");
            echoed += 1;
        }
        sleep(Duration::from_millis(1)).await;
    }

    sockets.close_connection(conn, EndReason::APP_GENERIC, "done", true);
    Ok(echoed)
}

async fn wait_connected(sockets: &NetworkingSockets, conn: ConnectionHandle) -> Result<(), EchoError> {
    let start = Instant::now();
    loop {
        let state = sockets
            .get_connection_info(conn)
            .map(|info| info.state)
            .unwrap_or_default();
        match state {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Connecting | ConnectionState::FindingRoute => {}
            _ => return Err(SocketError::NoConnection.into()),
        }
        if start.elapsed() > DEADLINE {
            return Err(EchoError::Timeout("connection"));
        }
        sleep(Duration::from_millis(1)).await;
    }
}
