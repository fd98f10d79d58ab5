//! netsockets echo demo
//!
//! Starts a listen socket, connects a client to it in the same process and
//! echoes every message back through a poll group.
//!
//! Environment variables:
//! - ECHO_PORT: listen port (default 27015)
//! - ECHO_MESSAGES: messages the client sends (default 10)
//! - RUST_LOG: tracing filter (default info)

mod client;
mod server;

use std::str::FromStr;
use std::sync::Arc;

use netsockets::{NetworkingSockets, SocketError};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::server::EchoServer;

/// Errors from the demo.
#[derive(Debug, Error)]
pub enum EchoError {
    /// Socket operation failed.
    #[error("socket error: {0}")]
    Socket(#[from] SocketError),

    /// Something did not happen in time.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// Environment variable could not be parsed.
    #[error("invalid {name}: {value}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Rejected value.
        value: String,
    },
}

fn env_or<T: FromStr>(name: &'static str, default: T) -> Result<T, EchoError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| EchoError::InvalidEnv { name, value }),
        Err(_) => Ok(default),
    }
}

#[tokio::main]
async fn main() -> Result<(), EchoError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port: u16 = env_or("ECHO_PORT", 27015)?;
    let count: usize = env_or("ECHO_MESSAGES", 10)?;

    let sockets = Arc::new(NetworkingSockets::new());
    let service = sockets.spawn_service_task();

    let server = EchoServer::start(&sockets, port)?;
    let echoed = client::run(&sockets, port, count).await?;
    info!(sent = count, echoed, "client finished");

    server.stop().await;
    service.abort();
    Ok(())
}
