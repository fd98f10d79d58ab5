//! The tokio task driving the service pass.

#![cfg(feature = "service")]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{init_tracing, pair};
use netsockets::prelude::*;

#[tokio::test]
async fn test_service_task_releases_nagle_data() {
    init_tracing();
    let sockets = Arc::new(
        NetworkingSockets::builder()
            .global(ConfigKey::ServiceInterval, 2)
            .build()
            .unwrap(),
    );
    let task = sockets.spawn_service_task();
    let (a, b) = pair(&sockets);

    sockets
        .send_message(a, b"tick".to_vec(), SendFlags::RELIABLE)
        .unwrap();

    let mut received = Vec::new();
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        received = sockets.receive_messages_on_connection(b, 4).unwrap();
        if !received.is_empty() {
            break;
        }
    }
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].data(), b"tick");

    drop(sockets);
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("service task should stop once the instance is dropped")
        .unwrap();
}

#[tokio::test]
async fn test_service_task_times_out_connects() {
    let sockets = Arc::new(NetworkingSockets::new());
    let task = sockets.spawn_service_task();
    let client = sockets
        .connect_by_ip_address(
            "127.0.0.1:27040".parse().unwrap(),
            &[(ConfigKey::TimeoutInitial, ConfigValue::Int32(20))],
        )
        .unwrap();

    let mut state = ConnectionState::Connecting;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        state = sockets.get_connection_info(client).unwrap().state;
        if state != ConnectionState::Connecting {
            break;
        }
    }
    assert_eq!(state, ConnectionState::ProblemDetectedLocally);
    task.abort();
}
