//! Event routing through the config scope chain and async call completion.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{EventLog, init_tracing, pair};
use netsockets::prelude::*;

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

#[test]
fn test_socket_handler_receives_inbound_events() {
    init_tracing();
    let global = EventLog::new();
    let socket_log = EventLog::new();
    let sockets = NetworkingSockets::builder()
        .on_connection_status_changed(global.handler())
        .build()
        .unwrap();

    sockets
        .create_listen_socket_ip(
            addr("127.0.0.1:27030"),
            &[(
                ConfigKey::ConnectionStatusChanged,
                ConfigValue::from(socket_log.handler()),
            )],
        )
        .unwrap();
    let client = sockets
        .connect_by_ip_address(addr("127.0.0.1:27030"), &[])
        .unwrap();
    sockets.run_callbacks();

    let arrived = socket_log.status_changes();
    assert_eq!(arrived.len(), 1);
    let server = arrived[0].connection;
    assert_eq!(global.len(), 0);

    sockets.accept_connection(server).unwrap();
    sockets.run_callbacks();

    let socket_seen = socket_log.status_changes();
    assert_eq!(socket_seen.len(), 2);
    assert_eq!(socket_seen[1].connection, server);
    assert_eq!(socket_seen[1].info.state, ConnectionState::Connected);

    // The outbound end has no socket scope and falls back to global.
    let global_seen = global.status_changes();
    assert_eq!(global_seen.len(), 1);
    assert_eq!(global_seen[0].connection, client);
}

#[test]
fn test_connection_override_wins_over_socket() {
    let socket_log = EventLog::new();
    let conn_log = EventLog::new();
    let sockets = NetworkingSockets::new();

    sockets
        .create_listen_socket_ip(
            addr("127.0.0.1:27031"),
            &[(
                ConfigKey::ConnectionStatusChanged,
                ConfigValue::from(socket_log.handler()),
            )],
        )
        .unwrap();
    sockets
        .connect_by_ip_address(addr("127.0.0.1:27031"), &[])
        .unwrap();
    sockets.run_callbacks();
    let server = socket_log.status_changes()[0].connection;

    sockets
        .set_config_value(
            ConfigScope::Connection(server),
            ConfigKey::ConnectionStatusChanged,
            conn_log.handler(),
        )
        .unwrap();
    sockets.accept_connection(server).unwrap();
    sockets.run_callbacks();

    assert_eq!(socket_log.len(), 1);
    let seen = conn_log.status_changes();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].info.state, ConnectionState::Connected);
}

#[test]
fn test_handler_may_accept_from_callback() {
    init_tracing();
    let sockets = Arc::new(NetworkingSockets::new());
    let weak = Arc::downgrade(&sockets);
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    let handler = EventHandler::new(move |event| {
        let Some(change) = event.as_status_changed() else {
            return;
        };
        if change.info.state != ConnectionState::Connecting {
            return;
        }
        if let Some(sockets) = weak.upgrade() {
            sockets.accept_connection(change.connection).unwrap();
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    sockets
        .create_listen_socket_p2p(
            1,
            &[(ConfigKey::ConnectionStatusChanged, ConfigValue::from(handler))],
        )
        .unwrap();
    let client = sockets.connect_p2p(PeerIdentity::LocalHost, 1, &[]).unwrap();

    assert_eq!(sockets.run_callbacks(), 1);
    assert_eq!(accepted.load(Ordering::SeqCst), 1);

    // Events raised inside a callback wait for the next run.
    assert_eq!(sockets.run_callbacks(), 2);
    sockets.service();
    assert_eq!(
        sockets.get_connection_info(client).unwrap().state,
        ConnectionState::Connected
    );
}

#[test]
fn test_immediate_mode_delivers_inline() {
    let log = EventLog::new();
    let sockets = NetworkingSockets::builder()
        .delivery_mode(DeliveryMode::Immediate)
        .on_connection_status_changed(log.handler())
        .build()
        .unwrap();
    sockets.create_listen_socket_p2p(5, &[]).unwrap();
    sockets.connect_p2p(PeerIdentity::LocalHost, 5, &[]).unwrap();

    assert_eq!(log.len(), 1);
    assert_eq!(sockets.run_callbacks(), 0);
}

#[test]
fn test_async_call_completes_to_scope_handler() {
    let global = EventLog::new();
    let conn_log = EventLog::new();
    let sockets = NetworkingSockets::builder()
        .on_async_call_completed(global.handler())
        .build()
        .unwrap();
    let (a, _b) = pair(&sockets);
    sockets
        .set_config_value(
            ConfigScope::Connection(a),
            ConfigKey::AsyncCallCompleted,
            conn_log.handler(),
        )
        .unwrap();

    let call = sockets.begin_async_call(ConfigScope::Connection(a)).unwrap();
    assert!(sockets.complete_async_call(call, ResultCode::Ok, CallPayload::new(42u32)));
    assert!(!sockets.complete_async_call(call, ResultCode::Ok, CallPayload::none()));
    sockets.run_callbacks();

    assert_eq!(global.len(), 0);
    let events = conn_log.take();
    assert_eq!(events.len(), 1);
    let done = events[0].as_call_completed().unwrap();
    assert_eq!(done.call, call);
    assert_eq!(done.result, ResultCode::Ok);
    assert_eq!(done.payload.downcast_ref::<u32>(), Some(&42));
}

#[test]
fn test_closing_listen_socket_cancels_its_calls() {
    let global = EventLog::new();
    let sockets = NetworkingSockets::builder()
        .on_async_call_completed(global.handler())
        .build()
        .unwrap();
    let listen = sockets.create_listen_socket_p2p(9, &[]).unwrap();
    let call = sockets.begin_async_call(ConfigScope::Socket(listen)).unwrap();

    sockets.close_listen_socket(listen);
    assert!(!sockets.is_async_call_pending(call));
    sockets.run_callbacks();

    let events = global.take();
    assert_eq!(events.len(), 1);
    let done = events[0].as_call_completed().unwrap();
    assert_eq!(done.result, ResultCode::Cancelled);
    assert_eq!(done.scope, ConfigScope::Socket(listen));
}
