//! Connection lifecycle through the public API: listen, connect, accept,
//! route finding, close and timeouts.

mod common;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use common::{EventLog, init_tracing, pair};
use netsockets::prelude::*;

fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

#[test]
fn test_ip_connect_and_accept() {
    init_tracing();
    let log = EventLog::new();
    let sockets = NetworkingSockets::builder()
        .on_connection_status_changed(log.handler())
        .build()
        .unwrap();

    let listen = sockets
        .create_listen_socket_ip(addr("0.0.0.0:27015"), &[])
        .unwrap();
    let client = sockets
        .connect_by_ip_address(addr("127.0.0.1:27015"), &[])
        .unwrap();

    sockets.run_callbacks();
    let changes = log.status_changes();
    assert_eq!(changes.len(), 1);
    let server = changes[0].connection;
    assert_eq!(changes[0].old_state, ConnectionState::None);
    assert_eq!(changes[0].info.state, ConnectionState::Connecting);
    assert_eq!(changes[0].info.listen_socket, Some(listen));

    // Only inbound connections may be accepted.
    assert!(matches!(
        sockets.accept_connection(client),
        Err(SocketError::InvalidState(_))
    ));
    sockets.accept_connection(server).unwrap();
    assert!(matches!(
        sockets.accept_connection(server),
        Err(SocketError::InvalidState(_))
    ));

    let server_info = sockets.get_connection_info(server).unwrap();
    let client_info = sockets.get_connection_info(client).unwrap();
    assert_eq!(server_info.state, ConnectionState::Connected);
    assert_eq!(client_info.state, ConnectionState::Connected);
    assert_eq!(client_info.remote_identity, PeerIdentity::LocalHost);

    log.take();
    sockets.run_callbacks();
    let connected: Vec<ConnectionHandle> = log
        .status_changes()
        .iter()
        .filter(|c| c.info.state == ConnectionState::Connected)
        .map(|c| c.connection)
        .collect();
    assert_eq!(connected.len(), 2);
    assert!(connected.contains(&server));
    assert!(connected.contains(&client));
}

#[test]
fn test_accept_invalid_handle() {
    let sockets = NetworkingSockets::new();
    assert!(matches!(
        sockets.accept_connection(ConnectionHandle::INVALID),
        Err(SocketError::InvalidParam(_))
    ));
}

#[test]
fn test_send_before_accept() {
    let log = EventLog::new();
    let sockets = NetworkingSockets::builder()
        .on_connection_status_changed(log.handler())
        .build()
        .unwrap();
    sockets
        .create_listen_socket_ip(addr("127.0.0.1:27016"), &[])
        .unwrap();
    let client = sockets
        .connect_by_ip_address(addr("127.0.0.1:27016"), &[])
        .unwrap();
    sockets.run_callbacks();
    let server = log.status_changes()[0].connection;

    // The connecting side may queue data ahead of the accept; the
    // accepting side may not send until it accepts.
    assert_eq!(
        sockets.send_message(client, b"early".to_vec(), SendFlags::RELIABLE),
        Ok(1)
    );
    assert!(matches!(
        sockets.send_message(server, b"nope".to_vec(), SendFlags::RELIABLE),
        Err(SocketError::InvalidState(_))
    ));
    assert_eq!(
        sockets.flush_messages_on_connection(client),
        Ok(FlushStatus::NotConnected)
    );

    sockets.accept_connection(server).unwrap();
    assert_eq!(
        sockets.flush_messages_on_connection(client),
        Ok(FlushStatus::Flushed)
    );
    let msgs = sockets.receive_messages_on_connection(server, 4).unwrap();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].data(), b"early");
}

#[test]
fn test_p2p_goes_through_finding_route() {
    init_tracing();
    let log = EventLog::new();
    let sockets = NetworkingSockets::builder()
        .local_identity(PeerIdentity::Id(77))
        .on_connection_status_changed(log.handler())
        .build()
        .unwrap();

    sockets.create_listen_socket_p2p(3, &[]).unwrap();
    let client = sockets.connect_p2p(PeerIdentity::Id(77), 3, &[]).unwrap();
    sockets.run_callbacks();
    let server = log.status_changes()[0].connection;

    sockets.accept_connection(server).unwrap();
    assert_eq!(
        sockets.get_connection_info(server).unwrap().state,
        ConnectionState::FindingRoute
    );
    assert_eq!(
        sockets.get_connection_info(client).unwrap().state,
        ConnectionState::FindingRoute
    );

    sockets.send_message(client, b"hi".to_vec(), SendFlags::RELIABLE_NO_NAGLE).unwrap();
    sockets.service();
    assert_eq!(
        sockets.get_connection_info(server).unwrap().state,
        ConnectionState::Connected
    );
    assert_eq!(
        sockets.get_connection_info(client).unwrap().remote_identity,
        PeerIdentity::Id(77)
    );

    // Data queued during route finding flows once connected.
    sockets.service();
    let msgs = sockets.receive_messages_on_connection(server, 8).unwrap();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].peer_identity, PeerIdentity::Id(77));
}

#[test]
fn test_p2p_unknown_identity_times_out() {
    let sockets = NetworkingSockets::builder()
        .local_identity(PeerIdentity::Id(1))
        .build()
        .unwrap();
    sockets.create_listen_socket_p2p(0, &[]).unwrap();

    let client = sockets
        .connect_p2p(
            PeerIdentity::Id(2),
            0,
            &[(ConfigKey::TimeoutInitial, ConfigValue::Int32(50))],
        )
        .unwrap();
    assert_eq!(sockets.connection_count(), 1);

    sockets.service_at(Instant::now() + Duration::from_millis(100));
    let info = sockets.get_connection_info(client).unwrap();
    assert_eq!(info.state, ConnectionState::ProblemDetectedLocally);
    assert_eq!(info.end_reason, EndReason::MISC_TIMEOUT);
}

#[test]
fn test_unaccepted_connection_times_out_on_both_ends() {
    let sockets = NetworkingSockets::new();
    let listen = sockets
        .create_listen_socket_ip(
            addr("127.0.0.1:27017"),
            &[(ConfigKey::TimeoutInitial, ConfigValue::Int32(20))],
        )
        .unwrap();
    let client = sockets
        .connect_by_ip_address(addr("127.0.0.1:27017"), &[])
        .unwrap();

    // The listener's shorter timeout fires first; the client hears about it.
    sockets.service_at(Instant::now() + Duration::from_millis(100));
    let client_info = sockets.get_connection_info(client).unwrap();
    assert_eq!(client_info.state, ConnectionState::ClosedByPeer);
    assert_eq!(client_info.end_reason, EndReason::MISC_TIMEOUT);
    assert!(sockets.close_listen_socket(listen));
}

#[test]
fn test_connection_scope_timeout_applies_after_creation() {
    let sockets = NetworkingSockets::new();
    let client = sockets
        .connect_by_ip_address(addr("127.0.0.1:27019"), &[])
        .unwrap();
    sockets
        .set_config_value(
            ConfigScope::Connection(client),
            ConfigKey::TimeoutInitial,
            20,
        )
        .unwrap();

    sockets.service_at(Instant::now() + Duration::from_millis(100));
    let info = sockets.get_connection_info(client).unwrap();
    assert_eq!(info.state, ConnectionState::ProblemDetectedLocally);
    assert_eq!(info.end_reason, EndReason::MISC_TIMEOUT);
}

#[test]
fn test_close_is_idempotent() {
    let sockets = NetworkingSockets::new();
    let (a, b) = pair(&sockets);

    assert!(sockets.close_connection(a, EndReason::APP_GENERIC, "bye", false));
    assert_eq!(
        sockets.get_connection_info(b).unwrap().state,
        ConnectionState::ClosedByPeer
    );

    assert!(sockets.close_connection(b, EndReason::APP_GENERIC, "", false));
    assert!(sockets.close_connection(b, EndReason::APP_GENERIC, "", false));
    assert_eq!(sockets.get_connection_info(b), None);
    assert_eq!(sockets.connection_count(), 0);
}

#[test]
fn test_closing_pair_reports_only_the_other_side() {
    init_tracing();
    let log = EventLog::new();
    let sockets = NetworkingSockets::builder()
        .delivery_mode(DeliveryMode::Immediate)
        .on_connection_status_changed(log.handler())
        .build()
        .unwrap();
    let (a, b) = pair(&sockets);

    sockets.close_connection(a, EndReason::APP_GENERIC, "", false);
    sockets.close_connection(b, EndReason::APP_GENERIC, "", false);

    let changes = log.status_changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].connection, b);
    assert_eq!(changes[0].info.state, ConnectionState::ClosedByPeer);
    assert!(changes.iter().all(|c| c.info.state != ConnectionState::None));

    // The final invalidations were generated but had no scope to reach.
    assert_eq!(sockets.dropped_event_count(), 2);
}

#[test]
fn test_stale_handle_never_aliases() {
    let sockets = NetworkingSockets::new();
    let (a, b) = pair(&sockets);
    sockets.close_connection(a, EndReason::APP_GENERIC, "", false);
    sockets.close_connection(b, EndReason::APP_GENERIC, "", false);

    // The new pair reuses the freed slots under new generations.
    let (c, _d) = pair(&sockets);
    assert_ne!(a, c);
    assert!(!sockets.set_connection_user_data(a, 5));
    assert_eq!(sockets.get_connection_user_data(a), -1);
    assert!(sockets.set_connection_user_data(c, 5));
    assert_eq!(sockets.get_connection_user_data(c), 5);
}

#[test]
fn test_listen_socket_user_data_is_inherited() {
    let log = EventLog::new();
    let sockets = NetworkingSockets::builder()
        .on_connection_status_changed(log.handler())
        .build()
        .unwrap();
    sockets
        .create_listen_socket_ip(
            addr("127.0.0.1:27018"),
            &[(ConfigKey::ConnectionUserData, ConfigValue::Int64(1234))],
        )
        .unwrap();
    let client = sockets
        .connect_by_ip_address(
            addr("127.0.0.1:27018"),
            &[(ConfigKey::ConnectionUserData, ConfigValue::Int64(99))],
        )
        .unwrap();

    sockets.run_callbacks();
    let server = log.status_changes()[0].connection;
    assert_eq!(sockets.get_connection_user_data(server), 1234);
    assert_eq!(sockets.get_connection_user_data(client), 99);
}
