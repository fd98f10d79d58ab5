//! The service pass: timeouts, route finding, transmission and linger.

use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, warn};

use super::networking::{NetworkingSockets, SocketsState, status_event};
use crate::config::ConfigKey;
use crate::core::ConnectionHandle;
use crate::events::Event;
use crate::transport::{ConnectionState, EndReason, Message};

impl NetworkingSockets {
    /// Run one service pass at the current time.
    pub fn service(&self) {
        self.service_at(Instant::now());
    }

    /// Run one service pass as of `now`.
    ///
    /// Fails connection attempts whose timeout ran out, completes route
    /// finding, moves queued messages to their receivers and finishes
    /// lingering closes. Events raised along the way are posted once the
    /// pass is done.
    pub fn service_at(&self, now: Instant) {
        let mut events = Vec::new();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        for raw in state.connections.handles() {
            let h = ConnectionHandle::from(raw);
            let Some(conn) = state.connections.get_mut(raw) else {
                continue;
            };

            if conn.lingering {
                self.pump(state, h, now, &mut events);
                self.finish_linger(state, h, now, &mut events);
                continue;
            }

            if conn.timed_out(now) {
                let peer = conn.peer;
                if let Some(old) = conn.end(
                    ConnectionState::ProblemDetectedLocally,
                    EndReason::MISC_TIMEOUT,
                    "connection attempt timed out",
                    now,
                ) {
                    debug!(connection = %h, from = %old, "connection attempt timed out");
                    events.push(status_event(h, conn, old));
                }
                if let Some(p) = peer {
                    self.end_peer(state, p, EndReason::MISC_TIMEOUT, "peer timed out", now, &mut events);
                }
                continue;
            }

            if conn.state == ConnectionState::FindingRoute {
                if let Some(old) = conn.transition(ConnectionState::Connected, now) {
                    events.push(status_event(h, conn, old));
                }
            }
            if conn.state == ConnectionState::Connected {
                self.pump(state, h, now, &mut events);
            }
        }
        drop(guard);

        self.post(events);
    }

    /// Move what the pacer allows from `h` to its peer.
    pub(super) fn pump(
        &self,
        state: &mut SocketsState,
        h: ConnectionHandle,
        now: Instant,
        events: &mut Vec<Event>,
    ) {
        let nagle = Duration::from_micros(self.setting_i32(h, ConfigKey::NagleTime) as u64);
        let rate = self.send_rate(h);
        let Some(conn) = state.connections.get_mut(h.raw()) else {
            return;
        };
        conn.channel.set_nagle(nagle);
        conn.channel.set_rate(rate);
        if conn.state != ConnectionState::Connected || !conn.channel.has_outbound() {
            return;
        }
        let Some(p) = conn.peer else {
            return;
        };
        let Some(peer) = state.connections.get(p.raw()) else {
            return;
        };
        let peer_lingering = peer.lingering;
        if peer.state != ConnectionState::Connected && !peer_lingering {
            return;
        }

        let mut room = peer.channel.room(
            self.setting_i32(p, ConfigKey::RecvBufferSize) as usize,
            self.setting_i32(p, ConfigKey::RecvBufferMessages) as usize,
            self.setting_i32(p, ConfigKey::RecvMaxMessageSize) as usize,
        );
        let loss = self.setting_f32(h, ConfigKey::FakePacketLossSend);

        let SocketsState {
            connections,
            rng,
            next_arrival,
            ..
        } = state;
        let Some(conn) = connections.get_mut(h.raw()) else {
            return;
        };
        if peer_lingering {
            // The receiving application is gone.
            conn.channel.discard_outbound();
            return;
        }
        let out = conn
            .channel
            .transmit(now, &mut room, |_| loss > 0.0 && rng.gen_range(0.0f32..100.0) < loss);
        let sender_lingering = conn.lingering;
        if out.lost > 0 {
            debug!(connection = %h, lost = out.lost, "unreliable messages lost in transit");
        }

        let Some(peer) = connections.get_mut(p.raw()) else {
            return;
        };
        for (lane, msg) in out.delivered {
            *next_arrival += 1;
            peer.channel.push_inbound(Message {
                connection: p,
                payload: msg.payload,
                lane,
                message_number: msg.message_number,
                flags: msg.flags,
                peer_identity: peer.remote_identity.clone(),
                user_data: peer.user_data,
                arrival_seq: *next_arrival,
            });
        }
        if out.dropped > 0 {
            peer.channel.note_dropped(out.dropped);
            warn!(connection = %p, dropped = out.dropped, "receive buffer full, unreliable messages dropped");
        }

        if let Some(size) = out.oversized {
            warn!(connection = %p, size, "peer sent a message over the size limit");
            if let Some(old) = peer.end(
                ConnectionState::ProblemDetectedLocally,
                EndReason::REMOTE_MESSAGE_TOO_LARGE,
                "peer sent an oversized message",
                now,
            ) {
                events.push(status_event(p, peer, old));
            }
            let Some(conn) = connections.get_mut(h.raw()) else {
                return;
            };
            conn.channel.discard_outbound();
            if let Some(old) = conn.end(
                ConnectionState::ClosedByPeer,
                EndReason::REMOTE_MESSAGE_TOO_LARGE,
                "peer rejected an oversized message",
                now,
            ) {
                if !sender_lingering {
                    events.push(status_event(h, conn, old));
                }
            }
        }
    }

    /// Drive [`NetworkingSockets::service`] from a tokio task.
    ///
    /// The task runs every `ServiceInterval` milliseconds, read from the
    /// global scope when the task starts, and stops once the last `Arc` to
    /// the instance is dropped.
    #[cfg(feature = "service")]
    #[cfg_attr(docsrs, doc(cfg(feature = "service")))]
    pub fn spawn_service_task(self: &std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        let period = self
            .config
            .get_i32(crate::config::ConfigScope::Global, ConfigKey::ServiceInterval)
            .unwrap_or(crate::core::constants::DEFAULT_SERVICE_INTERVAL_MS)
            .max(1);
        let period = Duration::from_millis(period as u64);
        let weak = std::sync::Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(sockets) = weak.upgrade() else {
                    break;
                };
                sockets.service();
            }
            debug!("service task stopped");
        })
    }
}
