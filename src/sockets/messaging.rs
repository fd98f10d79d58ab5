//! Sending, receiving, lanes and poll groups.

use std::time::Instant;

use tracing::trace;

use super::networking::NetworkingSockets;
use crate::core::constants::MAX_MESSAGE_SIZE_SEND;
use crate::core::{ConnectionHandle, PollGroupHandle, SocketError, SocketResult};
use crate::transport::{
    ConnectionState, Direction, LaneConfig, Message, OutboundMessage, PollGroup, SendFlags,
    next_ready,
};

/// Outcome of [`NetworkingSockets::flush_messages_on_connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Queued data was released to the wire, subject to the send rate.
    Flushed,
    /// Connection is not yet established; data stays queued.
    NotConnected,
}

impl NetworkingSockets {
    /// Send a message on lane 0. Returns its message number.
    pub fn send_message(
        &self,
        h: ConnectionHandle,
        data: impl Into<Vec<u8>>,
        flags: SendFlags,
    ) -> SocketResult<i64> {
        self.send_message_on_lane(h, data, flags, 0)
    }

    /// Send a message on `lane`. Returns its message number.
    ///
    /// Outbound connections may queue data before they are connected. An
    /// unreliable `NO_DELAY` message that cannot go out right away is
    /// dropped with [`SocketError::Ignored`].
    pub fn send_message_on_lane(
        &self,
        h: ConnectionHandle,
        data: impl Into<Vec<u8>>,
        flags: SendFlags,
        lane: u16,
    ) -> SocketResult<i64> {
        let now = Instant::now();
        let payload = data.into();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let conn = state.conn_mut(h)?;
        if payload.len() > MAX_MESSAGE_SIZE_SEND {
            return Err(SocketError::InvalidParam("message exceeds maximum size"));
        }
        if !flags.is_valid() {
            return Err(SocketError::InvalidParam("send flags"));
        }
        match conn.state {
            ConnectionState::Connecting if conn.direction == Direction::Inbound => {
                return Err(SocketError::InvalidState("connection not accepted"));
            }
            s if !s.is_active() => return Err(SocketError::NoConnection),
            _ => {}
        }
        let lane = usize::from(lane);
        if lane >= conn.channel.lane_count() {
            return Err(SocketError::InvalidParam("lane index"));
        }
        if flags.is_no_delay()
            && !flags.is_reliable()
            && !(conn.state == ConnectionState::Connected && conn.channel.can_send_now(now))
        {
            trace!(connection = %h, lane, "no-delay message ignored");
            return Err(SocketError::Ignored);
        }

        let size = payload.len();
        let number = conn.channel.enqueue(lane, payload, flags, now)?;
        trace!(connection = %h, lane, number, size, %flags, "message queued");

        let mut events = Vec::new();
        if flags.is_no_nagle() || flags.is_no_delay() {
            conn.channel.request_flush();
            self.pump(state, h, now, &mut events);
        }
        drop(guard);

        self.post(events);
        Ok(number)
    }

    /// Send a batch. Results line up with the input order.
    pub fn send_messages(
        &self,
        messages: impl IntoIterator<Item = OutboundMessage>,
    ) -> Vec<SocketResult<i64>> {
        messages
            .into_iter()
            .map(|m| self.send_message_on_lane(m.connection, m.payload, m.flags, m.lane))
            .collect()
    }

    /// Take up to `max` received messages from a connection, oldest first.
    ///
    /// Messages that arrived before the connection ended can still be read.
    pub fn receive_messages_on_connection(
        &self,
        h: ConnectionHandle,
        max: usize,
    ) -> SocketResult<Vec<Message>> {
        let mut guard = self.state.lock();
        let conn = guard.conn_mut(h)?;

        let mut out = Vec::with_capacity(max.min(conn.channel.inbound_len()));
        while out.len() < max {
            let Some(mut msg) = conn.channel.pop_inbound() else {
                break;
            };
            msg.connection = h;
            msg.user_data = conn.user_data;
            out.push(msg);
        }
        Ok(out)
    }

    /// Take up to `max` messages from every member of a poll group, in the
    /// order they arrived across the group.
    pub fn receive_messages_on_poll_group(
        &self,
        g: PollGroupHandle,
        max: usize,
    ) -> SocketResult<Vec<Message>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let members: Vec<ConnectionHandle> = state
            .poll_groups
            .get(g.raw())
            .ok_or(SocketError::InvalidParam("poll group handle"))?
            .members()
            .collect();

        let mut out = Vec::new();
        while out.len() < max {
            let connections = &state.connections;
            let Some(next) = next_ready(members.iter().copied(), |c| {
                connections
                    .get(c.raw())
                    .and_then(|conn| conn.channel.front_arrival())
            }) else {
                break;
            };
            let Some(conn) = state.connections.get_mut(next.raw()) else {
                break;
            };
            let Some(mut msg) = conn.channel.pop_inbound() else {
                break;
            };
            msg.connection = next;
            msg.user_data = conn.user_data;
            out.push(msg);
        }
        Ok(out)
    }

    /// Release queued data to the wire now, ignoring the Nagle delay.
    pub fn flush_messages_on_connection(&self, h: ConnectionHandle) -> SocketResult<FlushStatus> {
        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let conn = state.conn_mut(h)?;
        match conn.state {
            ConnectionState::Connected => {}
            s if s.is_terminal() => return Err(SocketError::NoConnection),
            _ => return Ok(FlushStatus::NotConnected),
        }
        conn.channel.request_flush();

        let mut events = Vec::new();
        self.pump(state, h, now, &mut events);
        drop(guard);

        self.post(events);
        Ok(FlushStatus::Flushed)
    }

    /// Set lane priorities and weights. The lane count may only grow.
    pub fn configure_connection_lanes(
        &self,
        h: ConnectionHandle,
        lanes: &[LaneConfig],
    ) -> SocketResult<()> {
        let mut guard = self.state.lock();
        let conn = guard.conn_mut(h)?;
        if conn.state.is_terminal() {
            return Err(SocketError::NoConnection);
        }
        conn.channel.configure_lanes(lanes)?;
        trace!(connection = %h, lanes = lanes.len(), "lanes configured");
        Ok(())
    }

    /// Create an empty poll group.
    pub fn create_poll_group(&self) -> PollGroupHandle {
        PollGroupHandle::from(self.state.lock().poll_groups.insert(PollGroup::new()))
    }

    /// Destroy a poll group. Members stay open and simply leave the group.
    pub fn destroy_poll_group(&self, g: PollGroupHandle) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let Some(mut group) = state.poll_groups.remove(g.raw()) else {
            return false;
        };
        for member in group.take_members() {
            if let Some(conn) = state.connections.get_mut(member.raw()) {
                conn.poll_group = None;
            }
        }
        true
    }

    /// Move a connection into `g`, or out of any group with
    /// [`PollGroupHandle::INVALID`]. Pending messages move with it.
    pub fn set_connection_poll_group(
        &self,
        h: ConnectionHandle,
        g: PollGroupHandle,
    ) -> SocketResult<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let current = state.conn(h)?.poll_group;
        let target = if g.is_invalid() {
            None
        } else if state.poll_groups.get(g.raw()).is_some() {
            Some(g)
        } else {
            return Err(SocketError::InvalidParam("poll group handle"));
        };
        if current == target {
            return Ok(());
        }

        if let Some(old) = current {
            if let Some(group) = state.poll_groups.get_mut(old.raw()) {
                group.remove(h);
            }
        }
        if let Some(new) = target {
            if let Some(group) = state.poll_groups.get_mut(new.raw()) {
                group.insert(h);
            }
        }
        state.conn_mut(h)?.poll_group = target;
        Ok(())
    }
}
