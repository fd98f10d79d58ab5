//! Per-connection message channel.
//!
//! Outbound messages wait in lane queues until the pacer and the receiver's
//! buffer allow them onto the wire. Inbound messages wait in arrival order
//! until the application receives them.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::trace;

use super::connection::LaneStatus;
use super::lanes::{LaneConfig, LaneScheduler};
use super::message::{Message, QueuedMessage, SendFlags};
use super::pacing::{PacerAction, SendPacer};
use crate::core::constants::FIRST_MESSAGE_NUMBER;
use crate::core::{SocketError, SocketResult};

/// Counters kept by a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ChannelStats {
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub messages_received: u64,
    pub bytes_received: u64,
    pub dropped_unreliable: u64,
}

/// Space the receiving end has left, taken before a transmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InboundRoom {
    pub messages: usize,
    pub bytes: usize,
    pub max_message_size: usize,
    /// Receiver has nothing queued; one message is let through regardless of size.
    pub empty: bool,
}

impl InboundRoom {
    fn fits(&self, size: usize) -> bool {
        self.messages > 0 && (self.empty || self.bytes >= size)
    }

    fn consume(&mut self, size: usize) {
        self.messages -= 1;
        self.bytes = self.bytes.saturating_sub(size);
        self.empty = false;
    }
}

/// Result of one transmit pass.
#[derive(Debug, Default)]
pub(crate) struct Transmit {
    /// Messages placed on the wire and accepted by the receiver.
    pub delivered: Vec<(u16, QueuedMessage)>,
    /// Unreliable messages the receiver had no room for.
    pub dropped: usize,
    /// Unreliable messages lost on the send path.
    pub lost: usize,
    /// A message exceeded the receiver's maximum message size.
    pub oversized: Option<usize>,
    /// A reliable message is waiting for receiver space.
    pub blocked: bool,
}

#[derive(Debug)]
pub(crate) struct MessageChannel {
    lanes: LaneScheduler<QueuedMessage>,
    next_numbers: Vec<i64>,
    pacer: SendPacer,
    send_buffer_limit: usize,
    inbound: VecDeque<Message>,
    inbound_bytes: usize,
    stats: ChannelStats,
}

impl MessageChannel {
    pub fn new(send_buffer_limit: usize, pacer: SendPacer) -> Self {
        Self {
            lanes: LaneScheduler::new(),
            next_numbers: vec![FIRST_MESSAGE_NUMBER],
            pacer,
            send_buffer_limit,
            inbound: VecDeque::new(),
            inbound_bytes: 0,
            stats: ChannelStats::default(),
        }
    }

    pub fn configure_lanes(&mut self, configs: &[LaneConfig]) -> SocketResult<()> {
        self.lanes.configure(configs)?;
        self.next_numbers
            .resize(self.lanes.lane_count(), FIRST_MESSAGE_NUMBER);
        Ok(())
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.lane_count()
    }

    pub fn pending_bytes(&self) -> usize {
        self.lanes.queued_bytes()
    }

    pub fn has_outbound(&self) -> bool {
        !self.lanes.is_empty()
    }

    pub fn set_send_buffer_limit(&mut self, limit: usize) {
        self.send_buffer_limit = limit;
    }

    /// Fail with `LimitExceeded` if `size` more bytes would overflow the send buffer.
    pub fn check_room(&self, size: usize) -> SocketResult<()> {
        let pending = self.pending_bytes();
        if pending + size > self.send_buffer_limit {
            return Err(SocketError::LimitExceeded {
                pending,
                limit: self.send_buffer_limit,
            });
        }
        Ok(())
    }

    /// Queue a message on `lane` and return its number. `lane` must be valid.
    pub fn enqueue(
        &mut self,
        lane: usize,
        payload: Vec<u8>,
        flags: SendFlags,
        now: Instant,
    ) -> SocketResult<i64> {
        self.check_room(payload.len())?;
        let number = self
            .next_numbers
            .get_mut(lane)
            .ok_or(SocketError::InvalidParam("lane index"))?;
        let message_number = *number;
        *number += 1;

        let size = payload.len();
        self.lanes.push(
            lane,
            QueuedMessage {
                payload,
                flags,
                message_number,
            },
            size,
        );
        self.pacer.on_queued(now);
        if flags.is_no_nagle() {
            self.pacer.request_flush();
        }
        Ok(message_number)
    }

    /// Whether a message queued now would go on the wire without waiting.
    pub fn can_send_now(&mut self, now: Instant) -> bool {
        self.lanes.is_empty() && self.pacer.has_credit(now)
    }

    pub fn request_flush(&mut self) {
        self.pacer.request_flush();
    }

    pub fn poll(&mut self, now: Instant) -> PacerAction {
        let has_data = self.has_outbound();
        self.pacer.poll(now, has_data)
    }

    /// Move as many queued messages onto the wire as pacing and `room` allow.
    pub fn transmit(
        &mut self,
        now: Instant,
        room: &mut InboundRoom,
        mut lose: impl FnMut(&QueuedMessage) -> bool,
    ) -> Transmit {
        let mut out = Transmit::default();

        while self.poll(now) == PacerAction::SendNow {
            let Some(lane) = self.lanes.next_lane() else {
                break;
            };
            let Some(front) = self.lanes.front(lane) else {
                break;
            };
            let size = front.payload.len();
            let reliable = front.flags.is_reliable();

            if size > room.max_message_size {
                self.lanes.pop(lane);
                out.oversized = Some(size);
                break;
            }
            let fits = room.fits(size);
            if reliable && !fits {
                out.blocked = true;
                break;
            }

            let Some(msg) = self.lanes.pop(lane) else {
                break;
            };
            self.pacer.on_sent(size, now);
            self.stats.messages_sent += 1;
            self.stats.bytes_sent += size as u64;

            if !reliable && lose(&msg) {
                trace!(lane, number = msg.message_number, "unreliable message lost");
                out.lost += 1;
                continue;
            }
            if !fits {
                out.dropped += 1;
                continue;
            }

            room.consume(size);
            trace!(lane, number = msg.message_number, size, flags = %msg.flags, "message on wire");
            out.delivered.push((lane as u16, msg));
        }

        if self.lanes.is_empty() {
            self.pacer.on_drained();
        }
        out
    }

    /// Drop queued unreliable messages, keeping reliable ones.
    pub fn discard_unreliable(&mut self) -> usize {
        let before = self.lanes.len();
        self.lanes.retain(|m| m.flags.is_reliable());
        before - self.lanes.len()
    }

    /// Drop everything queued for sending.
    pub fn discard_outbound(&mut self) {
        self.lanes.clear();
        self.pacer.on_drained();
    }

    pub fn room(&self, max_bytes: usize, max_messages: usize, max_message_size: usize) -> InboundRoom {
        InboundRoom {
            messages: max_messages.saturating_sub(self.inbound.len()),
            bytes: max_bytes.saturating_sub(self.inbound_bytes),
            max_message_size,
            empty: self.inbound.is_empty(),
        }
    }

    pub fn push_inbound(&mut self, msg: Message) {
        self.stats.messages_received += 1;
        self.stats.bytes_received += msg.len() as u64;
        self.inbound_bytes += msg.len();
        self.inbound.push_back(msg);
    }

    pub fn pop_inbound(&mut self) -> Option<Message> {
        let msg = self.inbound.pop_front()?;
        self.inbound_bytes -= msg.len();
        Some(msg)
    }

    /// Arrival sequence of the oldest inbound message.
    pub fn front_arrival(&self) -> Option<u64> {
        self.inbound.front().map(|m| m.arrival_seq)
    }

    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    pub fn clear_inbound(&mut self) {
        self.inbound.clear();
        self.inbound_bytes = 0;
    }

    pub fn note_dropped(&mut self, count: usize) {
        self.stats.dropped_unreliable += count as u64;
    }

    pub fn lane_status(&self) -> Vec<LaneStatus> {
        (0..self.lanes.lane_count())
            .map(|lane| {
                let mut status = LaneStatus::default();
                for msg in self.lanes.items(lane) {
                    if msg.flags.is_reliable() {
                        status.pending_reliable += msg.payload.len();
                    } else {
                        status.pending_unreliable += msg.payload.len();
                    }
                    status.queued_messages += 1;
                }
                status
            })
            .collect()
    }

    pub fn send_rate(&self) -> u32 {
        self.pacer.rate()
    }

    pub fn set_rate(&mut self, rate: u32) {
        self.pacer.set_rate(rate);
    }

    pub fn set_nagle(&mut self, nagle: Duration) {
        self.pacer.set_nagle(nagle);
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }
}
