//! Send flags and message descriptors.

use std::fmt;
use std::ops::BitOr;

use crate::core::{ConnectionHandle, PeerIdentity};

/// Delivery flags for a send.
///
/// Bit 0 disables Nagle coalescing, bit 2 asks for send-now-or-drop and
/// bit 3 selects reliable delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SendFlags(u32);

impl SendFlags {
    /// Best-effort delivery, coalesced under the Nagle delay.
    pub const UNRELIABLE: Self = Self(0);
    /// Place on the wire without waiting for the Nagle delay.
    pub const NO_NAGLE: Self = Self(1);
    /// Unreliable without Nagle.
    pub const UNRELIABLE_NO_NAGLE: Self = Self(1);
    /// Drop instead of queueing if the message cannot go out right away.
    pub const NO_DELAY: Self = Self(4);
    /// Unreliable, send now or drop.
    pub const UNRELIABLE_NO_DELAY: Self = Self(5);
    /// Ordered, exactly-once delivery per lane.
    pub const RELIABLE: Self = Self(8);
    /// Reliable without Nagle.
    pub const RELIABLE_NO_NAGLE: Self = Self(9);

    const KNOWN_BITS: u32 = 0x0D;

    /// Create flags from raw bits.
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Check if every bit of `other` is set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check if the RELIABLE bit is set.
    pub fn is_reliable(self) -> bool {
        self.0 & 0x08 != 0
    }

    /// Check if the NO_NAGLE bit is set.
    pub fn is_no_nagle(self) -> bool {
        self.0 & 0x01 != 0
    }

    /// Check if the NO_DELAY bit is set.
    pub fn is_no_delay(self) -> bool {
        self.0 & 0x04 != 0
    }

    /// Check that no undefined bits are set.
    pub fn is_valid(self) -> bool {
        self.0 & !Self::KNOWN_BITS == 0
    }
}

impl BitOr for SendFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for SendFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_reliable() { "reliable" } else { "unreliable" })?;
        if self.is_no_nagle() {
            f.write_str("|no-nagle")?;
        }
        if self.is_no_delay() {
            f.write_str("|no-delay")?;
        }
        Ok(())
    }
}

/// A received message. Dropping it releases it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Connection the message arrived on.
    pub connection: ConnectionHandle,
    /// Payload, byte-identical to what the peer sent.
    pub payload: Vec<u8>,
    /// Lane the peer sent it on.
    pub lane: u16,
    /// Number assigned by the sender, increasing per lane from 1.
    pub message_number: i64,
    /// Flags the peer sent it with.
    pub flags: SendFlags,
    /// Identity of the sender.
    pub peer_identity: PeerIdentity,
    /// User data of the receiving connection when the message was handed out.
    pub user_data: i64,
    pub(crate) arrival_seq: u64,
}

impl Message {
    /// Payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.payload
    }

    /// Payload length.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Take the payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// One entry of a batched send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Target connection.
    pub connection: ConnectionHandle,
    /// Payload.
    pub payload: Vec<u8>,
    /// Delivery flags.
    pub flags: SendFlags,
    /// Lane index.
    pub lane: u16,
}

impl OutboundMessage {
    /// Message on lane 0.
    pub fn new(connection: ConnectionHandle, payload: impl Into<Vec<u8>>, flags: SendFlags) -> Self {
        Self {
            connection,
            payload: payload.into(),
            flags,
            lane: 0,
        }
    }

    /// Send on a different lane.
    pub fn on_lane(mut self, lane: u16) -> Self {
        self.lane = lane;
        self
    }
}

/// A message waiting in a lane queue.
#[derive(Debug, Clone)]
pub(crate) struct QueuedMessage {
    pub payload: Vec<u8>,
    pub flags: SendFlags,
    pub message_number: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_bits() {
        assert!(SendFlags::RELIABLE.is_reliable());
        assert!(!SendFlags::UNRELIABLE.is_reliable());
        assert!(SendFlags::RELIABLE_NO_NAGLE.is_no_nagle());
        assert!(SendFlags::UNRELIABLE_NO_DELAY.is_no_delay());
        assert!(!SendFlags::UNRELIABLE_NO_DELAY.is_reliable());
        assert_eq!(SendFlags::RELIABLE | SendFlags::NO_NAGLE, SendFlags::RELIABLE_NO_NAGLE);
        assert!(SendFlags::RELIABLE_NO_NAGLE.contains(SendFlags::RELIABLE));
    }

    #[test]
    fn test_flag_validity() {
        assert!(SendFlags::RELIABLE_NO_NAGLE.is_valid());
        assert!(SendFlags::from_bits(0x0D).is_valid());
        assert!(!SendFlags::from_bits(0x02).is_valid());
        assert!(!SendFlags::from_bits(0x100).is_valid());
    }

    #[test]
    fn test_flag_display() {
        assert_eq!(SendFlags::RELIABLE.to_string(), "reliable");
        assert_eq!(SendFlags::UNRELIABLE_NO_DELAY.to_string(), "unreliable|no-delay");
    }

    #[test]
    fn test_outbound_builder() {
        let msg = OutboundMessage::new(ConnectionHandle::INVALID, b"hi".to_vec(), SendFlags::RELIABLE)
            .on_lane(3);
        assert_eq!(msg.lane, 3);
        assert_eq!(msg.payload, b"hi");
    }
}
