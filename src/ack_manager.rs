//! Acknowledgment bookkeeping for the output stage
//!
//! Two small pieces of state the output stage keeps next to its Data packet:
//! the pending outgoing Ack packet with its send cursor, and the retransmit
//! timer of the Data packet in flight. Retries are unbounded; the attempt
//! counter exists for diagnostics only.
use crate::clock::elapsed_ms;
use crate::packet::{AckPacket, PacketId};
use crate::ACK_PACKET_SIZE;

/// Outgoing Ack packet and how much of it has been written
#[derive(Debug, Clone)]
pub struct AckSlot {
    buf: [u8; ACK_PACKET_SIZE],
    cursor: usize,
}

impl AckSlot {
    pub fn new() -> Self {
        Self {
            buf: AckPacket::new(PacketId::NONE).encode(),
            cursor: ACK_PACKET_SIZE,
        }
    }

    /// Replace the slot content with an Ack for `id` and rewind the cursor.
    pub fn load(&mut self, id: PacketId) {
        self.buf = AckPacket::new(id).encode();
        self.cursor = 0;
    }

    pub fn id(&self) -> PacketId {
        PacketId::new(self.buf[1])
    }

    /// Bytes not yet handed to the transport
    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.cursor..]
    }

    /// Record `amount` bytes as written; returns true once the packet is out.
    pub fn advance(&mut self, amount: usize) -> bool {
        self.cursor = (self.cursor + amount).min(ACK_PACKET_SIZE);
        self.is_sent()
    }

    pub fn is_sent(&self) -> bool {
        self.cursor == ACK_PACKET_SIZE
    }
}

impl Default for AckSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Retransmission state tracker
///
/// Maintains the send timestamp of the Data packet in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetransmissionState {
    /// Counter value at the most recent (re)transmission start
    pub sent_at: u16,

    /// Number of retransmissions of the current packet (0 = first send)
    pub attempt: u32,
}

impl RetransmissionState {
    pub fn new(now: u16) -> Self {
        Self { sent_at: now, attempt: 0 }
    }

    /// A fresh packet starts its first transmission.
    pub fn restart(&mut self, now: u16) {
        *self = Self::new(now);
    }

    /// The same packet is about to be sent again.
    pub fn schedule_retry(&mut self, now: u16) {
        self.sent_at = now;
        self.attempt = self.attempt.saturating_add(1);
    }

    /// True once more than `timeout_ms` passed since the last send started.
    pub fn is_due(&self, now: u16, timeout_ms: u16) -> bool {
        elapsed_ms(now, self.sent_at) > timeout_ms
    }
}
