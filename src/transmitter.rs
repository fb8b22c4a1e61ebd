//! Output stage - stop-and-wait transmission state machine
//!
//! Owns at most one outgoing Data packet that has not been acknowledged and
//! an independent outgoing Ack packet. Both share a single transport, and
//! only one packet's bytes may be in the middle of transmission at a time,
//! so the combinations are encoded as six explicit states:
//!
//! ```text
//!            data queued              fully written
//!   Idle ───────────────▶ SendingData ─────────────▶ WaitAck ──acked──▶ Idle
//!    │                        │    ▲                   │  │
//!    │ ack due                │    └────timeout────────┘  │ ack due
//!    ▼                        │ ack due                   ▼
//!  SendingAck ──▶ Idle        ▼                   SendingAckWaitAck ──▶ WaitAck
//!                  SendingDataPendingAck ──written──▶ SendingAckWaitAck
//! ```
//!
//! The transport is never touched outside [`OutputStage::step`].
use crate::ack_manager::{AckSlot, RetransmissionState};
use crate::buffers::ByteQueue;
use crate::packet::{write_data_packet, PacketId};
use crate::transport::Transport;
use crate::{MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE};

/// Output stage states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    /// Nothing in flight, nothing owed
    Idle,
    /// Writing the Data packet
    SendingData,
    /// Writing an Ack packet; no Data packet outstanding
    SendingAck,
    /// Writing the Data packet; an Ack is queued behind it
    SendingDataPendingAck,
    /// Data packet written, waiting for the peer's Ack
    WaitAck,
    /// Writing an Ack packet while the Data packet awaits its Ack
    SendingAckWaitAck,
}

impl OutputState {
    /// State after an acknowledgment obligation is queued.
    ///
    /// Returns `None` when an Ack is already queued or being written: the
    /// request is dropped and the peer's retransmission covers it.
    pub fn with_ack_queued(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::SendingAck),
            Self::SendingData => Some(Self::SendingDataPendingAck),
            Self::WaitAck => Some(Self::SendingAckWaitAck),
            Self::SendingAck | Self::SendingDataPendingAck | Self::SendingAckWaitAck => None,
        }
    }

    /// State after the last Data packet byte was written.
    pub fn after_data_sent(self) -> Self {
        match self {
            Self::SendingDataPendingAck => Self::SendingAckWaitAck,
            _ => Self::WaitAck,
        }
    }

    /// State after the last Ack packet byte was written.
    pub fn after_ack_sent(self) -> Self {
        match self {
            Self::SendingAckWaitAck => Self::WaitAck,
            _ => Self::Idle,
        }
    }
}

/// Observable progress of one output step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    /// A new Data packet was built from outbound bytes
    DataQueued { id: PacketId, payload_len: usize },
    /// The last byte of a Data packet was written
    DataSent(PacketId),
    /// The last byte of an Ack packet was written
    AckSent(PacketId),
    /// The peer acknowledged the Data packet in flight
    Acknowledged(PacketId),
    /// The retransmit timeout expired; the packet is being resent
    Retransmit { id: PacketId, attempt: u32 },
}

/// Stop-and-wait transmission state for one link direction
pub struct OutputStage {
    state: OutputState,
    data: [u8; MAX_PACKET_SIZE],
    data_len: usize,
    data_cursor: usize,
    current_id: PacketId,
    acked_id: PacketId,
    retransmit: RetransmissionState,
    ack: AckSlot,
    timeout_ms: u16,
}

impl OutputStage {
    /// Create an idle output stage
    ///
    /// # Arguments
    /// * `timeout_ms` - Time to wait for an Ack before resending the Data packet
    pub fn new(timeout_ms: u16) -> Self {
        Self {
            state: OutputState::Idle,
            data: [0u8; MAX_PACKET_SIZE],
            data_len: 0,
            data_cursor: 0,
            current_id: PacketId::NONE,
            acked_id: PacketId::NONE,
            retransmit: RetransmissionState::new(0),
            ack: AckSlot::new(),
            timeout_ms,
        }
    }

    pub fn state(&self) -> OutputState {
        self.state
    }

    /// ID of the most recently built Data packet (sentinel before the first)
    pub fn current_id(&self) -> PacketId {
        self.current_id
    }

    /// ID most recently acknowledged by the peer
    pub fn acked_id(&self) -> PacketId {
        self.acked_id
    }

    pub fn retransmission(&self) -> RetransmissionState {
        self.retransmit
    }

    /// Wire bytes of the Data packet still owned by this stage, if any
    pub fn outstanding_packet(&self) -> Option<&[u8]> {
        match self.state {
            OutputState::SendingData
            | OutputState::SendingDataPendingAck
            | OutputState::WaitAck
            | OutputState::SendingAckWaitAck => Some(&self.data[..self.data_len]),
            OutputState::Idle | OutputState::SendingAck => None,
        }
    }

    /// Queue an Ack for `id`.
    ///
    /// # Returns
    /// `true` if the Ack was queued, `false` if another Ack is already
    /// pending and this request was dropped
    pub fn schedule_ack(&mut self, id: PacketId) -> bool {
        match self.state.with_ack_queued() {
            Some(next) => {
                self.ack.load(id);
                self.state = next;
                true
            }
            None => false,
        }
    }

    /// Record an Ack received from the peer.
    pub fn on_ack_received(&mut self, id: PacketId) {
        self.acked_id = id;
    }

    /// Advance the state machine by one poll
    ///
    /// # Arguments
    /// * `transport` - Where packet bytes are written; partial writes are fine
    /// * `outbound` - Application bytes waiting to be packetized
    /// * `now` - Current millisecond counter
    ///
    /// # Returns
    /// The event this step produced, if any
    pub fn step<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        outbound: &mut ByteQueue,
        now: u16,
    ) -> Option<OutputEvent> {
        match self.state {
            OutputState::Idle => self.load_next(outbound, now),
            OutputState::SendingData | OutputState::SendingDataPendingAck => {
                if !self.push_data(transport) {
                    return None;
                }
                self.state = self.state.after_data_sent();
                Some(OutputEvent::DataSent(self.current_id))
            }
            OutputState::WaitAck => {
                if self.acked_id == self.current_id {
                    self.state = OutputState::Idle;
                    return Some(OutputEvent::Acknowledged(self.current_id));
                }
                if self.retransmit.is_due(now, self.timeout_ms) {
                    self.data_cursor = 0;
                    self.retransmit.schedule_retry(now);
                    self.state = OutputState::SendingData;
                    return Some(OutputEvent::Retransmit {
                        id: self.current_id,
                        attempt: self.retransmit.attempt,
                    });
                }
                None
            }
            OutputState::SendingAck | OutputState::SendingAckWaitAck => {
                let remaining = self.ack.remaining();
                let written = transport.write(remaining).min(remaining.len());
                if !self.ack.advance(written) {
                    return None;
                }
                self.state = self.state.after_ack_sent();
                Some(OutputEvent::AckSent(self.ack.id()))
            }
        }
    }

    /// Build the next Data packet from up to [`MAX_PAYLOAD_SIZE`] outbound bytes.
    fn load_next(&mut self, outbound: &mut ByteQueue, now: u16) -> Option<OutputEvent> {
        let mut payload = [0u8; MAX_PAYLOAD_SIZE];
        let size = outbound.peek(&mut payload);
        if size == 0 {
            return None;
        }
        outbound.consume(size);

        self.current_id = self.current_id.successor();
        self.data_len = write_data_packet(&mut self.data, self.current_id, &payload[..size]);
        self.data_cursor = 0;
        self.acked_id = PacketId::NONE;
        self.retransmit.restart(now);
        self.state = OutputState::SendingData;
        Some(OutputEvent::DataQueued {
            id: self.current_id,
            payload_len: size,
        })
    }

    /// Write as much of the Data packet as the transport takes; true when done.
    fn push_data<T: Transport + ?Sized>(&mut self, transport: &mut T) -> bool {
        let remaining = &self.data[self.data_cursor..self.data_len];
        let written = transport.write(remaining).min(remaining.len());
        self.data_cursor += written;
        self.data_cursor == self.data_len
    }
}
