use log::trace;

use crate::clock::elapsed_ms;
use crate::errors::{ExchangeError, Result};
use crate::packet::{Packet, PacketId, PacketKind};
use crate::{ACK_PACKET_SIZE, DATA_PACKET_OVERHEAD, MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    Idle,
    Receiving { kind: PacketKind, started_at: u16 },
}

/// Reassembles packets from the byte stream, one byte per step.
pub struct InputStage {
    state: InputState,
    buffer: [u8; MAX_PACKET_SIZE],
    byte_amount: usize,
    timeout_ms: u16,
}

impl InputStage {
    pub fn new(timeout_ms: u16) -> Self {
        Self {
            state: InputState::Idle,
            buffer: [0u8; MAX_PACKET_SIZE],
            byte_amount: 0,
            timeout_ms,
        }
    }

    pub fn state(&self) -> InputState {
        self.state
    }

    pub fn buffered(&self) -> &[u8] {
        match self.state {
            InputState::Idle => &[],
            InputState::Receiving { .. } => &self.buffer[..self.byte_amount],
        }
    }

    pub fn reset(&mut self) {
        self.state = InputState::Idle;
        self.byte_amount = 0;
    }

    /// Advance with the byte read this poll (if any).
    ///
    /// `Ok(Some(_))` is a complete CRC-valid packet. Every `Err` leaves the
    /// stage Idle with the partial packet discarded.
    pub fn step(&mut self, byte: Option<u8>, now: u16) -> Result<Option<Packet>> {
        let (next, outcome) = match (self.state, byte) {
            (InputState::Idle, None) => (InputState::Idle, Ok(None)),
            (InputState::Idle, Some(byte)) => self.start(byte, now),
            (InputState::Receiving { started_at, .. }, None) => {
                let elapsed = elapsed_ms(now, started_at);
                if elapsed > self.timeout_ms {
                    (InputState::Idle, Err(ExchangeError::InputTimeout { elapsed_ms: elapsed }))
                } else {
                    (self.state, Ok(None))
                }
            }
            (InputState::Receiving { kind, .. }, Some(byte)) => self.accumulate(kind, byte),
        };
        if next == InputState::Idle {
            self.byte_amount = 0;
        }
        self.state = next;
        outcome
    }

    fn start(&mut self, byte: u8, now: u16) -> (InputState, Result<Option<Packet>>) {
        match PacketKind::from_tag(byte) {
            Some(kind) => {
                self.buffer[0] = byte;
                self.byte_amount = 1;
                (InputState::Receiving { kind, started_at: now }, Ok(None))
            }
            None => {
                trace!("discarding stray byte {:#04x}", byte);
                (InputState::Idle, Ok(None))
            }
        }
    }

    fn accumulate(&mut self, kind: PacketKind, byte: u8) -> (InputState, Result<Option<Packet>>) {
        if self.byte_amount >= MAX_PACKET_SIZE {
            let received = self.byte_amount + 1;
            return (InputState::Idle, Err(ExchangeError::PacketOverflow { received }));
        }
        self.buffer[self.byte_amount] = byte;
        self.byte_amount += 1;
        let count = self.byte_amount;

        let expected = match kind {
            PacketKind::Ack => ACK_PACKET_SIZE,
            PacketKind::Data => {
                if count < 3 {
                    return (self.state, Ok(None));
                }
                let length = self.buffer[2];
                if usize::from(length) > MAX_PAYLOAD_SIZE {
                    return (
                        InputState::Idle,
                        Err(ExchangeError::IllegalLength { length, max: MAX_PAYLOAD_SIZE }),
                    );
                }
                usize::from(length) + DATA_PACKET_OVERHEAD
            }
        };

        if count < expected {
            return (self.state, Ok(None));
        }
        (InputState::Idle, Packet::decode(&self.buffer[..count]).map(Some))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Fresh,
    Duplicate,
}

/// Tracks the last accepted Data packet ID and judges new arrivals.
#[derive(Debug, Clone)]
pub struct SequenceTracker {
    last_accepted: PacketId,
    accept_restart: bool,
}

impl SequenceTracker {
    pub fn new(accept_restart: bool) -> Self {
        Self {
            last_accepted: PacketId::NONE,
            accept_restart,
        }
    }

    pub fn last_accepted(&self) -> PacketId {
        self.last_accepted
    }

    pub fn admit(&self, id: PacketId) -> Result<Admission> {
        if id.is_none() {
            return Err(ExchangeError::IllegalPacketId);
        }
        if id == self.last_accepted {
            return Ok(Admission::Duplicate);
        }
        if self.last_accepted.is_none() {
            return Ok(Admission::Fresh);
        }
        if self.accept_restart && id == PacketId::INITIAL {
            return Ok(Admission::Fresh);
        }
        let expected = self.last_accepted.successor();
        if id != expected {
            return Err(ExchangeError::OutOfOrder {
                received: id.get(),
                expected: expected.get(),
            });
        }
        Ok(Admission::Fresh)
    }

    pub fn commit(&mut self, id: PacketId) {
        self.last_accepted = id;
    }
}
