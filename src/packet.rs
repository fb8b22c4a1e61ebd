//! Wire format of the two packet types
//!
//! ```text
//! Data packet:  0xDD | id | length | payload[length] | crcLow | crcHigh
//! Ack packet:   0xAA | id | crcLow | crcHigh
//! ```
//!
//! The CRC16 covers every byte before the CRC itself. A Data packet is at
//! most [`MAX_PACKET_SIZE`] bytes, which leaves [`MAX_PAYLOAD_SIZE`] bytes of
//! payload. No I/O happens here.
use std::fmt;

use crate::crc16::{crc16_ccitt, crc_bytes};
use crate::errors::{ExchangeError, Result};
use crate::{ACK_PACKET_SIZE, DATA_PACKET_OVERHEAD, MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE};

/// Leading byte of a Data packet
pub const DATA_PACKET_TAG: u8 = 0xDD;

/// Leading byte of an Ack packet
pub const ACK_PACKET_TAG: u8 = 0xAA;

/// Packet type, derived from the leading tag byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Data,
    Ack,
}

impl PacketKind {
    /// Map a tag byte to its packet kind
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            DATA_PACKET_TAG => Some(Self::Data),
            ACK_PACKET_TAG => Some(Self::Ack),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Self::Data => DATA_PACKET_TAG,
            Self::Ack => ACK_PACKET_TAG,
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => f.write_str("DATA"),
            Self::Ack => f.write_str("ACK"),
        }
    }
}

/// One-byte packet sequence number
///
/// Valid IDs are `0..=254`. `0xFF` is the sentinel meaning "no packet":
/// nothing sent yet, nothing accepted yet, nothing acknowledged yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketId(u8);

impl PacketId {
    /// The sentinel
    pub const NONE: PacketId = PacketId(0xFF);

    /// ID of the very first Data packet a side sends
    pub const INITIAL: PacketId = PacketId(0);

    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == Self::NONE.0
    }

    /// The ID that follows `self` in a sending sequence.
    ///
    /// The sentinel is followed by [`PacketId::INITIAL`]. Otherwise the ID is
    /// incremented, and a result landing on the sentinel becomes 1: after the
    /// initial 0 the sequence cycles through `1..=254`.
    pub const fn successor(self) -> Self {
        if self.is_none() {
            return Self::INITIAL;
        }
        let next = self.0.wrapping_add(1);
        if next == Self::NONE.0 {
            Self(1)
        } else {
            Self(next)
        }
    }
}

impl Default for PacketId {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.0)
    }
}

/// A Data packet: sequence ID plus up to [`MAX_PAYLOAD_SIZE`] payload bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub id: PacketId,
    pub payload: Vec<u8>,
}

impl DataPacket {
    /// Create a Data packet, rejecting payloads that do not fit one frame.
    ///
    /// # Errors
    /// Returns [`ExchangeError::PayloadTooLarge`] if `payload` is longer than
    /// [`MAX_PAYLOAD_SIZE`].
    pub fn new(id: PacketId, payload: &[u8]) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ExchangeError::PayloadTooLarge {
                length: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(Self {
            id,
            payload: payload.to_vec(),
        })
    }

    /// Size of this packet on the wire
    pub fn wire_len(&self) -> usize {
        self.payload.len() + DATA_PACKET_OVERHEAD
    }

    /// Serialize into `buf`, returning the number of bytes written.
    ///
    /// `buf` is a full-size packet buffer so the write cannot run short.
    pub fn encode_into(&self, buf: &mut [u8; MAX_PACKET_SIZE]) -> usize {
        write_data_packet(buf, self.id, &self.payload)
    }

    /// Serialize into a newly allocated vector
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let len = self.encode_into(&mut buf);
        buf[..len].to_vec()
    }
}

/// An Ack packet confirming receipt of one Data packet ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPacket {
    pub id: PacketId,
}

impl AckPacket {
    pub fn new(id: PacketId) -> Self {
        Self { id }
    }

    pub fn encode(&self) -> [u8; ACK_PACKET_SIZE] {
        let mut buf = [ACK_PACKET_TAG, self.id.get(), 0, 0];
        let [low, high] = crc_bytes(crc16_ccitt(&buf[..2]));
        buf[2] = low;
        buf[3] = high;
        buf
    }
}

/// A complete, CRC-validated packet of either kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Data(DataPacket),
    Ack(AckPacket),
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Self::Data(_) => PacketKind::Data,
            Self::Ack(_) => PacketKind::Ack,
        }
    }

    pub fn id(&self) -> PacketId {
        match self {
            Self::Data(data) => data.id,
            Self::Ack(ack) => ack.id,
        }
    }

    /// Parse one complete frame.
    ///
    /// # Errors
    /// - [`ExchangeError::UnexpectedTag`] if the first byte is not a tag
    /// - [`ExchangeError::IllegalLength`] if a Data packet declares more than
    ///   [`MAX_PAYLOAD_SIZE`] bytes
    /// - [`ExchangeError::InvalidPacketLength`] if `frame` is not exactly one packet
    /// - [`ExchangeError::IntegrityCheckFailed`] on CRC mismatch
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let tag = *frame.first().ok_or(ExchangeError::InvalidPacketLength {
            expected: ACK_PACKET_SIZE,
            received: 0,
        })?;
        let kind = PacketKind::from_tag(tag).ok_or(ExchangeError::UnexpectedTag(tag))?;

        let expected_len = match kind {
            PacketKind::Ack => ACK_PACKET_SIZE,
            PacketKind::Data => {
                let length = *frame.get(2).ok_or(ExchangeError::InvalidPacketLength {
                    expected: DATA_PACKET_OVERHEAD,
                    received: frame.len(),
                })?;
                if usize::from(length) > MAX_PAYLOAD_SIZE {
                    return Err(ExchangeError::IllegalLength {
                        length,
                        max: MAX_PAYLOAD_SIZE,
                    });
                }
                usize::from(length) + DATA_PACKET_OVERHEAD
            }
        };
        if frame.len() != expected_len {
            return Err(ExchangeError::InvalidPacketLength {
                expected: expected_len,
                received: frame.len(),
            });
        }

        verify_crc(kind, frame)?;

        let id = PacketId::new(frame[1]);
        Ok(match kind {
            PacketKind::Ack => Self::Ack(AckPacket::new(id)),
            PacketKind::Data => Self::Data(DataPacket {
                id,
                payload: frame[3..expected_len - 2].to_vec(),
            }),
        })
    }
}

/// Write a Data packet into `buf` and return its wire length.
///
/// The caller guarantees `payload.len() <= MAX_PAYLOAD_SIZE`.
pub(crate) fn write_data_packet(buf: &mut [u8; MAX_PACKET_SIZE], id: PacketId, payload: &[u8]) -> usize {
    debug_assert!(payload.len() <= MAX_PAYLOAD_SIZE);
    let len = payload.len();
    buf[0] = DATA_PACKET_TAG;
    buf[1] = id.get();
    buf[2] = len as u8;
    buf[3..3 + len].copy_from_slice(payload);
    let [low, high] = crc_bytes(crc16_ccitt(&buf[..3 + len]));
    buf[3 + len] = low;
    buf[4 + len] = high;
    len + DATA_PACKET_OVERHEAD
}

fn verify_crc(kind: PacketKind, frame: &[u8]) -> Result<()> {
    let body = frame.len() - 2;
    let expected = crc16_ccitt(&frame[..body]);
    let actual = u16::from_le_bytes([frame[body], frame[body + 1]]);
    if expected != actual {
        return Err(ExchangeError::IntegrityCheckFailed { kind, expected, actual });
    }
    Ok(())
}
