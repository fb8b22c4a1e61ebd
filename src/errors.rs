//! Error types for the data exchange engine
//!
//! Nothing inside the engine is fatal: framing, integrity and sequencing
//! failures are recovered locally and only surface through logging, the
//! monitor trace and [`crate::ExchangeStats`]. The variants below are what
//! the individual stages report to the engine, plus the failures the outer
//! API (configuration, I/O adapters, the async link driver) can return.
use std::fmt;
use std::io;

use crate::packet::PacketKind;

/// Result type alias for exchange operations
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Exchange error enumeration
///
/// Covers every failure mode of the packet pipeline:
/// - Framing violations detected while reassembling bytes
/// - CRC mismatches
/// - Sequence violations on received Data packets
/// - Capacity limits of the application buffers
/// - Configuration and I/O failures of the surrounding plumbing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// I/O error reported by a transport adapter
    IoError(String),

    /// Declared Data packet payload length exceeds the maximum payload
    IllegalLength { length: u8, max: usize },

    /// More bytes accumulated than the largest legal packet
    PacketOverflow { received: usize },

    /// Input stage held a packet whose leading byte is not a known tag
    UnexpectedTag(u8),

    /// A complete frame has the wrong size for its type
    InvalidPacketLength { expected: usize, received: usize },

    /// CRC16 mismatch on a received packet
    IntegrityCheckFailed { kind: PacketKind, expected: u16, actual: u16 },

    /// Partial packet abandoned because the line went quiet
    InputTimeout { elapsed_ms: u16 },

    /// Data packet carries the reserved sentinel ID
    IllegalPacketId,

    /// Data packet ID does not continue the accepted sequence
    OutOfOrder { received: u8, expected: u8 },

    /// Application buffer cannot take the bytes
    BufferTooSmall { required: usize, available: usize },

    /// Payload does not fit into one Data packet
    PayloadTooLarge { length: usize, max: usize },

    /// Rejected configuration value
    InvalidConfig(String),

    /// Background driver task ended abnormally
    TaskFailed(String),
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError(msg) => write!(f, "I/O error: {}", msg),
            Self::IllegalLength { length, max } => {
                write!(f, "illegal data packet length {:#04x} (max {})", length, max)
            }
            Self::PacketOverflow { received } => {
                write!(f, "packet overflow after {} bytes", received)
            }
            Self::UnexpectedTag(tag) => write!(f, "unexpected packet tag {:#04x}", tag),
            Self::InvalidPacketLength { expected, received } => {
                write!(f, "invalid packet length: expected {}, received {}", expected, received)
            }
            Self::IntegrityCheckFailed { kind, expected, actual } => write!(
                f,
                "corrupted {} packet: expected CRC16 {:#06x}, got {:#06x}",
                kind, expected, actual
            ),
            Self::InputTimeout { elapsed_ms } => {
                write!(f, "input stage timed out after {} ms", elapsed_ms)
            }
            Self::IllegalPacketId => write!(f, "invalid DATA packet id"),
            Self::OutOfOrder { received, expected } => write!(
                f,
                "unexpected packet id {:02X}, expected {:02X}",
                received, expected
            ),
            Self::BufferTooSmall { required, available } => {
                write!(f, "buffer too small: required {}, available {}", required, available)
            }
            Self::PayloadTooLarge { length, max } => {
                write!(f, "payload of {} bytes exceeds packet maximum {}", length, max)
            }
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            Self::TaskFailed(msg) => write!(f, "link task failed: {}", msg),
        }
    }
}

impl std::error::Error for ExchangeError {}

/// Convert from io::Error to ExchangeError
impl From<io::Error> for ExchangeError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl ExchangeError {
    /// Whether the error was raised while reassembling a frame
    /// (as opposed to integrity or sequencing).
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Self::IllegalLength { .. }
                | Self::PacketOverflow { .. }
                | Self::UnexpectedTag(_)
                | Self::InvalidPacketLength { .. }
        )
    }
}
