//! SCS Exchange - Packetized, acknowledged data exchange over RS-232 links
//!
//! This library implements the stop-and-wait protocol spoken between a host
//! and a motion controller over a plain serial line. Command bytes are cut
//! into CRC16-protected Data packets; every accepted packet is answered with
//! an Ack packet; unacknowledged packets are resent until they get through.
//!
//! # Design Principles
//! - Driven by non-blocking polls, no internal threads
//! - Fixed 64-byte packet buffers, one packet in flight per direction
//! - Every failure is recovered locally, counted and traced
//! - Transport and clock are traits, so the same engine runs on a host,
//!   in a simulator or under a tokio task
//!
//! ```
//! use scs_exchange::{DataExchange, ManualClock, MemoryPort};
//!
//! let mut exchange = DataExchange::with_defaults(MemoryPort::new(), ManualClock::new());
//! exchange.submit_outbound(b"HOME\n").unwrap();
//! exchange.poll_n(2);
//! assert_eq!(exchange.transport_mut().take_output().len(), 5 + 5);
//! ```

pub mod ack_manager;
pub mod buffers;
pub mod clock;
pub mod config;
pub mod crc16;
pub mod errors;
pub mod exchange;
pub mod link;
pub mod monitor;
pub mod packet;
pub mod receiver;
pub mod simulator;
pub mod transmitter;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ExchangeConfig, ExchangeConfigBuilder};
pub use errors::{ExchangeError, Result};
pub use exchange::{DataExchange, ExchangeStats};
pub use link::{spawn_link, LinkHandle, LinkOptions};
pub use packet::{AckPacket, DataPacket, Packet, PacketId, PacketKind};
pub use simulator::{SimPort, SimulatedLink, SimulatorConfig};
pub use transport::{IoPort, MemoryPort, Transport};

/// Largest packet on the wire (in bytes)
pub const MAX_PACKET_SIZE: usize = 64;

/// Data packet bytes that are not payload: tag, id, length and two CRC bytes
pub const DATA_PACKET_OVERHEAD: usize = 5;

/// Maximum Data packet payload
pub const MAX_PAYLOAD_SIZE: usize = MAX_PACKET_SIZE - DATA_PACKET_OVERHEAD;

/// Ack packet size
pub const ACK_PACKET_SIZE: usize = 4;

/// Quiet time after which a partial packet is abandoned
pub const INPUT_TIMEOUT_MS: u16 = 50;

/// ACK timeout before a Data packet is resent
pub const RETRANSMIT_TIMEOUT_MS: u16 = 200;

/// Monitor ring buffer size
pub const MONITOR_BUFFER_SIZE: usize = 256;

/// Default capacity of the inbound (reply) buffer
pub const DEFAULT_INBOUND_CAPACITY: usize = 1024;

/// Default cap on queued outbound (command) bytes
pub const DEFAULT_OUTBOUND_LIMIT: usize = 0x1_0000;
