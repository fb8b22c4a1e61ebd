//! The polled data exchange engine
//!
//! [`DataExchange`] ties the input stage, the output stage, both application
//! buffers and the monitor channel to one transport and one clock. Each
//! [`DataExchange::poll`] call:
//!
//! 1. reads at most one byte and advances the input stage,
//! 2. advances the output stage by as much as the transport accepts,
//! 3. offers buffered monitor bytes to the transport.
//!
//! Nothing blocks and nothing returns an error: framing, integrity and
//! sequencing failures are counted in [`ExchangeStats`], logged, and traced
//! into the monitor channel.
use std::fmt::{self, Write as _};

use log::{debug, trace, warn};

use crate::buffers::ByteQueue;
use crate::clock::Clock;
use crate::config::ExchangeConfig;
use crate::errors::{ExchangeError, Result};
use crate::monitor::MonitorBuffer;
use crate::packet::{DataPacket, Packet, PacketId};
use crate::receiver::{Admission, InputStage, InputState, SequenceTracker};
use crate::transmitter::{OutputEvent, OutputStage, OutputState};
use crate::transport::Transport;

/// Counters describing the traffic seen by one engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeStats {
    /// CRC-valid Data packets received
    pub data_received: u64,

    /// Data packets whose payload reached the inbound buffer
    pub data_accepted: u64,

    /// Data packets repeating the last accepted ID (re-acknowledged)
    pub duplicates: u64,

    /// Data packets dropped for not continuing the sequence
    pub out_of_order: u64,

    /// Data packets carrying the sentinel ID
    pub illegal_ids: u64,

    /// Data packets left unacknowledged because the inbound buffer was full
    pub backpressure_drops: u64,

    /// CRC-valid Ack packets received
    pub acks_received: u64,

    /// Data packets fully written, retransmissions included
    pub data_sent: u64,

    /// Data packets resent after the retransmit timeout
    pub retransmissions: u64,

    /// Ack packets fully written
    pub acks_sent: u64,

    /// Ack requests dropped because another Ack was already queued
    pub dropped_ack_requests: u64,

    /// Packets rejected by the CRC check
    pub crc_errors: u64,

    /// Malformed frames (bad length, overflow)
    pub framing_errors: u64,

    /// Partial packets abandoned after the input timeout
    pub input_timeouts: u64,
}

/// DataExchange - Packetized stop-and-wait link over a byte transport
///
/// `T` is the byte channel, `C` the millisecond counter. One instance per
/// link; it holds no global state and is not internally synchronized.
pub struct DataExchange<T: Transport, C: Clock> {
    config: ExchangeConfig,
    transport: T,
    clock: C,
    input: InputStage,
    tracker: SequenceTracker,
    output: OutputStage,
    inbound: ByteQueue,
    outbound: ByteQueue,
    monitor: MonitorBuffer,
    stats: ExchangeStats,
}

impl<T: Transport, C: Clock> DataExchange<T, C> {
    /// Create an engine in the Idle/Idle state
    ///
    /// # Arguments
    /// * `transport` - Byte channel to the peer
    /// * `clock` - Millisecond counter used for both timeouts
    /// * `config` - Engine configuration
    ///
    /// # Returns
    /// The engine, or [`ExchangeError::InvalidConfig`] if `config` is rejected
    pub fn new(transport: T, clock: C, config: ExchangeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid(transport, clock, config))
    }

    /// Create an engine with the reference configuration
    pub fn with_defaults(transport: T, clock: C) -> Self {
        Self::from_valid(transport, clock, ExchangeConfig::default())
    }

    fn from_valid(transport: T, clock: C, config: ExchangeConfig) -> Self {
        Self {
            input: InputStage::new(config.input_timeout_ms),
            tracker: SequenceTracker::new(config.accept_peer_restart),
            output: OutputStage::new(config.retransmit_timeout_ms),
            inbound: ByteQueue::with_capacity(config.inbound_capacity),
            outbound: ByteQueue::with_capacity(config.outbound_limit),
            monitor: MonitorBuffer::new(config.monitor_buffer_size),
            stats: ExchangeStats::default(),
            config,
            transport,
            clock,
        }
    }

    /// Run one cooperative step of the engine
    pub fn poll(&mut self) {
        let byte = self.transport.read_byte();
        let now = self.clock.now_ms();

        match self.input.step(byte, now) {
            Ok(Some(Packet::Data(packet))) => self.on_data(packet),
            Ok(Some(Packet::Ack(ack))) => {
                self.stats.acks_received += 1;
                debug!("ACK {} received", ack.id);
                self.trace(format_args!("> A {}\r\n", ack.id));
                self.output.on_ack_received(ack.id);
            }
            Ok(None) => {}
            Err(err) => self.on_input_error(err),
        }

        if let Some(event) = self.output.step(&mut self.transport, &mut self.outbound, now) {
            self.on_output_event(event);
        }

        self.monitor.drain_into(&mut self.transport);
    }

    /// Poll `count` times in a row.
    pub fn poll_n(&mut self, count: usize) {
        for _ in 0..count {
            self.poll();
        }
    }

    fn on_data(&mut self, packet: DataPacket) {
        self.stats.data_received += 1;
        debug!("DATA {} received ({} bytes)", packet.id, packet.payload.len());
        self.trace(format_args!("> D {}\r\n", packet.id));

        match self.tracker.admit(packet.id) {
            Ok(Admission::Duplicate) => {
                self.stats.duplicates += 1;
                debug!("DATA {} is a duplicate, acknowledging again", packet.id);
                self.schedule_ack(packet.id);
            }
            Ok(Admission::Fresh) => match self.inbound.push(&packet.payload) {
                Ok(_) => {
                    self.tracker.commit(packet.id);
                    self.stats.data_accepted += 1;
                    self.schedule_ack(packet.id);
                }
                Err(err) => {
                    self.stats.backpressure_drops += 1;
                    debug!("DATA {} left unacknowledged: {}", packet.id, err);
                    self.trace(format_args!("ERROR: not enough inbound buffer, {}\r\n", packet.id));
                }
            },
            Err(err) => {
                match &err {
                    ExchangeError::IllegalPacketId => self.stats.illegal_ids += 1,
                    _ => self.stats.out_of_order += 1,
                }
                warn!("dropping DATA {}: {}", packet.id, err);
                self.trace(format_args!("ERROR: {}\r\n", err));
            }
        }
    }

    fn on_input_error(&mut self, err: ExchangeError) {
        match &err {
            ExchangeError::IntegrityCheckFailed { .. } => self.stats.crc_errors += 1,
            ExchangeError::InputTimeout { .. } => self.stats.input_timeouts += 1,
            e if e.is_framing() => self.stats.framing_errors += 1,
            _ => {}
        }
        warn!("input stage reset: {}", err);
        self.trace(format_args!("ERROR: {}\r\n", err));
    }

    fn on_output_event(&mut self, event: OutputEvent) {
        match event {
            OutputEvent::DataQueued { id, payload_len } => {
                trace!("DATA {} built from {} outbound bytes", id, payload_len);
            }
            OutputEvent::DataSent(id) => {
                self.stats.data_sent += 1;
                debug!("DATA {} sent", id);
                self.trace(format_args!("< D {}\r\n", id));
            }
            OutputEvent::AckSent(id) => {
                self.stats.acks_sent += 1;
                debug!("ACK {} sent", id);
                self.trace(format_args!("< A {}\r\n", id));
            }
            OutputEvent::Acknowledged(id) => {
                trace!("DATA {} acknowledged by peer", id);
            }
            OutputEvent::Retransmit { id, attempt } => {
                self.stats.retransmissions += 1;
                debug!("DATA {} not acknowledged, resending (attempt {})", id, attempt);
                self.trace(format_args!("ERROR: ACK time out, {}\r\n", id));
            }
        }
    }

    fn schedule_ack(&mut self, id: PacketId) {
        if !self.output.schedule_ack(id) {
            self.stats.dropped_ack_requests += 1;
            debug!("ACK {} dropped, another ACK is pending", id);
        }
    }

    fn trace(&mut self, args: fmt::Arguments<'_>) {
        if self.config.trace {
            let _ = self.monitor.write_fmt(args);
        }
    }

    /// Queue command bytes for transmission
    ///
    /// # Returns
    /// Number of bytes queued (all of them), or
    /// [`ExchangeError::BufferTooSmall`] when the outbound limit would be
    /// exceeded, in which case nothing is queued
    pub fn submit_outbound(&mut self, bytes: &[u8]) -> Result<usize> {
        self.outbound.push(bytes)
    }

    /// Discard command bytes not yet cut into a Data packet.
    pub fn clear_outbound(&mut self) {
        self.outbound.clear();
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    pub fn outbound_available(&self) -> usize {
        self.outbound.available()
    }

    /// Remove and return up to `max` received bytes.
    pub fn take_inbound(&mut self, max: usize) -> Vec<u8> {
        self.inbound.take(max)
    }

    /// Copy received bytes into `buf` without removing them.
    pub fn peek_inbound(&self, buf: &mut [u8]) -> usize {
        self.inbound.peek(buf)
    }

    pub fn consume_inbound(&mut self, amount: usize) {
        self.inbound.consume(amount);
    }

    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    /// Free inbound space; a Data packet with a larger payload is not acknowledged.
    pub fn inbound_available(&self) -> usize {
        self.inbound.available()
    }

    pub fn set_inbound_capacity(&mut self, capacity: usize) {
        self.inbound.set_capacity(capacity);
    }

    /// Append diagnostic bytes to the monitor channel; returns how many fit.
    pub fn write_monitor(&mut self, bytes: &[u8]) -> usize {
        self.monitor.write(bytes)
    }

    /// Remove up to `max` bytes not yet handed to the transport.
    pub fn take_monitor(&mut self, max: usize) -> Vec<u8> {
        self.monitor.take(max)
    }

    pub fn stats(&self) -> &ExchangeStats {
        &self.stats
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn input_state(&self) -> InputState {
        self.input.state()
    }

    pub fn output_state(&self) -> OutputState {
        self.output.state()
    }

    /// ID of the last Data packet accepted from the peer
    pub fn last_accepted_id(&self) -> PacketId {
        self.tracker.last_accepted()
    }

    /// ID of the most recently built outgoing Data packet
    pub fn last_sent_id(&self) -> PacketId {
        self.output.current_id()
    }

    /// True when no Data packet is in flight and no command bytes wait.
    pub fn is_idle(&self) -> bool {
        self.output.state() == OutputState::Idle && self.outbound.is_empty()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn into_parts(self) -> (T, C) {
        (self.transport, self.clock)
    }
}
