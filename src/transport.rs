//! Byte-stream transport the engine reads from and writes to
//!
//! The engine never blocks: every method here must return immediately.
//! `read_byte` yields `None` when nothing is pending, and the write methods
//! report how many bytes they took, 0 meaning "try again on a later poll".
//!
//! Two implementations live here. [`MemoryPort`] is the buffered host side
//! used when the serial line itself is serviced by another task: received
//! bytes are pushed in, bytes to transmit are peeked and consumed.
//! [`IoPort`] adapts any non-blocking `Read + Write` stream.
use std::collections::VecDeque;
use std::io::{self, Read, Write};

use log::warn;

use crate::errors::ExchangeError;

/// Non-blocking byte transport
pub trait Transport {
    /// Next received byte, if one is available
    fn read_byte(&mut self) -> Option<u8>;

    /// Offer `buf` for transmission, returning how many leading bytes were taken
    fn write(&mut self, buf: &[u8]) -> usize;

    /// Offer monitor bytes. Transports without a monitor sink take nothing,
    /// leaving the bytes in the engine for `take_monitor`.
    fn write_monitor(&mut self, _buf: &[u8]) -> usize {
        0
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read_byte(&mut self) -> Option<u8> {
        (**self).read_byte()
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        (**self).write(buf)
    }

    fn write_monitor(&mut self, buf: &[u8]) -> usize {
        (**self).write_monitor(buf)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_byte(&mut self) -> Option<u8> {
        (**self).read_byte()
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        (**self).write(buf)
    }

    fn write_monitor(&mut self, buf: &[u8]) -> usize {
        (**self).write_monitor(buf)
    }
}

/// Cap on buffered monitor bytes in a [`MemoryPort`]
pub const MEMORY_PORT_MONITOR_LIMIT: usize = 0xFFFF;

/// In-memory transport for a host that services the serial line elsewhere
#[derive(Debug, Clone, Default)]
pub struct MemoryPort {
    incoming: VecDeque<u8>,
    outgoing: VecDeque<u8>,
    monitor: VecDeque<u8>,
    write_capacity: Option<usize>,
}

impl MemoryPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit how many bytes a single `write` call accepts, modelling a slow line.
    pub fn with_write_capacity(mut self, capacity: usize) -> Self {
        self.write_capacity = Some(capacity);
        self
    }

    /// Queue bytes read off the line for the engine to consume.
    pub fn push_received(&mut self, bytes: &[u8]) {
        self.incoming.extend(bytes);
    }

    pub fn pending_received(&self) -> usize {
        self.incoming.len()
    }

    /// Copy bytes waiting to go onto the line without removing them.
    pub fn peek_output(&self, buf: &mut [u8]) -> usize {
        let amount = buf.len().min(self.outgoing.len());
        for (slot, byte) in buf.iter_mut().zip(self.outgoing.iter()).take(amount) {
            *slot = *byte;
        }
        amount
    }

    /// Drop `amount` bytes that have been written to the line.
    pub fn consume_output(&mut self, amount: usize) {
        let amount = amount.min(self.outgoing.len());
        self.outgoing.drain(..amount);
    }

    /// Remove and return everything waiting to go onto the line.
    pub fn take_output(&mut self) -> Vec<u8> {
        self.outgoing.drain(..).collect()
    }

    pub fn pending_output(&self) -> usize {
        self.outgoing.len()
    }

    /// Remove and return up to `max` monitor bytes.
    pub fn take_monitor(&mut self, max: usize) -> Vec<u8> {
        let amount = max.min(self.monitor.len());
        self.monitor.drain(..amount).collect()
    }
}

impl Transport for MemoryPort {
    fn read_byte(&mut self) -> Option<u8> {
        self.incoming.pop_front()
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        let amount = self.write_capacity.map_or(buf.len(), |cap| cap.min(buf.len()));
        self.outgoing.extend(&buf[..amount]);
        amount
    }

    fn write_monitor(&mut self, buf: &[u8]) -> usize {
        if self.monitor.len() > MEMORY_PORT_MONITOR_LIMIT {
            return 0;
        }
        self.monitor.extend(buf);
        buf.len()
    }
}

/// Transport over a non-blocking `Read + Write` stream
///
/// The stream must already be in non-blocking mode (e.g.
/// `TcpStream::set_nonblocking(true)` or a serial device opened with
/// `O_NONBLOCK`). I/O errors other than `WouldBlock` and `Interrupted` are
/// logged and kept in [`IoPort::last_error`]; the engine sees them as
/// "nothing available".
#[derive(Debug)]
pub struct IoPort<S> {
    stream: S,
    last_error: Option<ExchangeError>,
}

impl<S: Read + Write> IoPort<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            last_error: None,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Take the most recent I/O failure, if any.
    pub fn last_error(&mut self) -> Option<ExchangeError> {
        self.last_error.take()
    }

    fn record(&mut self, op: &str, err: io::Error) {
        warn!("transport {} failed: {}", op, err);
        self.last_error = Some(err.into());
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted)
}

impl<S: Read + Write> Transport for IoPort<S> {
    fn read_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.stream.read(&mut byte) {
            Ok(1) => Some(byte[0]),
            Ok(_) => None,
            Err(e) if is_transient(&e) => None,
            Err(e) => {
                self.record("read", e);
                None
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        match self.stream.write(buf) {
            Ok(n) => n,
            Err(e) if is_transient(&e) => 0,
            Err(e) => {
                self.record("write", e);
                0
            }
        }
    }
}
