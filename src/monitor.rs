//! Best-effort diagnostic byte channel
//!
//! A fixed-size circular buffer. Writers never block and never grow it:
//! bytes that do not fit are dropped. Each poll offers the buffered bytes to
//! the transport's monitor sink, as one contiguous run or, when the data wraps
//! the end of the buffer, two.
use std::fmt;

use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct MonitorBuffer {
    buf: Box<[u8]>,
    head: usize,
    len: usize,
}

impl MonitorBuffer {
    /// `size` must be non-zero; configuration validation guarantees it.
    pub fn new(size: usize) -> Self {
        Self {
            buf: vec![0u8; size.max(1)].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append as many of `bytes` as fit; returns how many were stored.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let amount = bytes.len().min(self.capacity() - self.len);
        let cap = self.capacity();
        for (offset, &byte) in bytes[..amount].iter().enumerate() {
            self.buf[(self.head + self.len + offset) % cap] = byte;
        }
        self.len += amount;
        amount
    }

    /// Contiguous run starting at the read position.
    fn first_run(&self) -> &[u8] {
        let end = (self.head + self.len).min(self.capacity());
        &self.buf[self.head..end]
    }

    fn advance(&mut self, amount: usize) {
        let amount = amount.min(self.len);
        self.head = (self.head + amount) % self.capacity();
        self.len -= amount;
        if self.len == 0 {
            self.head = 0;
        }
    }

    /// Offer buffered bytes to the transport's monitor sink.
    ///
    /// Makes at most two transport calls (before and after the wrap point)
    /// and returns the total number of bytes consumed.
    pub fn drain_into<T: Transport + ?Sized>(&mut self, transport: &mut T) -> usize {
        let mut total = 0;
        for _ in 0..2 {
            if self.is_empty() {
                break;
            }
            let run = self.first_run();
            let run_len = run.len();
            let taken = transport.write_monitor(run).min(run_len);
            self.advance(taken);
            total += taken;
            if taken < run_len {
                break;
            }
        }
        total
    }

    /// Remove and return up to `max` buffered bytes.
    pub fn take(&mut self, max: usize) -> Vec<u8> {
        let amount = max.min(self.len);
        let mut out = Vec::with_capacity(amount);
        while out.len() < amount {
            let run = self.first_run();
            let n = run.len().min(amount - out.len());
            out.extend_from_slice(&run[..n]);
            self.advance(n);
        }
        out
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

/// Formatting into the monitor never fails; overflow is silently cut.
impl fmt::Write for MonitorBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;

    /// Monitor sink recording each call.
    #[derive(Default)]
    struct Sink {
        calls: Vec<Vec<u8>>,
        room: Option<usize>,
    }

    impl Transport for Sink {
        fn read_byte(&mut self) -> Option<u8> {
            None
        }

        fn write(&mut self, _buf: &[u8]) -> usize {
            0
        }

        fn write_monitor(&mut self, buf: &[u8]) -> usize {
            let n = self.room.map_or(buf.len(), |room| room.min(buf.len()));
            if let Some(room) = self.room.as_mut() {
                *room -= n;
            }
            self.calls.push(buf[..n].to_vec());
            n
        }
    }

    #[test]
    fn test_write_drops_overflow() {
        let mut monitor = MonitorBuffer::new(4);
        assert_eq!(monitor.write(b"abcdef"), 4);
        assert_eq!(monitor.write(b"g"), 0);
        assert_eq!(monitor.take(10), b"abcd");
        assert!(monitor.is_empty());
    }

    #[test]
    fn test_wrapped_drain_uses_two_calls() {
        let mut monitor = MonitorBuffer::new(8);
        monitor.write(b"123456");
        assert_eq!(monitor.take(5), b"12345");
        monitor.write(b"abcdef");
        let mut sink = Sink::default();
        assert_eq!(monitor.drain_into(&mut sink), 7);
        assert_eq!(sink.calls, vec![b"6ab".to_vec(), b"cdef".to_vec()]);
        assert!(monitor.is_empty());
    }

    #[test]
    fn test_partial_drain_keeps_rest() {
        let mut monitor = MonitorBuffer::new(16);
        monitor.write(b"ERROR: x\r\n");
        let mut sink = Sink { room: Some(3), ..Sink::default() };
        assert_eq!(monitor.drain_into(&mut sink), 3);
        assert_eq!(monitor.len(), 7);
        assert_eq!(monitor.take(100), b"OR: x\r\n");
    }

    #[test]
    fn test_formatting() {
        let mut monitor = MonitorBuffer::new(256);
        write!(monitor, "< D {:02X}\r\n", 0x0b).unwrap();
        assert_eq!(monitor.take(256), b"< D 0B\r\n");
    }

    #[test]
    fn test_sink_refusing_everything() {
        let mut monitor = MonitorBuffer::new(8);
        monitor.write(b"abc");
        let mut sink = Sink { room: Some(0), ..Sink::default() };
        assert_eq!(monitor.drain_into(&mut sink), 0);
        assert_eq!(monitor.len(), 3);
    }
}
