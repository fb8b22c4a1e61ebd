//! Bounded FIFO byte buffers at the application boundary
//!
//! The engine keeps two of them: outbound command bytes waiting to be cut
//! into Data packets, and inbound reply bytes reassembled from accepted Data
//! packets. Capacity is a soft limit the engine consults; it never truncates.
use std::collections::VecDeque;

use crate::errors::{ExchangeError, Result};

#[derive(Debug, Clone)]
pub struct ByteQueue {
    data: VecDeque<u8>,
    capacity: usize,
}

impl ByteQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: VecDeque::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the capacity. Bytes already queued beyond the new limit stay.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    /// Free space left under the capacity
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.data.len())
    }

    /// Append all of `bytes` or nothing.
    ///
    /// # Errors
    /// Returns [`ExchangeError::BufferTooSmall`] if `bytes` does not fit in the
    /// remaining capacity.
    pub fn push(&mut self, bytes: &[u8]) -> Result<usize> {
        let available = self.available();
        if bytes.len() > available {
            return Err(ExchangeError::BufferTooSmall {
                required: bytes.len(),
                available,
            });
        }
        self.data.extend(bytes);
        Ok(bytes.len())
    }

    /// Copy up to `buf.len()` bytes from the front without removing them.
    pub fn peek(&self, buf: &mut [u8]) -> usize {
        let amount = buf.len().min(self.data.len());
        for (slot, byte) in buf.iter_mut().zip(self.data.iter()).take(amount) {
            *slot = *byte;
        }
        amount
    }

    /// Drop up to `amount` bytes from the front.
    pub fn consume(&mut self, amount: usize) {
        let amount = amount.min(self.data.len());
        self.data.drain(..amount);
    }

    /// Remove and return up to `max` bytes from the front.
    pub fn take(&mut self, max: usize) -> Vec<u8> {
        let amount = max.min(self.data.len());
        self.data.drain(..amount).collect()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_is_all_or_nothing() {
        let mut queue = ByteQueue::with_capacity(4);
        assert_eq!(queue.push(b"abc"), Ok(3));
        assert_eq!(
            queue.push(b"de"),
            Err(ExchangeError::BufferTooSmall { required: 2, available: 1 })
        );
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.push(b"d"), Ok(1));
        assert_eq!(queue.available(), 0);
    }

    #[test]
    fn test_peek_then_consume() {
        let mut queue = ByteQueue::with_capacity(16);
        queue.push(b"reply\r\n").unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(queue.peek(&mut buf), 5);
        assert_eq!(&buf, b"reply");
        assert_eq!(queue.len(), 7);
        queue.consume(5);
        assert_eq!(queue.take(10), b"\r\n");
        queue.consume(3);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_shrinking_capacity_keeps_bytes() {
        let mut queue = ByteQueue::with_capacity(8);
        queue.push(b"12345").unwrap();
        queue.set_capacity(0);
        assert_eq!(queue.len(), 5);
        assert_eq!(queue.available(), 0);
        assert_eq!(queue.take(2), b"12");
    }
}
