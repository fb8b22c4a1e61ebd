//! Lossy serial link simulator for deterministic testing
//!
//! [`SimulatedLink::pair`] returns two connected [`SimPort`] transports. Every
//! `write` call on one port is one chunk handed to the line; before it reaches
//! the other port the chunk passes a fault model:
//!
//! | Fault            | Description                                          |
//! |------------------|------------------------------------------------------|
//! | Scripted drop    | Drop the n-th write call of a direction.             |
//! | Loss             | Drop a chunk with probability `loss_rate`.           |
//! | Corruption       | Flip one random bit with probability `corrupt_rate`. |
//! | Slow line        | Accept at most `write_capacity` bytes per call.      |
//!
//! Randomness comes from a seeded [`StdRng`], so a failing run replays
//! exactly. The ports are `Send` and can be moved into separate tasks.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::transport::Transport;

/// Fault model of a [`SimulatedLink`]
///
/// Probabilities are clamped to `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that a written chunk never arrives
    pub loss_rate: f64,

    /// Probability that a delivered chunk has one bit flipped
    pub corrupt_rate: f64,

    /// Bytes accepted per `write` call (`None` = everything)
    pub write_capacity: Option<usize>,

    /// Zero-based write-call indices of side A to drop
    pub drop_writes_a_to_b: Vec<usize>,

    /// Zero-based write-call indices of side B to drop
    pub drop_writes_b_to_a: Vec<usize>,

    /// RNG seed
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            write_capacity: None,
            drop_writes_a_to_b: Vec::new(),
            drop_writes_b_to_a: Vec::new(),
            seed: 0x5C5_1234,
        }
    }
}

impl SimulatorConfig {
    pub fn lossless() -> Self {
        Self::default()
    }

    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate;
        self
    }

    pub fn with_corrupt_rate(mut self, rate: f64) -> Self {
        self.corrupt_rate = rate;
        self
    }

    pub fn with_write_capacity(mut self, capacity: usize) -> Self {
        self.write_capacity = Some(capacity);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn drop_a_to_b(mut self, write_index: usize) -> Self {
        self.drop_writes_a_to_b.push(write_index);
        self
    }

    pub fn drop_b_to_a(mut self, write_index: usize) -> Self {
        self.drop_writes_b_to_a.push(write_index);
        self
    }
}

type Line = Arc<Mutex<VecDeque<u8>>>;

/// Constructor for pairs of connected ports
pub struct SimulatedLink;

impl SimulatedLink {
    /// Create two ports joined by a simulated line.
    pub fn pair(config: SimulatorConfig) -> (SimPort, SimPort) {
        let a_to_b: Line = Arc::default();
        let b_to_a: Line = Arc::default();

        let a = SimPort::new(
            "A",
            Arc::clone(&a_to_b),
            Arc::clone(&b_to_a),
            &config,
            config.drop_writes_a_to_b.clone(),
            config.seed,
        );
        let b = SimPort::new(
            "B",
            b_to_a,
            a_to_b,
            &config,
            config.drop_writes_b_to_a.clone(),
            config.seed.rotate_left(32) ^ 0x9E37_79B9,
        );
        (a, b)
    }
}

/// One end of a simulated line
pub struct SimPort {
    name: &'static str,
    tx: Line,
    rx: Line,
    rng: StdRng,
    loss_rate: f64,
    corrupt_rate: f64,
    write_capacity: Option<usize>,
    scripted_drops: Vec<usize>,
    write_calls: usize,
    chunks: Vec<Vec<u8>>,
    dropped: usize,
    monitor: Vec<u8>,
}

impl SimPort {
    fn new(
        name: &'static str,
        tx: Line,
        rx: Line,
        config: &SimulatorConfig,
        scripted_drops: Vec<usize>,
        seed: u64,
    ) -> Self {
        Self {
            name,
            tx,
            rx,
            rng: StdRng::seed_from_u64(seed),
            loss_rate: config.loss_rate.clamp(0.0, 1.0),
            corrupt_rate: config.corrupt_rate.clamp(0.0, 1.0),
            write_capacity: config.write_capacity,
            scripted_drops,
            write_calls: 0,
            chunks: Vec::new(),
            dropped: 0,
            monitor: Vec::new(),
        }
    }

    /// Every chunk this port wrote, including the ones the line dropped
    pub fn sent_chunks(&self) -> &[Vec<u8>] {
        &self.chunks
    }

    /// All bytes this port wrote, concatenated
    pub fn sent_bytes(&self) -> Vec<u8> {
        self.chunks.concat()
    }

    /// Number of chunks the line dropped
    pub fn dropped_chunks(&self) -> usize {
        self.dropped
    }

    /// Bytes delivered to this port and not read yet
    pub fn pending_rx(&self) -> usize {
        lock(&self.rx).len()
    }

    /// Put bytes straight onto this port's receive side, bypassing faults.
    pub fn inject(&self, bytes: &[u8]) {
        lock(&self.rx).extend(bytes);
    }

    /// Monitor bytes written by the engine using this port
    pub fn take_monitor(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.monitor)
    }

    fn should_drop(&mut self, index: usize) -> bool {
        if self.scripted_drops.contains(&index) {
            return true;
        }
        self.loss_rate > 0.0 && self.rng.gen_bool(self.loss_rate)
    }
}

fn lock(line: &Line) -> std::sync::MutexGuard<'_, VecDeque<u8>> {
    line.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Transport for SimPort {
    fn read_byte(&mut self) -> Option<u8> {
        lock(&self.rx).pop_front()
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        let amount = self.write_capacity.map_or(buf.len(), |cap| cap.min(buf.len()));
        if amount == 0 {
            return 0;
        }
        let mut chunk = buf[..amount].to_vec();
        let index = self.write_calls;
        self.write_calls += 1;
        self.chunks.push(chunk.clone());

        if self.should_drop(index) {
            self.dropped += 1;
            trace!("{}: write #{} ({} bytes) lost", self.name, index, amount);
            return amount;
        }
        if self.corrupt_rate > 0.0 && self.rng.gen_bool(self.corrupt_rate) {
            let bit = self.rng.gen_range(0..chunk.len() * 8);
            chunk[bit / 8] ^= 1 << (bit % 8);
            trace!("{}: write #{} corrupted at bit {}", self.name, index, bit);
        }
        lock(&self.tx).extend(chunk);
        amount
    }

    fn write_monitor(&mut self, buf: &[u8]) -> usize {
        self.monitor.extend_from_slice(buf);
        buf.len()
    }
}
