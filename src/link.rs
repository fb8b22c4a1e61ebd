//! Async driver that polls an engine from a tokio task
//!
//! The engine itself is synchronous and single-threaded. [`spawn_link`] puts
//! it behind an `Arc<Mutex<_>>` and polls it on a fixed tick; the returned
//! [`LinkHandle`] queues commands, receives replies and gives locked access to
//! the engine for everything else (monitor, statistics).
//!
//! Received bytes travel through a bounded channel. When the channel is full
//! they stay in the engine's inbound buffer, which fills up in turn and makes
//! the engine withhold acknowledgments until the application catches up.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, trace};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::clock::Clock;
use crate::errors::{ExchangeError, Result};
use crate::exchange::DataExchange;
use crate::transport::Transport;

/// Polling cadence of a link task
#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// Time between ticks
    pub poll_interval: Duration,

    /// Engine polls per tick; each poll reads at most one byte
    pub polls_per_tick: usize,

    /// Received batches the channel holds before the task stops draining
    pub channel_capacity: usize,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            polls_per_tick: 64,
            channel_capacity: 16,
        }
    }
}

impl LinkOptions {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_polls_per_tick(mut self, polls: usize) -> Self {
        self.polls_per_tick = polls.max(1);
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

type Shared<T, C> = Arc<Mutex<DataExchange<T, C>>>;

fn lock<T: Transport, C: Clock>(shared: &Shared<T, C>) -> MutexGuard<'_, DataExchange<T, C>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to a running link task
pub struct LinkHandle<T: Transport, C: Clock> {
    shared: Shared<T, C>,
    inbound: mpsc::Receiver<Vec<u8>>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Start polling `exchange` on the current tokio runtime
///
/// # Arguments
/// * `exchange` - Engine to drive; ownership returns through [`LinkHandle::shutdown`]
/// * `options` - Tick interval, polls per tick and channel capacity
///
/// # Panics
/// Panics when called outside a tokio runtime.
pub fn spawn_link<T, C>(exchange: DataExchange<T, C>, options: LinkOptions) -> LinkHandle<T, C>
where
    T: Transport + Send + 'static,
    C: Clock + Send + 'static,
{
    let shared = Arc::new(Mutex::new(exchange));
    let (tx, inbound) = mpsc::channel(options.channel_capacity.max(1));
    let (stop, stopped) = watch::channel(false);
    let task = tokio::spawn(run_link(Arc::clone(&shared), options, tx, stopped));

    LinkHandle {
        shared,
        inbound,
        stop,
        task,
    }
}

async fn run_link<T: Transport, C: Clock>(
    shared: Shared<T, C>,
    options: LinkOptions,
    tx: mpsc::Sender<Vec<u8>>,
    mut stopped: watch::Receiver<bool>,
) {
    let mut ticker = interval(options.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("link task started ({:?} tick)", options.poll_interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stopped.changed() => break,
        }

        let closed = {
            let mut exchange = lock(&shared);
            exchange.poll_n(options.polls_per_tick);
            forward_inbound(&mut exchange, &tx)
        };
        if closed {
            debug!("inbound receiver closed");
            break;
        }
    }
    info!("link task stopped");
}

/// Move received bytes into the channel if it has room; true once it is closed.
fn forward_inbound<T: Transport, C: Clock>(
    exchange: &mut DataExchange<T, C>,
    tx: &mpsc::Sender<Vec<u8>>,
) -> bool {
    let pending = exchange.inbound_len();
    if pending == 0 {
        return tx.is_closed();
    }
    match tx.try_reserve() {
        Ok(permit) => {
            permit.send(exchange.take_inbound(pending));
            false
        }
        Err(TrySendError::Full(())) => {
            trace!("inbound channel full, {} bytes held in the engine", pending);
            false
        }
        Err(TrySendError::Closed(())) => true,
    }
}

impl<T: Transport, C: Clock> LinkHandle<T, C> {
    /// Queue command bytes; all or nothing.
    pub fn send(&self, bytes: &[u8]) -> Result<usize> {
        lock(&self.shared).submit_outbound(bytes)
    }

    /// Wait for the next batch of received bytes.
    ///
    /// Returns `None` once the task has stopped and nothing is left.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        self.inbound.try_recv().ok()
    }

    /// Run `f` with the engine locked.
    pub fn with_exchange<R>(&self, f: impl FnOnce(&mut DataExchange<T, C>) -> R) -> R {
        f(&mut lock(&self.shared))
    }

    /// Stop the task and take the engine back
    ///
    /// # Errors
    /// [`ExchangeError::TaskFailed`] if the task panicked or was cancelled.
    pub async fn shutdown(self) -> Result<DataExchange<T, C>> {
        let _ = self.stop.send(true);
        self.task
            .await
            .map_err(|err| ExchangeError::TaskFailed(err.to_string()))?;

        let mutex = Arc::try_unwrap(self.shared)
            .map_err(|_| ExchangeError::TaskFailed("engine still shared".to_string()))?;
        Ok(mutex.into_inner().unwrap_or_else(PoisonError::into_inner))
    }
}
