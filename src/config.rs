//! Engine configuration
//!
//! Defaults reproduce the reference link: 50 ms input timeout, 200 ms
//! retransmit timeout, 256-byte monitor buffer. [`ExchangeConfigBuilder`]
//! validates values before an engine is built from them.
use crate::errors::{ExchangeError, Result};

/// Largest timeout that keeps the 16-bit counter comparison unambiguous
pub const MAX_TIMEOUT_MS: u16 = 0x7FFF;

/// Validated engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// Quiet time after which a partial packet is abandoned
    pub input_timeout_ms: u16,

    /// Time to wait for an acknowledgment before resending
    pub retransmit_timeout_ms: u16,

    /// Size of the monitor ring buffer in bytes
    pub monitor_buffer_size: usize,

    /// Capacity of the inbound (reply) buffer; full means backpressure
    pub inbound_capacity: usize,

    /// Cap on queued outbound (command) bytes
    pub outbound_limit: usize,

    /// Write the packet trace into the monitor channel
    pub trace: bool,

    /// Accept a Data packet with ID 0 as the start of a new sequence at any
    /// time (the peer rebooted), instead of only the expected successor
    pub accept_peer_restart: bool,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            input_timeout_ms: crate::INPUT_TIMEOUT_MS,
            retransmit_timeout_ms: crate::RETRANSMIT_TIMEOUT_MS,
            monitor_buffer_size: crate::MONITOR_BUFFER_SIZE,
            inbound_capacity: crate::DEFAULT_INBOUND_CAPACITY,
            outbound_limit: crate::DEFAULT_OUTBOUND_LIMIT,
            trace: true,
            accept_peer_restart: false,
        }
    }
}

impl ExchangeConfig {
    pub fn builder() -> ExchangeConfigBuilder {
        ExchangeConfigBuilder::new()
    }

    /// Check every field.
    ///
    /// # Errors
    /// Returns [`ExchangeError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        check_timeout("input_timeout_ms", self.input_timeout_ms)?;
        check_timeout("retransmit_timeout_ms", self.retransmit_timeout_ms)?;
        if self.monitor_buffer_size == 0 {
            return Err(ExchangeError::InvalidConfig(
                "monitor_buffer_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_timeout(name: &str, value: u16) -> Result<()> {
    if value == 0 || value > MAX_TIMEOUT_MS {
        return Err(ExchangeError::InvalidConfig(format!(
            "{} must be within 1..={} ms, got {}",
            name, MAX_TIMEOUT_MS, value
        )));
    }
    Ok(())
}

/// ExchangeConfigBuilder - Fluent construction of [`ExchangeConfig`]
pub struct ExchangeConfigBuilder {
    config: ExchangeConfig,
}

impl ExchangeConfigBuilder {
    /// Create a builder holding the reference defaults
    pub fn new() -> Self {
        Self {
            config: ExchangeConfig::default(),
        }
    }

    pub fn with_input_timeout_ms(mut self, timeout_ms: u16) -> Self {
        self.config.input_timeout_ms = timeout_ms;
        self
    }

    pub fn with_retransmit_timeout_ms(mut self, timeout_ms: u16) -> Self {
        self.config.retransmit_timeout_ms = timeout_ms;
        self
    }

    pub fn with_monitor_buffer_size(mut self, size: usize) -> Self {
        self.config.monitor_buffer_size = size;
        self
    }

    pub fn with_inbound_capacity(mut self, capacity: usize) -> Self {
        self.config.inbound_capacity = capacity;
        self
    }

    pub fn with_outbound_limit(mut self, limit: usize) -> Self {
        self.config.outbound_limit = limit;
        self
    }

    pub fn with_trace(mut self, enable: bool) -> Self {
        self.config.trace = enable;
        self
    }

    pub fn with_peer_restart(mut self, accept: bool) -> Self {
        self.config.accept_peer_restart = accept;
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<ExchangeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ExchangeConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
