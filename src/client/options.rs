//! Client configuration.
//!
//! Every field has a default, so a host application can embed
//! [`ClientOptions`] in its own configuration file and override only what
//! it needs:
//!
//! ```ignore
//! use resilient_ws::ClientOptions;
//!
//! let options = ClientOptions::new()
//!     .with_max_queue_depth(50)
//!     .with_heartbeat(15_000, 5_000)
//!     .with_rate_limit(20, 40);
//! options.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::MAX_MESSAGE_BYTES;
use crate::transport::backoff::{
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_MAX_RECONNECT_DELAY, DEFAULT_RECONNECT_DELAY,
    ReconnectPolicy,
};
use crate::transport::metrics::DEFAULT_RETENTION;
use crate::transport::queue::DEFAULT_QUEUE_CAPACITY;

// ============================================================================
// Constants
// ============================================================================

/// Default bound on a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30_000;

/// Default heartbeat period.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Default pong deadline.
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 10_000;

/// Default age at which an unacknowledged message counts as timed out.
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 30_000;

/// Default period of the pending-table sweep.
pub const DEFAULT_ACK_SWEEP_INTERVAL_MS: u64 = 1_000;

// ============================================================================
// RateLimitOptions
// ============================================================================

/// Outbound send limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitOptions {
    /// Sustained sends per second.
    pub max_per_second: u32,
    /// Sends allowed in a burst.
    pub burst: u32,
}

// ============================================================================
// ClientOptions
// ============================================================================

/// Transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Outbound queue capacity.
    pub max_queue_depth: usize,

    /// Serialized message size cap in bytes.
    pub max_message_bytes: usize,

    /// Reconnect attempts before the connection is declared exhausted.
    pub max_reconnect_attempts: u32,

    /// Delay before the first reconnect attempt.
    pub reconnect_delay_ms: u64,

    /// Reconnect delay cap.
    pub max_reconnect_delay_ms: u64,

    /// Bound on a single connect attempt.
    pub connect_timeout_ms: u64,

    /// Ping period while connected. `0` disables the heartbeat.
    pub heartbeat_interval_ms: u64,

    /// Pong deadline. Also bounds the close handshake.
    pub heartbeat_timeout_ms: u64,

    /// Age at which an unacknowledged message counts as timed out.
    pub ack_timeout_ms: u64,

    /// Period of the pending-table sweep.
    pub ack_sweep_interval_ms: u64,

    /// Connection history retention window.
    pub metrics_retention_ms: u64,

    /// Optional outbound send limit.
    pub rate_limit: Option<RateLimitOptions>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_queue_depth: DEFAULT_QUEUE_CAPACITY,
            max_message_bytes: MAX_MESSAGE_BYTES,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay_ms: millis(DEFAULT_RECONNECT_DELAY),
            max_reconnect_delay_ms: millis(DEFAULT_MAX_RECONNECT_DELAY),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            heartbeat_timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
            ack_sweep_interval_ms: DEFAULT_ACK_SWEEP_INTERVAL_MS,
            metrics_retention_ms: millis(DEFAULT_RETENTION),
            rate_limit: None,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the outbound queue capacity.
    #[inline]
    #[must_use]
    pub fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = depth;
        self
    }

    /// Sets the serialized message size cap.
    #[inline]
    #[must_use]
    pub fn with_max_message_bytes(mut self, bytes: usize) -> Self {
        self.max_message_bytes = bytes;
        self
    }

    /// Sets the reconnect schedule.
    #[inline]
    #[must_use]
    pub fn with_reconnect(mut self, delay_ms: u64, max_delay_ms: u64, max_attempts: u32) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self.max_reconnect_delay_ms = max_delay_ms;
        self.max_reconnect_attempts = max_attempts;
        self
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    /// Sets the heartbeat period and pong deadline.
    #[inline]
    #[must_use]
    pub fn with_heartbeat(mut self, interval_ms: u64, timeout_ms: u64) -> Self {
        self.heartbeat_interval_ms = interval_ms;
        self.heartbeat_timeout_ms = timeout_ms;
        self
    }

    /// Disables the heartbeat.
    #[inline]
    #[must_use]
    pub fn without_heartbeat(mut self) -> Self {
        self.heartbeat_interval_ms = 0;
        self
    }

    /// Sets the acknowledgment timeout.
    #[inline]
    #[must_use]
    pub fn with_ack_timeout(mut self, timeout_ms: u64) -> Self {
        self.ack_timeout_ms = timeout_ms;
        self
    }

    /// Sets the connection history retention window.
    #[inline]
    #[must_use]
    pub fn with_metrics_retention(mut self, retention_ms: u64) -> Self {
        self.metrics_retention_ms = retention_ms;
        self
    }

    /// Enables the outbound send limit.
    #[inline]
    #[must_use]
    pub fn with_rate_limit(mut self, max_per_second: u32, burst: u32) -> Self {
        self.rate_limit = Some(RateLimitOptions {
            max_per_second,
            burst,
        });
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl ClientOptions {
    /// Returns the reconnect schedule.
    #[must_use]
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.reconnect_delay_ms),
            Duration::from_millis(self.max_reconnect_delay_ms),
            self.max_reconnect_attempts,
        )
    }

    /// Returns the connect timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns the heartbeat period, or `None` when disabled.
    #[inline]
    #[must_use]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }

    /// Returns the pong deadline.
    #[inline]
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Returns the acknowledgment timeout.
    #[inline]
    #[must_use]
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Returns the pending-table sweep period.
    #[inline]
    #[must_use]
    pub fn ack_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.ack_sweep_interval_ms)
    }

    /// Returns the connection history retention window.
    #[inline]
    #[must_use]
    pub fn metrics_retention(&self) -> Duration {
        Duration::from_millis(self.metrics_retention_ms)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientOptions {
    /// Checks option consistency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.max_queue_depth == 0 {
            return Err(Error::config("max_queue_depth must be at least 1"));
        }
        if self.max_message_bytes == 0 {
            return Err(Error::config("max_message_bytes must be at least 1"));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(Error::config("reconnect_delay_ms must be greater than 0"));
        }
        if self.max_reconnect_delay_ms < self.reconnect_delay_ms {
            return Err(Error::config(format!(
                "max_reconnect_delay_ms ({}) must not be below reconnect_delay_ms ({})",
                self.max_reconnect_delay_ms, self.reconnect_delay_ms
            )));
        }
        if self.connect_timeout_ms == 0 {
            return Err(Error::config("connect_timeout_ms must be greater than 0"));
        }
        if self.heartbeat_timeout_ms == 0 {
            return Err(Error::config("heartbeat_timeout_ms must be greater than 0"));
        }
        if self.heartbeat_interval_ms > 0 && self.heartbeat_timeout_ms >= self.heartbeat_interval_ms
        {
            return Err(Error::config(format!(
                "heartbeat_timeout_ms ({}) must be below heartbeat_interval_ms ({})",
                self.heartbeat_timeout_ms, self.heartbeat_interval_ms
            )));
        }
        if self.ack_timeout_ms == 0 || self.ack_sweep_interval_ms == 0 {
            return Err(Error::config(
                "ack_timeout_ms and ack_sweep_interval_ms must be greater than 0",
            ));
        }
        if let Some(limit) = self.rate_limit
            && (limit.max_per_second == 0 || limit.burst == 0)
        {
            return Err(Error::config(
                "rate_limit needs max_per_second and burst of at least 1",
            ));
        }
        Ok(())
    }
}

#[inline]
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================
