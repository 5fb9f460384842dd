//! Error counters and performance metrics.
//!
//! Counters are never decremented individually; the error counters reset
//! as a whole each time a connection opens. `success_rate` is an unbounded
//! running ratio recomputed on every inbound message. The retention window
//! only bounds the connection history.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::state::ConnectionState;

// ============================================================================
// Constants
// ============================================================================

/// Default connection history retention (5 minutes).
pub const DEFAULT_RETENTION: Duration = Duration::from_millis(300_000);

// ============================================================================
// ErrorCategory
// ============================================================================

/// Error counter categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Connect failures and unexpected closes.
    Connection,
    /// Malformed inbound frames and undeliverable outbound messages.
    Message,
    /// Missed heartbeat replies.
    Heartbeat,
    /// Acknowledgments that did not arrive in time.
    Timeout,
}

impl ErrorCategory {
    /// Returns the category name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Message => "message",
            Self::Heartbeat => "heartbeat",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ErrorCounters
// ============================================================================

/// Running error counts per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ErrorCounters {
    /// Connection errors.
    pub connection: u64,
    /// Message errors.
    pub message: u64,
    /// Heartbeat errors.
    pub heartbeat: u64,
    /// Ack timeouts.
    pub timeout: u64,
}

impl ErrorCounters {
    /// Increments one category.
    pub fn record(&mut self, category: ErrorCategory) {
        *self.slot(category) += 1;
    }

    /// Adds `count` to one category.
    pub fn record_many(&mut self, category: ErrorCategory, count: u64) {
        *self.slot(category) += count;
    }

    /// Returns the count for one category.
    #[must_use]
    pub const fn get(&self, category: ErrorCategory) -> u64 {
        match category {
            ErrorCategory::Connection => self.connection,
            ErrorCategory::Message => self.message,
            ErrorCategory::Heartbeat => self.heartbeat,
            ErrorCategory::Timeout => self.timeout,
        }
    }

    /// Sum over all categories.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.connection + self.message + self.heartbeat + self.timeout
    }

    /// Zeroes every category.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn slot(&mut self, category: ErrorCategory) -> &mut u64 {
        match category {
            ErrorCategory::Connection => &mut self.connection,
            ErrorCategory::Message => &mut self.message,
            ErrorCategory::Heartbeat => &mut self.heartbeat,
            ErrorCategory::Timeout => &mut self.timeout,
        }
    }
}

// ============================================================================
// ConnectionEvent
// ============================================================================

/// Kind of connection history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionEventKind {
    /// Socket opened.
    Connected,
    /// Socket lost unexpectedly.
    Lost,
    /// Socket closed intentionally.
    Closed,
    /// Reconnection gave up.
    Exhausted,
}

/// One entry of the connection history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEvent {
    /// Wall-clock time in milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// What happened.
    pub event: ConnectionEventKind,
    /// Connect duration for `connected`, connection lifetime otherwise.
    pub duration_ms: Option<u64>,
}

// ============================================================================
// Metrics
// ============================================================================

/// Process-wide transport metrics.
#[derive(Debug)]
pub struct Metrics {
    errors: ErrorCounters,
    total_messages: u64,
    sent: u64,
    received: u64,
    acknowledged: u64,
    average_latency_ms: f64,
    success_rate: f64,
    connection_time: Option<Duration>,
    history: VecDeque<ConnectionEvent>,
    retention: Duration,
}

impl Metrics {
    /// Creates empty metrics with the given history retention.
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            errors: ErrorCounters::default(),
            total_messages: 0,
            sent: 0,
            received: 0,
            acknowledged: 0,
            average_latency_ms: 0.0,
            success_rate: 100.0,
            connection_time: None,
            history: VecDeque::new(),
            retention,
        }
    }

    /// Increments an error counter.
    #[inline]
    pub fn record_error(&mut self, category: ErrorCategory) {
        self.errors.record(category);
    }

    /// Adds to an error counter.
    #[inline]
    pub fn record_errors(&mut self, category: ErrorCategory, count: u64) {
        self.errors.record_many(category, count);
    }

    /// Zeroes the error counters.
    #[inline]
    pub fn reset_errors(&mut self) {
        self.errors.reset();
    }

    /// Returns the error counters.
    #[inline]
    #[must_use]
    pub const fn errors(&self) -> &ErrorCounters {
        &self.errors
    }

    /// Counts a written message.
    pub fn record_sent(&mut self) {
        self.sent += 1;
        self.total_messages += 1;
    }

    /// Counts an inbound message and recomputes the success rate.
    pub fn record_received(&mut self) {
        self.received += 1;
        self.total_messages += 1;
        self.recompute_success_rate();
    }

    /// Folds an acknowledgment latency into the running average.
    pub fn record_ack(&mut self, latency: Duration) {
        self.acknowledged += 1;
        let sample = latency.as_secs_f64() * 1000.0;
        self.average_latency_ms += (sample - self.average_latency_ms) / self.acknowledged as f64;
    }

    /// Records how long the latest connect took.
    #[inline]
    pub fn set_connection_time(&mut self, elapsed: Duration) {
        self.connection_time = Some(elapsed);
    }

    /// Appends a connection history entry and prunes entries older than
    /// the retention window.
    pub fn record_connection(
        &mut self,
        event: ConnectionEventKind,
        duration: Option<Duration>,
        now_ms: u64,
    ) {
        self.history.push_back(ConnectionEvent {
            timestamp: now_ms,
            event,
            duration_ms: duration.map(duration_ms),
        });
        self.prune_history(now_ms);
    }

    /// Current success rate in percent.
    #[inline]
    #[must_use]
    pub const fn success_rate(&self) -> f64 {
        self.success_rate
    }

    /// Running mean acknowledgment latency in milliseconds.
    #[inline]
    #[must_use]
    pub const fn average_latency_ms(&self) -> f64 {
        self.average_latency_ms
    }

    /// Builds a read-only snapshot.
    #[must_use]
    pub fn snapshot(&self, transport: TransportSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            state: transport.state,
            total_messages: self.total_messages,
            sent: self.sent,
            received: self.received,
            acknowledged: self.acknowledged,
            average_latency_ms: self.average_latency_ms,
            success_rate: self.success_rate,
            connection_time_ms: self.connection_time.map(duration_ms),
            errors: self.errors,
            queued: transport.queued,
            pending: transport.pending,
            reconnect_attempts: transport.reconnect_attempts,
            last_error: transport.last_error,
            connection_history: self.history.iter().cloned().collect(),
        }
    }

    fn recompute_success_rate(&mut self) {
        if self.total_messages == 0 {
            self.success_rate = 100.0;
            return;
        }
        let ok = self.total_messages.saturating_sub(self.errors.total());
        self.success_rate = ok as f64 / self.total_messages as f64 * 100.0;
    }

    fn prune_history(&mut self, now_ms: u64) {
        let retention_ms = duration_ms(self.retention);
        while let Some(oldest) = self.history.front() {
            if now_ms.saturating_sub(oldest.timestamp) <= retention_ms {
                break;
            }
            self.history.pop_front();
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

#[inline]
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Snapshots
// ============================================================================

/// Transport-side values folded into a [`MetricsSnapshot`].
#[derive(Debug, Clone, Default)]
pub struct TransportSnapshot {
    /// Connection state.
    pub state: ConnectionState,
    /// Outbound queue length.
    pub queued: usize,
    /// Pending table size.
    pub pending: usize,
    /// Reconnect attempts since the last successful connect.
    pub reconnect_attempts: u32,
    /// Most recent connection-level error.
    pub last_error: Option<String>,
}

/// Read-only view of transport health for the application.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Connection state.
    pub state: ConnectionState,
    /// Messages sent plus messages received.
    pub total_messages: u64,
    /// Messages written to the socket.
    pub sent: u64,
    /// Inbound messages, heartbeat replies excluded.
    pub received: u64,
    /// Acknowledgments matched to pending messages.
    pub acknowledged: u64,
    /// Running mean acknowledgment latency.
    pub average_latency_ms: f64,
    /// `(total - errors) / total * 100`, recomputed per inbound message.
    pub success_rate: f64,
    /// Duration of the latest successful connect.
    pub connection_time_ms: Option<u64>,
    /// Error counts since the latest connect.
    pub errors: ErrorCounters,
    /// Outbound queue length.
    pub queued: usize,
    /// Pending table size.
    pub pending: usize,
    /// Reconnect attempts since the last successful connect.
    pub reconnect_attempts: u32,
    /// Most recent connection-level error.
    pub last_error: Option<String>,
    /// Connection events inside the retention window, oldest first.
    pub connection_history: Vec<ConnectionEvent>,
}

// ============================================================================
// Tests
// ============================================================================
