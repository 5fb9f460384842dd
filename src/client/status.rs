//! Connection status notifications.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

// ============================================================================
// Types
// ============================================================================

/// Callback invoked with every status change and the current health.
pub type StatusCallback = Arc<dyn Fn(&Status, bool) + Send + Sync>;

/// Status reported to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// A connect attempt started.
    Connecting,
    /// The connection opened.
    Connected,
    /// The open connection failed.
    ConnectionLost {
        /// Close reason or transport error.
        reason: String,
    },
    /// A reconnect attempt is scheduled.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
        /// Attempts allowed.
        max_attempts: u32,
        /// Delay before the attempt.
        delay_ms: u64,
    },
    /// Intentional close in progress.
    Closing,
    /// Intentionally closed.
    Disconnected,
    /// A send was rejected because the outbound queue is full.
    QueueFull {
        /// Queue capacity.
        capacity: usize,
    },
    /// Reconnection gave up. Terminal until an explicit connect.
    ConnectionExhausted {
        /// Attempts made.
        attempts: u32,
    },
    /// The client was torn down.
    Destroyed,
}

impl Status {
    /// Returns `true` for statuses that need outside intervention.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ConnectionExhausted { .. } | Self::Destroyed)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("Connecting..."),
            Self::Connected => f.write_str("Connected"),
            Self::ConnectionLost { reason } => write!(f, "Connection lost: {reason}"),
            Self::Reconnecting {
                attempt,
                max_attempts,
                delay_ms,
            } => write!(
                f,
                "Reconnecting in {delay_ms}ms (attempt {attempt}/{max_attempts})"
            ),
            Self::Closing => f.write_str("Closing"),
            Self::Disconnected => f.write_str("Disconnected"),
            Self::QueueFull { capacity } => {
                write!(f, "Message queue full ({capacity}), try again later")
            }
            Self::ConnectionExhausted { attempts } => {
                write!(f, "Connection failed after {attempts} attempts")
            }
            Self::Destroyed => f.write_str("Destroyed"),
        }
    }
}

// ============================================================================
// StatusNotifier
// ============================================================================

/// Holds the registered status callback.
#[derive(Default)]
pub(crate) struct StatusNotifier {
    callback: Mutex<Option<StatusCallback>>,
}

impl StatusNotifier {
    /// Replaces the callback.
    pub(crate) fn set(&self, callback: StatusCallback) {
        *self.callback.lock() = Some(callback);
    }

    /// Removes the callback.
    pub(crate) fn clear(&self) {
        *self.callback.lock() = None;
    }

    /// Invokes the callback, if any, outside the lock.
    pub(crate) fn notify(&self, status: &Status, healthy: bool) {
        let callback = self.callback.lock().clone();
        if let Some(callback) = callback {
            callback(status, healthy);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
