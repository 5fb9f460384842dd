//! Transport building blocks.
//!
//! Everything the worker owns to keep one unreliable socket usable:
//!
//! ```text
//!   send() ──► OutboundQueue ──drain──► SocketSink ──► remote
//!                                  │
//!                                  └──► PendingTable ◄── ack ── remote
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `socket` | `Connector` trait and the tungstenite implementation |
//! | `queue` | Bounded FIFO of messages awaiting a healthy connection |
//! | `pending` | Sent messages awaiting acknowledgment |
//! | `backoff` | Reconnect delay schedule |
//! | `rate_limit` | Token bucket for outbound sends |
//! | `state` | Connection states and session epoch |
//! | `metrics` | Counters, latency, success rate, connection history |

// ============================================================================
// Submodules
// ============================================================================

/// Reconnect backoff policy.
pub mod backoff;

/// Metrics and error counters.
pub mod metrics;

/// Pending-acknowledgment table.
pub mod pending;

/// Outbound queue.
pub mod queue;

/// Send rate limiter.
pub mod rate_limit;

/// Socket abstraction and WebSocket connector.
pub mod socket;

/// Connection state machine.
pub mod state;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::ReconnectPolicy;
pub use metrics::{
    ConnectionEvent, ConnectionEventKind, ErrorCategory, ErrorCounters, Metrics, MetricsSnapshot,
};
pub use pending::{PendingEntry, PendingTable};
pub use queue::OutboundQueue;
pub use rate_limit::RateLimiter;
pub use socket::{Connector, NORMAL_CLOSURE, Socket, SocketEvent, SocketSink, WsConnector};
pub use state::{ConnectionState, Session};
