//! Reliable message transport over a single WebSocket connection.
//!
//! This library keeps one unreliable, stateful WebSocket usable for an
//! application: it queues messages while disconnected, reconnects with
//! bounded exponential backoff, tracks acknowledgments, rejects oversized
//! or malformed messages at the boundary and reports connection health.
//!
//! # Architecture
//!
//! All mutable state lives in one worker task:
//!
//! - [`Client`] handles validate and forward commands over a channel
//! - Socket events and timer firings arrive on the same channel
//! - Every timer carries an epoch, so nothing fires after a reconnect or
//!   teardown that it was not scheduled for
//!
//! # Quick Start
//!
//! ```no_run
//! use resilient_ws::{Client, Message, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder()
//!         .url("ws://127.0.0.1:9000/ws")
//!         .build()?;
//!
//!     client.register_handler("chat", |msg| {
//!         println!("{}", msg.get_str("text"));
//!     })?;
//!
//!     let id = client
//!         .send(Message::new("chat").with_field("text", "hello"))
//!         .await?;
//!     println!("sent {id}");
//!
//!     client.destroy().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`], builder, options, status |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | [`MessageId`] |
//! | [`protocol`] | Message envelope, control frames, validation |
//! | [`transport`] | Queue, pending table, backoff, state machine, metrics |

// ============================================================================
// Modules
// ============================================================================

/// Client handle and configuration.
///
/// Use [`Client::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Wire message types and validation.
pub mod protocol;

/// Transport building blocks owned by the worker.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    Client, ClientBuilder, ClientOptions, MessageHandler, RateLimitOptions, Status,
    StatusCallback,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::MessageId;

// Protocol types
pub use protocol::{InboundMessage, MAX_MESSAGE_BYTES, Message, validate};

// Transport types
pub use transport::{
    ConnectionEvent, ConnectionEventKind, ConnectionState, Connector, ErrorCategory,
    ErrorCounters, MetricsSnapshot, Socket, SocketEvent, SocketSink, WsConnector,
};
