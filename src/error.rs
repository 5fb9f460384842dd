//! Error types for the reliable transport.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use resilient_ws::{Client, Message, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     let id = client.send(Message::new("get_stats")).await?;
//!     println!("queued or sent as {id}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Validation | [`Error::MalformedMessage`], [`Error::MessageTooLarge`] |
//! | Backpressure | [`Error::QueueFull`], [`Error::RateLimited`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::ConnectionExhausted`], [`Error::NotConnected`] |
//! | Delivery | [`Error::AckTimeout`], [`Error::UnknownMessage`] |
//! | Lifecycle | [`Error::Destroyed`] |
//! | Configuration | [`Error::Config`], [`Error::InvalidUrl`], [`Error::ReservedType`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::MessageId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Validation and backpressure errors are returned synchronously from
/// [`Client::send`](crate::Client::send). Connection-level failures are
/// reported through the status callback and only surface here from
/// explicit connection operations.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// Message is not a structured record or lacks a `type`.
    ///
    /// Rejected at the boundary; never enters the queue.
    #[error("Malformed message: {message}")]
    MalformedMessage {
        /// What is wrong with the message.
        message: String,
    },

    /// Serialized message exceeds the configured size cap.
    #[error("Message too large: {size} bytes exceeds limit of {limit} bytes")]
    MessageTooLarge {
        /// Serialized size in bytes.
        size: usize,
        /// Configured cap in bytes.
        limit: usize,
    },

    // ========================================================================
    // Backpressure Errors
    // ========================================================================
    /// Outbound queue is at capacity.
    ///
    /// The message was neither queued nor sent; the caller must resubmit.
    #[error("Message queue full ({capacity} messages)")]
    QueueFull {
        /// Queue capacity.
        capacity: usize,
    },

    /// Send rate limit exceeded.
    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited {
        /// Milliseconds until a send would be admitted.
        retry_after_ms: u64,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport-level failure.
    ///
    /// Triggers reconnection; reported through the status callback.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// A connect attempt did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Socket closed by the remote end.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Reconnection gave up after the maximum number of attempts.
    ///
    /// Terminal until [`Client::connect`](crate::Client::connect) is called.
    #[error("Connection exhausted after {attempts} reconnect attempts")]
    ConnectionExhausted {
        /// Number of reconnect attempts made.
        attempts: u32,
    },

    /// Operation requires a healthy connection.
    #[error("Not connected")]
    NotConnected,

    // ========================================================================
    // Delivery Errors
    // ========================================================================
    /// A sent message was not acknowledged in time.
    ///
    /// Observability only: counted, never returned from a send.
    #[error("Message {message_id} not acknowledged after {timeout_ms}ms")]
    AckTimeout {
        /// The unacknowledged message.
        message_id: MessageId,
        /// Milliseconds waited.
        timeout_ms: u64,
    },

    /// No queued or pending message has this id.
    #[error("Unknown message: {message_id}")]
    UnknownMessage {
        /// The id that was looked up.
        message_id: MessageId,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// The client was torn down.
    #[error("Transport destroyed")]
    Destroyed,

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid client configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Endpoint URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Handler registration for a type the transport reserves.
    #[error("Message type '{kind}' is reserved by the transport")]
    ReservedType {
        /// The reserved type tag.
        kind: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a malformed message error.
    #[inline]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedMessage {
            message: message.into(),
        }
    }

    /// Creates a message too large error.
    #[inline]
    pub fn too_large(size: usize, limit: usize) -> Self {
        Self::MessageTooLarge { size, limit }
    }

    /// Creates a queue full error.
    #[inline]
    pub fn queue_full(capacity: usize) -> Self {
        Self::QueueFull { capacity }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a reserved type error.
    #[inline]
    pub fn reserved_type(kind: impl Into<String>) -> Self {
        Self::ReservedType { kind: kind.into() }
    }

    /// Creates an ack timeout error.
    #[inline]
    pub fn ack_timeout(message_id: MessageId, timeout_ms: u64) -> Self {
        Self::AckTimeout {
            message_id,
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the message was rejected by validation.
    #[inline]
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedMessage { .. } | Self::MessageTooLarge { .. }
        )
    }

    /// Returns `true` if this is a backpressure signal.
    #[inline]
    #[must_use]
    pub fn is_backpressure(&self) -> bool {
        matches!(self, Self::QueueFull { .. } | Self::RateLimited { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::ConnectionExhausted { .. }
                | Self::NotConnected
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed if the caller resubmits later.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::QueueFull { .. }
                | Self::RateLimited { .. }
                | Self::ConnectionTimeout { .. }
                | Self::NotConnected
                | Self::AckTimeout { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
