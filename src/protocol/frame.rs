//! Inbound frame classification and transport control frames.
//!
//! The transport reserves three `type` values for its own use. They are
//! never dispatched to application handlers.
//!
//! | Type | Direction | Purpose |
//! |------|-----------|---------|
//! | `ping` | both | Liveness check |
//! | `pong` | both | Liveness reply |
//! | `ack` | Remote → Local | Retires a pending message by `messageId` |

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::identifiers::MessageId;

use super::message::{InboundMessage, MESSAGE_ID_KEY, TIMESTAMP_KEY, TYPE_KEY};

// ============================================================================
// Constants
// ============================================================================

/// Heartbeat request type.
pub const PING_TYPE: &str = "ping";

/// Heartbeat reply type.
pub const PONG_TYPE: &str = "pong";

/// Acknowledgment type.
pub const ACK_TYPE: &str = "ack";

/// All transport-reserved types.
pub const RESERVED_TYPES: [&str; 3] = [PING_TYPE, PONG_TYPE, ACK_TYPE];

/// Returns `true` if the type tag is reserved by the transport.
#[inline]
#[must_use]
pub fn is_reserved(kind: &str) -> bool {
    RESERVED_TYPES.contains(&kind)
}

// ============================================================================
// InboundFrame
// ============================================================================

/// A parsed inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Delivery confirmation for a previously sent message.
    Ack {
        /// The acknowledged message.
        message_id: MessageId,
    },
    /// Liveness check from the remote end.
    Ping,
    /// Reply to our liveness check.
    Pong,
    /// Application message for handler dispatch.
    Message(InboundMessage),
}

impl InboundFrame {
    /// Parses and classifies a text frame.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the text is not JSON
    /// - [`Error::MalformedMessage`] if it is not an object with a string
    ///   `type`, or an ack lacks a valid `messageId`
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;

        let kind = value
            .as_object()
            .ok_or_else(|| Error::malformed("inbound frame must be a JSON object"))?
            .get(TYPE_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::malformed("inbound frame missing type field"))?;

        match kind {
            ACK_TYPE => {
                let message_id = value
                    .get(MESSAGE_ID_KEY)
                    .and_then(Value::as_str)
                    .and_then(|id| id.parse().ok())
                    .ok_or_else(|| Error::malformed("ack without a valid messageId"))?;
                Ok(Self::Ack { message_id })
            }
            PING_TYPE => Ok(Self::Ping),
            PONG_TYPE => Ok(Self::Pong),
            _ => Ok(Self::Message(serde_json::from_value(value)?)),
        }
    }

    /// Returns `true` for heartbeat traffic.
    #[inline]
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Ping | Self::Pong)
    }
}

// ============================================================================
// Control Frames
// ============================================================================

/// Builds a heartbeat ping.
#[must_use]
pub fn ping_frame(timestamp: u64) -> String {
    json!({ TYPE_KEY: PING_TYPE, TIMESTAMP_KEY: timestamp }).to_string()
}

/// Builds a heartbeat reply.
#[must_use]
pub fn pong_frame(timestamp: u64) -> String {
    json!({ TYPE_KEY: PONG_TYPE, TIMESTAMP_KEY: timestamp }).to_string()
}

// ============================================================================
// Tests
// ============================================================================
