//! Wire protocol message types.
//!
//! This module defines the JSON message format exchanged with the remote
//! endpoint and the validation applied to outbound messages.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`OutboundMessage`] | Local → Remote | Application message with envelope |
//! | [`InboundMessage`] | Remote → Local | Application message for handlers |
//! | `ack` | Remote → Local | Delivery confirmation |
//! | `ping` / `pong` | both | Heartbeat |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | Inbound classification and control frames |
//! | `message` | Application message types |
//! | `validate` | Outbound message validation |

// ============================================================================
// Submodules
// ============================================================================

/// Inbound frame classification and control frames.
pub mod frame;

/// Application message types.
pub mod message;

/// Outbound message validation.
pub mod validate;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{ACK_TYPE, InboundFrame, PING_TYPE, PONG_TYPE, is_reserved};
pub use message::{InboundMessage, Message, OutboundMessage};
pub use validate::{MAX_MESSAGE_BYTES, validate, validate_value};
