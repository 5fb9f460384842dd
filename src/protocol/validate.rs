//! Outbound message validation.
//!
//! Pure checks run before a message is accepted: well-formedness and the
//! serialized size cap. Deterministic and free of side effects.

// ============================================================================
// Imports
// ============================================================================

use std::io;

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

use super::frame::is_reserved;
use super::message::Message;

// ============================================================================
// Constants
// ============================================================================

/// Default serialized size cap (1 MiB).
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

// ============================================================================
// Validation
// ============================================================================

/// Validates a message against the size cap.
///
/// Returns the serialized size on success.
///
/// # Errors
///
/// - [`Error::MalformedMessage`] if the type is empty or reserved
/// - [`Error::MessageTooLarge`] if the serialized size exceeds `limit`
pub fn validate(message: &Message, limit: usize) -> Result<usize> {
    if message.kind().is_empty() {
        return Err(Error::malformed("message type must not be empty"));
    }

    if is_reserved(message.kind()) {
        return Err(Error::malformed(format!(
            "message type '{}' is reserved by the transport",
            message.kind()
        )));
    }

    let size = serialized_size(message)?;
    check_size(size, limit)?;
    Ok(size)
}

/// Validates an arbitrary JSON value and converts it into a [`Message`].
///
/// # Errors
///
/// Same as [`validate`], plus [`Error::MalformedMessage`] if the value is
/// not an object with a string `type`.
pub fn validate_value(value: Value, limit: usize) -> Result<Message> {
    let message = Message::from_value(value)?;
    validate(&message, limit)?;
    Ok(message)
}

/// Fails with [`Error::MessageTooLarge`] if `size` exceeds `limit`.
#[inline]
pub fn check_size(size: usize, limit: usize) -> Result<()> {
    if size > limit {
        return Err(Error::too_large(size, limit));
    }
    Ok(())
}

/// Returns the byte length of the JSON serialization without allocating it.
pub fn serialized_size<T: Serialize + ?Sized>(value: &T) -> Result<usize> {
    let mut counter = ByteCounter(0);
    serde_json::to_writer(&mut counter, value)?;
    Ok(counter.0)
}

// ============================================================================
// ByteCounter
// ============================================================================

/// Writer that only counts bytes.
struct ByteCounter(usize);

impl io::Write for ByteCounter {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    #[inline]
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
