//! Application message types.
//!
//! # Format
//!
//! Outbound messages are flat JSON objects. Payload fields sit next to the
//! envelope fields the transport assigns:
//!
//! ```json
//! {
//!   "query": "weather",
//!   "type": "query",
//!   "messageId": "uuid",
//!   "timestamp": 1730000000000
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::MessageId;

// ============================================================================
// Constants
// ============================================================================

/// Envelope key carrying the type tag.
pub const TYPE_KEY: &str = "type";

/// Envelope key carrying the transport-assigned id.
pub const MESSAGE_ID_KEY: &str = "messageId";

/// Envelope key carrying the assignment time.
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Returns `true` if the key is owned by the envelope rather than the payload.
#[inline]
fn is_envelope_key(key: &str) -> bool {
    matches!(key, TYPE_KEY | MESSAGE_ID_KEY | TIMESTAMP_KEY)
}

// ============================================================================
// Message
// ============================================================================

/// An outbound message as submitted by the application.
///
/// Carries a `type` tag and an opaque payload. The transport assigns the
/// `messageId` and `timestamp` when the message is accepted.
///
/// # Example
///
/// ```
/// use resilient_ws::Message;
///
/// let message = Message::new("query")
///     .with_field("text", "what's the weather?")
///     .with_field("voice", true);
///
/// assert_eq!(message.kind(), "query");
/// assert_eq!(message.payload().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Semantic type tag.
    kind: String,
    /// Payload fields, envelope keys excluded.
    payload: Map<String, Value>,
}

impl Message {
    /// Creates a message with an empty payload.
    #[inline]
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Map::new(),
        }
    }

    /// Adds a payload field.
    ///
    /// Envelope keys (`type`, `messageId`, `timestamp`) are ignored since
    /// the transport owns them.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if !is_envelope_key(&key) {
            self.payload.insert(key, value.into());
        }
        self
    }

    /// Replaces the payload.
    #[must_use]
    pub fn with_payload(mut self, mut payload: Map<String, Value>) -> Self {
        payload.retain(|key, _| !is_envelope_key(key));
        self.payload = payload;
        self
    }

    /// Builds a message from an arbitrary JSON value.
    ///
    /// Any caller-supplied `messageId` or `timestamp` is discarded.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedMessage`] if the value is not an object or has no
    /// string `type`.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(Error::malformed("message must be a JSON object"));
        };

        let kind = match fields.remove(TYPE_KEY) {
            Some(Value::String(kind)) => kind,
            Some(_) => return Err(Error::malformed("message type must be a string")),
            None => return Err(Error::malformed("message missing type field")),
        };

        fields.remove(MESSAGE_ID_KEY);
        fields.remove(TIMESTAMP_KEY);

        Ok(Self {
            kind,
            payload: fields,
        })
    }

    /// Returns the type tag.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the payload fields.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Serializes payload entries followed by the type tag.
    fn write_fields<M: SerializeMap>(&self, map: &mut M) -> std::result::Result<(), M::Error> {
        for (key, value) in &self.payload {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry(TYPE_KEY, &self.kind)
    }
}

impl TryFrom<Value> for Message {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.payload.len() + 1))?;
        self.write_fields(&mut map)?;
        map.end()
    }
}

// ============================================================================
// OutboundMessage
// ============================================================================

/// A message stamped with its transport-assigned id and timestamp.
///
/// This is what sits in the outbound queue and goes on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// Transport-assigned id.
    pub id: MessageId,
    /// Assignment time in milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// The submitted message.
    pub message: Message,
}

impl OutboundMessage {
    /// Stamps a message.
    #[inline]
    #[must_use]
    pub fn new(id: MessageId, timestamp: u64, message: Message) -> Self {
        Self {
            id,
            timestamp,
            message,
        }
    }

    /// Serializes the wire frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl Serialize for OutboundMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.message.payload.len() + 3))?;
        self.message.write_fields(&mut map)?;
        map.serialize_entry(MESSAGE_ID_KEY, &self.id)?;
        map.serialize_entry(TIMESTAMP_KEY, &self.timestamp)?;
        map.end()
    }
}

// ============================================================================
// InboundMessage
// ============================================================================

/// An application message received from the remote end.
///
/// Delivered to the handler registered for its `type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMessage {
    /// Type tag used for dispatch.
    #[serde(rename = "type")]
    pub kind: String,

    /// Remote-assigned id, if any.
    #[serde(rename = "messageId", default)]
    pub message_id: Option<String>,

    /// All remaining fields.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl InboundMessage {
    /// Returns a payload field.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Gets a string field.
    ///
    /// Returns empty string if key not found or not a string.
    #[inline]
    #[must_use]
    pub fn get_str(&self, key: &str) -> &str {
        self.payload
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Gets a u64 field.
    ///
    /// Returns 0 if key not found or not a number.
    #[inline]
    #[must_use]
    pub fn get_u64(&self, key: &str) -> u64 {
        self.payload
            .get(key)
            .and_then(Value::as_u64)
            .unwrap_or_default()
    }

    /// Gets a boolean field.
    ///
    /// Returns false if key not found or not a boolean.
    #[inline]
    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        self.payload
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================
