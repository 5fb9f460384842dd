//! Per-type inbound message handlers.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{InboundMessage, is_reserved};

// ============================================================================
// Types
// ============================================================================

/// Handler for one inbound message type.
pub type MessageHandler = Arc<dyn Fn(InboundMessage) + Send + Sync>;

/// One handler per message type; the last registration wins.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    handlers: RwLock<FxHashMap<String, MessageHandler>>,
}

// ============================================================================
// HandlerRegistry
// ============================================================================

impl HandlerRegistry {
    /// Registers `handler` for `kind`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// - [`Error::ReservedType`] for `ping`, `pong` and `ack`
    /// - [`Error::Config`] for an empty type
    pub(crate) fn register(&self, kind: String, handler: MessageHandler) -> Result<()> {
        if is_reserved(&kind) {
            return Err(Error::reserved_type(kind));
        }
        if kind.is_empty() {
            return Err(Error::config("handler type must not be empty"));
        }

        let replaced = self.handlers.write().insert(kind.clone(), handler).is_some();
        debug!(kind = %kind, replaced, "Registered message handler");
        Ok(())
    }

    /// Removes the handler for `kind`.
    pub(crate) fn remove(&self, kind: &str) -> bool {
        self.handlers.write().remove(kind).is_some()
    }

    /// Delivers `message` to the handler for its type.
    ///
    /// Returns `false` (and logs) when no handler matches.
    pub(crate) fn dispatch(&self, message: InboundMessage) -> bool {
        let handler = self.handlers.read().get(&message.kind).cloned();
        match handler {
            Some(handler) => {
                handler(message);
                true
            }
            None => {
                warn!(kind = %message.kind, "No handler for inbound message type");
                false
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
