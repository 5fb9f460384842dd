//! Bounded FIFO of messages awaiting transmission.
//!
//! Holds messages submitted while the connection is unhealthy, or whose
//! write failed. Enqueue on a full queue is rejected, never silently dropped.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::identifiers::MessageId;
use crate::protocol::OutboundMessage;

// ============================================================================
// Constants
// ============================================================================

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

// ============================================================================
// OutboundQueue
// ============================================================================

/// Bounded FIFO queue; insertion order is send order.
#[derive(Debug)]
pub struct OutboundQueue {
    /// Queued messages, oldest first.
    messages: VecDeque<OutboundMessage>,
    /// Maximum number of queued messages.
    capacity: usize,
}

impl OutboundQueue {
    /// Creates an empty queue with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity.min(DEFAULT_QUEUE_CAPACITY)),
            capacity,
        }
    }

    /// Appends a message at the back.
    ///
    /// # Errors
    ///
    /// [`Error::QueueFull`] if the queue is at capacity; the queue is
    /// left unchanged.
    pub fn push(&mut self, message: OutboundMessage) -> Result<()> {
        if self.is_full() {
            return Err(Error::queue_full(self.capacity));
        }
        self.messages.push_back(message);
        Ok(())
    }

    /// Puts a message back at the front.
    ///
    /// Used when a drain is interrupted: the message that failed to write
    /// keeps its place ahead of everything still queued. Room is guaranteed
    /// because the message was popped from this queue.
    pub fn requeue_front(&mut self, message: OutboundMessage) {
        self.messages.push_front(message);
    }

    /// Removes the oldest message.
    #[inline]
    pub fn pop_front(&mut self) -> Option<OutboundMessage> {
        self.messages.pop_front()
    }

    /// Removes a message by id.
    ///
    /// Returns `true` if the message was queued.
    pub fn remove(&mut self, id: MessageId) -> bool {
        match self.messages.iter().position(|m| m.id == id) {
            Some(index) => self.messages.remove(index).is_some(),
            None => false,
        }
    }

    /// Removes every queued message.
    ///
    /// Returns the number of messages dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.messages.len();
        self.messages.clear();
        count
    }

    /// Returns the number of queued messages.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns `true` if the queue is at capacity.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.messages.len() >= self.capacity
    }

    /// Returns the queue capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

// ============================================================================
// Tests
// ============================================================================
