//! Pending-acknowledgment table.
//!
//! Maps each written message id to its send metadata. An entry enters on a
//! successful socket write and leaves on acknowledgment, cancellation or
//! teardown. Entries past the ack timeout are reported once, never resent.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::time::Instant;

use crate::identifiers::MessageId;

// ============================================================================
// PendingEntry
// ============================================================================

/// Send metadata for an unacknowledged message.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    /// Time of the latest write.
    pub sent_at: Instant,
    /// Number of caller-requested resends.
    pub retry_count: u32,
    /// Exact frame that was written, kept for resends.
    pub frame: Arc<str>,
    /// Whether this entry was already counted as timed out.
    timeout_reported: bool,
}

// ============================================================================
// PendingTable
// ============================================================================

/// Pending-acknowledgment table keyed by message id.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: FxHashMap<MessageId, PendingEntry>,
}

impl PendingTable {
    /// Creates an empty table.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a written message.
    pub fn insert(&mut self, id: MessageId, frame: Arc<str>, sent_at: Instant) {
        self.entries.insert(
            id,
            PendingEntry {
                sent_at,
                retry_count: 0,
                frame,
                timeout_reported: false,
            },
        );
    }

    /// Retires an acknowledged message.
    ///
    /// Returns the round-trip latency, or `None` if the id is unknown.
    pub fn acknowledge(&mut self, id: &MessageId, now: Instant) -> Option<Duration> {
        self.entries
            .remove(id)
            .map(|entry| now.saturating_duration_since(entry.sent_at))
    }

    /// Marks a message as written again.
    ///
    /// Returns the frame to write, or `None` if the id is unknown.
    pub fn mark_resent(&mut self, id: &MessageId, now: Instant) -> Option<Arc<str>> {
        let entry = self.entries.get_mut(id)?;
        entry.sent_at = now;
        entry.retry_count += 1;
        entry.timeout_reported = false;
        Some(Arc::clone(&entry.frame))
    }

    /// Returns the ids of entries older than `timeout` not yet reported.
    ///
    /// Each entry is reported at most once per write.
    pub fn collect_expired(&mut self, now: Instant, timeout: Duration) -> Vec<MessageId> {
        self.entries
            .iter_mut()
            .filter(|(_, entry)| {
                !entry.timeout_reported && now.saturating_duration_since(entry.sent_at) >= timeout
            })
            .map(|(id, entry)| {
                entry.timeout_reported = true;
                *id
            })
            .collect()
    }

    /// Removes a message without acknowledging it.
    pub fn remove(&mut self, id: &MessageId) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Removes every entry; returns how many were dropped.
    pub fn purge(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Looks up an entry.
    #[inline]
    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<&PendingEntry> {
        self.entries.get(id)
    }

    /// Returns `true` if the id is pending.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.entries.contains_key(id)
    }

    /// Returns the number of pending messages.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
