//! Connection states and the connection session.
//!
//! ```text
//!                 connect()            open
//! Disconnected ─────────────► Connecting ─────► Connected
//!      ▲                        │   ▲              │   │
//!      │           loss/failure │   │ timer        │   │ close()
//!      │                        ▼   │              │   ▼
//!      └──── exhausted ──── Reconnecting ◄── loss ─┘  Draining
//!      ▲                                               │
//!      └───────────────────── closed ──────────────────┘
//! ```
//!
//! Teardown moves any state to `Disconnected` and is terminal.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use tokio::time::Instant;

// ============================================================================
// ConnectionState
// ============================================================================

/// State of the single managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No socket and no attempt in progress.
    #[default]
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Socket open; sends are written immediately.
    Connected,
    /// Intentional close in progress.
    Draining,
    /// Connection lost; a reconnect attempt is scheduled.
    Reconnecting,
}

impl ConnectionState {
    /// Returns `true` only in [`ConnectionState::Connected`].
    #[inline]
    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if `connect()` may start an attempt from this state.
    #[inline]
    #[must_use]
    pub const fn can_connect(self) -> bool {
        matches!(self, Self::Disconnected | Self::Reconnecting)
    }

    /// Returns `true` if the transition `self → to` is part of the state
    /// machine. Teardown bypasses this check.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Disconnected, Self::Connecting)
                | (Self::Reconnecting, Self::Connecting)
                | (Self::Reconnecting, Self::Disconnected)
                | (Self::Connecting, Self::Connected)
                | (Self::Connecting, Self::Reconnecting)
                | (Self::Connecting, Self::Disconnected)
                | (Self::Connected, Self::Reconnecting)
                | (Self::Connected, Self::Draining)
                | (Self::Draining, Self::Disconnected)
        )
    }

    /// Returns the lowercase state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Draining => "draining",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Session
// ============================================================================

/// Connection session state, owned by the worker.
///
/// The epoch advances on every connect attempt, every loss, intentional
/// close and teardown. Timers and socket events carry the epoch they were
/// created under and are discarded when it no longer matches.
#[derive(Debug, Default)]
pub struct Session {
    /// Current state.
    state: ConnectionState,
    /// Reconnect attempts since the last successful connect.
    pub reconnect_attempts: u32,
    /// Most recent connection-level error.
    pub last_error: Option<String>,
    /// When the current connection opened.
    pub connected_at: Option<Instant>,
    /// When the current connect attempt started.
    pub connect_started_at: Option<Instant>,
    /// Generation marker for stale-event guards.
    epoch: u64,
    /// Reconnection gave up; only an explicit connect resumes.
    exhausted: bool,
    /// Terminal teardown happened.
    destroyed: bool,
}

impl Session {
    /// Creates a disconnected session.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Moves to `to` if the transition is allowed.
    ///
    /// Returns `false` (and leaves the state untouched) otherwise, or once
    /// the session is destroyed.
    pub fn transition(&mut self, to: ConnectionState) -> bool {
        if self.destroyed || !self.state.can_transition_to(to) {
            return false;
        }
        self.state = to;
        true
    }

    /// Returns the current epoch.
    #[inline]
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Invalidates everything scheduled under the current epoch.
    pub fn advance_epoch(&mut self) -> u64 {
        self.epoch = self.epoch.wrapping_add(1);
        self.epoch
    }

    /// Returns `true` if `epoch` is current and the session is alive.
    #[inline]
    #[must_use]
    pub const fn is_current(&self, epoch: u64) -> bool {
        !self.destroyed && self.epoch == epoch
    }

    /// Returns `true` after reconnection gave up.
    #[inline]
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Marks reconnection as given up.
    pub fn mark_exhausted(&mut self) {
        self.exhausted = true;
    }

    /// Clears the exhausted flag and attempt counter.
    pub fn reset_attempts(&mut self) {
        self.exhausted = false;
        self.reconnect_attempts = 0;
    }

    /// Returns `true` after teardown.
    #[inline]
    #[must_use]
    pub const fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Terminal teardown: forces `Disconnected` and rejects all further
    /// transitions.
    pub fn destroy(&mut self) {
        self.advance_epoch();
        self.state = ConnectionState::Disconnected;
        self.connected_at = None;
        self.connect_started_at = None;
        self.destroyed = true;
    }
}

// ============================================================================
// Tests
// ============================================================================
