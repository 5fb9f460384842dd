//! Token-bucket limiter for outbound sends.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::time::Instant;

// ============================================================================
// RateLimiter
// ============================================================================

/// Token bucket refilled continuously at `per_second` tokens per second,
/// holding at most `burst` tokens.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Refill rate in tokens per second.
    per_second: f64,
    /// Bucket size.
    burst: f64,
    /// Tokens currently available.
    tokens: f64,
    /// Last refill time.
    refilled_at: Instant,
}

impl RateLimiter {
    /// Creates a full bucket.
    #[must_use]
    pub fn new(per_second: u32, burst: u32, now: Instant) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            per_second: f64::from(per_second.max(1)),
            burst,
            tokens: burst,
            refilled_at: now,
        }
    }

    /// Takes one token.
    ///
    /// # Errors
    ///
    /// Returns the wait until a token becomes available.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Ok(());
        }

        let missing = 1.0 - self.tokens;
        Err(Duration::from_secs_f64(missing / self.per_second))
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.refilled_at).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.per_second).min(self.burst);
        self.refilled_at = now;
    }
}

// ============================================================================
// Tests
// ============================================================================
