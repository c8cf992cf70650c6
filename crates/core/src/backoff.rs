// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnect backoff policies.
//!
//! Attempts are numbered from 1. The default policy doubles the delay on
//! every consecutive failure and caps it:
//!
//! ```text
//! delay(n) = min(base * 2^(n-1), max)
//! ```

use std::time::Duration;

/// Strategy for computing the delay before a reconnect attempt.
pub trait BackoffPolicy: Send + Sync {
    /// Returns the delay to wait before attempt `attempt` (1-based).
    fn delay(&self, attempt: u32) -> Duration;
}

/// Capped exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    /// Delay before the first attempt.
    pub base: Duration,
    /// Upper bound for any single delay.
    pub max: Duration,
}

/// Default cap on a single reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

impl ExponentialBackoff {
    /// Creates a policy with the given base delay and cap.
    pub fn new(base: Duration, max: Duration) -> Self {
        ExponentialBackoff { base, max }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        ExponentialBackoff::new(Duration::from_secs(1), DEFAULT_MAX_DELAY)
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base.checked_mul(factor).unwrap_or(self.max).min(self.max)
    }
}

/// Fixed delay between attempts. Useful for tests and for transports that
/// already apply their own jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBackoff(pub Duration);

impl BackoffPolicy for ConstantBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
