//! Retry schedule for survey submission.

use std::time::Duration;

/// How many times a retryable submission failure is retried, and how long to
/// wait in between. Waits double from `initial_delay` up to `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRetry {
    /// Attempts including the first. Zero behaves like one.
    pub attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl SubmitRetry {
    /// A single attempt, never retried.
    pub fn once() -> Self {
        Self {
            attempts: 1,
            ..Self::default()
        }
    }

    /// `attempts` tries with no wait between them.
    pub fn immediate(attempts: usize) -> Self {
        Self {
            attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// The wait before the next try once `failed` attempts have failed, or
    /// `None` when no attempts are left.
    pub fn delay_after(&self, failed: usize) -> Option<Duration> {
        if failed == 0 || failed >= self.attempts.max(1) {
            return None;
        }
        let factor = u32::try_from(failed - 1)
            .ok()
            .and_then(|shift| 1u32.checked_shl(shift))
            .unwrap_or(u32::MAX);
        Some(self.initial_delay.saturating_mul(factor).min(self.max_delay))
    }
}

impl Default for SubmitRetry {
    fn default() -> Self {
        Self {
            attempts: 1,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}
