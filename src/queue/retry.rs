//! Retry ceiling and exponential backoff

use std::time::Duration;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put the job back in line once the delay has passed
    Retry(Duration),
    /// Retry budget exhausted
    GiveUp,
}

/// Decides whether a failed upload gets another attempt
///
/// delay = base * 2^(retry_count - 1), capped at `max_delay`
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// `retry_count` is the number of failures so far, including the one just seen
    pub fn decide(&self, retry_count: u32, max_retries: u32) -> RetryDecision {
        if retry_count > max_retries {
            warn!(retry_count, max_retries, "Max retry attempts reached");
            return RetryDecision::GiveUp;
        }

        let delay = self.delay_for(retry_count);
        info!(
            retry_count,
            max_retries,
            delay_ms = delay.as_millis() as u64,
            "Scheduling retry"
        );
        RetryDecision::Retry(delay)
    }

    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}
