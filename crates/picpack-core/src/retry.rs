//! Retry policy
//!
//! Two loops in the worker retry, with very different contracts: queue
//! receive retries forever at a fixed delay (infrastructure availability is
//! the worker's reason to keep polling), while part uploads retry a small
//! bounded number of times with exponential backoff before the job fails.
//! Both are expressed through [`RetryPolicy`] instead of inline sleeps.

use std::time::Duration;

/// Maximum backoff delay. Caps exponential backoff so that high attempt
/// counts do not produce excessively long delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// `None` means retry forever.
    max_attempts: Option<u32>,
    base_delay: Duration,
    exponential: bool,
}

impl RetryPolicy {
    /// Bounded exponential backoff: delays of base, 2*base, 4*base, ...
    /// capped at [`MAX_RETRY_BACKOFF_SECS`].
    pub fn bounded(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            base_delay,
            exponential: true,
        }
    }

    /// Unbounded fixed-delay retry, for the queue receive loop.
    pub fn unbounded(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            base_delay: delay,
            exponential: false,
        }
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Whether another attempt is allowed after `failures` failed attempts.
    pub fn should_retry(&self, failures: u32) -> bool {
        match self.max_attempts {
            Some(max) => failures < max,
            None => true,
        }
    }

    /// Delay to wait before the attempt following `failures` failed attempts.
    pub fn delay_for(&self, failures: u32) -> Duration {
        if !self.exponential {
            return self.base_delay;
        }
        let max = Duration::from_secs(MAX_RETRY_BACKOFF_SECS);
        let factor = 2u32.saturating_pow(failures.saturating_sub(1));
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(max)
    }
}
