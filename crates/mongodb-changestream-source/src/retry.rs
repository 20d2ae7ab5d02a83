//! Retry strategies for reopening a change stream or restarting a scan.
//!
//! Attempts are counted from 1 and reset by the readers whenever the stream
//! makes progress again.

use std::fmt;
use std::time::Duration;

/// Decides whether, and after how long, a failed stream is retried.
pub trait RetryPolicy: Send + Sync + fmt::Debug {
    /// Delay before retry number `attempt`, or `None` to give up.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// Exponential backoff: `initial * 2^(attempt-1)`, capped at `max`, with jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    /// `None` retries forever
    max_attempts: Option<u32>,
    /// Fraction of the delay randomized around it, 0.0 to 1.0
    jitter: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(30),
            max_attempts: None,
            jitter: 0.1,
        }
    }
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial: initial.max(Duration::from_millis(1)),
            max: max.max(initial),
            ..Self::default()
        }
    }

    /// Give up after `attempts` retries. 0 means unlimited.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = (attempts > 0).then_some(attempts);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let initial_ms = self.initial.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        Duration::from_millis(initial_ms.saturating_mul(1_u64 << exponent).min(max_ms))
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if let Some(max_attempts) = self.max_attempts {
            if attempt > max_attempts {
                return None;
            }
        }
        let base = self.base_delay(attempt);
        if self.jitter == 0.0 {
            return Some(base);
        }
        // Random value in [base * (1 - jitter/2), base * (1 + jitter/2)]
        let base_ms = base.as_millis() as f64;
        let jitter_range = base_ms * self.jitter;
        let jitter = (rand::random::<f64>() * jitter_range) - (jitter_range / 2.0);
        Some(Duration::from_millis((base_ms + jitter).max(0.0) as u64))
    }
}

/// Retry at once, optionally a bounded number of times.
#[derive(Debug, Clone, Default)]
pub struct ImmediateRetry {
    max_attempts: Option<u32>,
}

impl ImmediateRetry {
    /// Retry forever without delay.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Give up after `attempts` retries. 0 means unlimited.
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: (attempts > 0).then_some(attempts),
        }
    }
}

impl RetryPolicy for ImmediateRetry {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max_attempts) if attempt > max_attempts => None,
            _ => Some(Duration::ZERO),
        }
    }
}
