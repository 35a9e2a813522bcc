// src/api/retry.rs
//! Exponential backoff for transient API failures.

use crate::config::ExtractionConfig;
use crate::constants::RETRY_JITTER_RATIO;
use crate::error::FailureKind;
use rand::Rng;
use std::time::Duration;

/// How many times, and how patiently, a failed call is repeated.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random jitter as a fraction of the exponential delay
    pub jitter_ratio: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_secs_f64(config.base_retry_delay),
            max_delay: Duration::from_secs_f64(config.max_retry_delay),
            jitter_ratio: RETRY_JITTER_RATIO,
        }
    }

    /// Same policy with jitter disabled, for reproducible delays.
    pub fn without_jitter(self) -> Self {
        Self {
            jitter_ratio: 0.0,
            ..self
        }
    }

    /// Delay before retry number `attempt + 1` (zero-based).
    ///
    /// `base * 2^attempt` plus up to `jitter_ratio` of itself, capped at
    /// `max_delay`. With a ratio below 1.0 successive delays never shrink.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(30) as i32);
        let jitter = if self.jitter_ratio > 0.0 {
            rand::rng().random_range(0.0..=exponential * self.jitter_ratio)
        } else {
            0.0
        };
        let capped = (exponential + jitter).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// A server-supplied `Retry-After` wins over computed backoff; both are capped.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(requested) => requested.min(self.max_delay),
            None => self.backoff(attempt),
        }
    }
}

/// One scheduled retry of an in-flight call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAttempt {
    /// 1 for the first retry
    pub attempt: u32,
    pub delay: Duration,
    pub trigger: FailureKind,
    /// HTTP status that triggered the retry, absent for network failures
    pub status: Option<u16>,
}
