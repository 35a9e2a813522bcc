// src/api/governor.rs
//! Process-wide request pacing with a token bucket.
//!
//! Every outbound call, including each retry, takes one token first. The
//! bucket refills continuously at the sustained rate and never holds more
//! than its burst capacity, so over any window `T` at most
//! `capacity + rate * T` calls are granted.

use crate::config::ExtractionConfig;
use crate::constants::MIN_REQUESTS_PER_SECOND;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

const MIN_REFILL_WAIT: Duration = Duration::from_millis(1);
const MAX_REFILL_WAIT: Duration = Duration::from_secs(3600);

/// Token bucket state. Only ever touched under the governor's lock.
#[derive(Debug, Clone)]
pub struct RequestBudget {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl RequestBudget {
    fn new(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            capacity,
            refill_rate,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Debits one token, or reports how long until one is available.
    fn try_debit(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            // Rounding can leave a deficit too small to sleep on.
            let wait = Duration::try_from_secs_f64((1.0 - self.tokens) / self.refill_rate)
                .unwrap_or(MAX_REFILL_WAIT);
            Err(wait.clamp(MIN_REFILL_WAIT, MAX_REFILL_WAIT))
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}

/// Counters describing how the governor has been used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GovernorStats {
    /// Tokens handed out
    pub granted: u64,
    /// Acquisitions that had to wait for a refill
    pub throttled: u64,
}

/// Shared gate every API call passes through.
pub struct RequestGovernor {
    budget: Mutex<RequestBudget>,
    granted: AtomicU64,
    throttled: AtomicU64,
}

impl RequestGovernor {
    /// A governor allowing `requests_per_second` sustained and `burst_capacity` at once.
    ///
    /// Rates that are not finite or fall below the slowest supported pace
    /// are raised to that pace.
    pub fn new(requests_per_second: f64, burst_capacity: u32) -> Self {
        let capacity = f64::from(burst_capacity.max(1));
        let refill_rate = if requests_per_second.is_finite()
            && requests_per_second >= MIN_REQUESTS_PER_SECOND
        {
            requests_per_second
        } else {
            log::warn!(
                "Unusable request rate {}, pacing at {}/s instead",
                requests_per_second,
                MIN_REQUESTS_PER_SECOND
            );
            MIN_REQUESTS_PER_SECOND
        };
        Self {
            budget: Mutex::new(RequestBudget::new(capacity, refill_rate, Instant::now())),
            granted: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.requests_per_second, config.burst_capacity)
    }

    /// Suspends until a token is available, then takes it.
    ///
    /// Never fails. The lock is released before sleeping so concurrent
    /// callers keep refilling and debiting.
    pub async fn acquire(&self) {
        let mut waited = false;
        loop {
            let outcome = self.budget.lock().try_debit(Instant::now());
            match outcome {
                Ok(()) => {
                    self.granted.fetch_add(1, Ordering::Relaxed);
                    if waited {
                        self.throttled.fetch_add(1, Ordering::Relaxed);
                    }
                    return;
                }
                Err(wait) => {
                    if !waited {
                        log::debug!("Request budget empty, waiting {:?}", wait);
                    }
                    waited = true;
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Current bucket contents, refilled up to now.
    pub fn available(&self) -> f64 {
        let mut budget = self.budget.lock();
        budget.refill(Instant::now());
        budget.tokens()
    }

    pub fn stats(&self) -> GovernorStats {
        GovernorStats {
            granted: self.granted.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
        }
    }
}
