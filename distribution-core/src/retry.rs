//! Retry policy - exponential backoff with jitter for delivery attempts
//!
//! Backoff state is persisted on the distribution record
//! (`next_attempt_at`), never held in process memory, so a restart
//! resumes the schedule where it left off.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total delivery attempts allowed before a distribution fails
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    pub initial_delay_ms: u64,

    /// Delay cap (milliseconds)
    pub max_delay_ms: u64,

    /// Exponential growth factor
    pub backoff_multiplier: f64,

    /// Jitter as a fraction of the computed delay (0.1 = ±10%)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 2000,      // 2 seconds
            max_delay_ms: 300_000,       // 5 minutes
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,          // 10% jitter
        }
    }
}

/// Computes retry schedules from attempt counts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create policy from configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Policy with default configuration
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Total attempts allowed
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// True once `attempts` delivery attempts have been made
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.config.max_attempts
    }

    /// Delay before the retry following the nth failed attempt
    /// (attempt numbering starts at 1)
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let base_delay = self.config.initial_delay_ms as f64
            * self.config.backoff_multiplier.powi(exponent as i32);

        // Cap before applying jitter so the cap bounds the schedule
        let capped_delay = base_delay.min(self.config.max_delay_ms as f64);

        // Jitter spreads retries to avoid thundering herd
        let jitter_range = capped_delay * self.config.jitter_factor;
        let jitter = (rand::random::<f64>() - 0.5) * jitter_range * 2.0;
        let final_delay = (capped_delay + jitter).max(0.0);

        Duration::from_millis(final_delay as u64)
    }

    /// Earliest instant the next attempt may be claimed
    pub fn next_attempt_at(&self, now: DateTime<Utc>, attempt: u32) -> DateTime<Utc> {
        let delay = self.delay_after_attempt(attempt);
        now + ChronoDuration::milliseconds(delay.as_millis() as i64)
    }
}
