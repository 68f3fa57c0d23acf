//! Retry policy for node execution failures.
//!
//! Exponential backoff with a configurable multiplier, matching §4.2 of
//! the design: `backoff_ms × backoff_multiplier^(attempt - 1)`, capped by
//! an optional `retry_on` predicate that lets a node opt permanent errors
//! (validation failures, 404s) out of the retry loop entirely.

use std::time::Duration;

pub type RetryPredicate = std::sync::Arc<dyn Fn(&(dyn std::error::Error + Send + Sync)) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub retry_on: Option<RetryPredicate>,
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("backoff_ms", &self.backoff_ms)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("retry_on", &self.retry_on.is_some())
            .finish()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1000,
            backoff_multiplier: 2.0,
            retry_on: None,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, backoff_ms: u64, multiplier: f64) -> Self {
        self.backoff_ms = backoff_ms;
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_retry_on(mut self, predicate: RetryPredicate) -> Self {
        self.retry_on = Some(predicate);
        self
    }

    /// Whether `attempt` (1-indexed, the attempt that just failed) is
    /// eligible for another try.
    pub fn should_retry(&self, attempt: u32, error: &(dyn std::error::Error + Send + Sync)) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        match &self.retry_on {
            Some(predicate) => predicate(error),
            None => true,
        }
    }

    /// Delay before the next attempt, given the attempt number that just
    /// failed (1-indexed).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi((attempt as i32 - 1).max(0));
        let millis = (self.backoff_ms as f64 * factor).round().max(0.0) as u64;
        Duration::from_millis(millis)
    }
}
