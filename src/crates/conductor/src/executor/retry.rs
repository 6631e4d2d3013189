//! Retry policy for transient provider failures
//!
//! The executor retries a node visit only when it failed with
//! `WorkflowError::Provider { retryable: true }`, under the bounded
//! exponential backoff configured here. Everything else surfaces on the
//! first failure.

use rand::Rng;
use serde::{Deserialize, Serialize};
use skein_core::error::WorkflowError;
use std::time::Duration;

/// Bounded exponential backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// First backoff delay
    pub initial_backoff_ms: u64,
    /// Backoff ceiling
    pub max_backoff_ms: u64,
    /// Delay multiplier per attempt
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 250,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Whether `error` warrants another attempt after `attempt` retries
    pub fn should_retry(&self, error: &WorkflowError, attempt: u32) -> bool {
        error.retryable() && attempt < self.max_retries
    }

    /// Backoff delay before retry number `attempt` (zero-based)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let mut delay_ms = (self.initial_backoff_ms as f64
            * self.backoff_multiplier.powi(attempt as i32)) as u64;
        delay_ms = delay_ms.min(self.max_backoff_ms);

        if self.jitter {
            let jitter = (delay_ms as f64 * 0.25 * rand::thread_rng().gen::<f64>()) as u64;
            delay_ms += jitter;
        }
        Duration::from_millis(delay_ms)
    }
}
