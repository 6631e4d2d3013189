//! Wall-clock deadline tracking
//!
//! A [`Deadline`] is handed to each execution and consulted at suspension
//! points. It is cheap to clone and query.

use std::time::{Duration, Instant};

/// Absolute deadline for one execution
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    /// Deadline `timeout` from now
    pub fn after(timeout: Duration) -> Self {
        Self {
            expires_at: Some(Instant::now() + timeout),
        }
    }

    /// Deadline that never expires
    pub fn none() -> Self {
        Self { expires_at: None }
    }

    /// True once the deadline has passed
    pub fn expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() >= at,
            None => false,
        }
    }

    /// Time left, or `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_never_expires() {
        let deadline = Deadline::none();
        assert!(!deadline.expired());
        assert!(deadline.remaining().is_none());
    }

    #[tokio::test]
    async fn expires_after_timeout() {
        let deadline = Deadline::after(Duration::from_millis(20));
        assert!(!deadline.expired());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(deadline.expired());
    }
}
