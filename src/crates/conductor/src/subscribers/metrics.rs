//! Metrics collection subscriber
//!
//! Lock-free counters and a fixed-bucket duration histogram fed from
//! lifecycle events. `snapshot` is the read surface for operators and
//! tests.

use skein_core::events::{EventPayload, EventSubscriber, WorkflowEvent};
use std::sync::atomic::{AtomicU64, Ordering};

/// Histogram bucket upper bounds in milliseconds; the last bucket is open
const DURATION_BUCKETS_MS: [u64; 8] = [50, 100, 250, 500, 1000, 2500, 5000, 10_000];

/// Counters and histograms for workflow executions
#[derive(Debug, Default)]
pub struct MetricsSubscriber {
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    node_failures: AtomicU64,
    tool_invocations: AtomicU64,
    tokens_total: AtomicU64,
    duration_buckets: [AtomicU64; 9],
}

/// Point-in-time view of the collected metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Runs started
    pub started: u64,
    /// Runs completed successfully
    pub completed: u64,
    /// Runs failed
    pub failed: u64,
    /// Runs cancelled or timed out
    pub cancelled: u64,
    /// Node visits that failed
    pub node_failures: u64,
    /// Tool calls executed
    pub tool_invocations: u64,
    /// Tokens consumed across completed runs
    pub tokens_total: u64,
    /// Run duration histogram; last bucket is the overflow
    pub duration_buckets: Vec<u64>,
}

impl MetricsSubscriber {
    /// Zeroed collector
    pub fn new() -> Self {
        Self::default()
    }

    fn observe_duration(&self, elapsed_ms: u64) {
        let index = DURATION_BUCKETS_MS
            .iter()
            .position(|bound| elapsed_ms <= *bound)
            .unwrap_or(DURATION_BUCKETS_MS.len());
        self.duration_buckets[index].fetch_add(1, Ordering::Relaxed);
    }

    /// Current values
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            node_failures: self.node_failures.load(Ordering::Relaxed),
            tool_invocations: self.tool_invocations.load(Ordering::Relaxed),
            tokens_total: self.tokens_total.load(Ordering::Relaxed),
            duration_buckets: self
                .duration_buckets
                .iter()
                .map(|b| b.load(Ordering::Relaxed))
                .collect(),
        }
    }
}

impl EventSubscriber for MetricsSubscriber {
    fn on_event(&self, event: &WorkflowEvent) {
        match &event.payload {
            EventPayload::ExecutionStarted { .. } => {
                self.started.fetch_add(1, Ordering::Relaxed);
            }
            EventPayload::ExecutionCompleted {
                totals, elapsed_ms, ..
            } => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                self.tokens_total
                    .fetch_add(totals.tokens_used, Ordering::Relaxed);
                self.observe_duration(*elapsed_ms);
            }
            EventPayload::ExecutionFailed { .. } => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
            EventPayload::ExecutionCancelled { .. } => {
                self.cancelled.fetch_add(1, Ordering::Relaxed);
            }
            EventPayload::NodeFailed { .. } => {
                self.node_failures.fetch_add(1, Ordering::Relaxed);
            }
            EventPayload::ToolInvoked { .. } => {
                self.tool_invocations.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_core::usage::UsageTotals;

    fn completed_event(elapsed_ms: u64, tokens: u64) -> WorkflowEvent {
        WorkflowEvent::new(
            "run-1",
            EventPayload::ExecutionCompleted {
                totals: UsageTotals {
                    prompt_tokens: tokens / 2,
                    completion_tokens: tokens - tokens / 2,
                    tokens_used: tokens,
                },
                cost: 0.0,
                elapsed_ms,
            },
        )
    }

    #[test]
    fn counts_lifecycle_events() {
        let metrics = MetricsSubscriber::new();
        metrics.on_event(&WorkflowEvent::new(
            "run-1",
            EventPayload::ExecutionStarted {
                user_id: "u1".into(),
                workflow: "chat".into(),
                blueprint_ref: None,
            },
        ));
        metrics.on_event(&completed_event(80, 10));
        metrics.on_event(&WorkflowEvent::new(
            "run-2",
            EventPayload::ExecutionCancelled {
                reason: "cancelled".into(),
            },
        ));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.started, 1);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.cancelled, 1);
        assert_eq!(snapshot.tokens_total, 10);
    }

    #[test]
    fn durations_land_in_the_right_bucket() {
        let metrics = MetricsSubscriber::new();
        metrics.on_event(&completed_event(40, 0)); // <= 50
        metrics.on_event(&completed_event(900, 0)); // <= 1000
        metrics.on_event(&completed_event(60_000, 0)); // overflow

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.duration_buckets[0], 1);
        assert_eq!(snapshot.duration_buckets[5], 1);
        assert_eq!(snapshot.duration_buckets[8], 1);
    }
}
