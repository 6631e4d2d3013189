//! Execution-row persistence subscriber
//!
//! Translates lifecycle events into [`WorkflowExecution`] transitions:
//! created on `ExecutionStarted`, token/cost totals and terminal status on
//! the final event. Store writes are async, so `on_event` only enqueues;
//! a worker task owned by this subscriber drains the queue in order.
//! Tests call [`PersistenceSubscriber::flush`] to wait for the queue to
//! empty.

use skein_core::error::ErrorReport;
use skein_core::events::{EventPayload, EventSubscriber, WorkflowEvent};
use skein_core::stores::{ExecutionStatus, ExecutionStore, WorkflowExecution};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

enum QueueItem {
    Event(WorkflowEvent),
    Flush(oneshot::Sender<()>),
}

/// Writes execution-row transitions from lifecycle events
pub struct PersistenceSubscriber {
    queue: mpsc::UnboundedSender<QueueItem>,
}

impl PersistenceSubscriber {
    /// Subscriber writing to `store`; spawns its worker on the current
    /// runtime
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(worker(store, rx));
        Self { queue: tx }
    }

    /// Wait until every event enqueued so far has been applied
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.queue.send(QueueItem::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

impl EventSubscriber for PersistenceSubscriber {
    fn on_event(&self, event: &WorkflowEvent) {
        let _ = self.queue.send(QueueItem::Event(event.clone()));
    }
}

async fn worker(store: Arc<dyn ExecutionStore>, mut rx: mpsc::UnboundedReceiver<QueueItem>) {
    while let Some(item) = rx.recv().await {
        match item {
            QueueItem::Flush(done) => {
                let _ = done.send(());
            }
            QueueItem::Event(event) => {
                if let Err(err) = apply(&store, &event).await {
                    warn!(run_id = %event.run_id, error = %err, "execution row update failed");
                }
            }
        }
    }
}

async fn apply(store: &Arc<dyn ExecutionStore>, event: &WorkflowEvent) -> skein_core::Result<()> {
    match &event.payload {
        EventPayload::ExecutionStarted {
            user_id,
            blueprint_ref,
            ..
        } => {
            let mut record = WorkflowExecution::pending(&event.run_id, user_id);
            record.status = ExecutionStatus::Running;
            record.blueprint_ref = blueprint_ref.clone();
            record.started_at = event.timestamp;
            store.create(record).await
        }
        EventPayload::ExecutionCompleted { totals, cost, .. } => {
            finish(store, event, ExecutionStatus::Completed, None, |record| {
                record.tokens = totals.tokens_used;
                record.cost = *cost;
            })
            .await
        }
        EventPayload::ExecutionFailed { error } => {
            finish(
                store,
                event,
                ExecutionStatus::Failed,
                Some(error.clone()),
                |_| {},
            )
            .await
        }
        EventPayload::ExecutionCancelled { reason } => {
            let error = ErrorReport {
                kind: if reason == "timeout" {
                    "TimeoutError".to_string()
                } else {
                    "CancelledError".to_string()
                },
                message: format!("execution {reason}"),
                details: None,
                retryable: None,
            };
            finish(store, event, ExecutionStatus::Cancelled, Some(error), |_| {}).await
        }
        _ => Ok(()),
    }
}

async fn finish<F>(
    store: &Arc<dyn ExecutionStore>,
    event: &WorkflowEvent,
    status: ExecutionStatus,
    error: Option<ErrorReport>,
    fill: F,
) -> skein_core::Result<()>
where
    F: FnOnce(&mut WorkflowExecution),
{
    let existing = store.get(&event.run_id).await?;
    let existed = existing.is_some();
    // A terminal event for a run whose start never persisted recreates the
    // row rather than dropping the transition.
    let mut record =
        existing.unwrap_or_else(|| WorkflowExecution::pending(&event.run_id, "unknown"));
    record.status = status;
    record.finished_at = Some(event.timestamp);
    record.error = error;
    fill(&mut record);

    if existed {
        store.update(record).await
    } else {
        store.create(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryExecutionStore;
    use skein_core::usage::UsageTotals;

    fn started(run_id: &str) -> WorkflowEvent {
        WorkflowEvent::new(
            run_id,
            EventPayload::ExecutionStarted {
                user_id: "u1".into(),
                workflow: "chat".into(),
                blueprint_ref: Some("template:plain-chat".into()),
            },
        )
    }

    #[tokio::test]
    async fn started_creates_a_running_row() {
        let store = Arc::new(MemoryExecutionStore::new());
        let subscriber = PersistenceSubscriber::new(store.clone());

        subscriber.on_event(&started("run-1"));
        subscriber.flush().await;

        let record = store.get("run-1").await.unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Running);
        assert_eq!(record.user_id, "u1");
        assert_eq!(record.blueprint_ref.as_deref(), Some("template:plain-chat"));
    }

    #[tokio::test]
    async fn completion_fills_tokens_and_cost() {
        let store = Arc::new(MemoryExecutionStore::new());
        let subscriber = PersistenceSubscriber::new(store.clone());

        subscriber.on_event(&started("run-1"));
        subscriber.on_event(&WorkflowEvent::new(
            "run-1",
            EventPayload::ExecutionCompleted {
                totals: UsageTotals {
                    prompt_tokens: 3,
                    completion_tokens: 2,
                    tokens_used: 5,
                },
                cost: 0.01,
                elapsed_ms: 7,
            },
        ));
        subscriber.flush().await;

        let record = store.get("run-1").await.unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(record.tokens, 5);
        assert!((record.cost - 0.01).abs() < 1e-9);
        assert!(record.finished_at.is_some());
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn failure_and_cancellation_populate_error() {
        let store = Arc::new(MemoryExecutionStore::new());
        let subscriber = PersistenceSubscriber::new(store.clone());

        subscriber.on_event(&started("run-f"));
        subscriber.on_event(&WorkflowEvent::new(
            "run-f",
            EventPayload::ExecutionFailed {
                error: ErrorReport {
                    kind: "LimitError".into(),
                    message: "too many tool calls".into(),
                    details: None,
                    retryable: None,
                },
            },
        ));

        subscriber.on_event(&started("run-c"));
        subscriber.on_event(&WorkflowEvent::new(
            "run-c",
            EventPayload::ExecutionCancelled {
                reason: "timeout".into(),
            },
        ));
        subscriber.flush().await;

        let failed = store.get("run-f").await.unwrap().unwrap();
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert_eq!(failed.error.as_ref().unwrap().kind, "LimitError");

        let cancelled = store.get("run-c").await.unwrap().unwrap();
        assert_eq!(cancelled.status, ExecutionStatus::Cancelled);
        assert_eq!(cancelled.error.as_ref().unwrap().kind, "TimeoutError");
    }
}
