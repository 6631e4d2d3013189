//! Lifecycle event bus
//!
//! The executor publishes [`WorkflowEvent`]s; persistence, metrics and
//! audit logic subscribe. The executor never knows who is listening, which
//! keeps monitoring concerns out of the execution path.
//!
//! Delivery is synchronous and best-effort: `publish` calls every
//! subscriber inline, in registration order, and subscribers must return
//! quickly. A subscriber that needs to do real work enqueues it for its
//! own worker.
//!
//! # Ordering
//!
//! Within a run, events are published in causal order: `ExecutionStarted`
//! first, every `NodeStarted` paired with exactly one
//! `NodeCompleted`/`NodeFailed`, and exactly one of
//! `ExecutionCompleted`/`ExecutionFailed`/`ExecutionCancelled` last.
//! Across runs no ordering is guaranteed.

use crate::error::ErrorReport;
use crate::usage::{UsageMetadata, UsageTotals};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Payload of one lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventPayload {
    /// Run accepted and about to execute
    #[serde(rename_all = "camelCase")]
    ExecutionStarted {
        /// Run owner
        user_id: String,
        /// Workflow label (blueprint name or source reference)
        workflow: String,
        /// Stored-source reference, absent for inline runs
        #[serde(skip_serializing_if = "Option::is_none")]
        blueprint_ref: Option<String>,
    },
    /// Node visit began
    #[serde(rename_all = "camelCase")]
    NodeStarted {
        /// Node id
        node_id: String,
        /// Node kind string
        kind: String,
    },
    /// Node visit finished successfully
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        /// Node id
        node_id: String,
        /// Node kind string
        kind: String,
        /// Visit duration
        elapsed_ms: u64,
    },
    /// Node visit failed
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        /// Node id
        node_id: String,
        /// Node kind string
        kind: String,
        /// The failure
        error: ErrorReport,
    },
    /// One streamed token left a model node
    #[serde(rename_all = "camelCase")]
    TokenChunk {
        /// Producing node
        node_id: String,
        /// Content fragment
        content: String,
    },
    /// A model call reported token usage
    #[serde(rename_all = "camelCase")]
    UsageRecorded {
        /// Reporting node
        node_id: String,
        /// The usage numbers
        usage: UsageMetadata,
    },
    /// A tool call finished
    #[serde(rename_all = "camelCase")]
    ToolInvoked {
        /// Tool name
        name: String,
        /// Whether the call succeeded
        ok: bool,
        /// Short result or error description
        summary: String,
    },
    /// Run finished successfully
    #[serde(rename_all = "camelCase")]
    ExecutionCompleted {
        /// Canonical token totals
        totals: UsageTotals,
        /// Priced cost
        cost: f64,
        /// Run duration
        elapsed_ms: u64,
    },
    /// Run failed
    #[serde(rename_all = "camelCase")]
    ExecutionFailed {
        /// The failure
        error: ErrorReport,
    },
    /// Run cancelled or timed out
    #[serde(rename_all = "camelCase")]
    ExecutionCancelled {
        /// Cancellation cause ("cancelled", "timeout")
        reason: String,
    },
}

impl EventPayload {
    /// Payload kind string
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExecutionStarted { .. } => "ExecutionStarted",
            Self::NodeStarted { .. } => "NodeStarted",
            Self::NodeCompleted { .. } => "NodeCompleted",
            Self::NodeFailed { .. } => "NodeFailed",
            Self::TokenChunk { .. } => "TokenChunk",
            Self::UsageRecorded { .. } => "UsageRecorded",
            Self::ToolInvoked { .. } => "ToolInvoked",
            Self::ExecutionCompleted { .. } => "ExecutionCompleted",
            Self::ExecutionFailed { .. } => "ExecutionFailed",
            Self::ExecutionCancelled { .. } => "ExecutionCancelled",
        }
    }

    /// True for the three run-terminating payloads
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ExecutionCompleted { .. }
                | Self::ExecutionFailed { .. }
                | Self::ExecutionCancelled { .. }
        )
    }
}

/// One lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent {
    /// Unique event id; usage aggregation dedups on it
    pub id: String,
    /// Run the event belongs to
    pub run_id: String,
    /// Publication time
    pub timestamp: DateTime<Utc>,
    /// The payload
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl WorkflowEvent {
    /// Event for `run_id` with a fresh id and the current time
    pub fn new(run_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.into(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// A listener on the event bus
///
/// `on_event` runs inline on the publishing path and must not block.
pub trait EventSubscriber: Send + Sync {
    /// Handle one event
    fn on_event(&self, event: &WorkflowEvent);
}

/// In-process publish/subscribe fan-out
///
/// Shared across runs; cloning shares the subscriber list.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<Arc<dyn EventSubscriber>>>>,
}

impl EventBus {
    /// Bus with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber; receives all subsequently published events
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.write().push(subscriber);
    }

    /// Deliver `event` to every subscriber in registration order
    pub fn publish(&self, event: WorkflowEvent) {
        let subscribers = self.subscribers.read();
        for subscriber in subscribers.iter() {
            subscriber.on_event(&event);
        }
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Subscriber that records every event it sees.
///
/// Used by tests asserting event order and by ad-hoc debugging.
#[derive(Default)]
pub struct CollectingSubscriber {
    events: parking_lot::Mutex<Vec<WorkflowEvent>>,
}

impl CollectingSubscriber {
    /// Empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything seen so far
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().clone()
    }

    /// Payload kind strings in publication order
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.payload.kind()).collect()
    }
}

impl EventSubscriber for CollectingSubscriber {
    fn on_event(&self, event: &WorkflowEvent) {
        self.events.lock().push(event.clone());
    }
}
