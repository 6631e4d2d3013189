//! Persistence ports and persisted record shapes
//!
//! The engine never talks to a database directly. These async ports are
//! implemented by adapters (in-memory in this workspace, durable ones
//! outside it). The record shapes here are the canonical persisted state
//! layout; token and cost fields on execution rows are authoritative.

use crate::blueprint::WorkflowBlueprint;
use crate::error::{ErrorReport, Result};
use crate::messages::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a persisted run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Accepted, not yet running
    Pending,
    /// Graph traversal in progress
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Cancelled or timed out
    Cancelled,
}

impl ExecutionStatus {
    /// True for the three end states
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Persisted record of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecution {
    /// Run id
    pub id: String,
    /// Definition or template the run came from, when not inline
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blueprint_ref: Option<String>,
    /// Run owner
    pub user_id: String,
    /// Current lifecycle state
    pub status: ExecutionStatus,
    /// When the run was accepted
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Canonical total tokens for the run
    pub tokens: u64,
    /// Canonical cost for the run
    pub cost: f64,
    /// Populated for failed and cancelled runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl WorkflowExecution {
    /// Fresh pending record for a run
    pub fn pending(id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            blueprint_ref: None,
            user_id: user_id.into(),
            status: ExecutionStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            tokens: 0,
            cost: 0.0,
            error: None,
        }
    }
}

/// Filter for listing executions
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    /// Restrict to one user
    pub user_id: Option<String>,
    /// Restrict to one status
    pub status: Option<ExecutionStatus>,
    /// Most-recent-first result cap
    pub limit: Option<usize>,
}

/// Execution row store
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Insert a new record
    async fn create(&self, record: WorkflowExecution) -> Result<()>;

    /// Replace the record with the same id
    async fn update(&self, record: WorkflowExecution) -> Result<()>;

    /// Fetch one record
    async fn get(&self, id: &str) -> Result<Option<WorkflowExecution>>;

    /// List records matching `filter`, most recent first
    async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<WorkflowExecution>>;
}

/// Conversation aggregates maintained by the result processor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Conversation id
    pub id: String,
    /// Owner
    pub user_id: String,
    /// Messages appended so far
    pub message_count: u64,
    /// Cumulative tokens across runs
    pub total_tokens: u64,
    /// Last activity
    pub last_active_at: DateTime<Utc>,
}

/// Aggregate delta applied after a run
#[derive(Debug, Clone, Copy, Default)]
pub struct ConversationDelta {
    /// Messages appended by the run
    pub messages_added: u64,
    /// Tokens consumed by the run
    pub tokens_added: u64,
}

/// Conversation aggregate store
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Fetch `id` when given, otherwise create a conversation for `user_id`
    async fn get_or_create(&self, id: Option<&str>, user_id: &str) -> Result<Conversation>;

    /// Apply a delta and return the updated aggregates
    async fn update_aggregates(&self, id: &str, delta: ConversationDelta) -> Result<Conversation>;
}

/// Message history store
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message to a conversation
    async fn append(&self, conversation_id: &str, message: &Message) -> Result<()>;

    /// Full history of a conversation, oldest first
    async fn history(&self, conversation_id: &str) -> Result<Vec<Message>>;
}

/// A blueprint stored durably and referenced by id
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDefinition {
    /// Definition id
    pub id: String,
    /// Owning user
    pub owner_id: String,
    /// The blueprint
    pub blueprint: WorkflowBlueprint,
}

/// Stored definition lookup port
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    /// Fetch a definition by id
    async fn get(&self, id: &str) -> Result<Option<StoredDefinition>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }

    #[test]
    fn pending_record_starts_zeroed() {
        let record = WorkflowExecution::pending("run-1", "u1");
        assert_eq!(record.status, ExecutionStatus::Pending);
        assert_eq!(record.tokens, 0);
        assert!(record.error.is_none());
        assert!(record.finished_at.is_none());
    }
}
