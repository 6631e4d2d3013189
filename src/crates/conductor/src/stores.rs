//! In-memory store adapters
//!
//! Dashmap-backed implementations of the persistence ports. They serve as
//! the default wiring for tests and single-process deployments; durable
//! adapters implement the same ports outside this workspace.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use skein_core::error::{Result, WorkflowError};
use skein_core::messages::Message;
use skein_core::stores::{
    Conversation, ConversationDelta, ConversationStore, DefinitionStore, ExecutionFilter,
    ExecutionStore, MessageStore, StoredDefinition, WorkflowExecution,
};
use uuid::Uuid;

/// Execution rows in memory
#[derive(Debug, Default)]
pub struct MemoryExecutionStore {
    rows: DashMap<String, WorkflowExecution>,
}

impl MemoryExecutionStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn create(&self, record: WorkflowExecution) -> Result<()> {
        self.rows.insert(record.id.clone(), record);
        Ok(())
    }

    async fn update(&self, record: WorkflowExecution) -> Result<()> {
        if !self.rows.contains_key(&record.id) {
            return Err(WorkflowError::not_found("execution", &record.id));
        }
        self.rows.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<WorkflowExecution>> {
        Ok(self.rows.get(id).map(|r| r.clone()))
    }

    async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<WorkflowExecution>> {
        let mut rows: Vec<WorkflowExecution> = self
            .rows
            .iter()
            .filter(|r| {
                filter
                    .user_id
                    .as_ref()
                    .map(|u| &r.user_id == u)
                    .unwrap_or(true)
                    && filter.status.map(|s| r.status == s).unwrap_or(true)
            })
            .map(|r| r.clone())
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

/// Conversation aggregates in memory
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    conversations: DashMap<String, Conversation>,
}

impl MemoryConversationStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn get_or_create(&self, id: Option<&str>, user_id: &str) -> Result<Conversation> {
        if let Some(id) = id {
            return match self.conversations.get(id) {
                Some(conversation) => {
                    if conversation.user_id != user_id {
                        return Err(WorkflowError::unauthorized("conversation", id));
                    }
                    Ok(conversation.clone())
                }
                None => Err(WorkflowError::not_found("conversation", id)),
            };
        }

        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            message_count: 0,
            total_tokens: 0,
            last_active_at: Utc::now(),
        };
        self.conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn update_aggregates(&self, id: &str, delta: ConversationDelta) -> Result<Conversation> {
        let mut conversation = self
            .conversations
            .get_mut(id)
            .ok_or_else(|| WorkflowError::not_found("conversation", id))?;
        conversation.message_count += delta.messages_added;
        conversation.total_tokens += delta.tokens_added;
        conversation.last_active_at = Utc::now();
        Ok(conversation.clone())
    }
}

/// Message history in memory
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    messages: DashMap<String, Vec<Message>>,
}

impl MemoryMessageStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages stored for a conversation
    pub fn count(&self, conversation_id: &str) -> usize {
        self.messages
            .get(conversation_id)
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Messages stored across all conversations
    pub fn total(&self) -> usize {
        self.messages.iter().map(|entry| entry.len()).sum()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(&self, conversation_id: &str, message: &Message) -> Result<()> {
        self.messages
            .entry(conversation_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn history(&self, conversation_id: &str) -> Result<Vec<Message>> {
        Ok(self
            .messages
            .get(conversation_id)
            .map(|m| m.clone())
            .unwrap_or_default())
    }
}

/// Stored definitions in memory
#[derive(Debug, Default)]
pub struct MemoryDefinitionStore {
    definitions: DashMap<String, StoredDefinition>,
}

impl MemoryDefinitionStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a definition
    pub fn insert(&self, definition: StoredDefinition) {
        self.definitions.insert(definition.id.clone(), definition);
    }
}

#[async_trait]
impl DefinitionStore for MemoryDefinitionStore {
    async fn get(&self, id: &str) -> Result<Option<StoredDefinition>> {
        Ok(self.definitions.get(id).map(|d| d.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_core::stores::ExecutionStatus;

    #[tokio::test]
    async fn execution_rows_filter_and_sort() {
        let store = MemoryExecutionStore::new();
        let mut a = WorkflowExecution::pending("run-a", "u1");
        a.status = ExecutionStatus::Completed;
        let b = WorkflowExecution::pending("run-b", "u2");
        store.create(a).await.unwrap();
        store.create(b).await.unwrap();

        let all = store.list(&ExecutionFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let mine = store
            .list(&ExecutionFilter {
                user_id: Some("u1".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, "run-a");

        let completed = store
            .list(&ExecutionFilter {
                status: Some(ExecutionStatus::Completed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
    }

    #[tokio::test]
    async fn update_requires_existing_row() {
        let store = MemoryExecutionStore::new();
        let record = WorkflowExecution::pending("run-x", "u1");
        assert!(store.update(record.clone()).await.is_err());

        store.create(record.clone()).await.unwrap();
        assert!(store.update(record).await.is_ok());
    }

    #[tokio::test]
    async fn conversations_enforce_ownership() {
        let store = MemoryConversationStore::new();
        let conversation = store.get_or_create(None, "u1").await.unwrap();

        let err = store
            .get_or_create(Some(&conversation.id), "intruder")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "Unauthorized");

        let err = store.get_or_create(Some("ghost"), "u1").await.unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[tokio::test]
    async fn aggregates_accumulate() {
        let store = MemoryConversationStore::new();
        let conversation = store.get_or_create(None, "u1").await.unwrap();

        let updated = store
            .update_aggregates(
                &conversation.id,
                ConversationDelta {
                    messages_added: 2,
                    tokens_added: 10,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.message_count, 2);
        assert_eq!(updated.total_tokens, 10);
    }

    #[tokio::test]
    async fn message_history_preserves_order() {
        let store = MemoryMessageStore::new();
        store.append("c1", &Message::user("one")).await.unwrap();
        store.append("c1", &Message::assistant("two")).await.unwrap();

        let history = store.history("c1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "one");
        assert_eq!(history[1].content, "two");
    }
}
