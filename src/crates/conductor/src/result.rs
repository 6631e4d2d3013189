//! Result processing
//!
//! The final pipeline stage before the completion event: takes the run's
//! finished state and canonical token totals, persists the new messages,
//! updates the conversation aggregates and assembles the
//! [`WorkflowResult`]. Nothing else in the engine writes conversations or
//! messages.

use crate::pricing::CostModel;
use skein_core::blueprint::WorkflowConfig;
use skein_core::error::{Result, WorkflowError};
use skein_core::messages::Message;
use skein_core::result::WorkflowResult;
use skein_core::state::ExecutionState;
use skein_core::stores::{ConversationDelta, ConversationStore, MessageStore};
use skein_core::usage::UsageTotals;
use std::sync::Arc;

/// Folds raw graph output into the canonical result
pub struct ResultProcessor {
    messages: Arc<dyn MessageStore>,
    conversations: Arc<dyn ConversationStore>,
    cost_model: Arc<dyn CostModel>,
}

impl ResultProcessor {
    /// Processor over the persistence collaborators and the price table
    pub fn new(
        messages: Arc<dyn MessageStore>,
        conversations: Arc<dyn ConversationStore>,
        cost_model: Arc<dyn CostModel>,
    ) -> Self {
        Self {
            messages,
            conversations,
            cost_model,
        }
    }

    /// Persist a successful run's output and build its result.
    ///
    /// `user_message` is the request message that opened the run; it is
    /// persisted alongside the assistant reply so a cancelled or failed
    /// run leaves no partial conversation behind.
    pub async fn process(
        &self,
        state: &ExecutionState,
        user_message: &Message,
        totals: UsageTotals,
        config: &WorkflowConfig,
        execution_time_ms: u64,
    ) -> Result<WorkflowResult> {
        let assistant_message = state
            .last_assistant_message()
            .cloned()
            .ok_or_else(|| WorkflowError::internal("run finished without an assistant message"))?;

        self.messages
            .append(&state.conversation_id, user_message)
            .await?;
        self.messages
            .append(&state.conversation_id, &assistant_message)
            .await?;

        let conversation = self
            .conversations
            .update_aggregates(
                &state.conversation_id,
                ConversationDelta {
                    messages_added: 2,
                    tokens_added: totals.tokens_used,
                },
            )
            .await?;

        let cost = self
            .cost_model
            .cost(&config.provider, &config.model, &totals);

        Ok(WorkflowResult {
            assistant_message,
            conversation,
            execution_time_ms,
            tokens_used: totals.tokens_used,
            prompt_tokens: totals.prompt_tokens,
            completion_tokens: totals.completion_tokens,
            cost,
            metadata: state.metadata.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::{ModelRate, StaticPriceTable};
    use crate::stores::{MemoryConversationStore, MemoryMessageStore};
    use serde_json::Value;

    fn totals(prompt: u64, completion: u64) -> UsageTotals {
        UsageTotals {
            prompt_tokens: prompt,
            completion_tokens: completion,
            tokens_used: prompt + completion,
        }
    }

    async fn processor_and_conversation() -> (ResultProcessor, Arc<MemoryMessageStore>, String) {
        let messages = Arc::new(MemoryMessageStore::new());
        let conversations = Arc::new(MemoryConversationStore::new());
        let conversation = conversations.get_or_create(None, "u1").await.unwrap();
        let prices = StaticPriceTable::new();
        prices.set("x", "m", ModelRate::new(0.001, 0.002));

        let processor = ResultProcessor::new(messages.clone(), conversations, Arc::new(prices));
        (processor, messages, conversation.id)
    }

    #[tokio::test]
    async fn persists_messages_and_prices_the_run() {
        let (processor, messages, conversation_id) = processor_and_conversation().await;

        let user_message = Message::user("hi");
        let mut state = ExecutionState::new(
            "u1",
            &conversation_id,
            vec![user_message.clone(), Message::assistant("hello")],
            Value::Null,
        );
        state.messages[1].ensure_id();

        let result = processor
            .process(
                &state,
                &user_message,
                totals(3, 2),
                &WorkflowConfig::new("x", "m"),
                42,
            )
            .await
            .unwrap();

        assert_eq!(result.assistant_message.content, "hello");
        assert_eq!(result.tokens_used, 5);
        assert_eq!(result.prompt_tokens, 3);
        assert_eq!(result.completion_tokens, 2);
        assert!((result.cost - (3.0 * 0.001 + 2.0 * 0.002)).abs() < 1e-9);
        assert_eq!(result.conversation.message_count, 2);
        assert_eq!(result.conversation.total_tokens, 5);
        assert_eq!(messages.count(&conversation_id), 2);
    }

    #[tokio::test]
    async fn missing_assistant_message_is_an_internal_error() {
        let (processor, _messages, conversation_id) = processor_and_conversation().await;
        let user_message = Message::user("hi");
        let state = ExecutionState::new(
            "u1",
            &conversation_id,
            vec![user_message.clone()],
            Value::Null,
        );

        let err = processor
            .process(
                &state,
                &user_message,
                totals(0, 0),
                &WorkflowConfig::new("x", "m"),
                1,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InternalError");
    }
}
