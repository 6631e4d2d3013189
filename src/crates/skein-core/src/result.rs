//! Canonical run output
//!
//! Every run that completes produces one [`WorkflowResult`]. The three
//! `to_*_response` conversions are the only way a response leaves the
//! engine; transports shape these, never the raw state.
//!
//! Token totals here come from the aggregator and are canonical. The
//! per-node `usage_metadata` left in execution state is a per-call scratch
//! value and must not be read as a run total.

use crate::messages::Message;
use crate::stores::Conversation;
use crate::usage::UsageTotals;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical output of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    /// The persisted assistant message
    pub assistant_message: Message,
    /// Conversation aggregates after the run
    pub conversation: Conversation,
    /// Wall-clock run duration
    pub execution_time_ms: u64,
    /// Canonical total tokens
    pub tokens_used: u64,
    /// Canonical prompt tokens
    pub prompt_tokens: u64,
    /// Canonical completion tokens
    pub completion_tokens: u64,
    /// Priced cost of the run
    pub cost: f64,
    /// Run metadata
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl WorkflowResult {
    /// Copy the aggregator's totals onto the result
    pub fn with_totals(mut self, totals: UsageTotals) -> Self {
        self.prompt_tokens = totals.prompt_tokens;
        self.completion_tokens = totals.completion_tokens;
        self.tokens_used = totals.tokens_used;
        self
    }

    /// Minimal chat-shaped response
    pub fn to_chat_response(&self) -> ChatResponse {
        ChatResponse {
            conversation_id: self.conversation.id.clone(),
            assistant_text: self.assistant_message.content.clone(),
            tokens_used: self.tokens_used,
        }
    }

    /// Execution summary response
    pub fn to_execution_response(&self) -> ExecutionResponse {
        ExecutionResponse {
            conversation_id: self.conversation.id.clone(),
            execution_time_ms: self.execution_time_ms,
            tokens_used: self.tokens_used,
            cost: self.cost,
        }
    }

    /// Full response including the message and token split
    pub fn to_detailed_response(&self) -> DetailedResponse {
        DetailedResponse {
            assistant_message: self.assistant_message.clone(),
            conversation_id: self.conversation.id.clone(),
            execution_time_ms: self.execution_time_ms,
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            tokens_used: self.tokens_used,
            cost: self.cost,
            metadata: self.metadata.clone(),
        }
    }
}

/// Chat-shaped projection of a result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    /// Conversation the reply belongs to
    pub conversation_id: String,
    /// Assistant reply text
    pub assistant_text: String,
    /// Canonical total tokens
    pub tokens_used: u64,
}

/// Execution-summary projection of a result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    /// Conversation the run belongs to
    pub conversation_id: String,
    /// Run duration
    pub execution_time_ms: u64,
    /// Canonical total tokens
    pub tokens_used: u64,
    /// Priced cost
    pub cost: f64,
}

/// Detailed projection of a result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedResponse {
    /// The assistant message
    pub assistant_message: Message,
    /// Conversation the run belongs to
    pub conversation_id: String,
    /// Run duration
    pub execution_time_ms: u64,
    /// Canonical prompt tokens
    pub prompt_tokens: u64,
    /// Canonical completion tokens
    pub completion_tokens: u64,
    /// Canonical total tokens
    pub tokens_used: u64,
    /// Priced cost
    pub cost: f64,
    /// Run metadata
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}
