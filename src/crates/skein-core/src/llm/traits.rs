//! The [`LanguageModel`] trait and its response types

use crate::error::Result;
use crate::llm::request::CompletionRequest;
use crate::messages::{Message, ToolCall};
use crate::usage::UsageMetadata;
use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;

/// Complete response from a unary model call
#[derive(Debug, Clone)]
pub struct Completion {
    /// The assistant message, possibly carrying tool-call requests
    pub message: Message,
    /// Token usage for this call
    pub usage: UsageMetadata,
}

/// One element of a streamed completion
///
/// A well-formed stream is zero or more `Token` deltas terminated by one
/// `Finish`. The finish carries anything that cannot be streamed: the
/// requested tool calls and the final usage numbers.
#[derive(Debug, Clone)]
pub enum CompletionDelta {
    /// Next content fragment in production order
    Token(String),
    /// End of the completion
    Finish {
        /// Tool calls requested by the completed message
        tool_calls: Option<Vec<ToolCall>>,
        /// Token usage for this call
        usage: UsageMetadata,
    },
}

/// Streamed completion as a pinned delta stream
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<CompletionDelta>> + Send>>;

/// Provider-agnostic chat model interface
///
/// Implementations convert [`Message`]s to their provider's wire format,
/// perform the call, and convert back. They must be `Send + Sync`; the
/// executor shares one handle across all model nodes of a run.
///
/// Failures should surface as `WorkflowError::Provider`, with `retryable`
/// set for rate limits, 5xx responses and network errors, so the
/// executor's retry policy can distinguish them from permanent failures.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a complete response
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;

    /// Stream a response token by token
    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream>;
}
