//! Model call node
//!
//! Calls the language model bound at preparation with the current message
//! history, appends the assistant reply (which may carry tool-call
//! requests) and records the call's token usage. In streaming mode tokens
//! are forwarded as they arrive; in unary mode they are buffered into the
//! final message. Both modes leave identical state behind.

use super::{NodeContext, NodeOutcome, WorkflowNode};
use crate::error::{Result, WorkflowError};
use crate::llm::{CompletionDelta, CompletionRequest};
use crate::messages::Message;
use crate::registry::NodeKind;
use crate::state::ExecutionState;
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;

/// LLM invocation step
#[derive(Debug)]
pub struct ModelNode {
    id: String,
}

impl ModelNode {
    /// Node with the blueprint node id
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    fn build_request(&self, state: &ExecutionState, ctx: &NodeContext) -> CompletionRequest {
        let mut request = CompletionRequest::new(state.messages.clone())
            .with_temperature(ctx.config.temperature);
        if let Some(max_tokens) = ctx.config.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        if ctx.config.enable_tools {
            let tools: Vec<ToolDefinition> = ctx
                .tools
                .definitions()
                .into_iter()
                .filter(|t| ctx.config.tool_allowed(&t.name))
                .collect();
            if !tools.is_empty() {
                request = request.with_tools(tools);
            }
        }
        request
    }
}

#[async_trait]
impl WorkflowNode for ModelNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Model
    }

    async fn run(&self, state: &mut ExecutionState, ctx: &NodeContext) -> Result<NodeOutcome> {
        let request = self.build_request(state, ctx);

        let (mut message, usage) = if ctx.is_streaming() {
            let mut stream = ctx.llm.stream(request).await?;
            let mut buffer = String::new();
            let mut finish = None;

            loop {
                let delta = tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => return Err(WorkflowError::Cancelled),
                    delta = stream.next() => delta,
                };
                match delta {
                    Some(Ok(CompletionDelta::Token(token))) => {
                        buffer.push_str(&token);
                        ctx.emit_token(&self.id, &token).await;
                    }
                    Some(Ok(CompletionDelta::Finish { tool_calls, usage })) => {
                        finish = Some((tool_calls, usage));
                        break;
                    }
                    Some(Err(err)) => return Err(err),
                    None => break,
                }
            }

            let (tool_calls, usage) = finish.ok_or_else(|| {
                WorkflowError::provider("stream ended without a finish delta", true)
            })?;
            let mut message = Message::assistant(buffer);
            if let Some(calls) = tool_calls {
                message.tool_calls = Some(calls);
            }
            (message, usage)
        } else {
            let completion = ctx.llm.complete(request).await?;
            (completion.message, completion.usage)
        };

        message.ensure_id();
        debug!(node = %self.id, tokens = usage.total(), "model call finished");

        state.messages.push(message);
        state.usage_metadata = Some(usage);
        ctx.record_usage(&self.id, usage).await;

        Ok(NodeOutcome::next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::WorkflowConfig;
    use crate::messages::{MessageRole, ToolCall};
    use crate::nodes::test_support::{context_with, state_with_user};
    use crate::testing::{ScriptedModel, ScriptedTurn};
    use serde_json::json;

    #[tokio::test]
    async fn appends_assistant_message_and_usage() {
        let model = ScriptedModel::new(vec![ScriptedTurn::text("hello there", 3, 2)]);
        let ctx = context_with(WorkflowConfig::new("x", "m"), model, None);
        let mut state = state_with_user("hi");

        ModelNode::new("llm").run(&mut state, &ctx).await.unwrap();

        let last = state.messages.last().unwrap();
        assert_eq!(last.role, MessageRole::Assistant);
        assert_eq!(last.content, "hello there");
        assert!(last.id.is_some());

        let usage = state.usage_metadata.unwrap();
        assert_eq!(usage.input_tokens, 3);
        assert_eq!(usage.output_tokens, 2);
    }

    #[tokio::test]
    async fn usage_is_overwritten_per_call() {
        let model = ScriptedModel::new(vec![
            ScriptedTurn::text("first", 3, 2),
            ScriptedTurn::text("second", 10, 20),
        ]);
        let ctx = context_with(WorkflowConfig::new("x", "m"), model, None);
        let mut state = state_with_user("hi");

        let node = ModelNode::new("llm");
        node.run(&mut state, &ctx).await.unwrap();
        node.run(&mut state, &ctx).await.unwrap();

        let usage = state.usage_metadata.unwrap();
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 20);
    }

    #[tokio::test]
    async fn carries_tool_call_requests() {
        let call = ToolCall::new("search", json!({"q": "rust"}));
        let model = ScriptedModel::new(vec![
            ScriptedTurn::text("", 1, 1).with_tool_calls(vec![call.clone()])
        ]);
        let ctx = context_with(WorkflowConfig::new("x", "m"), model, None);
        let mut state = state_with_user("find rust");

        ModelNode::new("llm").run(&mut state, &ctx).await.unwrap();

        let requested = state.messages.last().unwrap().requested_tool_calls();
        assert_eq!(requested.len(), 1);
        assert_eq!(requested[0].name, "search");
    }
}
