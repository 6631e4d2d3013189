//! Tool execution node
//!
//! Executes the tool calls requested by the last assistant message. Each
//! executed call appends a tool-result message and increments the run's
//! tool-call counter; the counter is checked against `max_tool_calls`
//! before every call, so a run that hits the cap keeps the results of the
//! calls that already ran.
//!
//! The allowlist is enforced here again even though preparation already
//! filtered the tool set handed to the model.

use super::{NodeContext, NodeOutcome, WorkflowNode};
use crate::error::{Result, WorkflowError};
use crate::messages::{Message, ToolCall};
use crate::registry::NodeKind;
use crate::state::ExecutionState;
use crate::tools::ToolInvocation;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

const SUMMARY_LIMIT: usize = 120;

fn summarize(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() > SUMMARY_LIMIT {
        let mut cut: String = text.chars().take(SUMMARY_LIMIT).collect();
        cut.push_str("...");
        cut
    } else {
        text
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ToolNodeConfig {
    /// Execute this step's calls concurrently
    parallel: bool,
}

/// Tool invocation step
#[derive(Debug)]
pub struct ToolNode {
    id: String,
    config: ToolNodeConfig,
}

impl ToolNode {
    /// Node with the blueprint node id and validated config
    pub fn from_config(id: impl Into<String>, config: &Value) -> Result<Self> {
        let config = if config.is_null() {
            ToolNodeConfig::default()
        } else {
            serde_json::from_value(config.clone())
                .map_err(|e| WorkflowError::validation(format!("tool node config: {e}")))?
        };
        Ok(Self {
            id: id.into(),
            config,
        })
    }

    fn authorize(&self, call: &ToolCall, ctx: &NodeContext) -> Result<()> {
        if !ctx.config.tool_allowed(&call.name) {
            return Err(WorkflowError::tool(&call.name, "not in the allowed tool list"));
        }
        if !ctx.tools.contains(&call.name) {
            return Err(WorkflowError::tool(&call.name, "not registered"));
        }
        Ok(())
    }

    async fn execute_one(
        &self,
        call: &ToolCall,
        state_user: &str,
        ctx: &NodeContext,
    ) -> Result<Message> {
        let invocation = ToolInvocation {
            user_id: state_user.to_string(),
            run_id: ctx.run_id.clone(),
        };
        match ctx
            .tools
            .invoke(&call.name, call.arguments.clone(), &invocation)
            .await
        {
            Ok(result) => {
                ctx.emit_tool(&call.name, true, &summarize(&result)).await;
                let mut message = Message::tool(
                    serde_json::to_string(&result).unwrap_or_default(),
                    &call.id,
                );
                message.ensure_id();
                Ok(message)
            }
            Err(err) => {
                warn!(tool = %call.name, error = %err, "tool invocation failed");
                ctx.emit_tool(&call.name, false, &err.to_string()).await;
                Err(err)
            }
        }
    }
}

#[async_trait]
impl WorkflowNode for ToolNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Tool
    }

    async fn run(&self, state: &mut ExecutionState, ctx: &NodeContext) -> Result<NodeOutcome> {
        if !ctx.config.enable_tools {
            return Ok(NodeOutcome::next());
        }

        let calls: Vec<ToolCall> = state
            .last_assistant_message()
            .map(|m| m.requested_tool_calls().to_vec())
            .unwrap_or_default();
        if calls.is_empty() {
            return Ok(NodeOutcome::next());
        }

        let user_id = state.user_id.clone();
        let max = ctx.config.max_tool_calls;

        if self.config.parallel {
            // All-or-nothing budget check, then the whole step runs
            // concurrently.
            for call in &calls {
                self.authorize(call, ctx)?;
            }
            let requested = calls.len() as u32;
            if state.tool_call_count + requested > max {
                return Err(WorkflowError::limit(format!(
                    "tool call budget exceeded: {} requested with {} of {} used",
                    requested, state.tool_call_count, max
                )));
            }
            let pending = calls.iter().map(|c| self.execute_one(c, &user_id, ctx));
            let results = futures::future::join_all(pending).await;
            for result in results {
                state.tool_call_count += 1;
                state.messages.push(result?);
            }
        } else {
            for call in &calls {
                if state.tool_call_count + 1 > max {
                    return Err(WorkflowError::limit(format!(
                        "tool call budget exceeded: limit {max}"
                    )));
                }
                self.authorize(call, ctx)?;
                let message = self.execute_one(call, &user_id, ctx).await?;
                state.tool_call_count += 1;
                state.messages.push(message);
            }
        }

        Ok(NodeOutcome::next())
    }
}
