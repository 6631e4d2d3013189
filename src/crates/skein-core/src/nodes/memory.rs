//! History compaction node
//!
//! Fits the conversation into the configured memory window, pruning the
//! oldest turns while preserving role boundaries, and records a
//! deterministic summary of what was dropped in `conversation_summary`.
//! Identical input always compacts to identical output.

use super::{NodeContext, NodeOutcome, WorkflowNode};
use crate::error::{Result, WorkflowError};
use crate::messages::{summarize_pruned, trim_to_window, WindowOptions};
use crate::registry::NodeKind;
use crate::state::ExecutionState;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct MemoryNodeConfig {
    /// Override of the run-level memory window
    window: Option<usize>,
    /// Record a summary of pruned turns; on by default
    summarize: Option<bool>,
}

/// Conversation compaction step
#[derive(Debug)]
pub struct MemoryNode {
    id: String,
    config: MemoryNodeConfig,
}

impl MemoryNode {
    /// Node with the blueprint node id and validated config
    pub fn from_config(id: impl Into<String>, config: &Value) -> Result<Self> {
        let config = if config.is_null() {
            MemoryNodeConfig::default()
        } else {
            serde_json::from_value(config.clone())
                .map_err(|e| WorkflowError::validation(format!("memory node config: {e}")))?
        };
        Ok(Self {
            id: id.into(),
            config,
        })
    }
}

#[async_trait]
impl WorkflowNode for MemoryNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Memory
    }

    async fn run(&self, state: &mut ExecutionState, ctx: &NodeContext) -> Result<NodeOutcome> {
        if !ctx.config.enable_memory {
            return Ok(NodeOutcome::next());
        }

        let window = self.config.window.unwrap_or(ctx.config.memory_window);
        let messages = std::mem::take(&mut state.messages);
        let trimmed = trim_to_window(messages, &WindowOptions::last(window));

        debug!(
            node = %self.id,
            kept = trimmed.kept.len(),
            pruned = trimmed.pruned.len(),
            "memory compaction finished"
        );

        if self.config.summarize.unwrap_or(true) {
            if let Some(summary) = summarize_pruned(&trimmed.pruned) {
                state.conversation_summary = Some(summary);
            }
        }
        state.messages = trimmed.kept;

        Ok(NodeOutcome::next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::WorkflowConfig;
    use crate::messages::{Message, MessageRole};
    use crate::nodes::test_support::context;
    use serde_json::json;

    fn memory_config(window: usize) -> WorkflowConfig {
        let mut config = WorkflowConfig::new("x", "m");
        config.enable_memory = true;
        config.memory_window = window;
        config
    }

    fn long_state() -> ExecutionState {
        ExecutionState::new(
            "u1",
            "c1",
            vec![
                Message::system("be brief"),
                Message::user("one"),
                Message::assistant("two"),
                Message::user("three"),
                Message::assistant("four"),
                Message::user("five"),
            ],
            Value::Null,
        )
    }

    #[tokio::test]
    async fn prunes_to_window_and_summarizes() {
        let ctx = context(memory_config(3));
        let mut state = long_state();

        MemoryNode::from_config("mem", &Value::Null)
            .unwrap()
            .run(&mut state, &ctx)
            .await
            .unwrap();

        // System message survives, window covers the last user turn onward.
        assert_eq!(state.messages[0].role, MessageRole::System);
        assert_eq!(state.messages[1].content, "three");
        assert!(state.conversation_summary.as_ref().unwrap().contains("one"));
    }

    #[tokio::test]
    async fn zero_window_keeps_system_plus_current_message() {
        let ctx = context(memory_config(0));
        let mut state = long_state();

        MemoryNode::from_config("mem", &Value::Null)
            .unwrap()
            .run(&mut state, &ctx)
            .await
            .unwrap();

        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].role, MessageRole::System);
        assert_eq!(state.messages[1].content, "five");
    }

    #[tokio::test]
    async fn disabled_memory_is_skipped() {
        let mut config = memory_config(1);
        config.enable_memory = false;
        let ctx = context(config);
        let mut state = long_state();

        MemoryNode::from_config("mem", &Value::Null)
            .unwrap()
            .run(&mut state, &ctx)
            .await
            .unwrap();

        assert_eq!(state.messages.len(), 6);
        assert!(state.conversation_summary.is_none());
    }

    #[tokio::test]
    async fn node_window_overrides_run_window() {
        let ctx = context(memory_config(5));
        let mut state = long_state();

        MemoryNode::from_config("mem", &json!({"window": 1}))
            .unwrap()
            .run(&mut state, &ctx)
            .await
            .unwrap();

        // System plus the single-turn window.
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].content, "five");
    }

    #[tokio::test]
    async fn compaction_is_deterministic() {
        let ctx = context(memory_config(3));
        let node = MemoryNode::from_config("mem", &Value::Null).unwrap();

        let mut a = long_state();
        let mut b = long_state();
        node.run(&mut a, &ctx).await.unwrap();
        node.run(&mut b, &ctx).await.unwrap();

        assert_eq!(a.messages, b.messages);
        assert_eq!(a.conversation_summary, b.conversation_summary);
    }
}
