//! Failure capture node
//!
//! When a node in its predecessor subgraph fails, the executor records the
//! failure in `error_state` and routes here instead of failing the run.
//! The handler optionally appends a fallback assistant message, then
//! follows its `on-error` edge (or its single unconditional edge).

use super::{NodeContext, NodeOutcome, WorkflowNode};
use crate::error::{Result, WorkflowError};
use crate::messages::Message;
use crate::registry::NodeKind;
use crate::state::ExecutionState;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

/// Branch label of the recovery edge
pub const BRANCH_ON_ERROR: &str = "on-error";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ErrorHandlerConfig {
    /// Assistant message appended as the recovery response
    fallback_message: Option<String>,
}

/// Recovery step reached only through a captured failure
#[derive(Debug)]
pub struct ErrorHandlerNode {
    id: String,
    config: ErrorHandlerConfig,
}

impl ErrorHandlerNode {
    /// Node with the blueprint node id and validated config
    pub fn from_config(id: impl Into<String>, config: &Value) -> Result<Self> {
        let config = if config.is_null() {
            ErrorHandlerConfig::default()
        } else {
            serde_json::from_value(config.clone())
                .map_err(|e| WorkflowError::validation(format!("error-handler node config: {e}")))?
        };
        Ok(Self {
            id: id.into(),
            config,
        })
    }
}

#[async_trait]
impl WorkflowNode for ErrorHandlerNode {
    fn kind(&self) -> NodeKind {
        NodeKind::ErrorHandler
    }

    async fn run(&self, state: &mut ExecutionState, _ctx: &NodeContext) -> Result<NodeOutcome> {
        if let Some(error) = &state.error_state {
            info!(
                node = %self.id,
                failed_node = %error.node_id,
                kind = %error.kind,
                "handling captured failure"
            );
        }

        if let Some(text) = &self.config.fallback_message {
            let mut message = Message::assistant(text.clone());
            message.ensure_id();
            state.messages.push(message);
        }

        Ok(NodeOutcome::branch(BRANCH_ON_ERROR))
    }
}
