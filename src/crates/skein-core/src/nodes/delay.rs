//! Timed suspension node

use super::{NodeContext, NodeOutcome, WorkflowNode};
use crate::error::{Result, WorkflowError};
use crate::registry::NodeKind;
use crate::state::ExecutionState;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DelayNodeConfig {
    /// Suspension length
    duration_ms: u64,
}

/// Suspends the run for a declared duration; cancellable mid-sleep
#[derive(Debug)]
pub struct DelayNode {
    id: String,
    config: DelayNodeConfig,
}

impl DelayNode {
    /// Node with the blueprint node id and validated config
    pub fn from_config(id: impl Into<String>, config: &Value) -> Result<Self> {
        let config: DelayNodeConfig = serde_json::from_value(config.clone())
            .map_err(|e| WorkflowError::validation(format!("delay node config: {e}")))?;
        Ok(Self {
            id: id.into(),
            config,
        })
    }
}

#[async_trait]
impl WorkflowNode for DelayNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Delay
    }

    async fn run(&self, _state: &mut ExecutionState, ctx: &NodeContext) -> Result<NodeOutcome> {
        tracing::trace!(node = %self.id, ms = self.config.duration_ms, "delay started");
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(WorkflowError::Cancelled),
            _ = tokio::time::sleep(Duration::from_millis(self.config.duration_ms)) => {
                Ok(NodeOutcome::next())
            }
        }
    }
}
