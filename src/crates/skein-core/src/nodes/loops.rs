//! Bounded loop node
//!
//! Maintains a per-node iteration counter in `loop_state`. While the
//! counter is below the declared bound and the optional body condition
//! holds, the node increments and follows its `body` edge; otherwise it
//! follows `exit`. The counter can never pass the bound, and a corrupted
//! counter above the bound fails the run.

use super::conditional::ConditionSpec;
use super::{NodeContext, NodeOutcome, WorkflowNode};
use crate::error::{Result, WorkflowError};
use crate::registry::NodeKind;
use crate::state::ExecutionState;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

/// Branch label re-entering the loop body
pub const BRANCH_BODY: &str = "body";
/// Branch label leaving the loop
pub const BRANCH_EXIT: &str = "exit";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoopNodeConfig {
    /// Iteration bound; zero exits immediately
    max_iterations: u32,
    /// Body condition; absent means "always"
    #[serde(flatten)]
    condition: Option<ConditionSpec>,
}

/// Bounded iteration step
#[derive(Debug)]
pub struct LoopNode {
    id: String,
    config: LoopNodeConfig,
}

impl LoopNode {
    /// Node with the blueprint node id and validated config
    pub fn from_config(id: impl Into<String>, config: &Value) -> Result<Self> {
        let config: LoopNodeConfig = serde_json::from_value(config.clone())
            .map_err(|e| WorkflowError::validation(format!("loop node config: {e}")))?;
        Ok(Self {
            id: id.into(),
            config,
        })
    }
}

#[async_trait]
impl WorkflowNode for LoopNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Loop
    }

    async fn run(&self, state: &mut ExecutionState, _ctx: &NodeContext) -> Result<NodeOutcome> {
        let body_condition = match &self.config.condition {
            Some(spec) => spec.evaluate(state)?,
            None => true,
        };

        let counter = state.loop_counter(&self.id, self.config.max_iterations);
        if counter.iterations > counter.bound {
            return Err(WorkflowError::limit(format!(
                "loop '{}' exceeded its bound of {}",
                self.id, counter.bound
            )));
        }

        if counter.iterations < counter.bound && body_condition {
            counter.iterations += 1;
            Ok(NodeOutcome::branch(BRANCH_BODY))
        } else {
            Ok(NodeOutcome::branch(BRANCH_EXIT))
        }
    }
}
