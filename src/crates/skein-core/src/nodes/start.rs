//! Entry marker node

use super::{NodeContext, NodeOutcome, WorkflowNode};
use crate::error::Result;
use crate::registry::NodeKind;
use crate::state::ExecutionState;
use async_trait::async_trait;

/// No-op node marking where execution begins
///
/// Every blueprint has exactly one; the validator enforces it.
#[derive(Debug, Default)]
pub struct StartNode;

#[async_trait]
impl WorkflowNode for StartNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Start
    }

    async fn run(&self, _state: &mut ExecutionState, _ctx: &NodeContext) -> Result<NodeOutcome> {
        Ok(NodeOutcome::next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::WorkflowConfig;
    use crate::nodes::test_support::{context, state_with_user};

    #[tokio::test]
    async fn start_is_a_no_op() {
        let node = StartNode;
        let mut state = state_with_user("hi");
        let before = state.clone();

        let outcome = node
            .run(&mut state, &context(WorkflowConfig::new("x", "m")))
            .await
            .unwrap();

        assert_eq!(outcome, NodeOutcome::next());
        assert_eq!(state.messages, before.messages);
    }
}
