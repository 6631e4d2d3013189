//! Variable manipulation node
//!
//! Reads and writes named keys in the run's `variables` map. Names are
//! accepted in snake or camel case and resolve to the same slot.

use super::{NodeContext, NodeOutcome, WorkflowNode};
use crate::error::{Result, WorkflowError};
use crate::registry::NodeKind;
use crate::state::ExecutionState;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

/// What the node does to its variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum VariableOperation {
    /// Store `value` (or the resolved `from` source)
    Set,
    /// Remove the variable
    Delete,
    /// Add `amount` to a numeric variable, initializing at zero
    Increment,
}

fn default_amount() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariableNodeConfig {
    operation: VariableOperation,
    /// Variable name, snake or camel case
    name: String,
    /// Literal value for `set`
    #[serde(default)]
    value: Option<Value>,
    /// Source selector for `set`: `lastMessage` or `variables.<name>`
    #[serde(default)]
    from: Option<String>,
    /// Step for `increment`
    #[serde(default = "default_amount")]
    amount: f64,
}

/// Variable read/write step
#[derive(Debug)]
pub struct VariableNode {
    id: String,
    config: VariableNodeConfig,
}

impl VariableNode {
    /// Node with the blueprint node id and validated config
    pub fn from_config(id: impl Into<String>, config: &Value) -> Result<Self> {
        let config: VariableNodeConfig = serde_json::from_value(config.clone())
            .map_err(|e| WorkflowError::validation(format!("variable node config: {e}")))?;
        Ok(Self {
            id: id.into(),
            config,
        })
    }

    fn resolve_source(&self, state: &ExecutionState) -> Value {
        match self.config.from.as_deref() {
            Some("lastMessage") => state
                .messages
                .last()
                .map(|m| Value::String(m.content.clone()))
                .unwrap_or(Value::Null),
            Some(source) => source
                .strip_prefix("variables.")
                .and_then(|name| state.variable(name).cloned())
                .unwrap_or(Value::Null),
            None => self.config.value.clone().unwrap_or(Value::Null),
        }
    }
}

#[async_trait]
impl WorkflowNode for VariableNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Variable
    }

    async fn run(&self, state: &mut ExecutionState, _ctx: &NodeContext) -> Result<NodeOutcome> {
        match self.config.operation {
            VariableOperation::Set => {
                let value = self.resolve_source(state);
                state.set_variable(&self.config.name, value);
            }
            VariableOperation::Delete => {
                state.remove_variable(&self.config.name);
            }
            VariableOperation::Increment => {
                let current = state
                    .variable(&self.config.name)
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                state.set_variable(&self.config.name, json!(current + self.config.amount));
            }
        }
        tracing::trace!(node = %self.id, name = %self.config.name, "variable updated");
        Ok(NodeOutcome::next())
    }
}
