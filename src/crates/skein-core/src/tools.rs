//! Tool registry port
//!
//! Tools are external capabilities the model can request. The engine only
//! sees this port: schemas to advertise, and an invoke call that either
//! returns a JSON result or a typed error.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema describing one tool to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name
    pub name: String,
    /// What the tool does, for the model's benefit
    pub description: String,
    /// JSON Schema of the arguments object
    pub parameters: Value,
}

impl ToolDefinition {
    /// Definition with an open-ended parameters schema
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    /// Set the parameters schema
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Identity and provenance of one tool invocation
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    /// User on whose behalf the tool runs
    pub user_id: String,
    /// Run that issued the call
    pub run_id: String,
}

/// External tool execution port
///
/// `invoke` failures surface as `WorkflowError::Tool` when the tool itself
/// refuses or errors, and `WorkflowError::Provider` for transport-level
/// failures of the tool runtime.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Schemas of all registered tools
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Whether `name` is registered
    fn contains(&self, name: &str) -> bool;

    /// Execute a tool and return its JSON result
    async fn invoke(&self, name: &str, args: Value, ctx: &ToolInvocation) -> Result<Value>;
}
