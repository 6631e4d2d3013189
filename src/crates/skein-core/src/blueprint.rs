//! Workflow description model
//!
//! A [`WorkflowBlueprint`] is the normalized, executable description of a
//! workflow: a set of typed nodes plus directed edges. Blueprints arrive
//! from one of three sources ([`WorkflowSource`]), are validated by the
//! validator, and are compiled into a
//! [`CompiledGraph`](crate::builder::CompiledGraph) for execution.
//!
//! All types here are plain data with a camelCase wire format; behavior
//! lives in the validator, builder and nodes.

use crate::registry::NodeKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// One node in a blueprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    /// Unique id within the blueprint
    pub id: String,
    /// Node type; must be a registry kind
    pub kind: NodeKind,
    /// Type-specific configuration, validated against the registry schema
    #[serde(default)]
    pub config: Value,
}

impl NodeSpec {
    /// Create a node with an empty config
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            config: Value::Null,
        }
    }

    /// Attach configuration
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }
}

/// Directed edge between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeSpec {
    /// Source node id
    pub from: String,
    /// Target node id
    pub to: String,
    /// Branch label for conditional routing; `None` for unconditional edges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Tie-break rank when several conditional edges could match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

impl EdgeSpec {
    /// Unconditional edge
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
            order: None,
        }
    }

    /// Edge taken when the source node selects `condition`
    pub fn conditional(
        from: impl Into<String>,
        to: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: Some(condition.into()),
            order: None,
        }
    }

    /// Set the tie-break rank
    pub fn with_order(mut self, order: u32) -> Self {
        self.order = Some(order);
        self
    }
}

/// Normalized, executable workflow description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowBlueprint {
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Node set; ids unique
    pub nodes: Vec<NodeSpec>,
    /// Edge set; no duplicate (from, to) pairs
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
    /// Free-form metadata
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl WorkflowBlueprint {
    /// Empty blueprint with a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            metadata: Value::Null,
        }
    }

    /// Add a node
    pub fn with_node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add an edge
    pub fn with_edge(mut self, edge: EdgeSpec) -> Self {
        self.edges.push(edge);
        self
    }

    /// Look up a node by id
    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// The single start node, when exactly one exists
    pub fn start_node(&self) -> Option<&NodeSpec> {
        let mut starts = self.nodes.iter().filter(|n| n.kind == NodeKind::Start);
        match (starts.next(), starts.next()) {
            (Some(node), None) => Some(node),
            _ => None,
        }
    }

    /// Outgoing edges of `id`, in declaration order
    pub fn outgoing(&self, id: &str) -> Vec<&EdgeSpec> {
        self.edges.iter().filter(|e| e.from == id).collect()
    }

    /// Stable fingerprint of this blueprint combined with the config shape.
    ///
    /// serde_json serializes object keys in sorted order, so the fingerprint
    /// is independent of field insertion order. Used as the compilation
    /// cache key.
    pub fn fingerprint(&self, config: &WorkflowConfig) -> u64 {
        let mut hasher = DefaultHasher::new();
        serde_json::to_string(self).unwrap_or_default().hash(&mut hasher);
        serde_json::to_string(config).unwrap_or_default().hash(&mut hasher);
        hasher.finish()
    }
}

/// Where a workflow description comes from
///
/// Exactly one of the three variants resolves to a blueprint during
/// preparation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WorkflowSource {
    /// The request carries the blueprint inline
    Inline {
        /// The blueprint itself
        config: WorkflowBlueprint,
    },
    /// A stored definition referenced by id
    Definition {
        /// Definition id
        id: String,
    },
    /// A named template expanded with parameters
    Template {
        /// Template name
        name: String,
        /// Template parameters
        #[serde(default)]
        params: Value,
    },
}

fn default_temperature() -> f32 {
    0.7
}

fn default_memory_window() -> usize {
    20
}

fn default_max_tool_calls() -> u32 {
    10
}

/// Execution parameters for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowConfig {
    /// Provider key, e.g. "openai"
    pub provider: String,
    /// Model name within the provider
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Completion token cap forwarded to the provider
    pub max_tokens: Option<u32>,
    /// Allow tool nodes to execute
    pub enable_tools: bool,
    /// Allow retrieval nodes to execute
    pub enable_retrieval: bool,
    /// Allow the memory node to compact history
    pub enable_memory: bool,
    /// Non-system messages kept by the memory node
    pub memory_window: usize,
    /// Hard cap on tool calls per run
    pub max_tool_calls: u32,
    /// System message installed at preparation
    pub system_message: Option<String>,
    /// Tools the run may invoke; `None` means all registered tools
    pub allowed_tools: Option<Vec<String>>,
    /// Documents the retriever may search; `None` means all owned documents
    pub document_ids: Option<Vec<String>>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            model: String::new(),
            temperature: default_temperature(),
            max_tokens: None,
            enable_tools: false,
            enable_retrieval: false,
            enable_memory: false,
            memory_window: default_memory_window(),
            max_tool_calls: default_max_tool_calls(),
            system_message: None,
            allowed_tools: None,
            document_ids: None,
        }
    }
}

impl WorkflowConfig {
    /// Config for `(provider, model)` with defaults elsewhere
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    /// True when `tool` may be invoked under this config
    pub fn tool_allowed(&self, tool: &str) -> bool {
        match &self.allowed_tools {
            Some(allowed) => allowed.iter().any(|t| t == tool),
            None => true,
        }
    }
}

/// One user request: the message plus everything needed to run it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInput {
    /// Requesting user
    pub user_id: String,
    /// The user's message
    pub message: String,
    /// Conversation to append to; a new one is created when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Execution parameters
    pub config: WorkflowConfig,
    /// Request metadata carried into the run
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl WorkflowInput {
    /// Input for `user_id` saying `message` under `config`
    pub fn new(
        user_id: impl Into<String>,
        message: impl Into<String>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            message: message.into(),
            conversation_id: None,
            config,
            metadata: Value::Null,
        }
    }

    /// Target an existing conversation
    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}
