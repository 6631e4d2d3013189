//! Node type catalog
//!
//! The registry is the single authority on node types: which kinds exist,
//! what configuration each accepts, which state fields each touches, and
//! how to construct an instance from validated config. The validator reads
//! config schemas from here, the builder constructs instances through the
//! factories here, and the API's node-types listing is a projection of
//! this catalog. Adding a node kind means registering it here and nowhere
//! else.

use crate::blueprint::NodeSpec;
use crate::error::{Result, WorkflowError};
use crate::nodes::{
    ConditionalNode, DelayNode, ErrorHandlerNode, LoopNode, MemoryNode, ModelNode, RetrievalNode,
    StartNode, ToolNode, VariableNode, WorkflowNode,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Closed set of node types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    /// Entry marker
    Start,
    /// LLM call
    Model,
    /// Tool execution
    Tool,
    /// Vector retrieval
    Retrieval,
    /// History compaction
    Memory,
    /// Branching
    Conditional,
    /// Bounded iteration
    Loop,
    /// Variable manipulation
    Variable,
    /// Timed suspension
    Delay,
    /// Failure capture
    ErrorHandler,
}

impl NodeKind {
    /// Wire string for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Model => "model",
            Self::Tool => "tool",
            Self::Retrieval => "retrieval",
            Self::Memory => "memory",
            Self::Conditional => "conditional",
            Self::Loop => "loop",
            Self::Variable => "variable",
            Self::Delay => "delay",
            Self::ErrorHandler => "error-handler",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broad grouping used by editors and listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeCategory {
    /// Flow control (start, conditional, loop, delay, error-handler)
    Control,
    /// Model interaction (model, memory)
    Model,
    /// State and retrieval (variable, retrieval)
    Data,
    /// External tools
    Tool,
}

/// Expected shape of one config value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigValueKind {
    /// JSON string
    String,
    /// JSON number
    Number,
    /// JSON boolean
    Bool,
    /// Anything
    Any,
}

impl ConfigValueKind {
    /// Whether `value` has this shape
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Any => true,
        }
    }
}

/// One declared config key of a node kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigKey {
    /// Key name in the node's config object
    pub name: String,
    /// Expected value shape
    pub value_kind: ConfigValueKind,
    /// Whether the key must be present
    pub required: bool,
    /// Default applied when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ConfigKey {
    /// Required key
    pub fn required(name: &str, value_kind: ConfigValueKind) -> Self {
        Self {
            name: name.to_string(),
            value_kind,
            required: true,
            default: None,
        }
    }

    /// Optional key
    pub fn optional(name: &str, value_kind: ConfigValueKind) -> Self {
        Self {
            name: name.to_string(),
            value_kind,
            required: false,
            default: None,
        }
    }

    /// Optional key with a default
    pub fn with_default(name: &str, value_kind: ConfigValueKind, default: Value) -> Self {
        Self {
            name: name.to_string(),
            value_kind,
            required: false,
            default: Some(default),
        }
    }
}

/// Factory constructing a node instance from its blueprint id and config
pub type NodeFactory = Arc<dyn Fn(&str, &Value) -> Result<Arc<dyn WorkflowNode>> + Send + Sync>;

/// Full catalog entry for one node kind
#[derive(Clone)]
pub struct NodeDescriptor {
    /// The kind
    pub kind: NodeKind,
    /// Human-readable name
    pub display_name: String,
    /// Listing category
    pub category: NodeCategory,
    /// Declared config keys
    pub config_keys: Vec<ConfigKey>,
    /// State fields this kind reads
    pub reads: Vec<String>,
    /// State fields this kind writes
    pub writes: Vec<String>,
    /// Whether a node of this kind may have no outgoing edges
    pub terminal_allowed: bool,
    /// Instance constructor
    pub factory: NodeFactory,
}

impl std::fmt::Debug for NodeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeDescriptor")
            .field("kind", &self.kind)
            .field("display_name", &self.display_name)
            .field("category", &self.category)
            .field("terminal_allowed", &self.terminal_allowed)
            .finish()
    }
}

impl NodeDescriptor {
    /// Serializable projection for the node-types listing
    pub fn to_type_descriptor(&self) -> NodeTypeDescriptor {
        NodeTypeDescriptor {
            kind: self.kind,
            display_name: self.display_name.clone(),
            category: self.category,
            config_keys: self.config_keys.clone(),
            reads: self.reads.clone(),
            writes: self.writes.clone(),
        }
    }
}

/// Wire projection of a catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeDescriptor {
    /// The kind
    pub kind: NodeKind,
    /// Human-readable name
    pub display_name: String,
    /// Listing category
    pub category: NodeCategory,
    /// Declared config keys
    pub config_keys: Vec<ConfigKey>,
    /// State fields read
    pub reads: Vec<String>,
    /// State fields written
    pub writes: Vec<String>,
}

/// Thread-safe node type catalog
#[derive(Clone, Default)]
pub struct NodeRegistry {
    descriptors: Arc<RwLock<HashMap<NodeKind, NodeDescriptor>>>,
}

impl NodeRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor; fails if the kind is already present
    pub fn register(&self, descriptor: NodeDescriptor) -> Result<()> {
        let mut descriptors = self.descriptors.write();
        if descriptors.contains_key(&descriptor.kind) {
            return Err(WorkflowError::config(format!(
                "node kind '{}' already registered",
                descriptor.kind
            )));
        }
        descriptors.insert(descriptor.kind, descriptor);
        Ok(())
    }

    /// Catalog entry for a kind
    pub fn get(&self, kind: NodeKind) -> Option<NodeDescriptor> {
        self.descriptors.read().get(&kind).cloned()
    }

    /// Whether the kind is registered
    pub fn is_valid(&self, kind: NodeKind) -> bool {
        self.descriptors.read().contains_key(&kind)
    }

    /// Names of the required config keys of a kind
    pub fn required_keys(&self, kind: NodeKind) -> Vec<String> {
        self.get(kind)
            .map(|d| {
                d.config_keys
                    .iter()
                    .filter(|k| k.required)
                    .map(|k| k.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All catalog entries as wire projections, sorted by kind string
    pub fn list(&self) -> Vec<NodeTypeDescriptor> {
        let mut entries: Vec<NodeTypeDescriptor> = self
            .descriptors
            .read()
            .values()
            .map(NodeDescriptor::to_type_descriptor)
            .collect();
        entries.sort_by(|a, b| a.kind.as_str().cmp(b.kind.as_str()));
        entries
    }

    /// Construct the node instance for a blueprint node
    pub fn instantiate(&self, spec: &NodeSpec) -> Result<Arc<dyn WorkflowNode>> {
        let descriptor = self.get(spec.kind).ok_or_else(|| {
            WorkflowError::validation(format!("unknown node kind '{}'", spec.kind))
        })?;
        (descriptor.factory)(&spec.id, &spec.config)
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("kinds", &self.descriptors.read().len())
            .finish()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The authoritative catalog with all built-in node kinds
pub fn default_registry() -> NodeRegistry {
    let registry = NodeRegistry::new();

    let entries = vec![
        NodeDescriptor {
            kind: NodeKind::Start,
            display_name: "Start".into(),
            category: NodeCategory::Control,
            config_keys: vec![],
            reads: vec![],
            writes: vec![],
            terminal_allowed: false,
            factory: Arc::new(|_id, _config| Ok(Arc::new(StartNode) as Arc<dyn WorkflowNode>)),
        },
        NodeDescriptor {
            kind: NodeKind::Model,
            display_name: "Model Call".into(),
            category: NodeCategory::Model,
            config_keys: vec![],
            reads: strings(&["messages"]),
            writes: strings(&["messages", "usageMetadata"]),
            terminal_allowed: true,
            factory: Arc::new(|id, _config| {
                Ok(Arc::new(ModelNode::new(id)) as Arc<dyn WorkflowNode>)
            }),
        },
        NodeDescriptor {
            kind: NodeKind::Tool,
            display_name: "Tool Call".into(),
            category: NodeCategory::Tool,
            config_keys: vec![ConfigKey::with_default(
                "parallel",
                ConfigValueKind::Bool,
                Value::Bool(false),
            )],
            reads: strings(&["messages", "toolCallCount"]),
            writes: strings(&["messages", "toolCallCount"]),
            terminal_allowed: true,
            factory: Arc::new(|id, config| {
                Ok(Arc::new(ToolNode::from_config(id, config)?) as Arc<dyn WorkflowNode>)
            }),
        },
        NodeDescriptor {
            kind: NodeKind::Retrieval,
            display_name: "Retrieval".into(),
            category: NodeCategory::Data,
            config_keys: vec![
                ConfigKey::optional("query", ConfigValueKind::String),
                ConfigKey::with_default("topK", ConfigValueKind::Number, Value::from(4)),
            ],
            reads: strings(&["messages"]),
            writes: strings(&["messages", "retrievalContext"]),
            terminal_allowed: false,
            factory: Arc::new(|id, config| {
                Ok(Arc::new(RetrievalNode::from_config(id, config)?) as Arc<dyn WorkflowNode>)
            }),
        },
        NodeDescriptor {
            kind: NodeKind::Memory,
            display_name: "Memory".into(),
            category: NodeCategory::Model,
            config_keys: vec![
                ConfigKey::optional("window", ConfigValueKind::Number),
                ConfigKey::optional("summarize", ConfigValueKind::Bool),
            ],
            reads: strings(&["messages"]),
            writes: strings(&["messages", "conversationSummary"]),
            terminal_allowed: true,
            factory: Arc::new(|id, config| {
                Ok(Arc::new(MemoryNode::from_config(id, config)?) as Arc<dyn WorkflowNode>)
            }),
        },
        NodeDescriptor {
            kind: NodeKind::Conditional,
            display_name: "Conditional".into(),
            category: NodeCategory::Control,
            config_keys: vec![
                ConfigKey::required("input", ConfigValueKind::String),
                ConfigKey::required("operator", ConfigValueKind::String),
                ConfigKey::optional("value", ConfigValueKind::Any),
            ],
            reads: strings(&["messages", "variables"]),
            writes: strings(&["conditionalResults"]),
            terminal_allowed: false,
            factory: Arc::new(|id, config| {
                Ok(Arc::new(ConditionalNode::from_config(id, config)?) as Arc<dyn WorkflowNode>)
            }),
        },
        NodeDescriptor {
            kind: NodeKind::Loop,
            display_name: "Loop".into(),
            category: NodeCategory::Control,
            config_keys: vec![
                ConfigKey::required("maxIterations", ConfigValueKind::Number),
                ConfigKey::optional("input", ConfigValueKind::String),
                ConfigKey::optional("operator", ConfigValueKind::String),
                ConfigKey::optional("value", ConfigValueKind::Any),
            ],
            reads: strings(&["messages", "variables", "loopState"]),
            writes: strings(&["loopState"]),
            terminal_allowed: false,
            factory: Arc::new(|id, config| {
                Ok(Arc::new(LoopNode::from_config(id, config)?) as Arc<dyn WorkflowNode>)
            }),
        },
        NodeDescriptor {
            kind: NodeKind::Variable,
            display_name: "Variable".into(),
            category: NodeCategory::Data,
            config_keys: vec![
                ConfigKey::required("operation", ConfigValueKind::String),
                ConfigKey::required("name", ConfigValueKind::String),
                ConfigKey::optional("value", ConfigValueKind::Any),
                ConfigKey::optional("from", ConfigValueKind::String),
                ConfigKey::optional("amount", ConfigValueKind::Number),
            ],
            reads: strings(&["messages", "variables"]),
            writes: strings(&["variables"]),
            terminal_allowed: true,
            factory: Arc::new(|id, config| {
                Ok(Arc::new(VariableNode::from_config(id, config)?) as Arc<dyn WorkflowNode>)
            }),
        },
        NodeDescriptor {
            kind: NodeKind::Delay,
            display_name: "Delay".into(),
            category: NodeCategory::Control,
            config_keys: vec![ConfigKey::required("durationMs", ConfigValueKind::Number)],
            reads: vec![],
            writes: vec![],
            terminal_allowed: true,
            factory: Arc::new(|id, config| {
                Ok(Arc::new(DelayNode::from_config(id, config)?) as Arc<dyn WorkflowNode>)
            }),
        },
        NodeDescriptor {
            kind: NodeKind::ErrorHandler,
            display_name: "Error Handler".into(),
            category: NodeCategory::Control,
            config_keys: vec![ConfigKey::optional(
                "fallbackMessage",
                ConfigValueKind::String,
            )],
            reads: strings(&["errorState"]),
            writes: strings(&["messages"]),
            terminal_allowed: true,
            factory: Arc::new(|id, config| {
                Ok(Arc::new(ErrorHandlerNode::from_config(id, config)?) as Arc<dyn WorkflowNode>)
            }),
        },
    ];

    for descriptor in entries {
        registry
            .register(descriptor)
            .expect("built-in kinds are distinct");
    }
    registry
}
