//! Workflow graph model and execution primitives
//!
//! `skein-core` holds everything a workflow execution engine needs below
//! the pipeline layer:
//!
//! - the blueprint data model ([`blueprint`]) and its single validation
//!   authority ([`validator`])
//! - the node catalog ([`registry`]) and the ten built-in node kinds
//!   ([`nodes`])
//! - compilation of blueprints into executable graphs ([`builder`])
//! - per-run state ([`state`]), lifecycle events ([`events`]), streaming
//!   frames ([`stream`]) and token accounting ([`usage`])
//! - the collaborator ports an engine binds at preparation: language model
//!   ([`llm`]), tools ([`tools`]), retriever ([`retriever`]) and stores
//!   ([`stores`])
//!
//! The pipeline that drives compiled graphs lives in the `conductor`
//! crate; this crate stays transport- and persistence-free.
//!
//! # Example
//!
//! ```rust
//! use skein_core::blueprint::{EdgeSpec, NodeSpec, WorkflowBlueprint, WorkflowConfig};
//! use skein_core::builder::GraphBuilder;
//! use skein_core::registry::{default_registry, NodeKind};
//!
//! let blueprint = WorkflowBlueprint::new("plain-chat")
//!     .with_node(NodeSpec::new("start", NodeKind::Start))
//!     .with_node(NodeSpec::new("llm", NodeKind::Model))
//!     .with_edge(EdgeSpec::new("start", "llm"));
//!
//! let builder = GraphBuilder::new(default_registry());
//! let graph = builder
//!     .compile(&blueprint, &WorkflowConfig::new("openai", "gpt-test"))
//!     .expect("valid blueprint");
//! assert_eq!(graph.start_id, "start");
//! ```

pub mod blueprint;
pub mod builder;
pub mod cancel;
pub mod error;
pub mod events;
pub mod llm;
pub mod messages;
pub mod nodes;
pub mod registry;
pub mod result;
pub mod retriever;
pub mod state;
pub mod stores;
pub mod stream;
pub mod testing;
pub mod tools;
pub mod usage;
pub mod validator;

pub use blueprint::{
    EdgeSpec, NodeSpec, WorkflowBlueprint, WorkflowConfig, WorkflowInput, WorkflowSource,
};
pub use builder::{CompiledGraph, GraphBuilder};
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use error::{ErrorReport, Result, WorkflowError};
pub use events::{CollectingSubscriber, EventBus, EventPayload, EventSubscriber, WorkflowEvent};
pub use messages::{Message, MessageRole, ToolCall};
pub use nodes::{NodeContext, NodeOutcome, WorkflowNode};
pub use registry::{default_registry, NodeKind, NodeRegistry, NodeTypeDescriptor};
pub use result::{ChatResponse, DetailedResponse, ExecutionResponse, WorkflowResult};
pub use state::ExecutionState;
pub use stores::{ExecutionFilter, ExecutionStatus, WorkflowExecution};
pub use stream::{NodePhase, StreamFrame};
pub use usage::{TokenAggregator, UsageMetadata, UsageTotals};
pub use validator::{validate_blueprint, validate_config, ValidationIssue, ValidationReport};
