//! Node execution contracts and the built-in node set
//!
//! A node is one typed step in a compiled graph. Instances are constructed
//! at compile time by their registry factory, are stateless across runs,
//! and are invoked once per visit with a mutable borrow of the run's
//! [`ExecutionState`]. A node may only touch the state fields its
//! descriptor declares.
//!
//! Routing works through [`NodeOutcome`]: branching nodes return the label
//! of the edge condition to follow; every other node returns
//! [`NodeOutcome::next`] and the executor takes the unconditional edge.

mod conditional;
mod delay;
mod error_handler;
mod loops;
mod memory;
mod model;
mod retrieval;
mod start;
mod tool;
mod variable;

pub use conditional::{
    ConditionOperator, ConditionSpec, ConditionalNode, BRANCH_FALSE, BRANCH_TRUE,
};
pub use delay::DelayNode;
pub use error_handler::{ErrorHandlerNode, BRANCH_ON_ERROR};
pub use loops::{LoopNode, BRANCH_BODY, BRANCH_EXIT};
pub use memory::MemoryNode;
pub use model::ModelNode;
pub use retrieval::RetrievalNode;
pub use start::StartNode;
pub use tool::ToolNode;
pub use variable::VariableNode;

use crate::blueprint::WorkflowConfig;
use crate::cancel::CancelSignal;
use crate::error::Result;
use crate::events::{EventBus, EventPayload, WorkflowEvent};
use crate::llm::LanguageModel;
use crate::registry::NodeKind;
use crate::retriever::Retriever;
use crate::state::ExecutionState;
use crate::stream::StreamFrame;
use crate::tools::ToolRegistry;
use crate::usage::{TokenAggregator, UsageMetadata};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// What a node visit produced, beyond its state writes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeOutcome {
    /// Edge condition to follow; `None` selects the unconditional edge
    pub branch: Option<String>,
}

impl NodeOutcome {
    /// Follow the unconditional edge
    pub fn next() -> Self {
        Self { branch: None }
    }

    /// Follow the edge whose condition equals `branch`
    pub fn branch(branch: impl Into<String>) -> Self {
        Self {
            branch: Some(branch.into()),
        }
    }
}

/// Per-run resources and emission channels handed to each node visit
///
/// The context is created once per run by the executor. Nodes treat every
/// field as read-only; emission goes through the methods below so the
/// executor stays the only writer of events, frames and usage totals.
#[derive(Clone)]
pub struct NodeContext {
    /// Run id
    pub run_id: String,
    /// Immutable config snapshot for the run
    pub config: WorkflowConfig,
    /// Model handle bound at preparation
    pub llm: Arc<dyn LanguageModel>,
    /// Tool runtime bound at preparation, filtered by the allowlist
    pub tools: Arc<dyn ToolRegistry>,
    /// Retriever view bound at preparation; absent when retrieval is off
    pub retriever: Option<Arc<dyn Retriever>>,
    /// Cancellation signal for the run
    pub cancel: CancelSignal,
    events: EventBus,
    aggregator: Arc<Mutex<TokenAggregator>>,
    frames: Option<mpsc::Sender<StreamFrame>>,
}

impl NodeContext {
    /// Context for a run
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: impl Into<String>,
        config: WorkflowConfig,
        llm: Arc<dyn LanguageModel>,
        tools: Arc<dyn ToolRegistry>,
        retriever: Option<Arc<dyn Retriever>>,
        cancel: CancelSignal,
        events: EventBus,
        aggregator: Arc<Mutex<TokenAggregator>>,
        frames: Option<mpsc::Sender<StreamFrame>>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            config,
            llm,
            tools,
            retriever,
            cancel,
            events,
            aggregator,
            frames,
        }
    }

    /// Whether token frames are being forwarded to a client
    pub fn is_streaming(&self) -> bool {
        self.frames.is_some()
    }

    /// Publish an event on the run's bus
    pub fn publish(&self, payload: EventPayload) {
        self.events.publish(WorkflowEvent::new(&self.run_id, payload));
    }

    /// Forward a frame to the streaming client, when there is one
    pub async fn send_frame(&self, frame: StreamFrame) {
        if let Some(tx) = &self.frames {
            let _ = tx.send(frame).await;
        }
    }

    /// Emit one streamed token: a `TokenChunk` event plus a `token` frame
    pub async fn emit_token(&self, node_id: &str, content: &str) {
        self.publish(EventPayload::TokenChunk {
            node_id: node_id.to_string(),
            content: content.to_string(),
        });
        self.send_frame(StreamFrame::Token {
            content: content.to_string(),
        })
        .await;
    }

    /// Emit a tool-step result: a `ToolInvoked` event plus a `tool` frame
    pub async fn emit_tool(&self, name: &str, ok: bool, summary: &str) {
        self.publish(EventPayload::ToolInvoked {
            name: name.to_string(),
            ok,
            summary: summary.to_string(),
        });
        self.send_frame(StreamFrame::Tool {
            name: name.to_string(),
            ok,
            summary: summary.to_string(),
        })
        .await;
    }

    /// Record one model call's usage.
    ///
    /// Publishes `UsageRecorded`, feeds the run aggregator keyed by the
    /// event id, and forwards a `usage` frame in streaming mode.
    pub async fn record_usage(&self, node_id: &str, usage: UsageMetadata) {
        let event = WorkflowEvent::new(
            &self.run_id,
            EventPayload::UsageRecorded {
                node_id: node_id.to_string(),
                usage,
            },
        );
        self.aggregator.lock().record(&event.id, &usage);
        self.events.publish(event);
        self.send_frame(StreamFrame::Usage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: usage.total(),
        })
        .await;
    }
}

/// One executable step in a compiled graph
#[async_trait]
pub trait WorkflowNode: Send + Sync {
    /// The registry kind this node implements
    fn kind(&self) -> NodeKind;

    /// Execute one visit
    ///
    /// Mutates only the state fields declared by this kind's descriptor
    /// and returns which edge to follow.
    async fn run(&self, state: &mut ExecutionState, ctx: &NodeContext) -> Result<NodeOutcome>;
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Shared fixtures for node unit tests

    use super::*;
    use crate::cancel::cancel_pair;
    use crate::testing::{ScriptedModel, StaticRetriever, StubToolRegistry};
    use serde_json::Value;

    /// Context wired to deterministic stubs and a fresh bus
    pub fn context(config: WorkflowConfig) -> NodeContext {
        context_with(config, ScriptedModel::default(), None)
    }

    /// Context with an explicit model script and optional retriever
    pub fn context_with(
        config: WorkflowConfig,
        model: ScriptedModel,
        retriever: Option<StaticRetriever>,
    ) -> NodeContext {
        let (_handle, signal) = cancel_pair();
        NodeContext::new(
            "run-test",
            config,
            Arc::new(model),
            Arc::new(StubToolRegistry::new()),
            retriever.map(|r| Arc::new(r) as Arc<dyn Retriever>),
            signal,
            EventBus::new(),
            Arc::new(Mutex::new(TokenAggregator::new())),
            None,
        )
    }

    /// Minimal state with one user message
    pub fn state_with_user(message: &str) -> ExecutionState {
        ExecutionState::new(
            "u1",
            "c1",
            vec![crate::messages::Message::user(message)],
            Value::Null,
        )
    }
}
