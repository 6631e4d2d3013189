//! Transport-agnostic control surface
//!
//! [`WorkflowService`] is the callable API of the engine: execute in
//! either mode, validate blueprints, list node types, and read persisted
//! executions. HTTP/SSE/gRPC layers shape these calls; none of them add
//! behavior.
//!
//! [`WorkflowServiceBuilder`] wires the default in-memory engine: memory
//! stores, the built-in node registry and templates, the static price
//! table and the three built-in subscribers. Every collaborator can be
//! swapped before `build`. Building requires a running tokio runtime (the
//! persistence subscriber spawns its worker).

use crate::cache::CompilationCache;
use crate::executor::{ExecutorOptions, WorkflowExecutor};
use crate::limits::{LimitEnforcer, LimitsConfig};
use crate::prepare::{ModelResolver, PreparationService, StaticModelResolver};
use crate::pricing::{CostModel, StaticPriceTable};
use crate::result::ResultProcessor;
use crate::stores::{
    MemoryConversationStore, MemoryDefinitionStore, MemoryExecutionStore, MemoryMessageStore,
};
use crate::subscribers::{
    AuditSubscriber, MetricsSnapshot, MetricsSubscriber, PersistenceSubscriber,
};
use crate::templates::{default_templates, TemplateRegistry};
use async_trait::async_trait;
use futures::Stream;
use skein_core::blueprint::{WorkflowBlueprint, WorkflowInput, WorkflowSource};
use skein_core::builder::GraphBuilder;
use skein_core::cancel::CancelHandle;
use skein_core::error::{Result, WorkflowError};
use skein_core::events::{EventBus, EventSubscriber};
use skein_core::llm::LanguageModel;
use skein_core::registry::{default_registry, NodeRegistry, NodeTypeDescriptor};
use skein_core::result::WorkflowResult;
use skein_core::retriever::Retriever;
use skein_core::stores::{
    ConversationStore, DefinitionStore, ExecutionFilter, ExecutionStore, MessageStore,
    WorkflowExecution,
};
use skein_core::stream::StreamFrame;
use skein_core::tools::{ToolDefinition, ToolInvocation, ToolRegistry};
use skein_core::validator::{validate_blueprint, ValidationReport};
use std::sync::Arc;

/// Tool registry with nothing in it; the builder default
struct EmptyToolRegistry;

#[async_trait]
impl ToolRegistry for EmptyToolRegistry {
    fn definitions(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    fn contains(&self, _name: &str) -> bool {
        false
    }

    async fn invoke(
        &self,
        name: &str,
        _args: serde_json::Value,
        _ctx: &ToolInvocation,
    ) -> Result<serde_json::Value> {
        Err(WorkflowError::tool(name, "no tool registry configured"))
    }
}

/// The engine's callable surface
#[derive(Clone)]
pub struct WorkflowService {
    executor: WorkflowExecutor,
    registry: NodeRegistry,
    executions: Arc<dyn ExecutionStore>,
    persistence: Arc<PersistenceSubscriber>,
    metrics: Arc<MetricsSubscriber>,
}

impl WorkflowService {
    /// Start building a service with default in-memory wiring
    pub fn builder() -> WorkflowServiceBuilder {
        WorkflowServiceBuilder::default()
    }

    /// Execute a workflow to completion (unary mode)
    pub async fn execute(
        &self,
        source: &WorkflowSource,
        input: WorkflowInput,
    ) -> Result<WorkflowResult> {
        self.executor.execute(source, input).await
    }

    /// Execute unary with an external cancellation signal
    pub async fn execute_with_cancel(
        &self,
        source: &WorkflowSource,
        input: WorkflowInput,
        cancel: skein_core::cancel::CancelSignal,
    ) -> Result<WorkflowResult> {
        self.executor.execute_with_signal(source, input, cancel).await
    }

    /// Execute a workflow in streaming mode
    pub fn execute_stream(
        &self,
        source: WorkflowSource,
        input: WorkflowInput,
    ) -> (CancelHandle, impl Stream<Item = StreamFrame> + Send + Unpin) {
        self.executor.execute_stream(source, input)
    }

    /// Validate a blueprint without executing it
    pub fn validate(&self, blueprint: &WorkflowBlueprint) -> ValidationReport {
        validate_blueprint(blueprint, &self.registry)
    }

    /// The node-type catalog projection
    pub fn list_node_types(&self) -> Vec<NodeTypeDescriptor> {
        self.registry.list()
    }

    /// Fetch a persisted execution record
    pub async fn get_execution(&self, id: &str) -> Result<Option<WorkflowExecution>> {
        // Read-your-writes: let the persistence queue drain first.
        self.persistence.flush().await;
        self.executions.get(id).await
    }

    /// List persisted execution records
    pub async fn list_executions(
        &self,
        filter: &ExecutionFilter,
    ) -> Result<Vec<WorkflowExecution>> {
        self.persistence.flush().await;
        self.executions.list(filter).await
    }

    /// Current metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The engine's event bus, for additional subscribers
    pub fn events(&self) -> &EventBus {
        self.executor.events()
    }
}

/// Builder assembling a [`WorkflowService`]
pub struct WorkflowServiceBuilder {
    registry: NodeRegistry,
    templates: TemplateRegistry,
    limits: LimitsConfig,
    options: ExecutorOptions,
    cost_model: Arc<dyn CostModel>,
    models: Arc<dyn ModelResolver>,
    tools: Arc<dyn ToolRegistry>,
    retriever: Option<Arc<dyn Retriever>>,
    definitions: Arc<dyn DefinitionStore>,
    executions: Arc<dyn ExecutionStore>,
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    extra_subscribers: Vec<Arc<dyn EventSubscriber>>,
}

impl Default for WorkflowServiceBuilder {
    fn default() -> Self {
        Self {
            registry: default_registry(),
            templates: default_templates(),
            limits: LimitsConfig::default(),
            options: ExecutorOptions::default(),
            cost_model: Arc::new(StaticPriceTable::with_defaults()),
            models: Arc::new(StaticModelResolver::new()),
            tools: Arc::new(EmptyToolRegistry),
            retriever: None,
            definitions: Arc::new(MemoryDefinitionStore::new()),
            executions: Arc::new(MemoryExecutionStore::new()),
            conversations: Arc::new(MemoryConversationStore::new()),
            messages: Arc::new(MemoryMessageStore::new()),
            extra_subscribers: Vec::new(),
        }
    }
}

impl WorkflowServiceBuilder {
    /// Answer every provider/model pair with one handle
    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.models = Arc::new(StaticModelResolver::single(model));
        self
    }

    /// Use a custom model resolver
    pub fn with_model_resolver(mut self, models: Arc<dyn ModelResolver>) -> Self {
        self.models = models;
        self
    }

    /// Use a tool registry
    pub fn with_tools(mut self, tools: Arc<dyn ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    /// Use a retriever
    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Use a definition store
    pub fn with_definitions(mut self, definitions: Arc<dyn DefinitionStore>) -> Self {
        self.definitions = definitions;
        self
    }

    /// Use an execution store
    pub fn with_executions(mut self, executions: Arc<dyn ExecutionStore>) -> Self {
        self.executions = executions;
        self
    }

    /// Use a conversation store
    pub fn with_conversations(mut self, conversations: Arc<dyn ConversationStore>) -> Self {
        self.conversations = conversations;
        self
    }

    /// Use a message store
    pub fn with_messages(mut self, messages: Arc<dyn MessageStore>) -> Self {
        self.messages = messages;
        self
    }

    /// Replace the limit settings
    pub fn with_limits(mut self, limits: LimitsConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Replace the executor options
    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the cost model
    pub fn with_cost_model(mut self, cost_model: Arc<dyn CostModel>) -> Self {
        self.cost_model = cost_model;
        self
    }

    /// Replace the template catalog
    pub fn with_templates(mut self, templates: TemplateRegistry) -> Self {
        self.templates = templates;
        self
    }

    /// Register an additional event subscriber
    pub fn with_subscriber(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.extra_subscribers.push(subscriber);
        self
    }

    /// Assemble the service; must run on a tokio runtime
    pub fn build(self) -> WorkflowService {
        let events = EventBus::new();

        let persistence = Arc::new(PersistenceSubscriber::new(self.executions.clone()));
        let metrics = Arc::new(MetricsSubscriber::new());
        events.subscribe(persistence.clone());
        events.subscribe(metrics.clone());
        events.subscribe(Arc::new(AuditSubscriber::new()));
        for subscriber in self.extra_subscribers {
            events.subscribe(subscriber);
        }

        let preparation = Arc::new(PreparationService::new(
            GraphBuilder::new(self.registry.clone()),
            CompilationCache::new(),
            self.templates,
            self.definitions,
            self.models,
            self.tools,
            self.retriever,
        ));
        let results = Arc::new(ResultProcessor::new(
            self.messages.clone(),
            self.conversations.clone(),
            self.cost_model,
        ));
        let executor = WorkflowExecutor::new(
            preparation,
            Arc::new(LimitEnforcer::new(self.limits)),
            events,
            results,
            self.conversations,
            self.messages,
            self.options,
        );

        WorkflowService {
            executor,
            registry: self.registry,
            executions: self.executions,
            persistence,
            metrics,
        }
    }
}
