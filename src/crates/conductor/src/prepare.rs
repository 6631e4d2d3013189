//! Preparation service
//!
//! Turns a [`WorkflowSource`] plus run config into everything the executor
//! needs: a compiled graph (through the compilation cache), the resolved
//! model handle, the allowlist-filtered tool view and the retriever. This
//! is the only place sources are resolved and collaborators are bound.

use crate::cache::CompilationCache;
use crate::templates::TemplateRegistry;
use async_trait::async_trait;
use dashmap::DashMap;
use skein_core::blueprint::{WorkflowBlueprint, WorkflowConfig, WorkflowSource};
use skein_core::builder::{CompiledGraph, GraphBuilder};
use skein_core::error::{Result, WorkflowError};
use skein_core::llm::LanguageModel;
use skein_core::retriever::Retriever;
use skein_core::stores::DefinitionStore;
use skein_core::tools::{ToolDefinition, ToolInvocation, ToolRegistry};
use std::sync::Arc;
use tracing::debug;

/// Resolves `(provider, model)` pairs to bound model handles
pub trait ModelResolver: Send + Sync {
    /// Handle for the pair, or `ConfigError` when unavailable
    fn resolve(&self, provider: &str, model: &str) -> Result<Arc<dyn LanguageModel>>;
}

/// Map-backed resolver with an optional catch-all handle
#[derive(Default)]
pub struct StaticModelResolver {
    handles: DashMap<(String, String), Arc<dyn LanguageModel>>,
    fallback: Option<Arc<dyn LanguageModel>>,
}

impl StaticModelResolver {
    /// Empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver that answers every pair with `model`
    pub fn single(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            handles: DashMap::new(),
            fallback: Some(model),
        }
    }

    /// Bind a handle for one pair
    pub fn register(&self, provider: &str, model: &str, handle: Arc<dyn LanguageModel>) {
        self.handles
            .insert((provider.to_string(), model.to_string()), handle);
    }
}

impl ModelResolver for StaticModelResolver {
    fn resolve(&self, provider: &str, model: &str) -> Result<Arc<dyn LanguageModel>> {
        if let Some(handle) = self.handles.get(&(provider.to_string(), model.to_string())) {
            return Ok(handle.clone());
        }
        self.fallback.clone().ok_or_else(|| {
            WorkflowError::config(format!("no model handle for {provider}/{model}"))
        })
    }
}

/// Tool view restricted to an allowlist
///
/// Preparation hands this view to the run so filtered tools are invisible
/// to the model; the tool node re-checks the allowlist at invocation as
/// the second layer.
pub struct FilteredToolRegistry {
    inner: Arc<dyn ToolRegistry>,
    allowed: Option<Vec<String>>,
}

impl FilteredToolRegistry {
    /// View of `inner` restricted to `allowed` (None passes everything)
    pub fn new(inner: Arc<dyn ToolRegistry>, allowed: Option<Vec<String>>) -> Self {
        Self { inner, allowed }
    }

    fn permits(&self, name: &str) -> bool {
        match &self.allowed {
            Some(allowed) => allowed.iter().any(|t| t == name),
            None => true,
        }
    }
}

#[async_trait]
impl ToolRegistry for FilteredToolRegistry {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.inner
            .definitions()
            .into_iter()
            .filter(|d| self.permits(&d.name))
            .collect()
    }

    fn contains(&self, name: &str) -> bool {
        self.permits(name) && self.inner.contains(name)
    }

    async fn invoke(
        &self,
        name: &str,
        args: serde_json::Value,
        ctx: &ToolInvocation,
    ) -> Result<serde_json::Value> {
        if !self.permits(name) {
            return Err(WorkflowError::tool(name, "not in the allowed tool list"));
        }
        self.inner.invoke(name, args, ctx).await
    }
}

/// Everything the executor needs to drive one run
pub struct PreparedWorkflow {
    /// Compiled graph, possibly shared through the cache
    pub graph: Arc<CompiledGraph>,
    /// Bound model handle
    pub llm: Arc<dyn LanguageModel>,
    /// Allowlist-filtered tool view
    pub tools: Arc<dyn ToolRegistry>,
    /// Retriever, present only when retrieval is enabled
    pub retriever: Option<Arc<dyn Retriever>>,
    /// Run config (carries the system message)
    pub config: WorkflowConfig,
    /// Stored-source reference for the execution record
    pub blueprint_ref: Option<String>,
}

impl std::fmt::Debug for PreparedWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedWorkflow")
            .field("graph", &self.graph)
            .field("llm", &"Arc<dyn LanguageModel>")
            .field("tools", &"Arc<dyn ToolRegistry>")
            .field("retriever", &self.retriever.is_some())
            .field("config", &self.config)
            .field("blueprint_ref", &self.blueprint_ref)
            .finish()
    }
}

/// Binds sources and collaborators into [`PreparedWorkflow`]s
pub struct PreparationService {
    builder: GraphBuilder,
    cache: CompilationCache,
    templates: TemplateRegistry,
    definitions: Arc<dyn DefinitionStore>,
    models: Arc<dyn ModelResolver>,
    tools: Arc<dyn ToolRegistry>,
    retriever: Option<Arc<dyn Retriever>>,
}

impl PreparationService {
    /// Service over the given collaborators
    pub fn new(
        builder: GraphBuilder,
        cache: CompilationCache,
        templates: TemplateRegistry,
        definitions: Arc<dyn DefinitionStore>,
        models: Arc<dyn ModelResolver>,
        tools: Arc<dyn ToolRegistry>,
        retriever: Option<Arc<dyn Retriever>>,
    ) -> Self {
        Self {
            builder,
            cache,
            templates,
            definitions,
            models,
            tools,
            retriever,
        }
    }

    /// Template catalog used for `template` sources
    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Node registry the builder compiles against
    pub fn registry(&self) -> &skein_core::registry::NodeRegistry {
        self.builder.registry()
    }

    async fn resolve_source(
        &self,
        source: &WorkflowSource,
        user_id: &str,
    ) -> Result<(WorkflowBlueprint, Option<String>)> {
        match source {
            WorkflowSource::Inline { config } => Ok((config.clone(), None)),
            WorkflowSource::Definition { id } => {
                let definition = self
                    .definitions
                    .get(id)
                    .await?
                    .ok_or_else(|| WorkflowError::not_found("definition", id))?;
                if definition.owner_id != user_id {
                    return Err(WorkflowError::unauthorized("definition", id));
                }
                Ok((definition.blueprint, Some(format!("definition:{id}"))))
            }
            WorkflowSource::Template { name, params } => {
                let blueprint = self.templates.expand(name, params)?;
                Ok((blueprint, Some(format!("template:{name}"))))
            }
        }
    }

    /// Resolve, compile and bind one run
    pub async fn prepare(
        &self,
        source: &WorkflowSource,
        config: &WorkflowConfig,
        user_id: &str,
    ) -> Result<PreparedWorkflow> {
        let (blueprint, blueprint_ref) = self.resolve_source(source, user_id).await?;

        let fingerprint = blueprint.fingerprint(config);
        let graph = match self.cache.get(fingerprint) {
            Some(graph) => {
                debug!(fingerprint, "compilation cache hit");
                graph
            }
            None => {
                let compiled = self.builder.compile(&blueprint, config)?;
                self.cache.insert(compiled)
            }
        };

        let llm = self.models.resolve(&config.provider, &config.model)?;
        let tools: Arc<dyn ToolRegistry> = Arc::new(FilteredToolRegistry::new(
            self.tools.clone(),
            config.allowed_tools.clone(),
        ));
        let retriever = if config.enable_retrieval {
            match &self.retriever {
                Some(retriever) => Some(retriever.clone()),
                None => {
                    return Err(WorkflowError::config(
                        "retrieval is enabled but no retriever is configured",
                    ))
                }
            }
        } else {
            None
        };

        Ok(PreparedWorkflow {
            graph,
            llm,
            tools,
            retriever,
            config: config.clone(),
            blueprint_ref,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryDefinitionStore;
    use crate::templates::default_templates;
    use serde_json::json;
    use skein_core::blueprint::{EdgeSpec, NodeSpec};
    use skein_core::registry::{default_registry, NodeKind};
    use skein_core::stores::StoredDefinition;
    use skein_core::testing::{ScriptedModel, StubToolRegistry};

    fn chat_blueprint() -> WorkflowBlueprint {
        WorkflowBlueprint::new("chat")
            .with_node(NodeSpec::new("start", NodeKind::Start))
            .with_node(NodeSpec::new("llm", NodeKind::Model))
            .with_edge(EdgeSpec::new("start", "llm"))
    }

    fn service(definitions: Arc<MemoryDefinitionStore>) -> PreparationService {
        PreparationService::new(
            GraphBuilder::new(default_registry()),
            CompilationCache::new(),
            default_templates(),
            definitions,
            Arc::new(StaticModelResolver::single(Arc::new(
                ScriptedModel::default(),
            ))),
            Arc::new(StubToolRegistry::new().register("search", "find things", |a| Ok(a))),
            None,
        )
    }

    #[tokio::test]
    async fn inline_source_compiles_directly() {
        let service = service(Arc::new(MemoryDefinitionStore::new()));
        let source = WorkflowSource::Inline {
            config: chat_blueprint(),
        };

        let prepared = service
            .prepare(&source, &WorkflowConfig::new("x", "m"), "u1")
            .await
            .unwrap();
        assert_eq!(prepared.graph.start_id, "start");
        assert!(prepared.blueprint_ref.is_none());
    }

    #[tokio::test]
    async fn definition_source_checks_ownership() {
        let definitions = Arc::new(MemoryDefinitionStore::new());
        definitions.insert(StoredDefinition {
            id: "wf-1".into(),
            owner_id: "owner".into(),
            blueprint: chat_blueprint(),
        });
        let service = service(definitions);
        let source = WorkflowSource::Definition { id: "wf-1".into() };
        let config = WorkflowConfig::new("x", "m");

        let prepared = service.prepare(&source, &config, "owner").await.unwrap();
        assert_eq!(prepared.blueprint_ref.as_deref(), Some("definition:wf-1"));

        let err = service.prepare(&source, &config, "intruder").await.unwrap_err();
        assert_eq!(err.kind(), "Unauthorized");

        let missing = WorkflowSource::Definition { id: "ghost".into() };
        let err = service.prepare(&missing, &config, "owner").await.unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[tokio::test]
    async fn template_source_expands_and_tags_the_ref() {
        let service = service(Arc::new(MemoryDefinitionStore::new()));
        let source = WorkflowSource::Template {
            name: "plain-chat".into(),
            params: json!({}),
        };

        let prepared = service
            .prepare(&source, &WorkflowConfig::new("x", "m"), "u1")
            .await
            .unwrap();
        assert_eq!(
            prepared.blueprint_ref.as_deref(),
            Some("template:plain-chat")
        );
    }

    #[tokio::test]
    async fn repeated_preparation_reuses_the_compiled_graph() {
        let service = service(Arc::new(MemoryDefinitionStore::new()));
        let source = WorkflowSource::Inline {
            config: chat_blueprint(),
        };
        let config = WorkflowConfig::new("x", "m");

        let first = service.prepare(&source, &config, "u1").await.unwrap();
        let second = service.prepare(&source, &config, "u1").await.unwrap();
        assert!(Arc::ptr_eq(&first.graph, &second.graph));
    }

    #[tokio::test]
    async fn allowlist_filters_the_tool_view() {
        let service = service(Arc::new(MemoryDefinitionStore::new()));
        let source = WorkflowSource::Inline {
            config: chat_blueprint(),
        };
        let mut config = WorkflowConfig::new("x", "m");
        config.allowed_tools = Some(vec!["other".into()]);

        let prepared = service.prepare(&source, &config, "u1").await.unwrap();
        assert!(prepared.tools.definitions().is_empty());
        assert!(!prepared.tools.contains("search"));
    }

    #[tokio::test]
    async fn retrieval_without_retriever_is_a_config_error() {
        let service = service(Arc::new(MemoryDefinitionStore::new()));
        let source = WorkflowSource::Inline {
            config: chat_blueprint(),
        };
        let mut config = WorkflowConfig::new("x", "m");
        config.enable_retrieval = true;

        let err = service.prepare(&source, &config, "u1").await.unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }
}
