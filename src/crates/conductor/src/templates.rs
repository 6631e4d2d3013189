//! Named workflow templates
//!
//! A template is a parameterized blueprint generator identified by name.
//! Templates register programmatically (closures) or load from YAML files
//! as static blueprints; `expand` resolves a name and parameter object to
//! a concrete blueprint for compilation.

use parking_lot::RwLock;
use serde_json::Value;
use skein_core::blueprint::{EdgeSpec, NodeSpec, WorkflowBlueprint};
use skein_core::error::{Result, WorkflowError};
use skein_core::registry::NodeKind;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Generator producing a blueprint from template parameters
pub type TemplateFn = Arc<dyn Fn(&Value) -> Result<WorkflowBlueprint> + Send + Sync>;

#[derive(Clone)]
enum TemplateEntry {
    Generator(TemplateFn),
    Fixed(WorkflowBlueprint),
}

/// Thread-safe template catalog
#[derive(Clone, Default)]
pub struct TemplateRegistry {
    templates: Arc<RwLock<HashMap<String, TemplateEntry>>>,
}

impl TemplateRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a generator template; fails on a duplicate name
    pub fn register<F>(&self, name: impl Into<String>, generator: F) -> Result<()>
    where
        F: Fn(&Value) -> Result<WorkflowBlueprint> + Send + Sync + 'static,
    {
        self.insert(name.into(), TemplateEntry::Generator(Arc::new(generator)))
    }

    /// Register a fixed blueprint as a template
    pub fn register_fixed(
        &self,
        name: impl Into<String>,
        blueprint: WorkflowBlueprint,
    ) -> Result<()> {
        self.insert(name.into(), TemplateEntry::Fixed(blueprint))
    }

    /// Load a fixed blueprint template from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(&self, name: impl Into<String>, path: P) -> Result<()> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            WorkflowError::config(format!(
                "cannot read template file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let blueprint: WorkflowBlueprint = serde_yaml::from_str(&text)
            .map_err(|e| WorkflowError::config(format!("invalid template YAML: {e}")))?;
        self.register_fixed(name, blueprint)
    }

    fn insert(&self, name: String, entry: TemplateEntry) -> Result<()> {
        let mut templates = self.templates.write();
        if templates.contains_key(&name) {
            return Err(WorkflowError::config(format!(
                "template '{name}' already registered"
            )));
        }
        templates.insert(name, entry);
        Ok(())
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.templates.read().contains_key(name)
    }

    /// Registered template names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve a template name and parameters to a blueprint
    pub fn expand(&self, name: &str, params: &Value) -> Result<WorkflowBlueprint> {
        let entry = self
            .templates
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| WorkflowError::not_found("template", name))?;
        match entry {
            TemplateEntry::Generator(generator) => generator(params),
            TemplateEntry::Fixed(blueprint) => Ok(blueprint),
        }
    }
}

impl std::fmt::Debug for TemplateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRegistry")
            .field("templates", &self.names())
            .finish()
    }
}

/// Registry with the built-in templates: `plain-chat`, `rag`, `tool-agent`
pub fn default_templates() -> TemplateRegistry {
    let registry = TemplateRegistry::new();

    registry
        .register("plain-chat", |_params| {
            Ok(WorkflowBlueprint::new("plain-chat")
                .with_node(NodeSpec::new("start", NodeKind::Start))
                .with_node(NodeSpec::new("respond", NodeKind::Model))
                .with_edge(EdgeSpec::new("start", "respond")))
        })
        .expect("fresh registry");

    registry
        .register("rag", |params| {
            let mut retrieval_config = serde_json::Map::new();
            if let Some(top_k) = params.get("topK") {
                if !top_k.is_number() {
                    return Err(WorkflowError::validation("rag template: topK must be a number"));
                }
                retrieval_config.insert("topK".into(), top_k.clone());
            }
            if let Some(query) = params.get("query") {
                retrieval_config.insert("query".into(), query.clone());
            }
            Ok(WorkflowBlueprint::new("rag")
                .with_node(NodeSpec::new("start", NodeKind::Start))
                .with_node(
                    NodeSpec::new("retrieve", NodeKind::Retrieval)
                        .with_config(Value::Object(retrieval_config)),
                )
                .with_node(NodeSpec::new("respond", NodeKind::Model))
                .with_edge(EdgeSpec::new("start", "retrieve"))
                .with_edge(EdgeSpec::new("retrieve", "respond")))
        })
        .expect("fresh registry");

    registry
        .register("tool-agent", |params| {
            let parallel = params
                .get("parallel")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            Ok(WorkflowBlueprint::new("tool-agent")
                .with_node(NodeSpec::new("start", NodeKind::Start))
                .with_node(NodeSpec::new("plan", NodeKind::Model))
                .with_node(
                    NodeSpec::new("act", NodeKind::Tool)
                        .with_config(serde_json::json!({"parallel": parallel})),
                )
                .with_node(NodeSpec::new("respond", NodeKind::Model))
                .with_edge(EdgeSpec::new("start", "plan"))
                .with_edge(EdgeSpec::new("plan", "act"))
                .with_edge(EdgeSpec::new("act", "respond")))
        })
        .expect("fresh registry");

    registry
}
