//! Workflow execution pipeline
//!
//! `conductor` drives the graphs that `skein-core` models: it resolves a
//! workflow source, enforces limits, seeds execution state, walks the
//! compiled graph in unary or streaming mode, aggregates token usage,
//! persists results and publishes lifecycle events to the built-in
//! subscribers.
//!
//! The quickest way in is [`api::WorkflowService`]:
//!
//! ```rust,no_run
//! use conductor::api::WorkflowService;
//! use skein_core::blueprint::{WorkflowConfig, WorkflowInput, WorkflowSource};
//! use skein_core::testing::ScriptedModel;
//! use std::sync::Arc;
//!
//! # async fn example() -> skein_core::Result<()> {
//! let service = WorkflowService::builder()
//!     .with_model(Arc::new(ScriptedModel::default()))
//!     .build();
//!
//! let source = WorkflowSource::Template {
//!     name: "plain-chat".into(),
//!     params: serde_json::json!({}),
//! };
//! let input = WorkflowInput::new("user-1", "hello", WorkflowConfig::new("openai", "gpt-test"));
//! let result = service.execute(&source, input).await?;
//! println!("{}", result.assistant_message.content);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod executor;
pub mod limits;
pub mod prepare;
pub mod pricing;
pub mod result;
pub mod stores;
pub mod subscribers;
pub mod templates;

pub use api::{WorkflowService, WorkflowServiceBuilder};
pub use cache::CompilationCache;
pub use executor::{ExecutorOptions, RetryPolicy, WorkflowExecutor};
pub use limits::{LimitEnforcer, LimitsConfig};
pub use prepare::{ModelResolver, PreparationService, PreparedWorkflow, StaticModelResolver};
pub use pricing::{CostModel, ModelRate, StaticPriceTable};
pub use result::ResultProcessor;
pub use subscribers::{AuditSubscriber, MetricsSnapshot, MetricsSubscriber, PersistenceSubscriber};
pub use templates::{default_templates, TemplateRegistry};
