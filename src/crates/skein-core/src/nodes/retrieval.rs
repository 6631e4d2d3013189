//! Document retrieval node
//!
//! Queries the vector retriever bound at preparation and stores the result
//! in `retrieval_context`, then injects a context-bearing system message so
//! the next model call sees the retrieved material. Skipped entirely when
//! retrieval is disabled for the run.

use super::{NodeContext, NodeOutcome, WorkflowNode};
use crate::error::{Result, WorkflowError};
use crate::messages::Message;
use crate::registry::NodeKind;
use crate::retriever::RetrievalFilter;
use crate::state::{ExecutionState, RetrievalContext};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const MESSAGE_PLACEHOLDER: &str = "{lastMessage}";

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RetrievalNodeConfig {
    /// Query template; `{lastMessage}` expands to the last user message
    query: Option<String>,
    /// Result cap
    top_k: usize,
}

impl Default for RetrievalNodeConfig {
    fn default() -> Self {
        Self {
            query: None,
            top_k: default_top_k(),
        }
    }
}

/// Vector search step
#[derive(Debug)]
pub struct RetrievalNode {
    id: String,
    config: RetrievalNodeConfig,
}

impl RetrievalNode {
    /// Node with the blueprint node id and validated config
    pub fn from_config(id: impl Into<String>, config: &Value) -> Result<Self> {
        let config = if config.is_null() {
            RetrievalNodeConfig::default()
        } else {
            serde_json::from_value(config.clone())
                .map_err(|e| WorkflowError::validation(format!("retrieval node config: {e}")))?
        };
        Ok(Self {
            id: id.into(),
            config,
        })
    }

    fn resolve_query(&self, state: &ExecutionState) -> String {
        let last_user = state
            .last_user_message()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        match &self.config.query {
            Some(template) => template.replace(MESSAGE_PLACEHOLDER, &last_user),
            None => last_user,
        }
    }
}

#[async_trait]
impl WorkflowNode for RetrievalNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Retrieval
    }

    async fn run(&self, state: &mut ExecutionState, ctx: &NodeContext) -> Result<NodeOutcome> {
        if !ctx.config.enable_retrieval {
            return Ok(NodeOutcome::next());
        }
        let retriever = ctx.retriever.as_ref().ok_or_else(|| {
            WorkflowError::config("retrieval is enabled but no retriever is bound")
        })?;

        let query = self.resolve_query(state);
        let filter = RetrievalFilter {
            user_id: state.user_id.clone(),
            document_ids: ctx.config.document_ids.clone(),
        };

        let mut chunks = retriever.query(&query, &filter).await?;
        chunks.truncate(self.config.top_k);
        debug!(node = %self.id, count = chunks.len(), "retrieval finished");

        if !chunks.is_empty() {
            let mut context_text = String::from("Relevant context:\n");
            for chunk in &chunks {
                context_text.push_str("- ");
                context_text.push_str(&chunk.content);
                context_text.push('\n');
            }
            let mut message = Message::system(context_text);
            message.ensure_id();
            // Insert ahead of the trailing user message so the model reads
            // context before the question.
            let at = state
                .messages
                .iter()
                .rposition(|m| m.role == crate::messages::MessageRole::User)
                .unwrap_or(state.messages.len());
            state.messages.insert(at, message);
        }

        state.retrieval_context = Some(RetrievalContext { query, chunks });
        Ok(NodeOutcome::next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::WorkflowConfig;
    use crate::messages::MessageRole;
    use crate::nodes::test_support::{context_with, state_with_user};
    use crate::retriever::RetrievedChunk;
    use crate::testing::{ScriptedModel, StaticRetriever};
    use serde_json::json;

    fn chunks() -> Vec<RetrievedChunk> {
        vec![
            RetrievedChunk {
                document_id: "d1".into(),
                content: "alpha".into(),
                score: 0.9,
            },
            RetrievedChunk {
                document_id: "d2".into(),
                content: "beta".into(),
                score: 0.8,
            },
        ]
    }

    fn rag_config() -> WorkflowConfig {
        let mut config = WorkflowConfig::new("x", "m");
        config.enable_retrieval = true;
        config
    }

    #[tokio::test]
    async fn populates_context_and_injects_system_message() {
        let ctx = context_with(
            rag_config(),
            ScriptedModel::default(),
            Some(StaticRetriever::new(chunks())),
        );
        let mut state = state_with_user("what is alpha?");

        RetrievalNode::from_config("rag", &Value::Null)
            .unwrap()
            .run(&mut state, &ctx)
            .await
            .unwrap();

        let retrieval = state.retrieval_context.as_ref().unwrap();
        assert_eq!(retrieval.query, "what is alpha?");
        assert_eq!(retrieval.chunks.len(), 2);

        // The injected system message lands before the user question.
        assert_eq!(state.messages[0].role, MessageRole::System);
        assert!(state.messages[0].content.contains("alpha"));
        assert_eq!(state.messages[1].role, MessageRole::User);
    }

    #[tokio::test]
    async fn document_filter_narrows_results() {
        let mut config = rag_config();
        config.document_ids = Some(vec!["d1".into()]);
        let ctx = context_with(
            config,
            ScriptedModel::default(),
            Some(StaticRetriever::new(chunks())),
        );
        let mut state = state_with_user("question");

        RetrievalNode::from_config("rag", &Value::Null)
            .unwrap()
            .run(&mut state, &ctx)
            .await
            .unwrap();

        let retrieval = state.retrieval_context.as_ref().unwrap();
        assert_eq!(retrieval.chunks.len(), 1);
        assert_eq!(retrieval.chunks[0].document_id, "d1");
    }

    #[tokio::test]
    async fn disabled_retrieval_is_skipped() {
        let ctx = context_with(
            WorkflowConfig::new("x", "m"),
            ScriptedModel::default(),
            Some(StaticRetriever::new(chunks())),
        );
        let mut state = state_with_user("question");

        RetrievalNode::from_config("rag", &Value::Null)
            .unwrap()
            .run(&mut state, &ctx)
            .await
            .unwrap();

        assert!(state.retrieval_context.is_none());
        assert_eq!(state.messages.len(), 1);
    }

    #[tokio::test]
    async fn query_template_expands_last_message() {
        let ctx = context_with(
            rag_config(),
            ScriptedModel::default(),
            Some(StaticRetriever::new(chunks())),
        );
        let mut state = state_with_user("rust");

        RetrievalNode::from_config("rag", &json!({"query": "docs about {lastMessage}"}))
            .unwrap()
            .run(&mut state, &ctx)
            .await
            .unwrap();

        assert_eq!(
            state.retrieval_context.unwrap().query,
            "docs about rust"
        );
    }

    #[tokio::test]
    async fn missing_retriever_is_a_config_error() {
        let ctx = context_with(rag_config(), ScriptedModel::default(), None);
        let mut state = state_with_user("question");

        let err = RetrievalNode::from_config("rag", &Value::Null)
            .unwrap()
            .run(&mut state, &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ConfigError");
    }
}
