//! Deterministic collaborator stubs
//!
//! Replay-style fakes for the LLM, tool and retriever ports. They exist so
//! engine behavior can be tested end to end with fully scripted
//! collaborators; replaying the same script yields the same result and the
//! same event sequence modulo timestamps.

use crate::error::{Result, WorkflowError};
use crate::llm::{Completion, CompletionDelta, CompletionRequest, CompletionStream, LanguageModel};
use crate::messages::{Message, ToolCall};
use crate::retriever::{RetrievalFilter, RetrievedChunk, Retriever};
use crate::tools::{ToolDefinition, ToolInvocation, ToolRegistry};
use crate::usage::UsageMetadata;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// One scripted model turn
#[derive(Debug, Clone)]
pub struct ScriptedTurn {
    /// Assistant text for the turn
    pub text: String,
    /// Token split used when streaming; defaults to the whole text at once
    pub tokens: Option<Vec<String>>,
    /// Tool calls the turn requests
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Usage reported for the turn
    pub usage: UsageMetadata,
}

impl ScriptedTurn {
    /// Text turn with the given usage
    pub fn text(text: impl Into<String>, input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            text: text.into(),
            tokens: None,
            tool_calls: None,
            usage: UsageMetadata::new(input_tokens, output_tokens),
        }
    }

    /// Set an explicit streaming token split
    pub fn with_tokens(mut self, tokens: Vec<&str>) -> Self {
        self.tokens = Some(tokens.into_iter().map(String::from).collect());
        self
    }

    /// Request tool calls on this turn
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = Some(tool_calls);
        self
    }
}

impl Default for ScriptedTurn {
    fn default() -> Self {
        Self::text("ok", 1, 1)
    }
}

/// Replay model: pops one scripted turn per call
///
/// When the script runs dry it answers with the default turn, so simple
/// tests need no script at all. Every request is recorded for assertions
/// on what the model actually saw; an optional token delay spaces out
/// streamed tokens so cancellation tests have a deterministic window.
#[derive(Default)]
pub struct ScriptedModel {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<CompletionRequest>>,
    calls: AtomicU32,
    token_delay: Option<std::time::Duration>,
}

impl ScriptedModel {
    /// Model that replays `turns` in order
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            ..Self::default()
        }
    }

    /// Sleep between streamed tokens
    pub fn with_token_delay(mut self, delay: std::time::Duration) -> Self {
        self.token_delay = Some(delay);
        self
    }

    /// Number of calls made so far (complete and stream together)
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests seen so far, in call order
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    fn next_turn(&self, request: &CompletionRequest) -> ScriptedTurn {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        self.turns.lock().pop_front().unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let turn = self.next_turn(&request);
        let mut message = Message::assistant(turn.text);
        if let Some(calls) = turn.tool_calls {
            message.tool_calls = Some(calls);
        }
        Ok(Completion {
            message,
            usage: turn.usage,
        })
    }

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        let turn = self.next_turn(&request);
        let tokens = turn.tokens.unwrap_or_else(|| vec![turn.text.clone()]);
        let tool_calls = turn.tool_calls;
        let usage = turn.usage;
        let delay = self.token_delay;

        let stream = async_stream::stream! {
            for (i, token) in tokens.into_iter().enumerate() {
                if let Some(delay) = delay {
                    if i > 0 {
                        tokio::time::sleep(delay).await;
                    }
                }
                yield Ok(CompletionDelta::Token(token));
            }
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            yield Ok(CompletionDelta::Finish { tool_calls, usage });
        };
        Ok(Box::pin(stream))
    }
}

/// Model that fails a fixed number of times, then delegates
///
/// Exercises the retry policy: failures carry the configured `retryable`
/// flag.
pub struct FlakyModel {
    inner: ScriptedModel,
    failures_left: AtomicU32,
    retryable: bool,
}

impl FlakyModel {
    /// Fail `failures` calls with `retryable`, then behave like `inner`
    pub fn new(inner: ScriptedModel, failures: u32, retryable: bool) -> Self {
        Self {
            inner,
            failures_left: AtomicU32::new(failures),
            retryable,
        }
    }

    fn try_fail(&self) -> Result<()> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(WorkflowError::provider("scripted failure", self.retryable));
        }
        Ok(())
    }
}

#[async_trait]
impl LanguageModel for FlakyModel {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        self.try_fail()?;
        self.inner.complete(request).await
    }

    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream> {
        self.try_fail()?;
        self.inner.stream(request).await
    }
}

type ToolFn = Arc<dyn Fn(Value) -> Result<Value> + Send + Sync>;

/// In-memory tool runtime with closure-backed tools
#[derive(Default)]
pub struct StubToolRegistry {
    tools: HashMap<String, (ToolDefinition, ToolFn)>,
    invocations: Mutex<Vec<(String, Value)>>,
}

impl StubToolRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure-backed tool
    pub fn register<F>(mut self, name: &str, description: &str, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.tools.insert(
            name.to_string(),
            (ToolDefinition::new(name, description), Arc::new(f)),
        );
        self
    }

    /// Recorded invocations in call order
    pub fn invocations(&self) -> Vec<(String, Value)> {
        self.invocations.lock().clone()
    }
}

#[async_trait]
impl ToolRegistry for StubToolRegistry {
    fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|(def, _)| def.clone()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    async fn invoke(&self, name: &str, args: Value, _ctx: &ToolInvocation) -> Result<Value> {
        self.invocations.lock().push((name.to_string(), args.clone()));
        match self.tools.get(name) {
            Some((_, f)) => f(args),
            None => Err(WorkflowError::tool(name, "not registered")),
        }
    }
}

/// Retriever returning a fixed chunk set, honoring the document filter
#[derive(Default)]
pub struct StaticRetriever {
    chunks: Vec<RetrievedChunk>,
    queries: Mutex<Vec<String>>,
}

impl StaticRetriever {
    /// Retriever that always holds `chunks`
    pub fn new(chunks: Vec<RetrievedChunk>) -> Self {
        Self {
            chunks,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Queries seen so far
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn query(&self, text: &str, filter: &RetrievalFilter) -> Result<Vec<RetrievedChunk>> {
        self.queries.lock().push(text.to_string());
        let chunks = self
            .chunks
            .iter()
            .filter(|c| match &filter.document_ids {
                Some(ids) => ids.contains(&c.document_id),
                None => true,
            })
            .cloned()
            .collect();
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolInvocation;
    use serde_json::json;

    #[tokio::test]
    async fn scripted_model_replays_in_order() {
        let model = ScriptedModel::new(vec![
            ScriptedTurn::text("first", 1, 1),
            ScriptedTurn::text("second", 2, 2),
        ]);

        let req = CompletionRequest::new(vec![Message::user("hi")]);
        assert_eq!(model.complete(req.clone()).await.unwrap().message.content, "first");
        assert_eq!(model.complete(req.clone()).await.unwrap().message.content, "second");
        // Script exhausted; default turn.
        assert_eq!(model.complete(req).await.unwrap().message.content, "ok");
        assert_eq!(model.call_count(), 3);
    }

    #[tokio::test]
    async fn flaky_model_recovers_after_failures() {
        let model = FlakyModel::new(ScriptedModel::default(), 2, true);
        let req = CompletionRequest::new(vec![Message::user("hi")]);

        assert!(model.complete(req.clone()).await.is_err());
        assert!(model.complete(req.clone()).await.is_err());
        assert!(model.complete(req).await.is_ok());
    }

    #[tokio::test]
    async fn stub_tools_record_invocations() {
        let tools = StubToolRegistry::new().register("echo", "echoes", |args| Ok(args));
        let ctx = ToolInvocation {
            user_id: "u1".into(),
            run_id: "r1".into(),
        };

        let result = tools.invoke("echo", json!({"x": 1}), &ctx).await.unwrap();
        assert_eq!(result, json!({"x": 1}));
        assert!(tools.invoke("missing", json!({}), &ctx).await.is_err());
        assert_eq!(tools.invocations().len(), 2);
    }

    #[tokio::test]
    async fn static_retriever_applies_document_filter() {
        let retriever = StaticRetriever::new(vec![
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
        ]);

        let filter = RetrievalFilter {
            user_id: "u1".into(),
            document_ids: Some(vec!["d1".into()]),
        };
        let chunks = retriever.query("q", &filter).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].document_id, "d1");
        assert_eq!(retriever.queries(), vec!["q"]);
    }
}
