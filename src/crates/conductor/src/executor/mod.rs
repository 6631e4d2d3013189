//! Workflow executor
//!
//! One pipeline drives both execution modes:
//!
//! ```text
//! Validate -> EnforceLimits -> PublishStart -> Prepare -> InitState
//!          -> RunGraph -> Aggregate -> Persist -> PublishEnd
//! ```
//!
//! Unary and streaming differ only in whether a frame channel is attached:
//! with one, model nodes forward token frames as they arrive; without one,
//! tokens are buffered into the final message. Both modes produce the same
//! [`WorkflowResult`] for the same inputs and collaborator behavior.
//!
//! Failures before `PublishStart` surface without emitting any event; once
//! `ExecutionStarted` is out, exactly one terminal event follows. The
//! error decorator around the inner stages publishes it, enriches the
//! failure log with run id, stage and elapsed time, and maps deadline
//! expiry to `TimeoutError` with a cancelled terminal state.

pub mod retry;

pub use retry::RetryPolicy;

use crate::limits::LimitEnforcer;
use crate::prepare::{PreparationService, PreparedWorkflow};
use crate::result::ResultProcessor;
use futures::Stream;
use parking_lot::Mutex;
use skein_core::blueprint::{WorkflowInput, WorkflowSource};
use skein_core::cancel::{cancel_pair, CancelHandle, CancelSignal};
use skein_core::error::{Result, WorkflowError};
use skein_core::events::{EventBus, EventPayload, WorkflowEvent};
use skein_core::messages::{Message, MessageRole};
use skein_core::nodes::NodeContext;
use skein_core::result::WorkflowResult;
use skein_core::state::{ErrorState, ExecutionState, HistoryEntry};
use skein_core::stores::{ConversationStore, MessageStore};
use skein_core::stream::{NodePhase, StreamFrame};
use skein_core::usage::TokenAggregator;
use skein_core::validator::{validate_blueprint, validate_config, ValidationReport};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tooling::deadline::Deadline;
use tracing::{debug, error};
use uuid::Uuid;

/// Executor tuning knobs
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Retry policy for transient provider failures
    pub retry: RetryPolicy,
    /// Emit `node` trace frames and record execution history
    pub trace_nodes: bool,
}

/// Drives compiled workflows to completion
#[derive(Clone)]
pub struct WorkflowExecutor {
    preparation: Arc<PreparationService>,
    limits: Arc<LimitEnforcer>,
    events: EventBus,
    results: Arc<ResultProcessor>,
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    options: ExecutorOptions,
}

impl WorkflowExecutor {
    /// Executor over the given collaborators
    pub fn new(
        preparation: Arc<PreparationService>,
        limits: Arc<LimitEnforcer>,
        events: EventBus,
        results: Arc<ResultProcessor>,
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            preparation,
            limits,
            events,
            results,
            conversations,
            messages,
            options,
        }
    }

    /// The event bus this executor publishes on
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Execute to completion, returning the canonical result
    pub async fn execute(
        &self,
        source: &WorkflowSource,
        input: WorkflowInput,
    ) -> Result<WorkflowResult> {
        let (_handle, signal) = cancel_pair();
        self.execute_with_signal(source, input, signal).await
    }

    /// Execute with an external cancellation signal
    pub async fn execute_with_signal(
        &self,
        source: &WorkflowSource,
        input: WorkflowInput,
        cancel: CancelSignal,
    ) -> Result<WorkflowResult> {
        let run_id = Uuid::new_v4().to_string();
        self.run_pipeline(run_id, source, input, cancel, None).await
    }

    /// Execute in streaming mode.
    ///
    /// Returns immediately with a cancel handle and the frame sequence:
    /// `start`, then tokens/tools/usage (and `node` frames when tracing),
    /// then exactly one `done` or `error`.
    pub fn execute_stream(
        &self,
        source: WorkflowSource,
        input: WorkflowInput,
    ) -> (CancelHandle, impl Stream<Item = StreamFrame> + Send + Unpin) {
        let (handle, signal) = cancel_pair();
        let (tx, rx) = mpsc::channel(64);
        let executor = self.clone();
        let run_id = Uuid::new_v4().to_string();

        tokio::spawn(async move {
            let _ = tx
                .send(StreamFrame::Start {
                    run_id: run_id.clone(),
                })
                .await;
            let outcome = executor
                .run_pipeline(run_id, &source, input, signal, Some(tx.clone()))
                .await;
            let terminal = match outcome {
                Ok(result) => StreamFrame::Done {
                    result: Box::new(result),
                },
                Err(err) => StreamFrame::error(&err),
            };
            let _ = tx.send(terminal).await;
        });

        (handle, ReceiverStream::new(rx))
    }

    async fn run_pipeline(
        &self,
        run_id: String,
        source: &WorkflowSource,
        input: WorkflowInput,
        cancel: CancelSignal,
        frames: Option<mpsc::Sender<StreamFrame>>,
    ) -> Result<WorkflowResult> {
        let started_at = Instant::now();

        // Validate: nothing is published for requests that never become runs.
        fail_on_issues(validate_config(&input.config))?;
        if let WorkflowSource::Inline { config } = source {
            self.limits.check_blueprint(config)?;
            fail_on_issues(validate_blueprint(config, self.preparation.registry()))?;
        }

        // EnforceLimits: the slot is held for the whole run.
        let _slot = self.limits.admit(&input.user_id).await?;

        // PublishStart.
        let (workflow_label, blueprint_ref) = source_labels(source);
        self.events.publish(WorkflowEvent::new(
            &run_id,
            EventPayload::ExecutionStarted {
                user_id: input.user_id.clone(),
                workflow: workflow_label,
                blueprint_ref,
            },
        ));

        // Everything after the start event runs under the error decorator:
        // exactly one terminal event, failure logs enriched with context.
        let outcome = self
            .run_started(&run_id, started_at, source, &input, cancel, frames)
            .await;

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        match &outcome {
            Ok(result) => {
                self.events.publish(WorkflowEvent::new(
                    &run_id,
                    EventPayload::ExecutionCompleted {
                        totals: skein_core::usage::UsageTotals {
                            prompt_tokens: result.prompt_tokens,
                            completion_tokens: result.completion_tokens,
                            tokens_used: result.tokens_used,
                        },
                        cost: result.cost,
                        elapsed_ms,
                    },
                ));
            }
            Err(err) if err.is_cancellation() => {
                let reason = match err {
                    WorkflowError::Timeout { .. } => "timeout",
                    _ => "cancelled",
                };
                error!(run_id = %run_id, elapsed_ms, reason, "execution cancelled");
                self.events.publish(WorkflowEvent::new(
                    &run_id,
                    EventPayload::ExecutionCancelled {
                        reason: reason.to_string(),
                    },
                ));
            }
            Err(err) => {
                error!(run_id = %run_id, elapsed_ms, kind = err.kind(), error = %err, "execution failed");
                self.events.publish(WorkflowEvent::new(
                    &run_id,
                    EventPayload::ExecutionFailed {
                        error: err.to_report(),
                    },
                ));
            }
        }

        outcome
    }

    async fn run_started(
        &self,
        run_id: &str,
        started_at: Instant,
        source: &WorkflowSource,
        input: &WorkflowInput,
        cancel: CancelSignal,
        frames: Option<mpsc::Sender<StreamFrame>>,
    ) -> Result<WorkflowResult> {
        // Prepare.
        debug!(run_id, stage = "prepare", "resolving workflow source");
        let prepared = self
            .preparation
            .prepare(source, &input.config, &input.user_id)
            .await?;
        self.limits.check_blueprint(&prepared.graph.blueprint)?;

        // InitState.
        debug!(run_id, stage = "init-state", "seeding execution state");
        let conversation = self
            .conversations
            .get_or_create(input.conversation_id.as_deref(), &input.user_id)
            .await?;
        let mut seed = Vec::new();
        let history = self.messages.history(&conversation.id).await?;
        if let Some(system) = &prepared.config.system_message {
            if !history.iter().any(|m| m.role == MessageRole::System) {
                seed.push(Message::system(system.clone()));
            }
        }
        seed.extend(history);
        let mut user_message = Message::user(&input.message);
        user_message.ensure_id();
        seed.push(user_message.clone());

        let mut state = ExecutionState::new(
            &input.user_id,
            &conversation.id,
            seed,
            input.metadata.clone(),
        );

        // RunGraph, with the deadline and external cancel merged into one
        // signal checked at every suspension point.
        let deadline = Deadline::after(self.limits.config().run_deadline);
        let (merged_handle, merged_signal) = cancel_pair();
        let watchdog = tokio::spawn({
            let external = cancel.clone();
            let handle = merged_handle.clone();
            let remaining = deadline
                .remaining()
                .unwrap_or(Duration::from_secs(86_400));
            async move {
                tokio::select! {
                    _ = external.cancelled() => {}
                    _ = tokio::time::sleep(remaining) => {}
                }
                handle.cancel();
            }
        });

        let aggregator = Arc::new(Mutex::new(TokenAggregator::new()));
        let ctx = NodeContext::new(
            run_id,
            prepared.config.clone(),
            prepared.llm.clone(),
            prepared.tools.clone(),
            prepared.retriever.clone(),
            merged_signal,
            self.events.clone(),
            aggregator.clone(),
            frames.clone(),
        );

        let run_outcome = self
            .run_graph(&prepared, &mut state, &ctx, &deadline, started_at, frames)
            .await;
        watchdog.abort();
        run_outcome?;

        // Aggregate.
        let totals = aggregator.lock().totals();
        self.limits.record_usage(&input.user_id, totals.tokens_used);

        // Persist.
        debug!(run_id, stage = "persist", "writing result");
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        self.results
            .process(&state, &user_message, totals, &prepared.config, elapsed_ms)
            .await
    }

    async fn run_graph(
        &self,
        prepared: &PreparedWorkflow,
        state: &mut ExecutionState,
        ctx: &NodeContext,
        deadline: &Deadline,
        started_at: Instant,
        frames: Option<mpsc::Sender<StreamFrame>>,
    ) -> Result<()> {
        let graph = &prepared.graph;
        let mut current = graph.start_id.clone();
        let mut steps = 0u32;

        loop {
            if ctx.cancel.is_cancelled() {
                return Err(self.cancellation_error(deadline, started_at));
            }
            steps += 1;
            let step_cap = self.limits.config().max_steps_per_run;
            if steps > step_cap {
                return Err(WorkflowError::limit(format!(
                    "run exceeded the step cap of {step_cap}"
                )));
            }

            let node = graph.node(&current)?.clone();
            let kind = node.kind.as_str().to_string();
            ctx.publish(EventPayload::NodeStarted {
                node_id: current.clone(),
                kind: kind.clone(),
            });
            if self.options.trace_nodes {
                send_node_frame(&frames, &current, NodePhase::Start).await;
            }

            let visit_start = Instant::now();
            let mut attempt = 0u32;
            let visit = loop {
                match node.instance.run(state, ctx).await {
                    Ok(outcome) => break Ok(outcome),
                    Err(err) if self.options.retry.should_retry(&err, attempt) => {
                        attempt += 1;
                        let delay = self.options.retry.backoff_delay(attempt - 1);
                        debug!(node = %current, attempt, delay_ms = delay.as_millis() as u64, "retrying node after transient provider error");
                        tokio::time::sleep(delay).await;
                    }
                    Err(err) => break Err(err),
                }
            };
            let elapsed_ms = visit_start.elapsed().as_millis() as u64;

            match visit {
                Ok(outcome) => {
                    ctx.publish(EventPayload::NodeCompleted {
                        node_id: current.clone(),
                        kind: kind.clone(),
                        elapsed_ms,
                    });
                    if self.options.trace_nodes {
                        state.push_history(HistoryEntry {
                            node_id: current.clone(),
                            kind,
                            elapsed_ms,
                            outcome: outcome.branch.clone().unwrap_or_else(|| "ok".into()),
                        });
                        send_node_frame(&frames, &current, NodePhase::End).await;
                    }

                    match graph.next_edge(&current, outcome.branch.as_deref())? {
                        Some(edge) => current = edge.to.clone(),
                        None => return Ok(()),
                    }
                }
                Err(err) => {
                    let err = if err.is_cancellation() {
                        self.cancellation_error(deadline, started_at)
                    } else {
                        err
                    };
                    ctx.publish(EventPayload::NodeFailed {
                        node_id: current.clone(),
                        kind: kind.clone(),
                        error: err.to_report(),
                    });
                    if self.options.trace_nodes {
                        state.push_history(HistoryEntry {
                            node_id: current.clone(),
                            kind,
                            elapsed_ms,
                            outcome: "failed".into(),
                        });
                        send_node_frame(&frames, &current, NodePhase::End).await;
                    }

                    if err.is_cancellation() {
                        return Err(err);
                    }
                    if let Some(handler) = graph.error_handler_from(&current) {
                        debug!(failed = %current, handler = %handler, "routing failure to error handler");
                        state.error_state = Some(ErrorState {
                            node_id: current.clone(),
                            kind: err.kind().to_string(),
                            message: err.to_string(),
                        });
                        current = handler;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    fn cancellation_error(&self, deadline: &Deadline, started_at: Instant) -> WorkflowError {
        if deadline.expired() {
            WorkflowError::Timeout {
                elapsed_ms: started_at.elapsed().as_millis() as u64,
            }
        } else {
            WorkflowError::Cancelled
        }
    }
}

fn fail_on_issues(report: ValidationReport) -> Result<()> {
    if report.is_valid() {
        return Ok(());
    }
    let summary = report
        .issues
        .iter()
        .map(|i| format!("{} at {}: {}", i.code, i.path, i.message))
        .collect::<Vec<_>>()
        .join("; ");
    Err(WorkflowError::validation(summary))
}

fn source_labels(source: &WorkflowSource) -> (String, Option<String>) {
    match source {
        WorkflowSource::Inline { config } => {
            let label = if config.name.is_empty() {
                "inline".to_string()
            } else {
                config.name.clone()
            };
            (label, None)
        }
        WorkflowSource::Definition { id } => {
            let label = format!("definition:{id}");
            (label.clone(), Some(label))
        }
        WorkflowSource::Template { name, .. } => {
            let label = format!("template:{name}");
            (label.clone(), Some(label))
        }
    }
}

async fn send_node_frame(
    frames: &Option<mpsc::Sender<StreamFrame>>,
    node: &str,
    phase: NodePhase,
) {
    if let Some(tx) = frames {
        let _ = tx
            .send(StreamFrame::Node {
                name: node.to_string(),
                phase,
            })
            .await;
    }
}
