//! Per-run execution state
//!
//! One [`ExecutionState`] is created per run and owned by the executor.
//! Nodes receive it by mutable reference for the duration of a single visit
//! and may only touch the fields their registry descriptor declares.
//!
//! Optional fields stay unallocated until first written, so a plain chat
//! run carries nothing beyond the message list and identifiers.

use crate::messages::Message;
use crate::retriever::RetrievedChunk;
use crate::usage::UsageMetadata;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Retrieval output captured in state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalContext {
    /// Query sent to the retriever
    pub query: String,
    /// Chunks returned, best first
    pub chunks: Vec<RetrievedChunk>,
}

/// Loop progress for one loop node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopCounter {
    /// Completed iterations
    pub iterations: u32,
    /// Declared bound
    pub bound: u32,
}

/// Failure captured by an error-handler node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorState {
    /// Node whose failure was captured
    pub node_id: String,
    /// Error kind string from the taxonomy
    pub kind: String,
    /// Failure message
    pub message: String,
}

/// One node visit, recorded when tracing is enabled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Visited node id
    pub node_id: String,
    /// Node kind string
    pub kind: String,
    /// Visit duration
    pub elapsed_ms: u64,
    /// "ok", "failed" or the selected branch label
    pub outcome: String,
}

/// Normalize a user-declared variable name to snake_case.
///
/// Workflow authors write variable names in either snake or camel case;
/// both resolve to the same slot.
pub fn normalize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    let mut prev_lower = false;
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else {
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
            out.push(ch);
        }
    }
    out
}

/// Mutable context threaded through a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    /// Conversation so far, oldest first
    pub messages: Vec<Message>,
    /// Run owner
    pub user_id: String,
    /// Conversation the run belongs to
    pub conversation_id: String,
    /// Request metadata
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
    /// Tool calls executed so far in this run
    #[serde(default)]
    pub tool_call_count: u32,
    /// Output of the most recent retrieval node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_context: Option<RetrievalContext>,
    /// Summary produced by the memory node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_summary: Option<String>,
    /// User-declared variables, keys normalized to snake_case
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<HashMap<String, Value>>,
    /// Per-loop-node progress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_state: Option<HashMap<String, LoopCounter>>,
    /// Branch chosen by each conditional node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional_results: Option<HashMap<String, String>>,
    /// Failure captured by an error-handler node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_state: Option<ErrorState>,
    /// Node visit trace, when enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_history: Option<Vec<HistoryEntry>>,
    /// Usage of the most recent model call; overwritten each call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
}

impl ExecutionState {
    /// Fresh state for a run
    pub fn new(
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        messages: Vec<Message>,
        metadata: Value,
    ) -> Self {
        Self {
            messages,
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            metadata,
            tool_call_count: 0,
            retrieval_context: None,
            conversation_summary: None,
            variables: None,
            loop_state: None,
            conditional_results: None,
            error_state: None,
            execution_history: None,
            usage_metadata: None,
        }
    }

    /// Variable value for a snake- or camel-case name
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.as_ref()?.get(&normalize_key(name))
    }

    /// Set a variable, allocating the map on first write
    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.variables
            .get_or_insert_with(HashMap::new)
            .insert(normalize_key(name), value);
    }

    /// Remove a variable; true when it existed
    pub fn remove_variable(&mut self, name: &str) -> bool {
        match self.variables.as_mut() {
            Some(vars) => vars.remove(&normalize_key(name)).is_some(),
            None => false,
        }
    }

    /// Loop counter for `node_id`, created at zero with `bound` on first use
    pub fn loop_counter(&mut self, node_id: &str, bound: u32) -> &mut LoopCounter {
        self.loop_state
            .get_or_insert_with(HashMap::new)
            .entry(node_id.to_string())
            .or_insert(LoopCounter {
                iterations: 0,
                bound,
            })
    }

    /// Record the branch a conditional node selected
    pub fn record_branch(&mut self, node_id: &str, branch: impl Into<String>) {
        self.conditional_results
            .get_or_insert_with(HashMap::new)
            .insert(node_id.to_string(), branch.into());
    }

    /// Append a visit to the trace
    pub fn push_history(&mut self, entry: HistoryEntry) {
        self.execution_history
            .get_or_insert_with(Vec::new)
            .push(entry);
    }

    /// The most recent assistant message, if any
    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::messages::MessageRole::Assistant)
    }

    /// The most recent user message, if any
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::messages::MessageRole::User)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_fields_start_unallocated() {
        let state = ExecutionState::new("u1", "c1", vec![], Value::Null);
        assert!(state.variables.is_none());
        assert!(state.loop_state.is_none());
        assert!(state.conditional_results.is_none());
        assert!(state.retrieval_context.is_none());
        assert!(state.execution_history.is_none());
        assert_eq!(state.tool_call_count, 0);
    }

    #[test]
    fn variable_names_tolerate_both_cases() {
        let mut state = ExecutionState::new("u1", "c1", vec![], Value::Null);
        state.set_variable("retryCount", json!(3));

        assert_eq!(state.variable("retry_count"), Some(&json!(3)));
        assert_eq!(state.variable("retryCount"), Some(&json!(3)));

        state.set_variable("retry_count", json!(4));
        assert_eq!(state.variable("retryCount"), Some(&json!(4)));

        assert!(state.remove_variable("retryCount"));
        assert!(state.variable("retry_count").is_none());
    }

    #[test]
    fn normalize_key_handles_mixed_forms() {
        assert_eq!(normalize_key("retryCount"), "retry_count");
        assert_eq!(normalize_key("retry_count"), "retry_count");
        assert_eq!(normalize_key("userId2"), "user_id2");
        assert_eq!(normalize_key("plain"), "plain");
    }

    #[test]
    fn loop_counter_is_created_once() {
        let mut state = ExecutionState::new("u1", "c1", vec![], Value::Null);
        state.loop_counter("loop1", 5).iterations += 1;
        state.loop_counter("loop1", 99).iterations += 1;

        let counter = state.loop_counter("loop1", 5);
        assert_eq!(counter.iterations, 2);
        assert_eq!(counter.bound, 5);
    }

    #[test]
    fn branch_results_accumulate_per_node() {
        let mut state = ExecutionState::new("u1", "c1", vec![], Value::Null);
        state.record_branch("cond1", "true");
        state.record_branch("cond2", "false");

        let results = state.conditional_results.as_ref().unwrap();
        assert_eq!(results["cond1"], "true");
        assert_eq!(results["cond2"], "false");
    }

    #[test]
    fn last_message_helpers_scan_backwards() {
        let state = ExecutionState::new(
            "u1",
            "c1",
            vec![
                Message::user("first"),
                Message::assistant("reply"),
                Message::user("second"),
            ],
            Value::Null,
        );
        assert_eq!(state.last_user_message().unwrap().content, "second");
        assert_eq!(state.last_assistant_message().unwrap().content, "reply");
    }
}
