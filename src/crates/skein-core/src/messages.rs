//! Chat message model and history utilities
//!
//! Messages are the unit of conversation state threaded through a run. The
//! model is deliberately small: a role, text content, optional tool-call
//! requests on assistant messages, and a `tool_call_id` linking tool-result
//! messages back to the request that produced them.
//!
//! The trimming helpers at the bottom back the memory node: they fit a
//! history into a message window while preserving role boundaries, so a
//! pruned history never starts with a dangling tool result or assistant
//! turn.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Role of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instruction
    System,
    /// End-user message
    User,
    /// Model output
    Assistant,
    /// Tool result
    Tool,
}

/// A tool call requested by an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back on the result message
    pub id: String,
    /// Tool name
    pub name: String,
    /// JSON arguments
    pub arguments: Value,
}

impl ToolCall {
    /// Create a tool call with a fresh id
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            arguments,
        }
    }
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Stable id; assigned lazily via [`Message::ensure_id`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Message role
    pub role: MessageRole,
    /// Text content
    pub content: String,
    /// Tool calls requested by an assistant message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// For tool-result messages, the id of the call being answered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Free-form metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Message {
    /// Create a message with the given role and content
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            metadata: None,
        }
    }

    /// System message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// User message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Tool-result message answering `tool_call_id`
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        let mut msg = Self::new(MessageRole::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Attach an explicit id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach tool-call requests
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = Some(tool_calls);
        self
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Assign a fresh id when none is set
    pub fn ensure_id(&mut self) {
        if self.id.is_none() {
            self.id = Some(Uuid::new_v4().to_string());
        }
    }

    /// Tool calls requested by this message, empty when none
    pub fn requested_tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }
}

/// Last message regardless of role
pub fn last_message(messages: &[Message]) -> Option<&Message> {
    messages.last()
}

/// Last message with the given role
pub fn last_message_of_role(messages: &[Message], role: MessageRole) -> Option<&Message> {
    messages.iter().rev().find(|m| m.role == role)
}

/// Options controlling [`trim_to_window`]
#[derive(Debug, Clone)]
pub struct WindowOptions {
    /// Maximum number of non-system messages to keep
    pub window: usize,
    /// Keep system messages regardless of the window
    pub keep_system: bool,
    /// Slide the cut forward so the kept slice starts on a user message
    pub start_on_user: bool,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            window: 20,
            keep_system: true,
            start_on_user: true,
        }
    }
}

impl WindowOptions {
    /// Window of `window` non-system messages with the default boundary rules
    pub fn last(window: usize) -> Self {
        Self {
            window,
            ..Self::default()
        }
    }
}

/// Outcome of a trim: the kept window and the messages that were pruned
#[derive(Debug, Clone)]
pub struct TrimmedHistory {
    /// Messages retained, in original order
    pub kept: Vec<Message>,
    /// Messages dropped, in original order
    pub pruned: Vec<Message>,
}

/// Fit a history into a message window, preserving role boundaries.
///
/// System messages are retained (subject to `keep_system`) and do not count
/// against the window. With `start_on_user`, the kept slice is advanced past
/// any leading assistant or tool messages so the window opens on a user turn;
/// this keeps tool results adjacent to the assistant message that requested
/// them. A window of zero keeps only system messages plus the final user
/// message, matching the minimal context a model call needs.
///
/// Deterministic: identical inputs always produce identical outputs.
pub fn trim_to_window(messages: Vec<Message>, options: &WindowOptions) -> TrimmedHistory {
    let (system, rest): (Vec<Message>, Vec<Message>) = messages
        .into_iter()
        .partition(|m| m.role == MessageRole::System);

    let mut pruned: Vec<Message> = Vec::new();
    let mut kept_tail: Vec<Message>;

    if options.window == 0 {
        // Keep only the final user message.
        let last_user_idx = rest.iter().rposition(|m| m.role == MessageRole::User);
        kept_tail = Vec::new();
        for (idx, msg) in rest.into_iter().enumerate() {
            if Some(idx) == last_user_idx {
                kept_tail.push(msg);
            } else {
                pruned.push(msg);
            }
        }
    } else if rest.len() <= options.window {
        kept_tail = rest;
    } else {
        let mut cut = rest.len() - options.window;
        if options.start_on_user {
            while cut < rest.len() && rest[cut].role != MessageRole::User {
                cut += 1;
            }
        }
        let mut iter = rest.into_iter();
        for _ in 0..cut {
            if let Some(msg) = iter.next() {
                pruned.push(msg);
            }
        }
        kept_tail = iter.collect();
    }

    let mut kept = if options.keep_system { system } else { Vec::new() };
    kept.append(&mut kept_tail);

    TrimmedHistory { kept, pruned }
}

/// Deterministic one-line summary of pruned history.
///
/// Not an LLM summary: it folds the pruned turns into a compact digest so a
/// compacted conversation still records what was dropped.
pub fn summarize_pruned(pruned: &[Message]) -> Option<String> {
    if pruned.is_empty() {
        return None;
    }
    let users = pruned.iter().filter(|m| m.role == MessageRole::User).count();
    let assistants = pruned
        .iter()
        .filter(|m| m.role == MessageRole::Assistant)
        .count();
    let first = pruned
        .iter()
        .find(|m| m.role == MessageRole::User)
        .map(|m| {
            let mut text: String = m.content.chars().take(80).collect();
            if m.content.chars().count() > 80 {
                text.push_str("...");
            }
            text
        })
        .unwrap_or_default();
    Some(format!(
        "Earlier conversation ({users} user and {assistants} assistant messages) beginning with: {first}"
    ))
}
