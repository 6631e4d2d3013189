//! Error taxonomy for workflow execution
//!
//! Every failure in the system surfaces as a [`WorkflowError`]. The variant
//! set is closed and maps one-to-one onto the wire-level `kind` strings that
//! clients see, so matching on a variant and matching on a kind string are
//! equivalent.
//!
//! # Taxonomy
//!
//! ```text
//! WorkflowError
//! ├── Validation     - blueprint/config failed structural or semantic checks
//! ├── NotFound       - referenced template/definition/conversation absent
//! ├── Unauthorized   - user lacks access to a referenced resource
//! ├── Config         - provider/model/tool unavailable or incompatible
//! ├── Limit          - quota, step, tool-call or loop bound exceeded
//! ├── Provider       - LLM/tool/retriever call failed; carries `retryable`
//! ├── Tool           - tool invocation refused or returned an error payload
//! ├── Timeout        - deadline exceeded
//! ├── Cancelled      - run cancelled
//! └── Internal       - invariant violation; never user-caused
//! ```
//!
//! # Examples
//!
//! ```rust
//! use skein_core::error::WorkflowError;
//!
//! let err = WorkflowError::limit("tool call budget exhausted");
//! assert_eq!(err.kind(), "LimitError");
//! assert!(!err.retryable());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenience result type using [`WorkflowError`]
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Closed error set for all workflow operations
#[derive(Error, Debug, Clone)]
pub enum WorkflowError {
    /// Blueprint or config failed structural/semantic checks
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A referenced template, definition or conversation does not exist
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Resource category ("template", "definition", "conversation", ...)
        resource: String,
        /// Identifier that failed to resolve
        id: String,
    },

    /// The user is not allowed to access a referenced resource
    #[error("Unauthorized access to {resource} '{id}'")]
    Unauthorized {
        /// Resource category
        resource: String,
        /// Identifier the user may not access
        id: String,
    },

    /// Provider, model or tool unavailable or incompatible with the request
    #[error("Configuration error: {0}")]
    Config(String),

    /// A quota, step, tool-call or loop bound was exceeded
    #[error("Limit exceeded: {0}")]
    Limit(String),

    /// An LLM, tool-runtime or retriever call failed
    #[error("Provider error: {message}")]
    Provider {
        /// Human-readable failure description
        message: String,
        /// Whether a retry may succeed (rate limits, 5xx, network)
        retryable: bool,
    },

    /// A tool invocation was refused or returned an error payload
    #[error("Tool '{name}' failed: {message}")]
    Tool {
        /// Tool that failed
        name: String,
        /// Failure description
        message: String,
    },

    /// The run's wall-clock deadline expired
    #[error("Execution deadline exceeded after {elapsed_ms}ms")]
    Timeout {
        /// Milliseconds elapsed when the deadline fired
        elapsed_ms: u64,
    },

    /// The run was cancelled
    #[error("Execution cancelled")]
    Cancelled,

    /// Invariant violation inside the engine; never user-caused
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    /// Validation error from any displayable message
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Not-found error for a resource category and id
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Unauthorized error for a resource category and id
    pub fn unauthorized(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Unauthorized {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Limit error
    pub fn limit(message: impl Into<String>) -> Self {
        Self::Limit(message.into())
    }

    /// Provider error; pass `retryable = true` for transient failures
    pub fn provider(message: impl Into<String>, retryable: bool) -> Self {
        Self::Provider {
            message: message.into(),
            retryable,
        }
    }

    /// Tool error
    pub fn tool(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Internal invariant violation
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Wire-level kind string for this error
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::NotFound { .. } => "NotFound",
            Self::Unauthorized { .. } => "Unauthorized",
            Self::Config(_) => "ConfigError",
            Self::Limit(_) => "LimitError",
            Self::Provider { .. } => "ProviderError",
            Self::Tool { .. } => "ToolError",
            Self::Timeout { .. } => "TimeoutError",
            Self::Cancelled => "CancelledError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// Whether retrying the failed operation may succeed
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Provider { retryable: true, .. })
    }

    /// Whether this error terminates the run as cancelled rather than failed
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout { .. })
    }

    /// Wire representation of this error
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind().to_string(),
            message: self.to_string(),
            details: None,
            retryable: self.retryable().then_some(true),
        }
    }
}

/// Wire shape for a surfaced error: `{kind, message, details?, retryable?}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    /// One of the taxonomy kind strings
    pub kind: String,
    /// Human-readable message
    pub message: String,
    /// Optional structured context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Present and true only for retryable provider failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_taxonomy() {
        assert_eq!(WorkflowError::validation("x").kind(), "ValidationError");
        assert_eq!(WorkflowError::not_found("template", "t1").kind(), "NotFound");
        assert_eq!(
            WorkflowError::unauthorized("definition", "d1").kind(),
            "Unauthorized"
        );
        assert_eq!(WorkflowError::config("x").kind(), "ConfigError");
        assert_eq!(WorkflowError::limit("x").kind(), "LimitError");
        assert_eq!(WorkflowError::provider("x", true).kind(), "ProviderError");
        assert_eq!(WorkflowError::tool("search", "x").kind(), "ToolError");
        assert_eq!(WorkflowError::Timeout { elapsed_ms: 10 }.kind(), "TimeoutError");
        assert_eq!(WorkflowError::Cancelled.kind(), "CancelledError");
        assert_eq!(WorkflowError::internal("x").kind(), "InternalError");
    }

    #[test]
    fn only_flagged_provider_errors_retry() {
        assert!(WorkflowError::provider("rate limited", true).retryable());
        assert!(!WorkflowError::provider("bad request", false).retryable());
        assert!(!WorkflowError::limit("quota").retryable());
    }

    #[test]
    fn report_carries_kind_and_retryable() {
        let report = WorkflowError::provider("upstream 503", true).to_report();
        assert_eq!(report.kind, "ProviderError");
        assert_eq!(report.retryable, Some(true));

        let report = WorkflowError::Cancelled.to_report();
        assert_eq!(report.kind, "CancelledError");
        assert_eq!(report.retryable, None);
    }

    #[test]
    fn timeout_and_cancel_are_cancellation() {
        assert!(WorkflowError::Cancelled.is_cancellation());
        assert!(WorkflowError::Timeout { elapsed_ms: 5 }.is_cancellation());
        assert!(!WorkflowError::limit("x").is_cancellation());
    }
}
