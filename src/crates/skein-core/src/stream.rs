//! Streaming response frames
//!
//! A streaming execution emits an ordered sequence of typed frames over a
//! channel: one `start`, any number of `token`/`tool`/`node`/`usage`
//! frames, then exactly one terminal `done` or `error`. `node` frames are
//! emitted only when the run's trace flag is set.

use crate::error::WorkflowError;
use crate::result::WorkflowResult;
use serde::{Deserialize, Serialize};

/// Phase of a node trace frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodePhase {
    /// Node visit began
    Start,
    /// Node visit finished
    End,
}

/// One element of a streaming response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamFrame {
    /// First frame of every stream
    #[serde(rename_all = "camelCase")]
    Start {
        /// Run id
        run_id: String,
    },
    /// One content token
    Token {
        /// Content fragment, in production order
        content: String,
    },
    /// A tool step finished
    Tool {
        /// Tool name
        name: String,
        /// Whether the call succeeded
        ok: bool,
        /// Short result or error description
        summary: String,
    },
    /// Node trace marker, behind the trace flag
    Node {
        /// Node id
        name: String,
        /// Start or end of the visit
        phase: NodePhase,
    },
    /// Usage of one model step
    #[serde(rename_all = "camelCase")]
    Usage {
        /// Prompt tokens of the step
        input_tokens: u64,
        /// Completion tokens of the step
        output_tokens: u64,
        /// Step total
        total_tokens: u64,
    },
    /// Terminal success frame
    Done {
        /// The canonical result
        result: Box<WorkflowResult>,
    },
    /// Terminal failure frame
    Error {
        /// Error kind from the taxonomy
        kind: String,
        /// Failure message
        message: String,
    },
}

impl StreamFrame {
    /// Error frame for a typed error
    pub fn error(err: &WorkflowError) -> Self {
        Self::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    /// True for `done` and `error`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}
