//! Language model port
//!
//! The engine is an orchestrator, not an LLM client: this module defines
//! the trait a provider adapter implements and the request/response types
//! that cross it. Adapters for concrete providers live outside this
//! workspace.

mod request;
mod traits;

pub use request::CompletionRequest;
pub use traits::{Completion, CompletionDelta, CompletionStream, LanguageModel};
