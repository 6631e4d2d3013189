//! Cross-cutting utilities for the skein workspace
//!
//! # Modules
//!
//! - `rate_limit` - Token bucket rate limiters, plain and keyed per user
//! - `redact` - Secret masking for anything that reaches logs or audit trails
//! - `logging` - Structured logging bootstrap and timing helpers
//! - `deadline` - Wall-clock deadline tracking for executions

pub mod deadline;
pub mod logging;
pub mod rate_limit;
pub mod redact;
