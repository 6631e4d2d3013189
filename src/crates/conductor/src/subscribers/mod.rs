//! Built-in event subscribers
//!
//! The executor publishes lifecycle events; these subscribers turn them
//! into execution-row transitions, metrics and audit lines. None of them
//! is known to the executor, and none blocks the publishing path.

mod audit;
mod metrics;
mod persistence;

pub use audit::AuditSubscriber;
pub use metrics::{MetricsSnapshot, MetricsSubscriber};
pub use persistence::PersistenceSubscriber;
