//! Structured logging bootstrap and timing helpers

use std::time::Instant;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Respects `RUST_LOG`; falls back to `info` when unset. Safe to call more
/// than once; subsequent calls are no-ops.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Await a future while logging its wall-clock duration at debug level
pub async fn timed<F, T>(name: &str, future: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = Instant::now();
    let result = future.await;
    debug!(operation = name, elapsed_ms = start.elapsed().as_millis() as u64, "operation finished");
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timed_passes_through_result() {
        let value = timed("addition", async { 2 + 2 }).await;
        assert_eq!(value, 4);
    }

    #[test]
    fn init_is_idempotent() {
        init("info");
        init("debug");
    }
}
