//! Audit logging subscriber
//!
//! Emits one structured log line per lifecycle event, with the payload
//! passed through secret redaction first. The audit trail is the only
//! place event payloads are serialized wholesale, so redaction here covers
//! everything that could leak into log storage.

use skein_core::events::{EventSubscriber, WorkflowEvent};
use tooling::redact::redact_json;
use tracing::info;

/// Logs redacted lifecycle events
#[derive(Debug, Default)]
pub struct AuditSubscriber;

impl AuditSubscriber {
    /// New audit logger
    pub fn new() -> Self {
        Self
    }
}

impl EventSubscriber for AuditSubscriber {
    fn on_event(&self, event: &WorkflowEvent) {
        let payload = serde_json::to_value(&event.payload)
            .map(|v| redact_json(&v))
            .unwrap_or_default();
        info!(
            target: "skein::audit",
            run_id = %event.run_id,
            event = event.payload.kind(),
            payload = %payload,
            "workflow event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_core::events::EventPayload;

    #[test]
    fn handles_every_payload_without_panicking() {
        let audit = AuditSubscriber::new();
        audit.on_event(&WorkflowEvent::new(
            "run-1",
            EventPayload::ToolInvoked {
                name: "search".into(),
                ok: true,
                summary: "api_key=sk-secret in output".into(),
            },
        ));
    }
}
