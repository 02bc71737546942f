use tracing::info;

use botsso_core::audit::{AuditEvent, AuditSink};

/// Forwards audit events to the `tracing` pipeline as structured `info` events.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = event
            .metadata
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" ");

        info!(
            event_name = %event.event_type,
            audit_event_id = %event.id,
            outcome = event.outcome.as_str(),
            conversation_id = %event.context.conversation_id,
            user_id = %event.context.user_id,
            correlation_id = %event.context.correlation_id,
            actor = %event.context.actor,
            metadata = %metadata,
            "audit event"
        );
    }
}
