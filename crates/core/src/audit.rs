use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Navigation,
    Members,
    Verification,
    Persistence,
    Lead,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub journey_id: String,
    pub product: String,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        journey_id: impl Into<String>,
        product: impl Into<String>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            journey_id: journey_id.into(),
            product: product.into(),
            correlation_id: correlation_id.into(),
            actor: actor.into(),
        }
    }

    pub fn event(
        &self,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> AuditEvent {
        AuditEvent::new(self, event_type, category, outcome)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub journey_id: String,
    pub product: String,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        context: &AuditContext,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            journey_id: context.journey_id.clone(),
            product: context.product.clone(),
            correlation_id: context.correlation_id.clone(),
            event_type: event_type.into(),
            category,
            actor: context.actor.clone(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.event_type).collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Writes each audit event as one structured log record.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        info!(
            event_name = "audit.event",
            audit_event_id = %event.event_id,
            audit_event_type = %event.event_type,
            category = ?event.category,
            outcome = ?event.outcome,
            journey_id = %event.journey_id,
            product = %event.product,
            correlation_id = %event.correlation_id,
            actor = %event.actor,
            metadata = %metadata,
            "audit event"
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::{
        AuditCategory, AuditContext, AuditOutcome, AuditSink, InMemoryAuditSink, TracingAuditSink,
    };

    #[test]
    fn context_stamps_journey_and_product_on_step_events() {
        let sink = InMemoryAuditSink::default();
        let context = AuditContext::new("journey-1", "supertopup", "req-123", "enquiry-wizard");
        sink.emit(
            context
                .event("enquiry.step.advanced", AuditCategory::Navigation, AuditOutcome::Success)
                .with_metadata("from", "members")
                .with_metadata("to", "ages"),
        );

        let [event] = sink.events().try_into().expect("exactly one event");
        assert_eq!(event.correlation_id, "req-123");
        assert_eq!(event.journey_id, "journey-1");
        assert_eq!(event.product, "supertopup");
        assert_eq!(event.metadata.get("to").map(String::as_str), Some("ages"));
        assert_eq!(sink.event_types(), vec!["enquiry.step.advanced"]);
    }

    #[test]
    fn tracing_sink_accepts_events_without_a_subscriber() {
        let context = AuditContext::new("journey-2", "gmc", "req-9", "cli");
        TracingAuditSink.emit(context.event(
            "enquiry.submitted",
            AuditCategory::Persistence,
            AuditOutcome::Success,
        ));
    }
}
