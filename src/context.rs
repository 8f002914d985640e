//! Per-request handle threaded through every core operation.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::Span;
use uuid::Uuid;

use crate::security::{AuditEntry, AuditEventType, AuditLogger, AuditSeverity};

/// Identifies the request, fixes its evaluation instant and carries the audit sink.
#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
    /// Who is acting, when the shell knows (admin id, account id)
    pub actor: Option<String>,
    /// Every time comparison in the call uses this instant
    pub now: DateTime<Utc>,
    audit: Arc<AuditLogger>,
}

impl RequestContext {
    pub fn new(audit: Arc<AuditLogger>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            actor: None,
            now: Utc::now(),
            audit,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn audit_log(&self) -> &Arc<AuditLogger> {
        &self.audit
    }

    pub fn span(&self, operation: &'static str) -> Span {
        tracing::info_span!("core_op", op = operation, request_id = %self.request_id)
    }

    pub async fn audit(&self, event_type: AuditEventType, severity: AuditSeverity) {
        let entry = AuditEntry::new(event_type, severity)
            .with_request_id(&self.request_id)
            .with_actor(self.actor.as_deref());
        self.audit.log(entry).await;
    }
}
