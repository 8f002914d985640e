//! Audit logging for reward and security decisions.
//!
//! The logger is handed to each operation through [`crate::context::RequestContext`];
//! nothing in the core writes to a process-wide log sink of its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Types of auditable events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuditEventType {
    // Ledger events
    PointsAwarded {
        account_id: Uuid,
        amount: i64,
        reason: String,
    },
    BalanceMismatch {
        account_id: Uuid,
        cached: i64,
        ledger_sum: i64,
    },

    // Reward events
    ReferralCompleted {
        referral_id: Uuid,
        referrer_id: Uuid,
    },
    RewardDeferred {
        subject: String,
        error: String,
    },
    SubmissionReviewed {
        submission_id: Uuid,
        approved: bool,
        reviewer: Option<String>,
    },

    // Security events
    BanApplied {
        account_id: Uuid,
        reason: String,
    },
    BanLifted {
        account_id: Uuid,
        expired: bool,
    },
    SignupBlocked {
        email: String,
        reason: String,
    },
    SuspicionRecorded {
        email: String,
        score: i32,
        reasons: Vec<String>,
    },
}

/// Severity levels for audit events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuditSeverity {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub request_id: Option<String>,
    pub actor: Option<String>,
    pub severity: AuditSeverity,
    pub metadata: HashMap<String, String>,
}

impl AuditEntry {
    pub fn new(event_type: AuditEventType, severity: AuditSeverity) -> Self {
        Self {
            id: format!("audit_{}", Uuid::new_v4().simple()),
            timestamp: Utc::now(),
            event_type,
            request_id: None,
            actor: None,
            severity,
            metadata: HashMap::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: &str) -> Self {
        self.request_id = Some(request_id.to_string());
        self
    }

    pub fn with_actor(mut self, actor: Option<&str>) -> Self {
        self.actor = actor.map(str::to_string);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Bounded in-memory audit trail, mirrored into `tracing`
pub struct AuditLogger {
    entries: Arc<RwLock<VecDeque<AuditEntry>>>,
    max_entries: usize,
    min_severity: AuditSeverity,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries: 100_000,
            min_severity: AuditSeverity::Info,
        }
    }

    pub fn with_min_severity(mut self, severity: AuditSeverity) -> Self {
        self.min_severity = severity;
        self
    }

    pub fn with_capacity(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub async fn log(&self, entry: AuditEntry) {
        if entry.severity < self.min_severity {
            return;
        }

        let request_id = entry.request_id.as_deref().unwrap_or("-");
        match entry.severity {
            AuditSeverity::Debug => tracing::debug!(request_id, "AUDIT: {:?}", entry.event_type),
            AuditSeverity::Info => tracing::info!(request_id, "AUDIT: {:?}", entry.event_type),
            AuditSeverity::Warning => tracing::warn!(request_id, "AUDIT: {:?}", entry.event_type),
            AuditSeverity::Error => tracing::error!(request_id, "AUDIT: {:?}", entry.event_type),
        }

        let mut entries = self.entries.write().await;
        entries.push_back(entry);

        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    pub async fn get_recent(&self, count: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries.iter().rev().take(count).cloned().collect()
    }

    pub async fn get_by_severity(&self, min_severity: AuditSeverity) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.severity >= min_severity)
            .cloned()
            .collect()
    }

    pub async fn get_for_request(&self, request_id: &str) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.request_id.as_deref() == Some(request_id))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
