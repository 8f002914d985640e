use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-producer metadata attached to a points transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionMetadata {
    ReferralReward {
        referral_id: Uuid,
        /// The other side of the two-sided reward
        counterparty_id: Uuid,
    },
    TaskReward {
        task_id: String,
        completion_id: Uuid,
    },
    Manual {
        note: Option<String>,
    },
    Opaque {
        value: serde_json::Value,
    },
}

impl Default for TransactionMetadata {
    fn default() -> Self {
        TransactionMetadata::Manual { note: None }
    }
}

/// Immutable, append-only ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: i64,
    pub reason: String,
    pub metadata: TransactionMetadata,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PointsTransaction {
    pub fn new(
        account_id: Uuid,
        amount: i64,
        reason: impl Into<String>,
        metadata: TransactionMetadata,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            amount,
            reason: reason.into(),
            metadata,
            idempotency_key: None,
            created_at,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}
