use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::VerificationFlags;

/// One per (referrer, referred email). Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralRecord {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referred_email: String,

    /// Flags mirrored from the referred account at the last check
    pub verification: VerificationFlags,
    pub all_verifications_complete: bool,

    /// One-way guard: false -> true only
    pub points_awarded: bool,

    /// Set on the first complete observation, never cleared
    pub completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReferralRecord {
    pub fn new(referrer_id: Uuid, referred_email: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            referrer_id,
            referred_email: super::normalize_email(referred_email),
            verification: VerificationFlags::default(),
            all_verifications_complete: false,
            points_awarded: false,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the reward step still has work to do.
    pub fn reward_due(&self) -> bool {
        self.all_verifications_complete && !self.points_awarded
    }
}
