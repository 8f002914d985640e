use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a bot signal was raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlaggedReason {
    /// Too many signups from the same IP inside the window
    IpVelocity { signups: u64 },
    MissingUserAgent,
    ShortUserAgent { length: usize },
    /// Score carried over from an earlier signal for the same identity
    PriorSignal { score: i32 },
}

impl FlaggedReason {
    pub fn description(&self) -> String {
        match self {
            FlaggedReason::IpVelocity { .. } => "too many signups from same IP".to_string(),
            FlaggedReason::MissingUserAgent => "missing user agent".to_string(),
            FlaggedReason::ShortUserAgent { length } => {
                format!("user agent too short ({} chars)", length)
            }
            FlaggedReason::PriorSignal { score } => format!("prior suspicion score {}", score),
        }
    }
}

/// Append-only suspicion event. The newest matching record is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSignal {
    pub id: Uuid,
    pub email: Option<String>,
    pub ip: Option<String>,
    pub fingerprint: Option<String>,
    pub score: i32,
    pub flagged_reasons: Vec<FlaggedReason>,
    pub blocked: bool,
    pub created_at: DateTime<Utc>,
}

/// A signup the shell accepted, kept for IP velocity checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupEvent {
    pub email: String,
    pub ip: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}
