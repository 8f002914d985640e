//! Account identity, verification flags and the embedded ban record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Emails are case-insensitive keys; every lookup goes through this.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// The four conditions whose conjunction completes a referral
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationFlags {
    pub email_verified: bool,
    pub telegram_verified: bool,
    pub telegram_followed: bool,
    pub tag_created: bool,
}

impl VerificationFlags {
    pub fn all_complete(&self) -> bool {
        self.email_verified && self.telegram_verified && self.telegram_followed && self.tag_created
    }

    pub fn with(mut self, flag: VerificationFlag) -> Self {
        match flag {
            VerificationFlag::Email => self.email_verified = true,
            VerificationFlag::Telegram => self.telegram_verified = true,
            VerificationFlag::TelegramFollow => self.telegram_followed = true,
            VerificationFlag::TagCreated => self.tag_created = true,
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationFlag {
    Email,
    Telegram,
    TelegramFollow,
    TagCreated,
}

impl VerificationFlag {
    pub fn column(&self) -> &'static str {
        match self {
            VerificationFlag::Email => "email_verified",
            VerificationFlag::Telegram => "telegram_verified",
            VerificationFlag::TelegramFollow => "telegram_followed",
            VerificationFlag::TagCreated => "tag_created",
        }
    }
}

/// Temporary or permanent ban embedded in the account document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanState {
    pub banned: bool,
    pub reason: Option<String>,
    /// None means the ban never lapses on its own
    pub until: Option<DateTime<Utc>>,
}

impl BanState {
    pub fn banned(reason: impl Into<String>, until: Option<DateTime<Utc>>) -> Self {
        Self {
            banned: true,
            reason: Some(reason.into()),
            until,
        }
    }

    /// True when the ban is set but its expiry has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.banned && self.until.map(|until| until < now).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,

    /// Cached aggregate of every points transaction for this account
    pub points: i64,

    pub verification: VerificationFlags,
    pub referral_tag: Option<String>,
    pub referred_by: Option<Uuid>,
    pub successful_referrals: u32,
    pub ban: BanState,

    /// Cumulative suspicion score raised by the bot scorer
    pub bot_score: i32,

    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(email: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            points: 0,
            verification: VerificationFlags::default(),
            referral_tag: None,
            referred_by: None,
            successful_referrals: 0,
            ban: BanState::default(),
            bot_score: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }
}
