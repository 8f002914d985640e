//! Storage abstraction for the reward core.
//!
//! Every backend (Postgres, in-memory for tests and dev) implements [`Store`]. The
//! components depend only on the trait. Each method is one atomic operation against
//! its target record; multi-record writes that must not partially apply
//! (`apply_award`, `mark_referral_rewarded`) are single methods for that reason.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Account, BanState, BotSignal, CompletionStatus, PointsTransaction, ReferralRecord,
    SignupEvent, TaskCompletionRecord, TaskDefinition, VerificationFlag, VerificationFlags,
};

/// Result of appending a transaction and bumping the cached balance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwardOutcome {
    Applied { new_balance: i64 },
    /// A transaction with the same idempotency key already exists; nothing was written
    AlreadyApplied { balance: i64 },
}

impl AwardOutcome {
    pub fn balance(&self) -> i64 {
        match self {
            AwardOutcome::Applied { new_balance } => *new_balance,
            AwardOutcome::AlreadyApplied { balance } => *balance,
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // Accounts

    /// Fails with `Duplicate` when the email or referral tag is taken.
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError>;
    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, StoreError>;
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;
    async fn find_account_by_tag(&self, tag: &str) -> Result<Option<Account>, StoreError>;
    async fn list_account_ids(&self) -> Result<Vec<Uuid>, StoreError>;
    async fn set_verification_flag(
        &self,
        id: Uuid,
        flag: VerificationFlag,
    ) -> Result<bool, StoreError>;
    /// Sets the tag and `tag_created`. `Duplicate` if another account holds the tag.
    async fn set_referral_tag(&self, id: Uuid, tag: &str) -> Result<bool, StoreError>;
    /// Only writes when `referred_by` is unset. Returns whether it wrote.
    async fn set_referred_by(&self, id: Uuid, referrer_id: Uuid) -> Result<bool, StoreError>;
    async fn set_ban(&self, id: Uuid, ban: &BanState) -> Result<bool, StoreError>;
    /// Clears the ban only if it is still set and `until < now`.
    async fn lift_expired_ban(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError>;
    async fn raise_bot_score(&self, email: &str, delta: i32) -> Result<bool, StoreError>;

    // Ledger

    /// Appends the transaction and increments the balance in one step.
    /// `NotFound` when the account does not exist.
    async fn apply_award(&self, tx: &PointsTransaction) -> Result<AwardOutcome, StoreError>;
    /// Newest first.
    async fn list_transactions(
        &self,
        account_id: Uuid,
        limit: usize,
    ) -> Result<Vec<PointsTransaction>, StoreError>;
    async fn sum_transactions(&self, account_id: Uuid) -> Result<i64, StoreError>;

    // Referrals

    /// Inserts the record unless one exists for (referrer, referred email); returns the stored one.
    async fn ensure_referral(&self, record: &ReferralRecord) -> Result<ReferralRecord, StoreError>;
    async fn find_referral(
        &self,
        referrer_id: Uuid,
        referred_email: &str,
    ) -> Result<Option<ReferralRecord>, StoreError>;
    /// Mirrors the flags. `completed_at` is set once and the completion flag stays
    /// true after it is set. Never touches `points_awarded`.
    async fn refresh_referral(
        &self,
        id: Uuid,
        flags: VerificationFlags,
        now: DateTime<Utc>,
    ) -> Result<ReferralRecord, StoreError>;
    /// Flips `points_awarded` false -> true and increments the referrer's
    /// successful referral count together. Returns false if already flipped.
    async fn mark_referral_rewarded(&self, id: Uuid, referrer_id: Uuid) -> Result<bool, StoreError>;
    async fn list_referrals(&self, referrer_id: Uuid) -> Result<Vec<ReferralRecord>, StoreError>;

    // Tasks

    async fn upsert_task(&self, task: &TaskDefinition) -> Result<(), StoreError>;
    async fn get_task(&self, task_id: &str) -> Result<Option<TaskDefinition>, StoreError>;
    /// `Duplicate` when a record already exists for (account, task).
    async fn insert_completion(&self, record: &TaskCompletionRecord) -> Result<(), StoreError>;
    async fn get_completion(
        &self,
        account_id: Uuid,
        task_id: &str,
    ) -> Result<Option<TaskCompletionRecord>, StoreError>;
    async fn get_completion_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<TaskCompletionRecord>, StoreError>;
    /// Writes every field of `next` except `points_awarded`, only if the stored status
    /// is one of `expected`. Returns the stored record on success, None otherwise.
    async fn transition_completion(
        &self,
        next: &TaskCompletionRecord,
        expected: &[CompletionStatus],
    ) -> Result<Option<TaskCompletionRecord>, StoreError>;
    /// Flips `points_awarded` false -> true. Returns false if already flipped.
    async fn mark_completion_rewarded(&self, id: Uuid) -> Result<bool, StoreError>;

    // Bot signals

    async fn record_signup_event(&self, event: &SignupEvent) -> Result<(), StoreError>;
    async fn count_signups_from_ip(
        &self,
        ip: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
    /// Newest signal matching any of the given identities.
    async fn latest_bot_signal(
        &self,
        email: &str,
        ip: &str,
        fingerprint: &str,
    ) -> Result<Option<BotSignal>, StoreError>;
    async fn insert_bot_signal(&self, signal: &BotSignal) -> Result<(), StoreError>;
}
