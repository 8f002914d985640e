//! In-memory store used by tests and as the dev fallback when Postgres is disabled.
//!
//! All state sits behind one lock, so every trait method is atomic with respect to
//! every other call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{AwardOutcome, Store};
use crate::error::StoreError;
use crate::models::{
    normalize_email, Account, BanState, BotSignal, CompletionStatus, PointsTransaction,
    ReferralRecord, SignupEvent, TaskCompletionRecord, TaskDefinition, VerificationFlag,
    VerificationFlags,
};

#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<Uuid, Account>,
    transactions: Vec<PointsTransaction>,
    idempotency_keys: HashSet<String>,
    referrals: HashMap<Uuid, ReferralRecord>,
    tasks: HashMap<String, TaskDefinition>,
    completions: HashMap<Uuid, TaskCompletionRecord>,
    signup_events: Vec<SignupEvent>,
    bot_signals: Vec<BotSignal>,
}

impl MemoryState {
    fn account_by_email(&self, email: &str) -> Option<&Account> {
        let email = normalize_email(email);
        self.accounts.values().find(|a| a.email == email)
    }

    fn account_mut(&mut self, id: Uuid) -> Option<&mut Account> {
        self.accounts.get_mut(&id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<dyn Store> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.account_by_email(&account.email).is_some() {
            return Err(StoreError::Duplicate(format!("email {}", account.email)));
        }
        if let Some(tag) = &account.referral_tag {
            if state
                .accounts
                .values()
                .any(|a| a.referral_tag.as_deref() == Some(tag.as_str()))
            {
                return Err(StoreError::Duplicate(format!("referral tag {}", tag)));
            }
        }

        let mut account = account.clone();
        account.email = normalize_email(&account.email);
        state.accounts.insert(account.id, account);
        Ok(())
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.state.read().await.accounts.get(&id).cloned())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.state.read().await.account_by_email(email).cloned())
    }

    async fn find_account_by_tag(&self, tag: &str) -> Result<Option<Account>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .accounts
            .values()
            .find(|a| a.referral_tag.as_deref() == Some(tag))
            .cloned())
    }

    async fn list_account_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        Ok(self.state.read().await.accounts.keys().copied().collect())
    }

    async fn set_verification_flag(
        &self,
        id: Uuid,
        flag: VerificationFlag,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state.account_mut(id) {
            Some(account) => {
                account.verification = account.verification.with(flag);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_referral_tag(&self, id: Uuid, tag: &str) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        if state
            .accounts
            .values()
            .any(|a| a.id != id && a.referral_tag.as_deref() == Some(tag))
        {
            return Err(StoreError::Duplicate(format!("referral tag {}", tag)));
        }
        match state.account_mut(id) {
            Some(account) => {
                account.referral_tag = Some(tag.to_string());
                account.verification = account.verification.with(VerificationFlag::TagCreated);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_referred_by(&self, id: Uuid, referrer_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state.account_mut(id) {
            Some(account) if account.referred_by.is_none() => {
                account.referred_by = Some(referrer_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_ban(&self, id: Uuid, ban: &BanState) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state.account_mut(id) {
            Some(account) => {
                account.ban = ban.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn lift_expired_ban(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state.account_mut(id) {
            Some(account) if account.ban.is_expired(now) => {
                account.ban = BanState::default();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn raise_bot_score(&self, email: &str, delta: i32) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let email = normalize_email(email);
        match state.accounts.values_mut().find(|a| a.email == email) {
            Some(account) => {
                account.bot_score = account.bot_score.saturating_add(delta);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn apply_award(&self, tx: &PointsTransaction) -> Result<AwardOutcome, StoreError> {
        let mut state = self.state.write().await;

        let balance = state
            .accounts
            .get(&tx.account_id)
            .map(|a| a.points)
            .ok_or_else(|| StoreError::NotFound(format!("account {}", tx.account_id)))?;

        if let Some(key) = &tx.idempotency_key {
            if state.idempotency_keys.contains(key) {
                debug!(key = %key, "Award already applied");
                return Ok(AwardOutcome::AlreadyApplied { balance });
            }
        }

        let new_balance = balance.checked_add(tx.amount).ok_or_else(|| {
            StoreError::Backend(format!(
                "balance of account {} out of range adding {}",
                tx.account_id, tx.amount
            ))
        })?;
        if let Some(key) = &tx.idempotency_key {
            state.idempotency_keys.insert(key.clone());
        }
        if let Some(account) = state.account_mut(tx.account_id) {
            account.points = new_balance;
        }
        state.transactions.push(tx.clone());

        Ok(AwardOutcome::Applied { new_balance })
    }

    async fn list_transactions(
        &self,
        account_id: Uuid,
        limit: usize,
    ) -> Result<Vec<PointsTransaction>, StoreError> {
        let state = self.state.read().await;
        let mut txs: Vec<PointsTransaction> = state
            .transactions
            .iter()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect();
        // Appends are in insertion order; reverse keeps same-instant entries newest first
        txs.reverse();
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        txs.truncate(limit);
        Ok(txs)
    }

    async fn sum_transactions(&self, account_id: Uuid) -> Result<i64, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.account_id == account_id)
            .map(|t| t.amount)
            .sum())
    }

    async fn ensure_referral(&self, record: &ReferralRecord) -> Result<ReferralRecord, StoreError> {
        let mut state = self.state.write().await;
        let email = normalize_email(&record.referred_email);
        if let Some(existing) = state
            .referrals
            .values()
            .find(|r| r.referrer_id == record.referrer_id && r.referred_email == email)
        {
            return Ok(existing.clone());
        }

        let mut record = record.clone();
        record.referred_email = email;
        state.referrals.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_referral(
        &self,
        referrer_id: Uuid,
        referred_email: &str,
    ) -> Result<Option<ReferralRecord>, StoreError> {
        let state = self.state.read().await;
        let email = normalize_email(referred_email);
        Ok(state
            .referrals
            .values()
            .find(|r| r.referrer_id == referrer_id && r.referred_email == email)
            .cloned())
    }

    async fn refresh_referral(
        &self,
        id: Uuid,
        flags: VerificationFlags,
        now: DateTime<Utc>,
    ) -> Result<ReferralRecord, StoreError> {
        let mut state = self.state.write().await;
        let record = state
            .referrals
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("referral {}", id)))?;

        record.verification = flags;
        if flags.all_complete() && record.completed_at.is_none() {
            record.completed_at = Some(now);
        }
        record.all_verifications_complete = record.completed_at.is_some();
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn mark_referral_rewarded(&self, id: Uuid, referrer_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let record = state
            .referrals
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("referral {}", id)))?;
        if record.points_awarded {
            return Ok(false);
        }
        record.points_awarded = true;

        if let Some(referrer) = state.account_mut(referrer_id) {
            referrer.successful_referrals += 1;
        }
        Ok(true)
    }

    async fn list_referrals(&self, referrer_id: Uuid) -> Result<Vec<ReferralRecord>, StoreError> {
        let state = self.state.read().await;
        let mut records: Vec<ReferralRecord> = state
            .referrals
            .values()
            .filter(|r| r.referrer_id == referrer_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn upsert_task(&self, task: &TaskDefinition) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.tasks.insert(task.task_id.clone(), task.clone());
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskDefinition>, StoreError> {
        Ok(self.state.read().await.tasks.get(task_id).cloned())
    }

    async fn insert_completion(&self, record: &TaskCompletionRecord) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state
            .completions
            .values()
            .any(|c| c.account_id == record.account_id && c.task_id == record.task_id)
        {
            return Err(StoreError::Duplicate(format!(
                "completion {}/{}",
                record.account_id, record.task_id
            )));
        }
        state.completions.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_completion(
        &self,
        account_id: Uuid,
        task_id: &str,
    ) -> Result<Option<TaskCompletionRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .completions
            .values()
            .find(|c| c.account_id == account_id && c.task_id == task_id)
            .cloned())
    }

    async fn get_completion_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<TaskCompletionRecord>, StoreError> {
        Ok(self.state.read().await.completions.get(&id).cloned())
    }

    async fn transition_completion(
        &self,
        next: &TaskCompletionRecord,
        expected: &[CompletionStatus],
    ) -> Result<Option<TaskCompletionRecord>, StoreError> {
        let mut state = self.state.write().await;
        let Some(current) = state.completions.get_mut(&next.id) else {
            return Ok(None);
        };
        if !expected.contains(&current.status) {
            return Ok(None);
        }

        let points_awarded = current.points_awarded;
        *current = next.clone();
        current.points_awarded = points_awarded;
        Ok(Some(current.clone()))
    }

    async fn mark_completion_rewarded(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state.completions.get_mut(&id) {
            Some(record) if !record.points_awarded => {
                record.points_awarded = true;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(format!("completion {}", id))),
        }
    }

    async fn record_signup_event(&self, event: &SignupEvent) -> Result<(), StoreError> {
        self.state.write().await.signup_events.push(event.clone());
        Ok(())
    }

    async fn count_signups_from_ip(
        &self,
        ip: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .signup_events
            .iter()
            .filter(|e| e.ip == ip && e.created_at >= since)
            .count() as u64)
    }

    async fn latest_bot_signal(
        &self,
        email: &str,
        ip: &str,
        fingerprint: &str,
    ) -> Result<Option<BotSignal>, StoreError> {
        let state = self.state.read().await;
        let email = normalize_email(email);
        Ok(state
            .bot_signals
            .iter()
            .filter(|s| {
                s.email.as_deref() == Some(email.as_str())
                    || s.ip.as_deref() == Some(ip)
                    || s.fingerprint.as_deref() == Some(fingerprint)
            })
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn insert_bot_signal(&self, signal: &BotSignal) -> Result<(), StoreError> {
        self.state.write().await.bot_signals.push(signal.clone());
        Ok(())
    }
}
