//! Database Connection Pool using sqlx

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;
use uuid::Uuid;

use crate::database::accounts::AccountRepository;
use crate::database::points::PointsRepository;
use crate::database::referrals::ReferralRepository;
use crate::database::signals::SignalRepository;
use crate::database::tasks::TaskRepository;
use crate::error::StoreError;
use crate::models::{
    Account, BanState, BotSignal, CompletionStatus, PointsTransaction, ReferralRecord,
    SignupEvent, TaskCompletionRecord, TaskDefinition, VerificationFlag, VerificationFlags,
};
use crate::store::{AwardOutcome, Store};

const SCHEMA: &[(&str, &str)] = &[
    (
        "accounts",
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id UUID PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            points BIGINT NOT NULL DEFAULT 0,
            email_verified BOOLEAN NOT NULL DEFAULT FALSE,
            telegram_verified BOOLEAN NOT NULL DEFAULT FALSE,
            telegram_followed BOOLEAN NOT NULL DEFAULT FALSE,
            tag_created BOOLEAN NOT NULL DEFAULT FALSE,
            referral_tag TEXT UNIQUE,
            referred_by UUID REFERENCES accounts(id),
            successful_referrals INTEGER NOT NULL DEFAULT 0,
            banned BOOLEAN NOT NULL DEFAULT FALSE,
            ban_reason TEXT,
            ban_until TIMESTAMPTZ,
            bot_score INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "points_transactions",
        r#"
        CREATE TABLE IF NOT EXISTS points_transactions (
            seq BIGSERIAL,
            id UUID PRIMARY KEY,
            account_id UUID NOT NULL REFERENCES accounts(id),
            amount BIGINT NOT NULL CHECK (amount > 0),
            reason TEXT NOT NULL,
            metadata JSONB NOT NULL,
            idempotency_key TEXT UNIQUE,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    ),
    (
        "points_transactions_account_idx",
        "CREATE INDEX IF NOT EXISTS points_transactions_account_idx ON points_transactions (account_id, created_at DESC)",
    ),
    (
        "referrals",
        r#"
        CREATE TABLE IF NOT EXISTS referrals (
            id UUID PRIMARY KEY,
            referrer_id UUID NOT NULL REFERENCES accounts(id),
            referred_email TEXT NOT NULL,
            email_verified BOOLEAN NOT NULL DEFAULT FALSE,
            telegram_verified BOOLEAN NOT NULL DEFAULT FALSE,
            telegram_followed BOOLEAN NOT NULL DEFAULT FALSE,
            tag_created BOOLEAN NOT NULL DEFAULT FALSE,
            all_verifications_complete BOOLEAN NOT NULL DEFAULT FALSE,
            points_awarded BOOLEAN NOT NULL DEFAULT FALSE,
            completed_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            UNIQUE (referrer_id, referred_email)
        )
        "#,
    ),
    (
        "task_definitions",
        r#"
        CREATE TABLE IF NOT EXISTS task_definitions (
            task_id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            task_type TEXT NOT NULL,
            requires_verification BOOLEAN NOT NULL DEFAULT FALSE,
            points_reward BIGINT NOT NULL DEFAULT 0,
            active BOOLEAN NOT NULL DEFAULT TRUE
        )
        "#,
    ),
    (
        "task_completions",
        r#"
        CREATE TABLE IF NOT EXISTS task_completions (
            id UUID PRIMARY KEY,
            account_id UUID NOT NULL REFERENCES accounts(id),
            task_id TEXT NOT NULL REFERENCES task_definitions(task_id),
            status TEXT NOT NULL,
            submission_link TEXT,
            evidence JSONB,
            submitted_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            reviewed_at TIMESTAMPTZ,
            reviewed_by TEXT,
            rejection_reason TEXT,
            points_awarded BOOLEAN NOT NULL DEFAULT FALSE,
            UNIQUE (account_id, task_id)
        )
        "#,
    ),
    (
        "bot_signals",
        r#"
        CREATE TABLE IF NOT EXISTS bot_signals (
            seq BIGSERIAL,
            id UUID PRIMARY KEY,
            email TEXT,
            ip TEXT,
            fingerprint TEXT,
            score INTEGER NOT NULL,
            flagged_reasons JSONB NOT NULL,
            blocked BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    ),
    (
        "signup_events",
        r#"
        CREATE TABLE IF NOT EXISTS signup_events (
            id BIGSERIAL PRIMARY KEY,
            email TEXT NOT NULL,
            ip TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    ),
    (
        "signup_events_ip_idx",
        "CREATE INDEX IF NOT EXISTS signup_events_ip_idx ON signup_events (ip, created_at)",
    ),
];

pub struct DatabasePool {
    pool: PgPool,
    accounts: AccountRepository,
    points: PointsRepository,
    referrals: ReferralRepository,
    tasks: TaskRepository,
    signals: SignalRepository,
}

impl DatabasePool {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to connect to PostgreSQL: {}", e)))?;

        info!("Connected to PostgreSQL");

        Ok(Self {
            accounts: AccountRepository::new(pool.clone()),
            points: PointsRepository::new(pool.clone()),
            referrals: ReferralRepository::new(pool.clone()),
            tasks: TaskRepository::new(pool.clone()),
            signals: SignalRepository::new(pool.clone()),
            pool,
        })
    }

    pub async fn init_schema(&self) -> Result<(), StoreError> {
        info!("Initializing database schema...");

        for (name, ddl) in SCHEMA {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Backend(format!("Failed to create {}: {}", name, e)))?;
        }

        info!("Database schema initialized");
        Ok(())
    }
}

#[async_trait]
impl Store for DatabasePool {
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        self.accounts.insert(account).await
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        self.accounts.get(id).await
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        self.accounts.find_by_email(email).await
    }

    async fn find_account_by_tag(&self, tag: &str) -> Result<Option<Account>, StoreError> {
        self.accounts.find_by_tag(tag).await
    }

    async fn list_account_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        self.accounts.list_ids().await
    }

    async fn set_verification_flag(
        &self,
        id: Uuid,
        flag: VerificationFlag,
    ) -> Result<bool, StoreError> {
        self.accounts.set_flag(id, flag).await
    }

    async fn set_referral_tag(&self, id: Uuid, tag: &str) -> Result<bool, StoreError> {
        self.accounts.set_tag(id, tag).await
    }

    async fn set_referred_by(&self, id: Uuid, referrer_id: Uuid) -> Result<bool, StoreError> {
        self.accounts.set_referred_by(id, referrer_id).await
    }

    async fn set_ban(&self, id: Uuid, ban: &BanState) -> Result<bool, StoreError> {
        self.accounts.set_ban(id, ban).await
    }

    async fn lift_expired_ban(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.accounts.lift_expired_ban(id, now).await
    }

    async fn raise_bot_score(&self, email: &str, delta: i32) -> Result<bool, StoreError> {
        self.accounts.raise_bot_score(email, delta).await
    }

    async fn apply_award(&self, tx: &PointsTransaction) -> Result<AwardOutcome, StoreError> {
        self.points.apply_award(tx).await
    }

    async fn list_transactions(
        &self,
        account_id: Uuid,
        limit: usize,
    ) -> Result<Vec<PointsTransaction>, StoreError> {
        self.points.list(account_id, limit).await
    }

    async fn sum_transactions(&self, account_id: Uuid) -> Result<i64, StoreError> {
        self.points.sum(account_id).await
    }

    async fn ensure_referral(&self, record: &ReferralRecord) -> Result<ReferralRecord, StoreError> {
        self.referrals.ensure(record).await
    }

    async fn find_referral(
        &self,
        referrer_id: Uuid,
        referred_email: &str,
    ) -> Result<Option<ReferralRecord>, StoreError> {
        self.referrals.find(referrer_id, referred_email).await
    }

    async fn refresh_referral(
        &self,
        id: Uuid,
        flags: VerificationFlags,
        now: DateTime<Utc>,
    ) -> Result<ReferralRecord, StoreError> {
        self.referrals.refresh(id, flags, now).await
    }

    async fn mark_referral_rewarded(&self, id: Uuid, referrer_id: Uuid) -> Result<bool, StoreError> {
        self.referrals.mark_rewarded(id, referrer_id).await
    }

    async fn list_referrals(&self, referrer_id: Uuid) -> Result<Vec<ReferralRecord>, StoreError> {
        self.referrals.list_for_referrer(referrer_id).await
    }

    async fn upsert_task(&self, task: &TaskDefinition) -> Result<(), StoreError> {
        self.tasks.upsert_task(task).await
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<TaskDefinition>, StoreError> {
        self.tasks.get_task(task_id).await
    }

    async fn insert_completion(&self, record: &TaskCompletionRecord) -> Result<(), StoreError> {
        self.tasks.insert_completion(record).await
    }

    async fn get_completion(
        &self,
        account_id: Uuid,
        task_id: &str,
    ) -> Result<Option<TaskCompletionRecord>, StoreError> {
        self.tasks.get_completion(account_id, task_id).await
    }

    async fn get_completion_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<TaskCompletionRecord>, StoreError> {
        self.tasks.get_completion_by_id(id).await
    }

    async fn transition_completion(
        &self,
        next: &TaskCompletionRecord,
        expected: &[CompletionStatus],
    ) -> Result<Option<TaskCompletionRecord>, StoreError> {
        self.tasks.transition(next, expected).await
    }

    async fn mark_completion_rewarded(&self, id: Uuid) -> Result<bool, StoreError> {
        self.tasks.mark_rewarded(id).await
    }

    async fn record_signup_event(&self, event: &SignupEvent) -> Result<(), StoreError> {
        self.signals.record_signup(event).await
    }

    async fn count_signups_from_ip(
        &self,
        ip: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.signals.count_from_ip(ip, since).await
    }

    async fn latest_bot_signal(
        &self,
        email: &str,
        ip: &str,
        fingerprint: &str,
    ) -> Result<Option<BotSignal>, StoreError> {
        self.signals.latest(email, ip, fingerprint).await
    }

    async fn insert_bot_signal(&self, signal: &BotSignal) -> Result<(), StoreError> {
        self.signals.insert(signal).await
    }
}
