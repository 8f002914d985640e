//! Integration tests for the waitlist reward core
//!
//! These tests drive the components through `RewardsCore` against the in-memory
//! store: ledger consistency under concurrency, two-sided referral rewards,
//! the task review loop, ban gating and signup bot scoring.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use waitlist_rewards::models::{
    Account, BanState, BotSignal, CompletionStatus, PointsTransaction, ReferralRecord,
    SignupEvent, TaskCompletionRecord, TaskDefinition, TaskType, TransactionMetadata,
    VerificationFlag, VerificationFlags,
};
use waitlist_rewards::{
    AuditEventType, AuditLogger, AuditSeverity, AwardOutcome, BlockReason, MemoryStore,
    RequestContext, RewardError, RewardsCore, SignupAttempt, Store, StoreError, WaitlistConfig,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn create_core(store: Arc<dyn Store>) -> RewardsCore {
    RewardsCore::new(store, &WaitlistConfig::default())
}

fn create_ctx() -> RequestContext {
    RequestContext::new(Arc::new(AuditLogger::new()))
}

async fn create_account(store: &Arc<dyn Store>, email: &str) -> Account {
    let account = Account::new(email).with_created_at(Utc::now() - Duration::days(1));
    store.insert_account(&account).await.unwrap();
    account
}

async fn balance(store: &Arc<dyn Store>, id: Uuid) -> i64 {
    store.get_account(id).await.unwrap().unwrap().points
}

async fn assert_ledger_consistent(core: &RewardsCore, ctx: &RequestContext, id: Uuid) {
    let audit = core.ledger().verify_balance(ctx, id, None).await.unwrap();
    assert!(
        audit.consistent,
        "cached {} != ledger {}",
        audit.cached, audit.ledger_sum
    );
}

/// Referrer with tag "a1tag" plus a referred account registered through it
async fn create_referral_pair(core: &RewardsCore, ctx: &RequestContext) -> (Account, Account) {
    let store = core.store();
    let a1 = create_account(store, "a1@example.com").await;
    store.set_referral_tag(a1.id, "a1tag").await.unwrap();
    let a2 = create_account(store, "a2@example.com").await;
    core.referrals().register(ctx, a2.id, "a1tag").await.unwrap();
    (a1, a2)
}

async fn verify_everything(store: &Arc<dyn Store>, id: Uuid) {
    store.set_verification_flag(id, VerificationFlag::Email).await.unwrap();
    store.set_verification_flag(id, VerificationFlag::Telegram).await.unwrap();
    store
        .set_verification_flag(id, VerificationFlag::TelegramFollow)
        .await
        .unwrap();
    store.set_referral_tag(id, "a2tag").await.unwrap();
}

async fn create_task(store: &Arc<dyn Store>, task_id: &str, review: bool, reward: i64) {
    store
        .upsert_task(&TaskDefinition {
            task_id: task_id.to_string(),
            title: task_id.to_string(),
            task_type: TaskType::Content,
            requires_verification: review,
            points_reward: reward,
            active: true,
        })
        .await
        .unwrap();
}

/// Wraps a MemoryStore and fails the next `failures` awards with a backend error
struct FlakyStore {
    inner: MemoryStore,
    failures: AtomicUsize,
    /// Written right after the next account read, as an admin racing the caller would
    ban_after_read: Mutex<Option<BanState>>,
}

impl FlakyStore {
    fn new(failures: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures: AtomicUsize::new(failures),
            ban_after_read: Mutex::new(None),
        }
    }

    fn ban_after_next_read(&self, ban: BanState) {
        if let Ok(mut pending) = self.ban_after_read.lock() {
            *pending = Some(ban);
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        self.inner.insert_account(account).await
    }
    async fn get_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let account = self.inner.get_account(id).await?;
        let pending = self.ban_after_read.lock().ok().and_then(|mut p| p.take());
        if let Some(ban) = pending {
            self.inner.set_ban(id, &ban).await?;
        }
        Ok(account)
    }
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        self.inner.find_account_by_email(email).await
    }
    async fn find_account_by_tag(&self, tag: &str) -> Result<Option<Account>, StoreError> {
        self.inner.find_account_by_tag(tag).await
    }
    async fn list_account_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        self.inner.list_account_ids().await
    }
    async fn set_verification_flag(
        &self,
        id: Uuid,
        flag: VerificationFlag,
    ) -> Result<bool, StoreError> {
        self.inner.set_verification_flag(id, flag).await
    }
    async fn set_referral_tag(&self, id: Uuid, tag: &str) -> Result<bool, StoreError> {
        self.inner.set_referral_tag(id, tag).await
    }
    async fn set_referred_by(&self, id: Uuid, referrer_id: Uuid) -> Result<bool, StoreError> {
        self.inner.set_referred_by(id, referrer_id).await
    }
    async fn set_ban(&self, id: Uuid, ban: &BanState) -> Result<bool, StoreError> {
        self.inner.set_ban(id, ban).await
    }
    async fn lift_expired_ban(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        self.inner.lift_expired_ban(id, now).await
    }
    async fn raise_bot_score(&self, email: &str, delta: i32) -> Result<bool, StoreError> {
        self.inner.raise_bot_score(email, delta).await
    }
    async fn apply_award(&self, tx: &PointsTransaction) -> Result<AwardOutcome, StoreError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        self.inner.apply_award(tx).await
    }
    async fn list_transactions(
        &self,
        account_id: Uuid,
        limit: usize,
    ) -> Result<Vec<PointsTransaction>, StoreError> {
        self.inner.list_transactions(account_id, limit).await
    }
    async fn sum_transactions(&self, account_id: Uuid) -> Result<i64, StoreError> {
        self.inner.sum_transactions(account_id).await
    }
    async fn ensure_referral(&self, record: &ReferralRecord) -> Result<ReferralRecord, StoreError> {
        self.inner.ensure_referral(record).await
    }
    async fn find_referral(
        &self,
        referrer_id: Uuid,
        referred_email: &str,
    ) -> Result<Option<ReferralRecord>, StoreError> {
        self.inner.find_referral(referrer_id, referred_email).await
    }
    async fn refresh_referral(
        &self,
        id: Uuid,
        flags: VerificationFlags,
        now: DateTime<Utc>,
    ) -> Result<ReferralRecord, StoreError> {
        self.inner.refresh_referral(id, flags, now).await
    }
    async fn mark_referral_rewarded(&self, id: Uuid, referrer_id: Uuid) -> Result<bool, StoreError> {
        self.inner.mark_referral_rewarded(id, referrer_id).await
    }
    async fn list_referrals(&self, referrer_id: Uuid) -> Result<Vec<ReferralRecord>, StoreError> {
        self.inner.list_referrals(referrer_id).await
    }
    async fn upsert_task(&self, task: &TaskDefinition) -> Result<(), StoreError> {
        self.inner.upsert_task(task).await
    }
    async fn get_task(&self, task_id: &str) -> Result<Option<TaskDefinition>, StoreError> {
        self.inner.get_task(task_id).await
    }
    async fn insert_completion(&self, record: &TaskCompletionRecord) -> Result<(), StoreError> {
        self.inner.insert_completion(record).await
    }
    async fn get_completion(
        &self,
        account_id: Uuid,
        task_id: &str,
    ) -> Result<Option<TaskCompletionRecord>, StoreError> {
        self.inner.get_completion(account_id, task_id).await
    }
    async fn get_completion_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<TaskCompletionRecord>, StoreError> {
        self.inner.get_completion_by_id(id).await
    }
    async fn transition_completion(
        &self,
        next: &TaskCompletionRecord,
        expected: &[CompletionStatus],
    ) -> Result<Option<TaskCompletionRecord>, StoreError> {
        self.inner.transition_completion(next, expected).await
    }
    async fn mark_completion_rewarded(&self, id: Uuid) -> Result<bool, StoreError> {
        self.inner.mark_completion_rewarded(id).await
    }
    async fn record_signup_event(&self, event: &SignupEvent) -> Result<(), StoreError> {
        self.inner.record_signup_event(event).await
    }
    async fn count_signups_from_ip(
        &self,
        ip: &str,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.inner.count_signups_from_ip(ip, since).await
    }
    async fn latest_bot_signal(
        &self,
        email: &str,
        ip: &str,
        fingerprint: &str,
    ) -> Result<Option<BotSignal>, StoreError> {
        self.inner.latest_bot_signal(email, ip, fingerprint).await
    }
    async fn insert_bot_signal(&self, signal: &BotSignal) -> Result<(), StoreError> {
        self.inner.insert_bot_signal(signal).await
    }
}

// ============================================================================
// Ledger Integrity
// ============================================================================

mod ledger_integrity {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_awards_keep_balance_consistent() {
        let store = MemoryStore::shared();
        let core = create_core(store.clone());
        let ctx = create_ctx();
        let account = create_account(&store, "busy@example.com").await;

        let awards = (1..=50).map(|i| {
            let core = core.clone();
            let ctx = ctx.clone();
            async move {
                core.award(&ctx, account.id, i, "bulk", TransactionMetadata::default())
                    .await
            }
        });
        let results = join_all(awards).await;
        assert!(results.iter().all(|r| r.is_ok()));

        assert_eq!(balance(&store, account.id).await, (1..=50).sum::<i64>());
        assert_ledger_consistent(&core, &ctx, account.id).await;
    }

    #[tokio::test]
    async fn test_failed_awards_leave_no_trace() {
        let store = MemoryStore::shared();
        let core = create_core(store.clone());
        let ctx = create_ctx();
        let account = create_account(&store, "mixed@example.com").await;

        core.award(&ctx, account.id, 10, "ok", TransactionMetadata::default())
            .await
            .unwrap();
        assert!(matches!(
            core.award(&ctx, account.id, 0, "zero", TransactionMetadata::default())
                .await,
            Err(RewardError::InvalidAmount(0))
        ));
        assert!(matches!(
            core.award(&ctx, Uuid::new_v4(), 5, "ghost", TransactionMetadata::default())
                .await,
            Err(RewardError::AccountNotFound(_))
        ));
        core.award(&ctx, account.id, 7, "ok", TransactionMetadata::default())
            .await
            .unwrap();

        assert_eq!(balance(&store, account.id).await, 17);
        assert_ledger_consistent(&core, &ctx, account.id).await;
        let history = core.ledger().history(&ctx, account.id, 50).await.unwrap();
        assert_eq!(history.len(), 2);
    }
}

// ============================================================================
// Referral Rewards
// ============================================================================

mod referral_rewards {
    use super::*;

    #[tokio::test]
    async fn test_referral_pays_both_sides_once() {
        let store = MemoryStore::shared();
        let core = create_core(store.clone());
        let ctx = create_ctx();
        let (a1, a2) = create_referral_pair(&core, &ctx).await;

        // Partially verified: nothing paid
        store
            .set_verification_flag(a2.id, VerificationFlag::Email)
            .await
            .unwrap();
        let status = core
            .check_referral_completion(&ctx, "a2@example.com")
            .await
            .unwrap();
        assert!(!status.all_verifications_complete);
        assert!(status.requirements.email_verified);
        assert_eq!(balance(&store, a1.id).await, 0);

        verify_everything(&store, a2.id).await;
        let status = core
            .check_referral_completion(&ctx, "A2@example.com")
            .await
            .unwrap();
        assert!(status.all_verifications_complete);
        assert!(status.points_awarded);
        assert!(status.reward_paid_now);

        assert_eq!(balance(&store, a1.id).await, 150);
        assert_eq!(balance(&store, a2.id).await, 100);
        let referrer = store.get_account(a1.id).await.unwrap().unwrap();
        assert_eq!(referrer.successful_referrals, 1);

        // Repeat is a no-op
        let status = core
            .check_referral_completion(&ctx, "a2@example.com")
            .await
            .unwrap();
        assert!(status.points_awarded);
        assert!(!status.reward_paid_now);
        assert_eq!(balance(&store, a1.id).await, 150);
        assert_eq!(balance(&store, a2.id).await, 100);

        assert_ledger_consistent(&core, &ctx, a1.id).await;
        assert_ledger_consistent(&core, &ctx, a2.id).await;

        let stats = core.referrals().stats(&ctx, a1.id).await.unwrap();
        assert_eq!((stats.total, stats.completed, stats.rewarded), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_concurrent_checks_pay_once() {
        let store = MemoryStore::shared();
        let core = create_core(store.clone());
        let ctx = create_ctx();
        let (a1, a2) = create_referral_pair(&core, &ctx).await;
        verify_everything(&store, a2.id).await;

        let checks = (0..8).map(|_| {
            let core = core.clone();
            let ctx = ctx.clone();
            async move { core.check_referral_completion(&ctx, "a2@example.com").await }
        });
        let results = join_all(checks).await;

        let payers = results
            .iter()
            .filter(|r| r.as_ref().map(|s| s.reward_paid_now).unwrap_or(false))
            .count();
        assert_eq!(payers, 1);
        assert_eq!(balance(&store, a1.id).await, 150);
        assert_eq!(balance(&store, a2.id).await, 100);
        assert_eq!(
            store.get_account(a1.id).await.unwrap().unwrap().successful_referrals,
            1
        );
    }

    #[tokio::test]
    async fn test_deferred_reward_retried_without_double_pay() {
        let flaky = Arc::new(FlakyStore::new(1));
        let store: Arc<dyn Store> = flaky.clone();
        let core = create_core(store.clone());
        let ctx = create_ctx();
        let (a1, a2) = create_referral_pair(&core, &ctx).await;
        verify_everything(&store, a2.id).await;

        // Referrer side fails, referred side lands; guard stays unset
        let status = core
            .check_referral_completion(&ctx, "a2@example.com")
            .await
            .unwrap();
        assert!(status.all_verifications_complete);
        assert!(!status.points_awarded);
        assert_eq!(balance(&store, a1.id).await, 0);
        assert_eq!(balance(&store, a2.id).await, 100);

        let deferred = ctx
            .audit_log()
            .get_by_severity(AuditSeverity::Warning)
            .await
            .into_iter()
            .any(|e| matches!(e.event_type, AuditEventType::RewardDeferred { .. }));
        assert!(deferred);

        // Next check finishes the job and does not pay the referred side twice
        let status = core
            .check_referral_completion(&ctx, "a2@example.com")
            .await
            .unwrap();
        assert!(status.points_awarded);
        assert_eq!(balance(&store, a1.id).await, 150);
        assert_eq!(balance(&store, a2.id).await, 100);
        assert_ledger_consistent(&core, &ctx, a1.id).await;
        assert_ledger_consistent(&core, &ctx, a2.id).await;
    }

    #[tokio::test]
    async fn test_unreferred_account_reports_checklist_only() {
        let store = MemoryStore::shared();
        let core = create_core(store.clone());
        let ctx = create_ctx();
        let solo = create_account(&store, "solo@example.com").await;
        verify_everything(&store, solo.id).await;

        let status = core
            .check_referral_completion(&ctx, "solo@example.com")
            .await
            .unwrap();
        assert!(status.referral_id.is_none());
        assert!(!status.points_awarded);
        assert_eq!(balance(&store, solo.id).await, 0);
    }

    #[tokio::test]
    async fn test_register_rejects_unknown_tag_and_self_referral() {
        let store = MemoryStore::shared();
        let core = create_core(store.clone());
        let ctx = create_ctx();
        let a1 = create_account(&store, "self@example.com").await;
        store.set_referral_tag(a1.id, "selftag").await.unwrap();

        assert!(matches!(
            core.referrals().register(&ctx, a1.id, "nope").await,
            Err(RewardError::InvalidReferralTag(_))
        ));
        assert!(matches!(
            core.referrals().register(&ctx, a1.id, "selftag").await,
            Err(RewardError::Conflict(_))
        ));
    }
}

// ============================================================================
// Task Review
// ============================================================================

mod task_review {
    use super::*;

    #[tokio::test]
    async fn test_resubmission_loop_pays_on_approval_only() {
        let store = MemoryStore::shared();
        let core = create_core(store.clone());
        let admin = create_ctx().with_actor("admin_1");
        let ctx = create_ctx();
        let account = create_account(&store, "writer@example.com").await;
        create_task(&store, "blog_post", true, 250).await;

        let first = core
            .submit_task(&ctx, account.id, "blog_post", "https://blog.example.com/draft")
            .await
            .unwrap();
        let rejected = core
            .reject_submission(&admin, first.id, Some("Post is private"))
            .await
            .unwrap();
        assert_eq!(rejected.status, CompletionStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Post is private"));
        assert_eq!(balance(&store, account.id).await, 0);

        let second = core
            .submit_task(&ctx, account.id, "blog_post", "https://blog.example.com/final")
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.status, CompletionStatus::Submitted);
        assert!(second.rejection_reason.is_none());
        assert_eq!(
            second.submission_link.as_deref(),
            Some("https://blog.example.com/final")
        );

        let approved = core
            .approve_submission(&admin, second.id, "admin_1")
            .await
            .unwrap();
        assert!(approved.points_awarded);
        assert_eq!(balance(&store, account.id).await, 250);

        // Approved is terminal for the account too
        assert!(matches!(
            core.submit_task(&ctx, account.id, "blog_post", "https://blog.example.com/again")
                .await,
            Err(RewardError::Conflict(_))
        ));
        assert_ledger_consistent(&core, &ctx, account.id).await;
    }

    #[tokio::test]
    async fn test_concurrent_approvals_pay_once() {
        let store = MemoryStore::shared();
        let core = create_core(store.clone());
        let ctx = create_ctx();
        let account = create_account(&store, "race@example.com").await;
        create_task(&store, "video", true, 400).await;

        let submitted = core
            .submit_task(&ctx, account.id, "video", "https://video.example.com/v/1")
            .await
            .unwrap();

        let approvals = (0..5).map(|i| {
            let core = core.clone();
            let ctx = ctx.clone();
            async move {
                core.approve_submission(&ctx, submitted.id, &format!("admin_{}", i))
                    .await
            }
        });
        let results = join_all(approvals).await;
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(balance(&store, account.id).await, 400);
    }

    #[tokio::test]
    async fn test_deferred_task_reward_settles_later() {
        let flaky = Arc::new(FlakyStore::new(1));
        let store: Arc<dyn Store> = flaky.clone();
        let core = create_core(store.clone());
        let ctx = create_ctx();
        let account = create_account(&store, "later@example.com").await;
        create_task(&store, "join_discord", false, 30).await;

        let record = core
            .complete_task(&ctx, account.id, "join_discord", None)
            .await
            .unwrap();
        assert_eq!(record.status, CompletionStatus::Completed);
        assert!(!record.points_awarded);
        assert_eq!(balance(&store, account.id).await, 0);

        let settled = core.tasks().settle_reward(&ctx, record.id).await.unwrap();
        assert!(settled.points_awarded);
        let settled = core.tasks().settle_reward(&ctx, record.id).await.unwrap();
        assert!(settled.points_awarded);
        assert_eq!(balance(&store, account.id).await, 30);
    }
}

// ============================================================================
// Ban Gate
// ============================================================================

mod ban_gate {
    use super::*;

    #[tokio::test]
    async fn test_banned_account_cannot_submit() {
        let store = MemoryStore::shared();
        let core = create_core(store.clone());
        let ctx = create_ctx();
        let account = create_account(&store, "spammer@example.com").await;
        create_task(&store, "tweet", true, 20).await;
        create_task(&store, "follow", false, 10).await;

        core.bans()
            .ban(&ctx, account.id, "spam links", Some(ctx.now + Duration::days(1)))
            .await
            .unwrap();

        let err = core
            .submit_task(&ctx, account.id, "tweet", "https://x.com/s/1")
            .await
            .unwrap_err();
        assert!(matches!(err, RewardError::Banned { ref reason, .. } if reason == "spam links"));

        let err = core
            .complete_task(&ctx, account.id, "follow", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RewardError::Banned { .. }));
        assert!(store
            .get_completion(account.id, "tweet")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_expired_ban_lifts_on_next_action() {
        let store = MemoryStore::shared();
        let core = create_core(store.clone());
        let ctx = create_ctx();
        let account = create_account(&store, "reformed@example.com").await;
        create_task(&store, "follow", false, 10).await;

        store
            .set_ban(
                account.id,
                &BanState::banned("cooldown", Some(ctx.now - Duration::hours(1))),
            )
            .await
            .unwrap();

        let record = core
            .complete_task(&ctx, account.id, "follow", None)
            .await
            .unwrap();
        assert!(record.points_awarded);
        assert!(!store.get_account(account.id).await.unwrap().unwrap().ban.banned);
    }

    #[tokio::test]
    async fn test_ban_with_future_expiry_holds() {
        let store = MemoryStore::shared();
        let core = create_core(store.clone());
        let ctx = create_ctx();
        let account = create_account(&store, "held@example.com").await;
        let until = ctx.now + Duration::minutes(5);
        core.bans().ban(&ctx, account.id, "", Some(until)).await.unwrap();

        let decision = core.check_ban(&ctx, account.id).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason.as_deref(), Some("Account is banned"));
        assert_eq!(decision.until, Some(until));

        // Same account, evaluated after expiry
        let later = ctx.clone().at(until + Duration::seconds(1));
        let decision = core.check_ban(&later, account.id).await.unwrap();
        assert!(decision.allowed);
        assert!(decision.lifted);
    }

    #[tokio::test]
    async fn test_reban_during_expiry_check_still_denies() {
        let flaky = Arc::new(FlakyStore::new(0));
        let store: Arc<dyn Store> = flaky.clone();
        let core = create_core(store.clone());
        let ctx = create_ctx();
        let account = create_account(&store, "repeat@example.com").await;
        create_task(&store, "follow", false, 10).await;

        store
            .set_ban(
                account.id,
                &BanState::banned("cooldown", Some(ctx.now - Duration::hours(1))),
            )
            .await
            .unwrap();
        // The gate reads the expired ban, then an admin bans again for a week
        let until = ctx.now + Duration::days(7);
        flaky.ban_after_next_read(BanState::banned("fraud", Some(until)));

        let decision = core.check_ban(&ctx, account.id).await.unwrap();
        assert!(!decision.allowed);
        assert!(!decision.lifted);
        assert_eq!(decision.reason.as_deref(), Some("fraud"));
        assert_eq!(decision.until, Some(until));

        let stored = store.get_account(account.id).await.unwrap().unwrap();
        assert!(stored.ban.banned);

        let err = core
            .complete_task(&ctx, account.id, "follow", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RewardError::Banned { ref reason, .. } if reason == "fraud"));
        assert_eq!(balance(&store, account.id).await, 0);
    }
}

// ============================================================================
// Bot Scoring
// ============================================================================

mod bot_scoring {
    use super::*;

    fn attempt(email: &str, ip: &str) -> SignupAttempt {
        SignupAttempt {
            email: email.to_string(),
            ip: ip.to_string(),
            user_agent: Some("Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5) Safari/605.1.15".to_string()),
            accept_language: Some("en-US,en;q=0.9".to_string()),
            accept_encoding: Some("gzip, deflate, br".to_string()),
        }
    }

    #[tokio::test]
    async fn test_third_signup_from_ip_blocked() {
        let store = MemoryStore::shared();
        let core = create_core(store.clone());
        let ctx = create_ctx();

        for email in ["one@example.com", "two@example.com"] {
            let signup = attempt(email, "203.0.113.7");
            let verdict = core.evaluate_signup(&ctx, &signup).await.unwrap();
            assert!(verdict.allow, "{} should pass", email);
            core.bots()
                .record_signup(&ctx, &signup, &verdict.fingerprint)
                .await
                .unwrap();
        }

        let verdict = core
            .evaluate_signup(&ctx, &attempt("three@example.com", "203.0.113.7"))
            .await
            .unwrap();
        assert!(!verdict.allow);
        assert_eq!(verdict.block_reason, Some(BlockReason::TooManyFromIp));

        let blocked = ctx
            .audit_log()
            .get_recent(10)
            .await
            .into_iter()
            .any(|e| matches!(e.event_type, AuditEventType::SignupBlocked { .. }));
        assert!(blocked);
    }

    #[tokio::test]
    async fn test_fingerprint_returned_even_when_blocked() {
        let store = MemoryStore::shared();
        let core = create_core(store.clone());
        let ctx = create_ctx();
        store
            .insert_account(&Account::new("fresh@example.com").with_created_at(ctx.now))
            .await
            .unwrap();

        let signup = attempt("fresh@example.com", "198.51.100.1");
        let verdict = core.evaluate_signup(&ctx, &signup).await.unwrap();
        assert!(!verdict.allow);
        assert_eq!(verdict.block_reason, Some(BlockReason::TooManyFromEmail));
        assert_eq!(verdict.fingerprint, signup.fingerprint());
    }
}

// ============================================================================
// Audit Logging
// ============================================================================

mod audit_logging {
    use super::*;

    #[tokio::test]
    async fn test_entries_carry_request_id_and_actor() {
        let store = MemoryStore::shared();
        let core = create_core(store.clone());
        let ctx = create_ctx()
            .with_request_id("req-42")
            .with_actor("admin_7");
        let account = create_account(&store, "audited@example.com").await;

        core.award(&ctx, account.id, 5, "manual", TransactionMetadata::default())
            .await
            .unwrap();

        let entries = ctx.audit_log().get_for_request("req-42").await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].actor.as_deref(), Some("admin_7"));
        assert!(matches!(
            entries[0].event_type,
            AuditEventType::PointsAwarded { amount: 5, .. }
        ));
    }
}
