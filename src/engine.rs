//! Entry points the HTTP shell calls, one per request.

use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::WaitlistConfig;
use crate::context::RequestContext;
use crate::error::RewardResult;
use crate::ledger::{AwardReceipt, PointsLedger};
use crate::models::{TaskCompletionRecord, TransactionMetadata};
use crate::referral::{ReferralStatus, ReferralTracker};
use crate::security::{BanDecision, BanGate, BotScorer, BotVerdict, SignupAttempt};
use crate::store::Store;
use crate::tasks::TaskLifecycle;

/// Wires every component over one store. Account-facing task operations pass
/// through the ban gate first.
#[derive(Clone)]
pub struct RewardsCore {
    store: Arc<dyn Store>,
    ledger: PointsLedger,
    referrals: ReferralTracker,
    tasks: TaskLifecycle,
    bans: BanGate,
    bots: BotScorer,
}

impl RewardsCore {
    pub fn new(store: Arc<dyn Store>, config: &WaitlistConfig) -> Self {
        let ledger = PointsLedger::new(store.clone());
        Self {
            referrals: ReferralTracker::new(store.clone(), ledger.clone(), config.rewards.clone()),
            tasks: TaskLifecycle::new(store.clone(), ledger.clone()),
            bans: BanGate::new(store.clone()),
            bots: BotScorer::new(store.clone(), config.bot.to_thresholds()),
            ledger,
            store,
        }
    }

    pub async fn award(
        &self,
        ctx: &RequestContext,
        account_id: Uuid,
        amount: i64,
        reason: &str,
        metadata: TransactionMetadata,
    ) -> RewardResult<AwardReceipt> {
        self.ledger
            .award(ctx, account_id, amount, reason, metadata)
            .instrument(ctx.span("award"))
            .await
    }

    pub async fn check_referral_completion(
        &self,
        ctx: &RequestContext,
        account_email: &str,
    ) -> RewardResult<ReferralStatus> {
        self.referrals
            .check_completion(ctx, account_email)
            .instrument(ctx.span("check_referral_completion"))
            .await
    }

    pub async fn submit_task(
        &self,
        ctx: &RequestContext,
        account_id: Uuid,
        task_id: &str,
        link: &str,
    ) -> RewardResult<TaskCompletionRecord> {
        async {
            self.bans.ensure_allowed(ctx, account_id).await?;
            self.tasks.submit(ctx, account_id, task_id, link).await
        }
        .instrument(ctx.span("submit_task"))
        .await
    }

    pub async fn complete_task(
        &self,
        ctx: &RequestContext,
        account_id: Uuid,
        task_id: &str,
        verification_data: Option<Value>,
    ) -> RewardResult<TaskCompletionRecord> {
        async {
            self.bans.ensure_allowed(ctx, account_id).await?;
            self.tasks
                .complete(ctx, account_id, task_id, verification_data)
                .await
        }
        .instrument(ctx.span("complete_task"))
        .await
    }

    pub async fn approve_submission(
        &self,
        ctx: &RequestContext,
        submission_id: Uuid,
        reviewer_id: &str,
    ) -> RewardResult<TaskCompletionRecord> {
        self.tasks
            .approve(ctx, submission_id, reviewer_id)
            .instrument(ctx.span("approve_submission"))
            .await
    }

    pub async fn reject_submission(
        &self,
        ctx: &RequestContext,
        submission_id: Uuid,
        reason: Option<&str>,
    ) -> RewardResult<TaskCompletionRecord> {
        self.tasks
            .reject(ctx, submission_id, reason)
            .instrument(ctx.span("reject_submission"))
            .await
    }

    pub async fn check_ban(&self, ctx: &RequestContext, account_id: Uuid) -> RewardResult<BanDecision> {
        self.bans
            .check(ctx, account_id)
            .instrument(ctx.span("check_ban"))
            .await
    }

    pub async fn evaluate_signup(
        &self,
        ctx: &RequestContext,
        attempt: &SignupAttempt,
    ) -> RewardResult<BotVerdict> {
        self.bots
            .evaluate(ctx, attempt)
            .instrument(ctx.span("evaluate_signup"))
            .await
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn ledger(&self) -> &PointsLedger {
        &self.ledger
    }

    pub fn referrals(&self) -> &ReferralTracker {
        &self.referrals
    }

    pub fn tasks(&self) -> &TaskLifecycle {
        &self.tasks
    }

    pub fn bans(&self) -> &BanGate {
        &self.bans
    }

    pub fn bots(&self) -> &BotScorer {
        &self.bots
    }
}
