use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RewardConfig;
use crate::context::RequestContext;
use crate::error::{RewardError, RewardResult};
use crate::ledger::PointsLedger;
use crate::models::{normalize_email, Account, ReferralRecord, TransactionMetadata, VerificationFlags};
use crate::security::{AuditEventType, AuditSeverity};
use crate::store::Store;

pub const REFERRER_REASON: &str = "referral completed";
pub const REFERRED_REASON: &str = "referral bonus";

/// The four verification conditions as the caller sees them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RequirementChecklist {
    pub email_verified: bool,
    pub telegram_verified: bool,
    pub telegram_followed: bool,
    pub tag_created: bool,
}

impl From<VerificationFlags> for RequirementChecklist {
    fn from(flags: VerificationFlags) -> Self {
        Self {
            email_verified: flags.email_verified,
            telegram_verified: flags.telegram_verified,
            telegram_followed: flags.telegram_followed,
            tag_created: flags.tag_created,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferralStatus {
    /// None when the account was not referred by anyone
    pub referral_id: Option<Uuid>,
    pub requirements: RequirementChecklist,
    pub all_verifications_complete: bool,
    pub points_awarded: bool,
    /// True only for the call that flipped `points_awarded`
    pub reward_paid_now: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReferralStats {
    pub total: usize,
    pub completed: usize,
    pub rewarded: usize,
}

#[derive(Clone)]
pub struct ReferralTracker {
    store: Arc<dyn Store>,
    ledger: PointsLedger,
    rewards: RewardConfig,
}

impl ReferralTracker {
    pub fn new(store: Arc<dyn Store>, ledger: PointsLedger, rewards: RewardConfig) -> Self {
        Self {
            store,
            ledger,
            rewards,
        }
    }

    /// Link a freshly signed-up account to the owner of `referral_tag` and open the
    /// pending referral record. Calling it again for the same pair is harmless.
    pub async fn register(
        &self,
        ctx: &RequestContext,
        referred_account_id: Uuid,
        referral_tag: &str,
    ) -> RewardResult<ReferralRecord> {
        let referred = self.load_account(referred_account_id).await?;
        let referrer = self
            .store
            .find_account_by_tag(referral_tag.trim())
            .await?
            .ok_or_else(|| RewardError::InvalidReferralTag(referral_tag.to_string()))?;

        if referrer.id == referred.id {
            return Err(RewardError::conflict("an account cannot refer itself"));
        }
        if let Some(existing) = referred.referred_by {
            if existing != referrer.id {
                return Err(RewardError::conflict("account was already referred"));
            }
        }

        self.store.set_referred_by(referred.id, referrer.id).await?;
        let record = self
            .store
            .ensure_referral(&ReferralRecord::new(referrer.id, &referred.email, ctx.now))
            .await?;

        info!(
            request_id = %ctx.request_id,
            referral_id = %record.id,
            referrer_id = %referrer.id,
            "Referral registered"
        );
        Ok(record)
    }

    /// Re-evaluate the referral of the account with `account_email`, refreshing the
    /// mirrored flags and paying the reward if it is due.
    pub async fn check_completion(
        &self,
        ctx: &RequestContext,
        account_email: &str,
    ) -> RewardResult<ReferralStatus> {
        let email = normalize_email(account_email);
        let referred = self
            .store
            .find_account_by_email(&email)
            .await?
            .ok_or_else(|| RewardError::AccountNotFound(email.clone()))?;

        let Some(referrer_id) = referred.referred_by else {
            return Ok(ReferralStatus {
                referral_id: None,
                requirements: referred.verification.into(),
                all_verifications_complete: referred.verification.all_complete(),
                points_awarded: false,
                reward_paid_now: false,
            });
        };

        let record = self
            .store
            .ensure_referral(&ReferralRecord::new(referrer_id, &email, ctx.now))
            .await?;
        let was_complete = record.all_verifications_complete;
        let record = self
            .store
            .refresh_referral(record.id, referred.verification, ctx.now)
            .await?;

        if record.all_verifications_complete && !was_complete {
            info!(
                request_id = %ctx.request_id,
                referral_id = %record.id,
                referrer_id = %referrer_id,
                "Referral verifications complete"
            );
        }

        let mut reward_paid_now = false;
        let mut points_awarded = record.points_awarded;
        if record.reward_due() {
            reward_paid_now = self.pay_reward(ctx, &record, &referred).await;
            points_awarded = reward_paid_now
                || self
                    .store
                    .find_referral(referrer_id, &email)
                    .await?
                    .map(|r| r.points_awarded)
                    .unwrap_or(false);
        }

        Ok(ReferralStatus {
            referral_id: Some(record.id),
            requirements: referred.verification.into(),
            all_verifications_complete: record.all_verifications_complete,
            points_awarded,
            reward_paid_now,
        })
    }

    /// Award both sides independently; flip the guard only when both are paid.
    /// Returns whether this call flipped it. Failures are deferred to the next check.
    async fn pay_reward(&self, ctx: &RequestContext, record: &ReferralRecord, referred: &Account) -> bool {
        let referrer_id = record.referrer_id;

        let referrer_award = self
            .ledger
            .award_idempotent(
                ctx,
                referrer_id,
                self.rewards.referrer_reward,
                REFERRER_REASON,
                TransactionMetadata::ReferralReward {
                    referral_id: record.id,
                    counterparty_id: referred.id,
                },
                &format!("referral:{}:referrer", record.id),
            )
            .await;
        let referred_award = self
            .ledger
            .award_idempotent(
                ctx,
                referred.id,
                self.rewards.referred_reward,
                REFERRED_REASON,
                TransactionMetadata::ReferralReward {
                    referral_id: record.id,
                    counterparty_id: referrer_id,
                },
                &format!("referral:{}:referred", record.id),
            )
            .await;

        let failure = match (&referrer_award, &referred_award) {
            (Ok(_), Ok(_)) => None,
            (Err(e), _) => Some(format!("referrer award failed: {}", e)),
            (_, Err(e)) => Some(format!("referred award failed: {}", e)),
        };
        if let Some(error) = failure {
            self.defer(ctx, record, error).await;
            return false;
        }

        match self.store.mark_referral_rewarded(record.id, referrer_id).await {
            Ok(true) => {
                info!(
                    request_id = %ctx.request_id,
                    referral_id = %record.id,
                    referrer_id = %referrer_id,
                    referred_id = %referred.id,
                    "Referral reward paid"
                );
                ctx.audit(
                    AuditEventType::ReferralCompleted {
                        referral_id: record.id,
                        referrer_id,
                    },
                    AuditSeverity::Info,
                )
                .await;
                true
            }
            Ok(false) => {
                debug!(
                    request_id = %ctx.request_id,
                    referral_id = %record.id,
                    "Referral reward already marked by a concurrent check"
                );
                false
            }
            Err(e) => {
                self.defer(ctx, record, format!("marking reward failed: {}", e))
                    .await;
                false
            }
        }
    }

    async fn defer(&self, ctx: &RequestContext, record: &ReferralRecord, error: String) {
        warn!(
            request_id = %ctx.request_id,
            referral_id = %record.id,
            error = %error,
            "Referral reward deferred to next check"
        );
        ctx.audit(
            AuditEventType::RewardDeferred {
                subject: format!("referral:{}", record.id),
                error,
            },
            AuditSeverity::Warning,
        )
        .await;
    }

    pub async fn stats(&self, _ctx: &RequestContext, referrer_id: Uuid) -> RewardResult<ReferralStats> {
        self.load_account(referrer_id).await?;
        let records = self.store.list_referrals(referrer_id).await?;

        Ok(ReferralStats {
            total: records.len(),
            completed: records.iter().filter(|r| r.all_verifications_complete).count(),
            rewarded: records.iter().filter(|r| r.points_awarded).count(),
        })
    }

    async fn load_account(&self, id: Uuid) -> RewardResult<Account> {
        self.store
            .get_account(id)
            .await?
            .ok_or_else(|| RewardError::AccountNotFound(id.to_string()))
    }
}
