use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{AuditEventType, AuditSeverity};
use crate::context::RequestContext;
use crate::error::{RewardError, RewardResult};
use crate::models::{Account, BanState};
use crate::store::Store;

/// Reason reported when a ban was stored without one
pub const DEFAULT_BAN_REASON: &str = "Account is banned";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BanDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub until: Option<DateTime<Utc>>,
    /// True when this check found an expired ban and cleared it
    pub lifted: bool,
}

impl BanDecision {
    fn allow(lifted: bool) -> Self {
        Self {
            allowed: true,
            reason: None,
            until: None,
            lifted,
        }
    }
}

/// Decides whether an account may act. Expired bans are cleared on the first
/// check after expiry rather than by a background sweep.
#[derive(Clone)]
pub struct BanGate {
    store: Arc<dyn Store>,
}

impl BanGate {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn check(&self, ctx: &RequestContext, account_id: Uuid) -> RewardResult<BanDecision> {
        let account = self.load(account_id).await?;

        if !account.ban.banned {
            return Ok(BanDecision::allow(false));
        }

        if !account.ban.is_expired(ctx.now) {
            return Ok(Self::deny(account.ban));
        }

        if self.store.lift_expired_ban(account_id, ctx.now).await? {
            info!(
                request_id = %ctx.request_id,
                account_id = %account_id,
                "Expired ban lifted"
            );
            ctx.audit(
                AuditEventType::BanLifted {
                    account_id,
                    expired: true,
                },
                AuditSeverity::Info,
            )
            .await;
            return Ok(BanDecision::allow(true));
        }

        // The ban changed under us: cleared by a concurrent check, or replaced by a new one
        let fresh = self.load(account_id).await?;
        if !fresh.ban.banned || fresh.ban.is_expired(ctx.now) {
            return Ok(BanDecision::allow(false));
        }
        Ok(Self::deny(fresh.ban))
    }

    async fn load(&self, account_id: Uuid) -> RewardResult<Account> {
        self.store
            .get_account(account_id)
            .await?
            .ok_or_else(|| RewardError::AccountNotFound(account_id.to_string()))
    }

    fn deny(ban: BanState) -> BanDecision {
        let reason = ban
            .reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BAN_REASON.to_string());
        BanDecision {
            allowed: false,
            reason: Some(reason),
            until: ban.until,
            lifted: false,
        }
    }

    /// `check`, with a denial surfaced as `RewardError::Banned`.
    pub async fn ensure_allowed(&self, ctx: &RequestContext, account_id: Uuid) -> RewardResult<()> {
        let decision = self.check(ctx, account_id).await?;
        if decision.allowed {
            return Ok(());
        }
        warn!(
            request_id = %ctx.request_id,
            account_id = %account_id,
            "Banned account attempted a gated action"
        );
        Err(RewardError::Banned {
            reason: decision
                .reason
                .unwrap_or_else(|| DEFAULT_BAN_REASON.to_string()),
            until: decision.until,
        })
    }

    /// Ban an account. `until = None` bans until an explicit unban.
    pub async fn ban(
        &self,
        ctx: &RequestContext,
        account_id: Uuid,
        reason: &str,
        until: Option<DateTime<Utc>>,
    ) -> RewardResult<()> {
        let reason = match reason.trim() {
            "" => DEFAULT_BAN_REASON,
            r => r,
        };
        if !self
            .store
            .set_ban(account_id, &BanState::banned(reason, until))
            .await?
        {
            return Err(RewardError::AccountNotFound(account_id.to_string()));
        }

        warn!(
            request_id = %ctx.request_id,
            account_id = %account_id,
            reason,
            until = ?until,
            "Account banned"
        );
        ctx.audit(
            AuditEventType::BanApplied {
                account_id,
                reason: reason.to_string(),
            },
            AuditSeverity::Warning,
        )
        .await;
        Ok(())
    }

    pub async fn unban(&self, ctx: &RequestContext, account_id: Uuid) -> RewardResult<()> {
        if !self.store.set_ban(account_id, &BanState::default()).await? {
            return Err(RewardError::AccountNotFound(account_id.to_string()));
        }
        ctx.audit(
            AuditEventType::BanLifted {
                account_id,
                expired: false,
            },
            AuditSeverity::Info,
        )
        .await;
        Ok(())
    }
}
