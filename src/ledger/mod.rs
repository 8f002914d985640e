//! Points Ledger
//!
//! The only writer of account balances. Every award appends one immutable
//! transaction and bumps the cached balance in the same store operation, so the
//! cached balance always equals the sum of the account's transactions.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::{RewardError, RewardResult, StoreError};
use crate::models::{PointsTransaction, TransactionMetadata};
use crate::security::{AuditEventType, AuditSeverity};
use crate::store::{AwardOutcome, Store};

/// Upper bound on a single history page
pub const MAX_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AwardReceipt {
    pub new_balance: i64,
    pub transaction_id: Uuid,
    /// False when an earlier award with the same idempotency key already paid
    pub applied: bool,
}

/// Outcome of a balance audit. A mismatch is reported here, never raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceAudit {
    pub account_id: Uuid,
    pub cached: i64,
    pub ledger_sum: i64,
    pub expected: Option<i64>,
    pub consistent: bool,
}

#[derive(Clone)]
pub struct PointsLedger {
    store: Arc<dyn Store>,
}

impl PointsLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Award points to an account.
    pub async fn award(
        &self,
        ctx: &RequestContext,
        account_id: Uuid,
        amount: i64,
        reason: &str,
        metadata: TransactionMetadata,
    ) -> RewardResult<AwardReceipt> {
        let tx = PointsTransaction::new(account_id, amount, reason, metadata, ctx.now);
        self.apply(ctx, tx).await
    }

    /// Award points at most once per `key`. A repeat returns the current balance
    /// with `applied = false` and writes nothing.
    pub async fn award_idempotent(
        &self,
        ctx: &RequestContext,
        account_id: Uuid,
        amount: i64,
        reason: &str,
        metadata: TransactionMetadata,
        key: &str,
    ) -> RewardResult<AwardReceipt> {
        let tx = PointsTransaction::new(account_id, amount, reason, metadata, ctx.now)
            .with_idempotency_key(key);
        self.apply(ctx, tx).await
    }

    async fn apply(&self, ctx: &RequestContext, tx: PointsTransaction) -> RewardResult<AwardReceipt> {
        if tx.amount <= 0 {
            return Err(RewardError::InvalidAmount(tx.amount));
        }

        let outcome = self.store.apply_award(&tx).await.map_err(|e| match e {
            StoreError::NotFound(_) => RewardError::AccountNotFound(tx.account_id.to_string()),
            other => RewardError::Store(other),
        })?;

        match outcome {
            AwardOutcome::Applied { new_balance } => {
                debug!(
                    request_id = %ctx.request_id,
                    account_id = %tx.account_id,
                    amount = tx.amount,
                    reason = %tx.reason,
                    new_balance,
                    "Points awarded"
                );
                ctx.audit(
                    AuditEventType::PointsAwarded {
                        account_id: tx.account_id,
                        amount: tx.amount,
                        reason: tx.reason.clone(),
                    },
                    AuditSeverity::Info,
                )
                .await;
            }
            AwardOutcome::AlreadyApplied { .. } => {
                debug!(
                    request_id = %ctx.request_id,
                    account_id = %tx.account_id,
                    key = ?tx.idempotency_key,
                    "Award skipped, already applied"
                );
            }
        }

        Ok(AwardReceipt {
            new_balance: outcome.balance(),
            transaction_id: tx.id,
            applied: matches!(outcome, AwardOutcome::Applied { .. }),
        })
    }

    /// Recompute the balance from the transaction log and compare it with the cached
    /// balance and, when given, an expected value.
    pub async fn verify_balance(
        &self,
        ctx: &RequestContext,
        account_id: Uuid,
        expected: Option<i64>,
    ) -> RewardResult<BalanceAudit> {
        let account = self
            .store
            .get_account(account_id)
            .await?
            .ok_or_else(|| RewardError::AccountNotFound(account_id.to_string()))?;
        let ledger_sum = self.store.sum_transactions(account_id).await?;

        let consistent =
            account.points == ledger_sum && expected.map(|e| e == ledger_sum).unwrap_or(true);

        if !consistent {
            warn!(
                request_id = %ctx.request_id,
                account_id = %account_id,
                cached = account.points,
                ledger_sum,
                expected = ?expected,
                "Balance mismatch"
            );
            ctx.audit(
                AuditEventType::BalanceMismatch {
                    account_id,
                    cached: account.points,
                    ledger_sum,
                },
                AuditSeverity::Error,
            )
            .await;
        }

        Ok(BalanceAudit {
            account_id,
            cached: account.points,
            ledger_sum,
            expected,
            consistent,
        })
    }

    /// Newest-first page of an account's transactions, at most `MAX_HISTORY_LIMIT`.
    pub async fn history(
        &self,
        _ctx: &RequestContext,
        account_id: Uuid,
        limit: usize,
    ) -> RewardResult<Vec<PointsTransaction>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = limit.min(MAX_HISTORY_LIMIT);
        Ok(self.store.list_transactions(account_id, limit).await?)
    }
}
