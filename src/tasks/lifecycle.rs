use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::context::RequestContext;
use crate::error::{RewardError, RewardResult, StoreError};
use crate::ledger::PointsLedger;
use crate::models::{
    CompletionStatus, TaskCompletionRecord, TaskDefinition, TaskEvidence, TransactionMetadata,
};
use crate::security::{AuditEventType, AuditSeverity};
use crate::store::Store;

pub const DEFAULT_REJECTION_REASON: &str = "Submission did not meet the task requirements";

/// Statuses a submission or direct completion may start from
const OPEN_STATUSES: &[CompletionStatus] = &[
    CompletionStatus::Pending,
    CompletionStatus::Submitted,
    CompletionStatus::Rejected,
];

/// Submission links must be absolute http(s) URLs with a host.
fn validate_link(link: &str) -> RewardResult<String> {
    let parsed = Url::parse(link.trim()).map_err(|e| RewardError::InvalidLink(e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(RewardError::InvalidLink(format!(
            "unsupported scheme: {}",
            parsed.scheme()
        )));
    }
    if parsed.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(RewardError::InvalidLink("missing host".to_string()));
    }
    Ok(parsed.to_string())
}

#[derive(Clone)]
pub struct TaskLifecycle {
    store: Arc<dyn Store>,
    ledger: PointsLedger,
}

impl TaskLifecycle {
    pub fn new(store: Arc<dyn Store>, ledger: PointsLedger) -> Self {
        Self { store, ledger }
    }

    /// Submit (or resubmit after rejection) a link for a review-path task.
    pub async fn submit(
        &self,
        ctx: &RequestContext,
        account_id: Uuid,
        task_id: &str,
        link: &str,
    ) -> RewardResult<TaskCompletionRecord> {
        let link = validate_link(link)?;
        self.ensure_account(account_id).await?;
        let task = self.load_active_task(task_id).await?;
        if !task.requires_verification {
            return Err(RewardError::conflict(
                "task does not require review, complete it directly",
            ));
        }

        let existing = self.store.get_completion(account_id, task_id).await?;
        if let Some(record) = &existing {
            if record.status.is_terminal() {
                return Err(RewardError::conflict(format!(
                    "task already {}",
                    record.status
                )));
            }
        }

        let is_new = existing.is_none();
        let mut next = existing.unwrap_or_else(|| TaskCompletionRecord::new(account_id, task_id));
        next.status = CompletionStatus::Submitted;
        next.submission_link = Some(link.clone());
        next.evidence = Some(TaskEvidence::Link { url: link });
        next.submitted_at = Some(ctx.now);
        next.reviewed_at = None;
        next.reviewed_by = None;
        next.rejection_reason = None;

        let stored = self.write(next, is_new, OPEN_STATUSES).await?;
        info!(
            request_id = %ctx.request_id,
            account_id = %account_id,
            task_id = %task_id,
            submission_id = %stored.id,
            "Task submitted for review"
        );
        Ok(stored)
    }

    /// Complete a direct-path task and pay its reward.
    pub async fn complete(
        &self,
        ctx: &RequestContext,
        account_id: Uuid,
        task_id: &str,
        verification_data: Option<serde_json::Value>,
    ) -> RewardResult<TaskCompletionRecord> {
        self.ensure_account(account_id).await?;
        let task = self.load_active_task(task_id).await?;
        if task.requires_verification {
            return Err(RewardError::conflict(
                "task requires review, submit a link instead",
            ));
        }

        let existing = self.store.get_completion(account_id, task_id).await?;
        if let Some(record) = &existing {
            if record.status.is_terminal() {
                return Err(RewardError::conflict("task already completed"));
            }
        }

        let is_new = existing.is_none();
        let mut next = existing.unwrap_or_else(|| TaskCompletionRecord::new(account_id, task_id));
        next.status = CompletionStatus::Completed;
        next.completed_at = Some(ctx.now);
        if let Some(data) = verification_data {
            next.evidence = Some(TaskEvidence::Payload { data });
        }

        let stored = self.write(next, is_new, OPEN_STATUSES).await?;
        debug!(
            request_id = %ctx.request_id,
            account_id = %account_id,
            task_id = %task_id,
            "Task completed"
        );
        self.reward(ctx, stored, &task).await
    }

    /// Approve a submitted record and pay its reward.
    pub async fn approve(
        &self,
        ctx: &RequestContext,
        submission_id: Uuid,
        reviewer_id: &str,
    ) -> RewardResult<TaskCompletionRecord> {
        let mut next = self.load_submitted(submission_id).await?;
        next.status = CompletionStatus::Approved;
        next.reviewed_at = Some(ctx.now);
        next.reviewed_by = Some(reviewer_id.to_string());
        next.completed_at = Some(ctx.now);
        next.rejection_reason = None;

        let stored = self.write(next, false, &[CompletionStatus::Submitted]).await?;
        self.audit_review(ctx, &stored, true).await;

        match self.store.get_task(&stored.task_id).await? {
            Some(task) => self.reward(ctx, stored, &task).await,
            None => {
                warn!(
                    request_id = %ctx.request_id,
                    task_id = %stored.task_id,
                    "Approved submission references a missing task, no reward paid"
                );
                Ok(stored)
            }
        }
    }

    /// Reject a submitted record. The account may resubmit afterwards.
    pub async fn reject(
        &self,
        ctx: &RequestContext,
        submission_id: Uuid,
        reason: Option<&str>,
    ) -> RewardResult<TaskCompletionRecord> {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REJECTION_REASON);

        let mut next = self.load_submitted(submission_id).await?;
        next.status = CompletionStatus::Rejected;
        next.reviewed_at = Some(ctx.now);
        next.reviewed_by = ctx.actor.clone();
        next.rejection_reason = Some(reason.to_string());

        let stored = self.write(next, false, &[CompletionStatus::Submitted]).await?;
        self.audit_review(ctx, &stored, false).await;
        Ok(stored)
    }

    /// Retry a reward that an earlier approval or completion could not pay.
    pub async fn settle_reward(
        &self,
        ctx: &RequestContext,
        submission_id: Uuid,
    ) -> RewardResult<TaskCompletionRecord> {
        let record = self
            .store
            .get_completion_by_id(submission_id)
            .await?
            .ok_or_else(|| RewardError::SubmissionNotFound(submission_id.to_string()))?;
        if !record.status.is_terminal() || record.points_awarded {
            return Ok(record);
        }

        match self.store.get_task(&record.task_id).await? {
            Some(task) => self.reward(ctx, record, &task).await,
            None => Ok(record),
        }
    }

    async fn reward(
        &self,
        ctx: &RequestContext,
        mut record: TaskCompletionRecord,
        task: &TaskDefinition,
    ) -> RewardResult<TaskCompletionRecord> {
        if record.points_awarded || task.points_reward <= 0 {
            return Ok(record);
        }

        let award = self
            .ledger
            .award_idempotent(
                ctx,
                record.account_id,
                task.points_reward,
                &format!("task reward: {}", task.task_id),
                TransactionMetadata::TaskReward {
                    task_id: task.task_id.clone(),
                    completion_id: record.id,
                },
                &format!("task:{}", record.id),
            )
            .await;

        let error = match award {
            Ok(_) => match self.store.mark_completion_rewarded(record.id).await {
                Ok(_) => {
                    record.points_awarded = true;
                    return Ok(record);
                }
                Err(e) => e.to_string(),
            },
            Err(e) => e.to_string(),
        };

        warn!(
            request_id = %ctx.request_id,
            submission_id = %record.id,
            error = %error,
            "Task reward deferred"
        );
        ctx.audit(
            AuditEventType::RewardDeferred {
                subject: format!("task:{}", record.id),
                error,
            },
            AuditSeverity::Warning,
        )
        .await;
        Ok(record)
    }

    /// Insert a new record or compare-and-set an existing one. Losing a race to a
    /// concurrent writer surfaces as `Conflict`.
    async fn write(
        &self,
        next: TaskCompletionRecord,
        is_new: bool,
        expected: &[CompletionStatus],
    ) -> RewardResult<TaskCompletionRecord> {
        if is_new {
            return match self.store.insert_completion(&next).await {
                Ok(()) => Ok(next),
                Err(StoreError::Duplicate(_)) => Err(RewardError::conflict(
                    "completion was modified concurrently",
                )),
                Err(e) => Err(e.into()),
            };
        }

        self.store
            .transition_completion(&next, expected)
            .await?
            .ok_or_else(|| RewardError::conflict("completion was modified concurrently"))
    }

    async fn load_submitted(&self, submission_id: Uuid) -> RewardResult<TaskCompletionRecord> {
        let record = self
            .store
            .get_completion_by_id(submission_id)
            .await?
            .ok_or_else(|| RewardError::SubmissionNotFound(submission_id.to_string()))?;
        if record.status != CompletionStatus::Submitted {
            return Err(RewardError::conflict(format!(
                "submission is {}, not submitted",
                record.status
            )));
        }
        Ok(record)
    }

    async fn load_active_task(&self, task_id: &str) -> RewardResult<TaskDefinition> {
        let task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| RewardError::TaskNotFound(task_id.to_string()))?;
        if !task.active {
            return Err(RewardError::TaskInactive(task_id.to_string()));
        }
        Ok(task)
    }

    async fn ensure_account(&self, account_id: Uuid) -> RewardResult<()> {
        match self.store.get_account(account_id).await? {
            Some(_) => Ok(()),
            None => Err(RewardError::AccountNotFound(account_id.to_string())),
        }
    }

    async fn audit_review(&self, ctx: &RequestContext, record: &TaskCompletionRecord, approved: bool) {
        ctx.audit(
            AuditEventType::SubmissionReviewed {
                submission_id: record.id,
                approved,
                reviewer: record.reviewed_by.clone(),
            },
            AuditSeverity::Info,
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Account, TaskType};
    use crate::security::AuditLogger;
    use crate::store::MemoryStore;

    struct Fixture {
        store: Arc<dyn Store>,
        lifecycle: TaskLifecycle,
        ctx: RequestContext,
        account: Account,
    }

    fn task(task_id: &str, requires_verification: bool, points_reward: i64) -> TaskDefinition {
        TaskDefinition {
            task_id: task_id.to_string(),
            title: task_id.replace('_', " "),
            task_type: TaskType::Social,
            requires_verification,
            points_reward,
            active: true,
        }
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::shared();
        let account = Account::new("tasker@example.com");
        store.insert_account(&account).await.unwrap();
        store.upsert_task(&task("follow_x", false, 50)).await.unwrap();
        store.upsert_task(&task("write_thread", true, 200)).await.unwrap();
        store.upsert_task(&task("say_hi", false, 0)).await.unwrap();

        let ledger = PointsLedger::new(store.clone());
        Fixture {
            lifecycle: TaskLifecycle::new(store.clone(), ledger),
            ctx: RequestContext::new(Arc::new(AuditLogger::new())).with_actor("admin_1"),
            store,
            account,
        }
    }

    async fn balance(store: &Arc<dyn Store>, id: Uuid) -> i64 {
        store.get_account(id).await.unwrap().unwrap().points
    }

    #[test]
    fn test_link_validation() {
        assert!(validate_link("https://x.com/user/status/1").is_ok());
        assert!(validate_link("http://example.org/post").is_ok());
        assert!(matches!(
            validate_link("not a url"),
            Err(RewardError::InvalidLink(_))
        ));
        assert!(matches!(
            validate_link("ftp://example.org/file"),
            Err(RewardError::InvalidLink(_))
        ));
    }

    #[tokio::test]
    async fn test_direct_completion_rewards_once() {
        let f = fixture().await;
        let record = f
            .lifecycle
            .complete(&f.ctx, f.account.id, "follow_x", None)
            .await
            .unwrap();
        assert_eq!(record.status, CompletionStatus::Completed);
        assert!(record.points_awarded);

        let err = f
            .lifecycle
            .complete(&f.ctx, f.account.id, "follow_x", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RewardError::Conflict(_)));
        assert_eq!(balance(&f.store, f.account.id).await, 50);
    }

    #[tokio::test]
    async fn test_zero_reward_task_leaves_guard_unset() {
        let f = fixture().await;
        let record = f
            .lifecycle
            .complete(&f.ctx, f.account.id, "say_hi", Some(serde_json::json!({"ok": true})))
            .await
            .unwrap();
        assert_eq!(record.status, CompletionStatus::Completed);
        assert!(!record.points_awarded);
        assert!(matches!(record.evidence, Some(TaskEvidence::Payload { .. })));
    }

    #[tokio::test]
    async fn test_complete_rejects_review_task() {
        let f = fixture().await;
        let err = f
            .lifecycle
            .complete(&f.ctx, f.account.id, "write_thread", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RewardError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_inactive_and_missing_tasks() {
        let f = fixture().await;
        let mut inactive = task("old_task", false, 10);
        inactive.active = false;
        f.store.upsert_task(&inactive).await.unwrap();

        assert!(matches!(
            f.lifecycle.complete(&f.ctx, f.account.id, "old_task", None).await,
            Err(RewardError::TaskInactive(_))
        ));
        assert!(matches!(
            f.lifecycle.complete(&f.ctx, f.account.id, "missing", None).await,
            Err(RewardError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_review_approve_pays() {
        let f = fixture().await;
        let submitted = f
            .lifecycle
            .submit(&f.ctx, f.account.id, "write_thread", "https://x.com/t/1")
            .await
            .unwrap();
        assert_eq!(submitted.status, CompletionStatus::Submitted);
        assert_eq!(balance(&f.store, f.account.id).await, 0);

        let approved = f
            .lifecycle
            .approve(&f.ctx, submitted.id, "admin_1")
            .await
            .unwrap();
        assert_eq!(approved.status, CompletionStatus::Approved);
        assert_eq!(approved.reviewed_by.as_deref(), Some("admin_1"));
        assert!(approved.points_awarded);
        assert_eq!(balance(&f.store, f.account.id).await, 200);

        // Approving twice is a wrong-state transition
        assert!(matches!(
            f.lifecycle.approve(&f.ctx, submitted.id, "admin_1").await,
            Err(RewardError::Conflict(_))
        ));
        assert_eq!(balance(&f.store, f.account.id).await, 200);
    }

    #[tokio::test]
    async fn test_reject_uses_default_reason_and_pays_nothing() {
        let f = fixture().await;
        let submitted = f
            .lifecycle
            .submit(&f.ctx, f.account.id, "write_thread", "https://x.com/t/1")
            .await
            .unwrap();

        let rejected = f.lifecycle.reject(&f.ctx, submitted.id, Some("  ")).await.unwrap();
        assert_eq!(rejected.status, CompletionStatus::Rejected);
        assert_eq!(
            rejected.rejection_reason.as_deref(),
            Some(DEFAULT_REJECTION_REASON)
        );
        assert_eq!(balance(&f.store, f.account.id).await, 0);
    }

    #[tokio::test]
    async fn test_reject_requires_submitted_status() {
        let f = fixture().await;
        f.store.upsert_task(&task("write_blog", true, 80)).await.unwrap();

        let approved = f
            .lifecycle
            .submit(&f.ctx, f.account.id, "write_thread", "https://x.com/t/1")
            .await
            .unwrap();
        f.lifecycle.approve(&f.ctx, approved.id, "admin_1").await.unwrap();

        let rejected = f
            .lifecycle
            .submit(&f.ctx, f.account.id, "write_blog", "https://blog.example.com/p/1")
            .await
            .unwrap();
        f.lifecycle
            .reject(&f.ctx, rejected.id, Some("off topic"))
            .await
            .unwrap();

        for (id, reason) in [(approved.id, "too late"), (rejected.id, "still off topic")] {
            assert!(matches!(
                f.lifecycle.reject(&f.ctx, id, Some(reason)).await,
                Err(RewardError::Conflict(_))
            ));
        }

        let approved = f.store.get_completion_by_id(approved.id).await.unwrap().unwrap();
        assert_eq!(approved.status, CompletionStatus::Approved);
        assert_eq!(approved.rejection_reason, None);
        let rejected = f.store.get_completion_by_id(rejected.id).await.unwrap().unwrap();
        assert_eq!(rejected.status, CompletionStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("off topic"));
        assert_eq!(balance(&f.store, f.account.id).await, 200);
    }

    #[tokio::test]
    async fn test_submit_requires_valid_link() {
        let f = fixture().await;
        let err = f
            .lifecycle
            .submit(&f.ctx, f.account.id, "write_thread", "thread please")
            .await
            .unwrap_err();
        assert!(matches!(err, RewardError::InvalidLink(_)));
        assert!(f
            .store
            .get_completion(f.account.id, "write_thread")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unknown_submission() {
        let f = fixture().await;
        assert!(matches!(
            f.lifecycle.approve(&f.ctx, Uuid::new_v4(), "admin_1").await,
            Err(RewardError::SubmissionNotFound(_))
        ));
        assert!(matches!(
            f.lifecycle.reject(&f.ctx, Uuid::new_v4(), None).await,
            Err(RewardError::SubmissionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_settle_reward_is_noop_when_paid() {
        let f = fixture().await;
        let record = f
            .lifecycle
            .complete(&f.ctx, f.account.id, "follow_x", None)
            .await
            .unwrap();

        let settled = f.lifecycle.settle_reward(&f.ctx, record.id).await.unwrap();
        assert!(settled.points_awarded);
        assert_eq!(balance(&f.store, f.account.id).await, 50);
    }
}
