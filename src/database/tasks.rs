//! Task Repository - PostgreSQL operations for task definitions and completions

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use super::{db_error, from_json, to_json};
use crate::error::StoreError;
use crate::models::{CompletionStatus, TaskCompletionRecord, TaskDefinition, TaskEvidence};

const COMPLETION_COLUMNS: &str = r#"
    id, account_id, task_id, status, submission_link, evidence, submitted_at, completed_at,
    reviewed_at, reviewed_by, rejection_reason, points_awarded
"#;

fn completion_from_row(row: &PgRow) -> Result<TaskCompletionRecord, StoreError> {
    let status: String = row.get("status");
    let evidence: Option<serde_json::Value> = row.get("evidence");
    Ok(TaskCompletionRecord {
        id: row.get("id"),
        account_id: row.get("account_id"),
        task_id: row.get("task_id"),
        status: status.parse().map_err(StoreError::Serialization)?,
        submission_link: row.get("submission_link"),
        evidence: evidence.map(from_json::<TaskEvidence>).transpose()?,
        submitted_at: row.get("submitted_at"),
        completed_at: row.get("completed_at"),
        reviewed_at: row.get("reviewed_at"),
        reviewed_by: row.get("reviewed_by"),
        rejection_reason: row.get("rejection_reason"),
        points_awarded: row.get("points_awarded"),
    })
}

pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn upsert_task(&self, task: &TaskDefinition) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO task_definitions
            (task_id, title, task_type, requires_verification, points_reward, active)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (task_id) DO UPDATE SET
                title = EXCLUDED.title,
                task_type = EXCLUDED.task_type,
                requires_verification = EXCLUDED.requires_verification,
                points_reward = EXCLUDED.points_reward,
                active = EXCLUDED.active
            "#,
        )
        .bind(&task.task_id)
        .bind(&task.title)
        .bind(task.task_type.as_str())
        .bind(task.requires_verification)
        .bind(task.points_reward)
        .bind(task.active)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to upsert task", e))?;

        debug!(task_id = %task.task_id, "Task definition stored");
        Ok(())
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Option<TaskDefinition>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT task_id, title, task_type, requires_verification, points_reward, active
            FROM task_definitions WHERE task_id = $1
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get task", e))?;

        row.map(|row| {
            let task_type: String = row.get("task_type");
            Ok(TaskDefinition {
                task_id: row.get("task_id"),
                title: row.get("title"),
                task_type: task_type.parse().map_err(StoreError::Serialization)?,
                requires_verification: row.get("requires_verification"),
                points_reward: row.get("points_reward"),
                active: row.get("active"),
            })
        })
        .transpose()
    }

    pub async fn insert_completion(&self, record: &TaskCompletionRecord) -> Result<(), StoreError> {
        let evidence = record.evidence.as_ref().map(to_json).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO task_completions
            (id, account_id, task_id, status, submission_link, evidence, submitted_at, completed_at,
             reviewed_at, reviewed_by, rejection_reason, points_awarded)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(record.id)
        .bind(record.account_id)
        .bind(&record.task_id)
        .bind(record.status.as_str())
        .bind(&record.submission_link)
        .bind(evidence)
        .bind(record.submitted_at)
        .bind(record.completed_at)
        .bind(record.reviewed_at)
        .bind(&record.reviewed_by)
        .bind(&record.rejection_reason)
        .bind(record.points_awarded)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert completion", e))?;

        Ok(())
    }

    pub async fn get_completion(
        &self,
        account_id: Uuid,
        task_id: &str,
    ) -> Result<Option<TaskCompletionRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM task_completions WHERE account_id = $1 AND task_id = $2",
            COMPLETION_COLUMNS
        ))
        .bind(account_id)
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get completion", e))?;

        row.as_ref().map(completion_from_row).transpose()
    }

    pub async fn get_completion_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<TaskCompletionRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM task_completions WHERE id = $1",
            COMPLETION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get completion", e))?;

        row.as_ref().map(completion_from_row).transpose()
    }

    /// Compare-and-set on status. `points_awarded` is left as stored.
    pub async fn transition(
        &self,
        next: &TaskCompletionRecord,
        expected: &[CompletionStatus],
    ) -> Result<Option<TaskCompletionRecord>, StoreError> {
        let expected: Vec<String> = expected.iter().map(|s| s.as_str().to_string()).collect();
        let evidence = next.evidence.as_ref().map(to_json).transpose()?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE task_completions SET
                status = $2,
                submission_link = $3,
                evidence = $4,
                submitted_at = $5,
                completed_at = $6,
                reviewed_at = $7,
                reviewed_by = $8,
                rejection_reason = $9
            WHERE id = $1 AND status = ANY($10)
            RETURNING {}
            "#,
            COMPLETION_COLUMNS
        ))
        .bind(next.id)
        .bind(next.status.as_str())
        .bind(&next.submission_link)
        .bind(evidence)
        .bind(next.submitted_at)
        .bind(next.completed_at)
        .bind(next.reviewed_at)
        .bind(&next.reviewed_by)
        .bind(&next.rejection_reason)
        .bind(&expected)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to transition completion", e))?;

        row.as_ref().map(completion_from_row).transpose()
    }

    pub async fn mark_rewarded(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE task_completions SET points_awarded = TRUE WHERE id = $1 AND points_awarded = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to mark completion rewarded", e))?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        match self.get_completion_by_id(id).await? {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(format!("completion {}", id))),
        }
    }
}
