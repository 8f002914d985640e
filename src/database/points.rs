//! Points Repository - the transaction log and cached balances

use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use super::{db_error, from_json, to_json};
use crate::error::StoreError;
use crate::models::PointsTransaction;
use crate::store::AwardOutcome;

pub struct PointsRepository {
    pool: PgPool,
}

impl PointsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append the transaction and bump the cached balance in one SQL transaction.
    /// The account row lock serializes concurrent awards to the same account.
    pub async fn apply_award(&self, tx: &PointsTransaction) -> Result<AwardOutcome, StoreError> {
        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin award", e))?;

        let balance: i64 = sqlx::query("SELECT points FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(tx.account_id)
            .fetch_optional(&mut *db_tx)
            .await
            .map_err(|e| db_error("Failed to lock account", e))?
            .map(|row| row.get("points"))
            .ok_or_else(|| StoreError::NotFound(format!("account {}", tx.account_id)))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO points_transactions
            (id, account_id, amount, reason, metadata, idempotency_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(tx.id)
        .bind(tx.account_id)
        .bind(tx.amount)
        .bind(&tx.reason)
        .bind(to_json(&tx.metadata)?)
        .bind(&tx.idempotency_key)
        .bind(tx.created_at)
        .execute(&mut *db_tx)
        .await
        .map_err(|e| db_error("Failed to insert transaction", e))?;

        if inserted.rows_affected() == 0 {
            db_tx
                .rollback()
                .await
                .map_err(|e| db_error("Failed to roll back award", e))?;
            debug!(key = ?tx.idempotency_key, "Award already applied");
            return Ok(AwardOutcome::AlreadyApplied { balance });
        }

        let new_balance: i64 = sqlx::query(
            "UPDATE accounts SET points = points + $2 WHERE id = $1 RETURNING points",
        )
        .bind(tx.account_id)
        .bind(tx.amount)
        .fetch_one(&mut *db_tx)
        .await
        .map_err(|e| db_error("Failed to update balance", e))?
        .get("points");

        db_tx
            .commit()
            .await
            .map_err(|e| db_error("Failed to commit award", e))?;

        Ok(AwardOutcome::Applied { new_balance })
    }

    pub async fn list(&self, account_id: Uuid, limit: usize) -> Result<Vec<PointsTransaction>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, amount, reason, metadata, idempotency_key, created_at
            FROM points_transactions
            WHERE account_id = $1
            ORDER BY created_at DESC, seq DESC
            LIMIT $2
            "#,
        )
        .bind(account_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list transactions", e))?;

        rows.into_iter()
            .map(|row| {
                Ok(PointsTransaction {
                    id: row.get("id"),
                    account_id: row.get("account_id"),
                    amount: row.get("amount"),
                    reason: row.get("reason"),
                    metadata: from_json(row.get("metadata"))?,
                    idempotency_key: row.get("idempotency_key"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    pub async fn sum(&self, account_id: Uuid) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount), 0)::BIGINT AS total FROM points_transactions WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to sum transactions", e))?;

        Ok(row.get("total"))
    }
}
