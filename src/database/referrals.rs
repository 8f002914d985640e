//! Referral Repository - PostgreSQL operations for referral records using sqlx

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use super::db_error;
use crate::error::StoreError;
use crate::models::{normalize_email, ReferralRecord, VerificationFlags};

const REFERRAL_COLUMNS: &str = r#"
    id, referrer_id, referred_email, email_verified, telegram_verified, telegram_followed,
    tag_created, all_verifications_complete, points_awarded, completed_at, created_at, updated_at
"#;

fn referral_from_row(row: &PgRow) -> ReferralRecord {
    ReferralRecord {
        id: row.get("id"),
        referrer_id: row.get("referrer_id"),
        referred_email: row.get("referred_email"),
        verification: VerificationFlags {
            email_verified: row.get("email_verified"),
            telegram_verified: row.get("telegram_verified"),
            telegram_followed: row.get("telegram_followed"),
            tag_created: row.get("tag_created"),
        },
        all_verifications_complete: row.get("all_verifications_complete"),
        points_awarded: row.get("points_awarded"),
        completed_at: row.get("completed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub struct ReferralRepository {
    pool: PgPool,
}

impl ReferralRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure(&self, record: &ReferralRecord) -> Result<ReferralRecord, StoreError> {
        let email = normalize_email(&record.referred_email);
        sqlx::query(
            r#"
            INSERT INTO referrals
            (id, referrer_id, referred_email, email_verified, telegram_verified, telegram_followed,
             tag_created, all_verifications_complete, points_awarded, completed_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (referrer_id, referred_email) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(record.referrer_id)
        .bind(&email)
        .bind(record.verification.email_verified)
        .bind(record.verification.telegram_verified)
        .bind(record.verification.telegram_followed)
        .bind(record.verification.tag_created)
        .bind(record.all_verifications_complete)
        .bind(record.points_awarded)
        .bind(record.completed_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert referral", e))?;

        self.find(record.referrer_id, &email)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("referral for {}", email)))
    }

    pub async fn find(
        &self,
        referrer_id: Uuid,
        referred_email: &str,
    ) -> Result<Option<ReferralRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM referrals WHERE referrer_id = $1 AND referred_email = $2",
            REFERRAL_COLUMNS
        ))
        .bind(referrer_id)
        .bind(normalize_email(referred_email))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find referral", e))?;

        Ok(row.as_ref().map(referral_from_row))
    }

    /// `completed_at` is written once; the completion flag follows it.
    pub async fn refresh(
        &self,
        id: Uuid,
        flags: VerificationFlags,
        now: DateTime<Utc>,
    ) -> Result<ReferralRecord, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE referrals SET
                email_verified = $2,
                telegram_verified = $3,
                telegram_followed = $4,
                tag_created = $5,
                completed_at = COALESCE(completed_at, CASE WHEN $6 THEN $7 END),
                all_verifications_complete = (completed_at IS NOT NULL OR $6),
                updated_at = $7
            WHERE id = $1
            RETURNING {}
            "#,
            REFERRAL_COLUMNS
        ))
        .bind(id)
        .bind(flags.email_verified)
        .bind(flags.telegram_verified)
        .bind(flags.telegram_followed)
        .bind(flags.tag_created)
        .bind(flags.all_complete())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to refresh referral", e))?;

        row.as_ref()
            .map(referral_from_row)
            .ok_or_else(|| StoreError::NotFound(format!("referral {}", id)))
    }

    /// Flip the reward guard and count the referral for the referrer together.
    pub async fn mark_rewarded(&self, id: Uuid, referrer_id: Uuid) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin referral reward", e))?;

        let flipped = sqlx::query(
            "UPDATE referrals SET points_awarded = TRUE WHERE id = $1 AND points_awarded = FALSE",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to mark referral rewarded", e))?
        .rows_affected()
            > 0;

        if !flipped {
            let exists = sqlx::query("SELECT 1 FROM referrals WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to look up referral", e))?
                .is_some();
            tx.rollback()
                .await
                .map_err(|e| db_error("Failed to roll back referral reward", e))?;
            if !exists {
                return Err(StoreError::NotFound(format!("referral {}", id)));
            }
            return Ok(false);
        }

        sqlx::query(
            "UPDATE accounts SET successful_referrals = successful_referrals + 1 WHERE id = $1",
        )
        .bind(referrer_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to count referral", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit referral reward", e))?;

        debug!(referral_id = %id, referrer_id = %referrer_id, "Referral marked rewarded");
        Ok(true)
    }

    pub async fn list_for_referrer(&self, referrer_id: Uuid) -> Result<Vec<ReferralRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM referrals WHERE referrer_id = $1 ORDER BY created_at DESC",
            REFERRAL_COLUMNS
        ))
        .bind(referrer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list referrals", e))?;

        Ok(rows.iter().map(referral_from_row).collect())
    }
}
