//! Account Repository - PostgreSQL operations for accounts using sqlx

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use super::db_error;
use crate::error::StoreError;
use crate::models::{normalize_email, Account, BanState, VerificationFlag, VerificationFlags};

const ACCOUNT_COLUMNS: &str = r#"
    id, email, points, email_verified, telegram_verified, telegram_followed, tag_created,
    referral_tag, referred_by, successful_referrals, banned, ban_reason, ban_until,
    bot_score, created_at
"#;

pub(crate) fn account_from_row(row: &PgRow) -> Account {
    let successful_referrals: i32 = row.get("successful_referrals");
    Account {
        id: row.get("id"),
        email: row.get("email"),
        points: row.get("points"),
        verification: VerificationFlags {
            email_verified: row.get("email_verified"),
            telegram_verified: row.get("telegram_verified"),
            telegram_followed: row.get("telegram_followed"),
            tag_created: row.get("tag_created"),
        },
        referral_tag: row.get("referral_tag"),
        referred_by: row.get("referred_by"),
        successful_referrals: successful_referrals.max(0) as u32,
        ban: BanState {
            banned: row.get("banned"),
            reason: row.get("ban_reason"),
            until: row.get("ban_until"),
        },
        bot_score: row.get("bot_score"),
        created_at: row.get("created_at"),
    }
}

pub struct AccountRepository {
    pool: PgPool,
}

impl AccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO accounts
            (id, email, points, email_verified, telegram_verified, telegram_followed, tag_created,
             referral_tag, referred_by, successful_referrals, banned, ban_reason, ban_until,
             bot_score, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(account.id)
        .bind(normalize_email(&account.email))
        .bind(account.points)
        .bind(account.verification.email_verified)
        .bind(account.verification.telegram_verified)
        .bind(account.verification.telegram_followed)
        .bind(account.verification.tag_created)
        .bind(&account.referral_tag)
        .bind(account.referred_by)
        .bind(account.successful_referrals as i32)
        .bind(account.ban.banned)
        .bind(&account.ban.reason)
        .bind(account.ban.until)
        .bind(account.bot_score)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert account", e))?;

        debug!(account_id = %account.id, "Account created");
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to get account", e))?;

        Ok(row.as_ref().map(account_from_row))
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE email = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find account by email", e))?;

        Ok(row.as_ref().map(account_from_row))
    }

    pub async fn find_by_tag(&self, tag: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE referral_tag = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(tag)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find account by tag", e))?;

        Ok(row.as_ref().map(account_from_row))
    }

    pub async fn list_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let rows = sqlx::query("SELECT id FROM accounts ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list accounts", e))?;

        Ok(rows.into_iter().map(|row| row.get("id")).collect())
    }

    pub async fn set_flag(&self, id: Uuid, flag: VerificationFlag) -> Result<bool, StoreError> {
        // Column names come from a closed enum, never from input
        let result = sqlx::query(&format!(
            "UPDATE accounts SET {} = TRUE WHERE id = $1",
            flag.column()
        ))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to set verification flag", e))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_tag(&self, id: Uuid, tag: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE accounts SET referral_tag = $2, tag_created = TRUE WHERE id = $1",
        )
        .bind(id)
        .bind(tag)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to set referral tag", e))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_referred_by(&self, id: Uuid, referrer_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE accounts SET referred_by = $2 WHERE id = $1 AND referred_by IS NULL",
        )
        .bind(id)
        .bind(referrer_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to set referrer", e))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_ban(&self, id: Uuid, ban: &BanState) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE accounts SET banned = $2, ban_reason = $3, ban_until = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(ban.banned)
        .bind(&ban.reason)
        .bind(ban.until)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to set ban", e))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn lift_expired_ban(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts SET banned = FALSE, ban_reason = NULL, ban_until = NULL
            WHERE id = $1 AND banned = TRUE AND ban_until IS NOT NULL AND ban_until < $2
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to lift ban", e))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn raise_bot_score(&self, email: &str, delta: i32) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE accounts SET bot_score = bot_score + $2 WHERE email = $1")
            .bind(normalize_email(email))
            .bind(delta)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to raise bot score", e))?;

        Ok(result.rows_affected() > 0)
    }
}
