//! Signal Repository - bot signals and signup events

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use super::{db_error, from_json, to_json};
use crate::error::StoreError;
use crate::models::{normalize_email, BotSignal, SignupEvent};

pub struct SignalRepository {
    pool: PgPool,
}

impl SignalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record_signup(&self, event: &SignupEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO signup_events (email, ip, fingerprint, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(normalize_email(&event.email))
        .bind(&event.ip)
        .bind(&event.fingerprint)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to record signup", e))?;

        Ok(())
    }

    pub async fn count_from_ip(&self, ip: &str, since: DateTime<Utc>) -> Result<u64, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS signups FROM signup_events WHERE ip = $1 AND created_at >= $2",
        )
        .bind(ip)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to count signups", e))?;

        let signups: i64 = row.get("signups");
        Ok(signups.max(0) as u64)
    }

    pub async fn latest(
        &self,
        email: &str,
        ip: &str,
        fingerprint: &str,
    ) -> Result<Option<BotSignal>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, email, ip, fingerprint, score, flagged_reasons, blocked, created_at
            FROM bot_signals
            WHERE email = $1 OR ip = $2 OR fingerprint = $3
            ORDER BY created_at DESC, seq DESC
            LIMIT 1
            "#,
        )
        .bind(normalize_email(email))
        .bind(ip)
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get bot signal", e))?;

        row.map(|row| {
            Ok(BotSignal {
                id: row.get("id"),
                email: row.get("email"),
                ip: row.get("ip"),
                fingerprint: row.get("fingerprint"),
                score: row.get("score"),
                flagged_reasons: from_json(row.get("flagged_reasons"))?,
                blocked: row.get("blocked"),
                created_at: row.get("created_at"),
            })
        })
        .transpose()
    }

    pub async fn insert(&self, signal: &BotSignal) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO bot_signals
            (id, email, ip, fingerprint, score, flagged_reasons, blocked, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(signal.id)
        .bind(signal.email.as_deref().map(normalize_email))
        .bind(&signal.ip)
        .bind(&signal.fingerprint)
        .bind(signal.score)
        .bind(to_json(&signal.flagged_reasons)?)
        .bind(signal.blocked)
        .bind(signal.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to insert bot signal", e))?;

        Ok(())
    }
}
