//! PostgreSQL Database Module
//!
//! Provides database operations for accounts, the points ledger, referrals, task
//! completions and bot signals. [`DatabasePool`] implements [`crate::store::Store`]
//! over these repositories.

pub mod accounts;
pub mod points;
pub mod pool;
pub mod referrals;
pub mod signals;
pub mod tasks;

pub use accounts::AccountRepository;
pub use points::PointsRepository;
pub use pool::DatabasePool;
pub use referrals::ReferralRepository;
pub use signals::SignalRepository;
pub use tasks::TaskRepository;

use crate::error::StoreError;

/// Map a sqlx error, surfacing unique violations as `Duplicate`.
pub(crate) fn db_error(context: &str, e: sqlx::Error) -> StoreError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => StoreError::Duplicate(format!("{}: {}", context, db)),
        _ => StoreError::Backend(format!("{}: {}", context, e)),
    }
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub(crate) fn from_json<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}
