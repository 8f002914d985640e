//! Error types for the reward core and its stores.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failures raised by a [`crate::store::Store`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Broad classification of a [`RewardError`], used by the HTTP shell to pick a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    SecurityBlock,
    Transient,
}

/// Errors returned by core operations. Each is scoped to the single call that produced it.
#[derive(Debug, Error)]
pub enum RewardError {
    #[error("award amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("invalid submission link: {0}")]
    InvalidLink(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("task is not active: {0}")]
    TaskInactive(String),

    #[error("submission not found: {0}")]
    SubmissionNotFound(String),

    #[error("unknown referral tag: {0}")]
    InvalidReferralTag(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("account is banned: {reason}")]
    Banned {
        reason: String,
        until: Option<DateTime<Utc>>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RewardError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        RewardError::Conflict(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RewardError::InvalidAmount(_) | RewardError::InvalidLink(_) => ErrorKind::Validation,
            RewardError::AccountNotFound(_)
            | RewardError::TaskNotFound(_)
            | RewardError::TaskInactive(_)
            | RewardError::SubmissionNotFound(_)
            | RewardError::InvalidReferralTag(_) => ErrorKind::NotFound,
            RewardError::Conflict(_) => ErrorKind::Conflict,
            RewardError::Banned { .. } => ErrorKind::SecurityBlock,
            RewardError::Store(_) => ErrorKind::Transient,
        }
    }
}

pub type RewardResult<T> = Result<T, RewardError>;
