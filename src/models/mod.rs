//! Persisted entities shared by every core component.
//!
//! Entities reference each other by id only. The store owns them; components load a
//! fresh copy per call and never cache across calls.

mod account;
mod points;
mod referral;
mod signal;
mod task;

pub use account::{normalize_email, Account, BanState, VerificationFlag, VerificationFlags};
pub use points::{PointsTransaction, TransactionMetadata};
pub use referral::ReferralRecord;
pub use signal::{BotSignal, FlaggedReason, SignupEvent};
pub use task::{CompletionStatus, TaskCompletionRecord, TaskDefinition, TaskEvidence, TaskType};
