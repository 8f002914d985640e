//! Waitlist Rewards
//!
//! Reward integrity core for the waitlist backend: a points ledger, two-sided
//! referral rewards, task review, account bans and signup bot scoring. The HTTP
//! shell calls [`RewardsCore`] once per request with a [`RequestContext`].
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Ledger audit entrypoint
//! ├── config.rs      - Configuration management
//! ├── context.rs     - Per-request context (request id, clock, audit sink)
//! ├── engine.rs      - RewardsCore facade
//! ├── error.rs       - Error types
//! ├── models/        - Accounts, transactions, referrals, tasks, bot signals
//! ├── ledger/        - Points ledger (the only balance writer)
//! ├── referral/      - Referral completion and two-sided rewards
//! ├── tasks/         - Task completion and review lifecycle
//! ├── security/      - Audit log, ban gate, bot scorer, fingerprints
//! ├── store/         - Store trait and in-memory store
//! └── database/      - PostgreSQL persistence
//! ```

pub mod config;
pub mod context;
pub mod database;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod models;
pub mod referral;
pub mod security;
pub mod store;
pub mod tasks;

// Re-export main types for convenience
pub use config::{BotConfig, DatabaseConfig, LoggingConfig, RewardConfig, WaitlistConfig};
pub use context::RequestContext;
pub use database::DatabasePool;
pub use engine::RewardsCore;
pub use error::{ErrorKind, RewardError, RewardResult, StoreError};
pub use ledger::{AwardReceipt, BalanceAudit, PointsLedger, MAX_HISTORY_LIMIT};
pub use referral::{ReferralStats, ReferralStatus, ReferralTracker, RequirementChecklist};
pub use security::{
    compute_fingerprint, AuditEntry, AuditEventType, AuditLogger, AuditSeverity, BanDecision,
    BanGate, BlockReason, BotScorer, BotThresholds, BotVerdict, SignupAttempt,
};
pub use store::{AwardOutcome, MemoryStore, Store};
pub use tasks::{TaskLifecycle, DEFAULT_REJECTION_REASON};
