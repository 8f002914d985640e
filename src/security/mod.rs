//! Security Module
//!
//! Provides:
//! - Audit logging for reward and security decisions
//! - Ban gate with lazy expiry
//! - Signup bot scoring and request fingerprinting

mod audit;
mod ban_gate;
mod bot_scorer;
mod fingerprint;

pub use audit::{AuditEntry, AuditEventType, AuditLogger, AuditSeverity};
pub use ban_gate::{BanDecision, BanGate, DEFAULT_BAN_REASON};
pub use bot_scorer::{BlockReason, BotScorer, BotThresholds, BotVerdict, SignupAttempt};
pub use fingerprint::compute_fingerprint;
