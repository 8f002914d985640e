//! Referral Tracker
//!
//! Detects when a referred account has satisfied every verification condition and
//! pays the two-sided reward.
//!
//! ## Lifecycle
//!
//! ```text
//! uninitialized ──register / first check──► pending ──all four flags──► complete
//!                                                                          │
//!                                   reward step (retried on every check)   │
//!                                   until points_awarded flips true  ◄─────┘
//! ```
//!
//! Completion is detected on demand from whichever account action calls
//! `check_completion`; there is no polling.

mod tracker;

pub use tracker::{ReferralStats, ReferralStatus, ReferralTracker, RequirementChecklist};
