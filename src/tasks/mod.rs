//! Task completion lifecycle.
//!
//! | Task kind | Path | Transitions |
//! |-----------|------|-------------|
//! | `requires_verification = false` | direct | pending → completed |
//! | `requires_verification = true` | review | pending/rejected → submitted → approved or rejected |
//!
//! Rewards are paid on entering `completed` or `approved`, guarded by the record's
//! `points_awarded` flag.

mod lifecycle;

pub use lifecycle::{TaskLifecycle, DEFAULT_REJECTION_REASON};
