//! Task definitions and per-(account, task) completion records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Social,
    Content,
    Community,
    Other,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Social => "social",
            TaskType::Content => "content",
            TaskType::Community => "community",
            TaskType::Other => "other",
        }
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "social" => Ok(TaskType::Social),
            "content" => Ok(TaskType::Content),
            "community" => Ok(TaskType::Community),
            "other" => Ok(TaskType::Other),
            _ => Err(format!("unknown task type: {}", s)),
        }
    }
}

/// Admin-authored reference data, read-only to the core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub task_id: String,
    pub title: String,
    pub task_type: TaskType,
    pub requires_verification: bool,
    pub points_reward: i64,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Pending,
    Submitted,
    Approved,
    Rejected,
    Completed,
}

impl CompletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionStatus::Pending => "pending",
            CompletionStatus::Submitted => "submitted",
            CompletionStatus::Approved => "approved",
            CompletionStatus::Rejected => "rejected",
            CompletionStatus::Completed => "completed",
        }
    }

    /// Approved and completed records are final and reward-bearing.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CompletionStatus::Approved | CompletionStatus::Completed)
    }
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompletionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CompletionStatus::Pending),
            "submitted" => Ok(CompletionStatus::Submitted),
            "approved" => Ok(CompletionStatus::Approved),
            "rejected" => Ok(CompletionStatus::Rejected),
            "completed" => Ok(CompletionStatus::Completed),
            _ => Err(format!("unknown completion status: {}", s)),
        }
    }
}

/// Evidence attached to a completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskEvidence {
    Link { url: String },
    Payload { data: serde_json::Value },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCompletionRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub task_id: String,
    pub status: CompletionStatus,
    pub submission_link: Option<String>,
    pub evidence: Option<TaskEvidence>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub points_awarded: bool,
}

impl TaskCompletionRecord {
    pub fn new(account_id: Uuid, task_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            task_id: task_id.to_string(),
            status: CompletionStatus::Pending,
            submission_link: None,
            evidence: None,
            submitted_at: None,
            completed_at: None,
            reviewed_at: None,
            reviewed_by: None,
            rejection_reason: None,
            points_awarded: false,
        }
    }
}
