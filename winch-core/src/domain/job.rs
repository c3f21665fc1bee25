//! Job domain types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One tracked invocation of an external command.
///
/// Structure shared between the persistence layer (which owns the id and
/// timestamps) and the executor (which drives the status transitions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Monotonically assigned by the store, immutable.
    pub id: i64,
    pub command: String,
    pub args: Vec<String>,
    /// Merged over the ambient process environment at run time.
    pub env_overrides: HashMap<String, String>,
    pub status: JobStatus,
    /// Set exactly once, on transition out of `Running`.
    pub exit_code: Option<i32>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Free-form payload attached by a caller after success; the executor
    /// never writes this.
    pub result: Option<serde_json::Value>,
}

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Terminal states never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}
