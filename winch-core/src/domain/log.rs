//! Log domain types

use serde::{Deserialize, Serialize};

/// One captured line of a job's standard output or standard error.
///
/// Entries are append-only; a job's log is the ordered sequence of its
/// entries by capture timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub job_id: i64,
    pub stream: LogStream,
    /// Line text, post-redaction.
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}
