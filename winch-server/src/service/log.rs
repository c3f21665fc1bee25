//! Log Service
//!
//! Read-side business logic for job logs. Appends happen inside the
//! executor's capture path and are deliberately best-effort there.

use winch_core::domain::log::LogEntry;

use crate::db::Db;
use crate::repository::{job_repository, log_repository};
use crate::service::job::JobError;

/// Get log entries for a job, optionally only those past a watermark
pub async fn get_job_logs(
    db: &Db,
    job_id: i64,
    since: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<Vec<LogEntry>, JobError> {
    job_repository::find_by_id(db, job_id)
        .await?
        .ok_or(JobError::NotFound(job_id))?;

    let logs = log_repository::find_by_job(db, job_id, since).await?;
    Ok(logs)
}
