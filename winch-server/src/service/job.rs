//! Job Service
//!
//! Business logic for job management and lifecycle.

use thiserror::Error;
use winch_core::domain::job::{Job, JobStatus};
use winch_core::dto::job::CreateJob;

use crate::db::Db;
use crate::repository::{job_repository, log_repository};

/// Service error type
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job {0} not found")]
    NotFound(i64),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("failed to spawn subprocess: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Create a new queued job
pub async fn create_job(db: &Db, req: CreateJob) -> Result<Job, JobError> {
    if req.command.trim().is_empty() {
        return Err(JobError::Validation("command must not be empty".to_string()));
    }

    let job = job_repository::create(db, &req).await?;

    tracing::info!("Job created: {} ({})", job.id, job.command);

    Ok(job)
}

/// Get a job by ID
pub async fn get_job(db: &Db, id: i64) -> Result<Job, JobError> {
    let job = job_repository::find_by_id(db, id)
        .await?
        .ok_or(JobError::NotFound(id))?;

    Ok(job)
}

/// List jobs, optionally restricted to one status, newest-created first
pub async fn list_jobs(db: &Db, status: Option<JobStatus>) -> Result<Vec<Job>, JobError> {
    let jobs = job_repository::list(db, status).await?;
    Ok(jobs)
}

/// Attach a result payload to a job.
///
/// Best-effort overwrite of the result field; the job's status is not
/// affected.
pub async fn attach_result(
    db: &Db,
    id: i64,
    result: serde_json::Value,
) -> Result<(), JobError> {
    if !job_repository::update_result(db, id, &result).await? {
        return Err(JobError::NotFound(id));
    }

    tracing::debug!("Result attached to job {}", id);

    Ok(())
}

/// Delete a job and its logs.
///
/// Refused while the job is running; the subprocess would keep writing
/// into a log that no longer exists.
pub async fn delete_job(db: &Db, id: i64) -> Result<(), JobError> {
    let job = job_repository::find_by_id(db, id)
        .await?
        .ok_or(JobError::NotFound(id))?;

    if job.status == JobStatus::Running {
        return Err(JobError::InvalidState(format!(
            "job {id} is running and cannot be deleted"
        )));
    }

    let removed = log_repository::delete_by_job(db, id).await?;
    job_repository::delete(db, id).await?;

    tracing::info!("Job {} deleted ({} log entries)", id, removed);

    Ok(())
}
