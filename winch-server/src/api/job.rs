//! Job API Handlers
//!
//! HTTP endpoints for job lifecycle management.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use winch_core::domain::job::{Job, JobStatus};
use winch_core::domain::log::LogEntry;
use winch_core::dto::job::{AttachResult, CreateJob};

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::{job_service, log_service};

// =============================================================================
// Job Lifecycle Endpoints
// =============================================================================

/// POST /job/launch
/// Create a new queued job; the scheduler picks it up from there
pub async fn launch_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJob>,
) -> ApiResult<Json<Job>> {
    tracing::info!("Launching job: {}", req.command);

    let job = job_service::create_job(&state.db, req).await?;

    Ok(Json(job))
}

/// GET /job/{id}
/// Get job details by ID
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Job>> {
    tracing::debug!("Getting job: {}", id);

    let job = job_service::get_job(&state.db, id).await?;

    Ok(Json(job))
}

/// GET /job/list
/// List jobs, newest first
///
/// Query parameters:
/// - `status` (optional): restrict to one status
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListJobsQuery>,
) -> ApiResult<Json<Vec<Job>>> {
    tracing::debug!("Listing jobs (status filter: {:?})", params.status);

    let jobs = job_service::list_jobs(&state.db, params.status).await?;

    Ok(Json(jobs))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<JobStatus>,
}

/// POST /job/{id}/result
/// Attach a result payload to a job; does not affect its status
pub async fn attach_result(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<AttachResult>,
) -> ApiResult<StatusCode> {
    tracing::debug!("Attaching result to job: {}", id);

    job_service::attach_result(&state.db, id, req.result).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /job/{id}
/// Delete a job and its logs; refused while the job is running
pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting job: {}", id);

    job_service::delete_job(&state.db, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Log Endpoints
// =============================================================================

/// GET /job/{id}/logs
/// Get log entries for a job, ascending by timestamp
///
/// Query parameters:
/// - `since` (optional, RFC 3339): only entries strictly after this
///   timestamp, enabling watermark-style incremental polling
pub async fn get_job_logs(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<LogsQuery>,
) -> ApiResult<Json<Vec<LogEntry>>> {
    tracing::debug!("Getting logs for job: {}", id);

    let logs = log_service::get_job_logs(&state.db, id, params.since).await?;

    Ok(Json(logs))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub since: Option<chrono::DateTime<chrono::Utc>>,
}
