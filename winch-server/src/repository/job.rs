//! Job Repository
//!
//! Handles all database operations related to jobs.

use winch_core::domain::job::{Job, JobStatus};
use winch_core::dto::job::CreateJob;

use crate::db::Db;

/// Create a new queued job in the database
pub async fn create(db: &Db, req: &CreateJob) -> Result<Job, sqlx::Error> {
    let now = chrono::Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO jobs (command, args, env_overrides, status, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&req.command)
    .bind(serde_json::to_string(&req.args).unwrap())
    .bind(serde_json::to_string(&req.env_overrides).unwrap())
    .bind(status_to_string(JobStatus::Queued))
    .bind(now)
    .execute(db.write())
    .await?;

    Ok(Job {
        id: result.last_insert_rowid(),
        command: req.command.clone(),
        args: req.args.clone(),
        env_overrides: req.env_overrides.clone(),
        status: JobStatus::Queued,
        exit_code: None,
        created_at: now,
        started_at: None,
        completed_at: None,
        result: None,
    })
}

/// Find a job by ID
pub async fn find_by_id(db: &Db, id: i64) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, command, args, env_overrides, status, exit_code,
               created_at, started_at, completed_at, result
        FROM jobs
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(db.read())
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List jobs, optionally restricted to one status, newest-created first
pub async fn list(db: &Db, status: Option<JobStatus>) -> Result<Vec<Job>, sqlx::Error> {
    let rows = match status {
        Some(status) => {
            sqlx::query_as::<_, JobRow>(
                r#"
                SELECT id, command, args, env_overrides, status, exit_code,
                       created_at, started_at, completed_at, result
                FROM jobs
                WHERE status = ?
                ORDER BY created_at DESC, id DESC
                "#,
            )
            .bind(status_to_string(status))
            .fetch_all(db.read())
            .await?
        }
        None => {
            sqlx::query_as::<_, JobRow>(
                r#"
                SELECT id, command, args, env_overrides, status, exit_code,
                       created_at, started_at, completed_at, result
                FROM jobs
                ORDER BY created_at DESC, id DESC
                "#,
            )
            .fetch_all(db.read())
            .await?
        }
    };

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Transition a queued job to running.
///
/// Compare-and-set on the queued status: returns false when the job was
/// already claimed by a concurrent caller. This write is the serialization
/// point for start races.
pub async fn try_mark_running(
    db: &Db,
    job_id: i64,
    started_at: chrono::DateTime<chrono::Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = ?, started_at = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(status_to_string(JobStatus::Running))
    .bind(started_at)
    .bind(job_id)
    .bind(status_to_string(JobStatus::Queued))
    .execute(db.write())
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Write the terminal status, exit code, and completion timestamp.
///
/// Guarded by `completed_at IS NULL` so the completion fields are
/// write-once for the life of the job.
pub async fn mark_completed(
    db: &Db,
    job_id: i64,
    status: JobStatus,
    exit_code: i32,
    completed_at: chrono::DateTime<chrono::Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = ?, exit_code = ?, completed_at = ?
        WHERE id = ? AND completed_at IS NULL
        "#,
    )
    .bind(status_to_string(status))
    .bind(exit_code)
    .bind(completed_at)
    .bind(job_id)
    .execute(db.write())
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Overwrite the job's result payload
pub async fn update_result(
    db: &Db,
    job_id: i64,
    result: &serde_json::Value,
) -> Result<bool, sqlx::Error> {
    let outcome = sqlx::query("UPDATE jobs SET result = ? WHERE id = ?")
        .bind(serde_json::to_string(result).unwrap())
        .bind(job_id)
        .execute(db.write())
        .await?;

    Ok(outcome.rows_affected() > 0)
}

/// Delete a job by ID (log rows cascade)
pub async fn delete(db: &Db, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
        .bind(id)
        .execute(db.write())
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Helper Functions
// =============================================================================

fn status_to_string(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "queued",
        JobStatus::Running => "running",
        JobStatus::Succeeded => "succeeded",
        JobStatus::Failed => "failed",
    }
}

fn string_to_status(s: &str) -> JobStatus {
    match s {
        "queued" => JobStatus::Queued,
        "running" => JobStatus::Running,
        "succeeded" => JobStatus::Succeeded,
        "failed" => JobStatus::Failed,
        _ => JobStatus::Queued,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    command: String,
    args: String,
    env_overrides: String,
    status: String,
    exit_code: Option<i32>,
    created_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    result: Option<String>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        let args = serde_json::from_str(&row.args).unwrap_or_default();
        let env_overrides = serde_json::from_str(&row.env_overrides).unwrap_or_default();
        let result = row.result.and_then(|s| serde_json::from_str(&s).ok());

        Job {
            id: row.id,
            command: row.command,
            args,
            env_overrides,
            status: string_to_status(&row.status),
            exit_code: row.exit_code,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            result,
        }
    }
}
