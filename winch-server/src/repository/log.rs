//! Log Repository
//!
//! Handles all database operations related to job logs. Log rows are
//! append-only and immutable; ordering is by capture timestamp with the
//! rowid as tiebreak so equal-timestamp lines keep insertion order.

use winch_core::domain::log::{LogEntry, LogStream};

use crate::db::Db;

/// Append one log entry for a job
pub async fn append(db: &Db, entry: &LogEntry) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO job_logs (job_id, stream, content, timestamp)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(entry.job_id)
    .bind(stream_to_string(entry.stream))
    .bind(&entry.content)
    .bind(entry.timestamp)
    .execute(db.write())
    .await?;

    Ok(())
}

/// Get log entries for a job, optionally only those past a watermark.
///
/// The `since` filter is strictly greater-than: an entry whose timestamp a
/// caller has already seen is never returned again. This is the primitive
/// both the poll fallback and history views use.
pub async fn find_by_job(
    db: &Db,
    job_id: i64,
    since: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<Vec<LogEntry>, sqlx::Error> {
    let rows = match since {
        Some(since) => {
            sqlx::query_as::<_, LogRow>(
                r#"
                SELECT job_id, stream, content, timestamp
                FROM job_logs
                WHERE job_id = ? AND timestamp > ?
                ORDER BY timestamp ASC, id ASC
                "#,
            )
            .bind(job_id)
            .bind(since)
            .fetch_all(db.read())
            .await?
        }
        None => {
            sqlx::query_as::<_, LogRow>(
                r#"
                SELECT job_id, stream, content, timestamp
                FROM job_logs
                WHERE job_id = ?
                ORDER BY timestamp ASC, id ASC
                "#,
            )
            .bind(job_id)
            .fetch_all(db.read())
            .await?
        }
    };

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Delete all logs for a job
pub async fn delete_by_job(db: &Db, job_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM job_logs WHERE job_id = ?")
        .bind(job_id)
        .execute(db.write())
        .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Helper Functions
// =============================================================================

fn stream_to_string(stream: LogStream) -> &'static str {
    match stream {
        LogStream::Stdout => "stdout",
        LogStream::Stderr => "stderr",
    }
}

fn string_to_stream(s: &str) -> LogStream {
    match s {
        "stderr" => LogStream::Stderr,
        _ => LogStream::Stdout,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct LogRow {
    job_id: i64,
    stream: String,
    content: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<LogRow> for LogEntry {
    fn from(row: LogRow) -> Self {
        LogEntry {
            job_id: row.job_id,
            stream: string_to_stream(&row.stream),
            content: row.content,
            timestamp: row.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::job_repository;
    use crate::test_util::test_db;
    use std::collections::HashMap;
    use winch_core::dto::job::CreateJob;

    async fn seed_job(db: &Db) -> i64 {
        let req = CreateJob {
            command: "echo".to_string(),
            args: Vec::new(),
            env_overrides: HashMap::new(),
        };
        job_repository::create(db, &req).await.unwrap().id
    }

    fn entry(job_id: i64, content: &str, timestamp: chrono::DateTime<chrono::Utc>) -> LogEntry {
        LogEntry {
            job_id,
            stream: LogStream::Stdout,
            content: content.to_string(),
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_find_is_ascending_by_timestamp() {
        let (db, _dir) = test_db().await;
        let job_id = seed_job(&db).await;

        let base = chrono::Utc::now();
        for (offset, content) in [(2, "third"), (0, "first"), (1, "second")] {
            append(
                &db,
                &entry(job_id, content, base + chrono::Duration::milliseconds(offset)),
            )
            .await
            .unwrap();
        }

        let logs = find_by_job(&db, job_id, None).await.unwrap();
        let contents: Vec<_> = logs.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_since_filter_is_strictly_greater() {
        let (db, _dir) = test_db().await;
        let job_id = seed_job(&db).await;

        let base = chrono::Utc::now();
        for offset in 0..3 {
            append(
                &db,
                &entry(
                    job_id,
                    &format!("line-{offset}"),
                    base + chrono::Duration::milliseconds(offset),
                ),
            )
            .await
            .unwrap();
        }

        let all = find_by_job(&db, job_id, None).await.unwrap();
        assert_eq!(all.len(), 3);

        // A watermark taken from a returned entry must not re-deliver it
        let watermark = all[0].timestamp;
        let rest = find_by_job(&db, job_id, Some(watermark)).await.unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].content, "line-1");

        let last = all.last().unwrap().timestamp;
        let none = find_by_job(&db, job_id, Some(last)).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_find_is_scoped_to_the_job() {
        let (db, _dir) = test_db().await;
        let first = seed_job(&db).await;
        let second = seed_job(&db).await;

        append(&db, &entry(first, "mine", chrono::Utc::now()))
            .await
            .unwrap();

        let logs = find_by_job(&db, second, None).await.unwrap();
        assert!(logs.is_empty());
    }
}
