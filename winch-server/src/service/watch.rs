//! Job watch engine
//!
//! Drives one streaming session: a live, ordered view of one job's output
//! and state transitions until the job reaches a terminal state. The HTTP
//! layer adapts the emitted events to SSE framing; keeping the loop here
//! lets tests drive it without a connection.

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;
use winch_core::domain::job::Job;
use winch_core::domain::log::LogEntry;

use crate::db::Db;
use crate::events::JobBroker;
use crate::repository::{job_repository, log_repository};

/// One event emitted to a streaming session
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// Current job snapshot; sent on open and after each batch of output
    State(Job),
    /// One captured log line
    Log(LogEntry),
    /// Final job snapshot; the session ends after this
    Complete(Job),
}

/// Stream a job's log lines and state transitions into `tx` until the job
/// is terminal or the receiver is dropped.
///
/// Wakes on broker notifications with a fallback interval, because
/// notification delivery is lossy; the per-session watermark makes the
/// combination at-least-once without duplicate delivery. Returns silently
/// when the job does not exist (the caller checks before attaching).
pub async fn watch_job(
    db: Db,
    broker: JobBroker,
    job_id: i64,
    tx: mpsc::Sender<WatchEvent>,
    fallback: Duration,
) {
    // Subscribe before the first snapshot so no write slips between them
    let mut sub = broker.subscribe(job_id);

    let job = match job_repository::find_by_id(&db, job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => return,
        Err(e) => {
            warn!("watch for job {} failed to load the job: {}", job_id, e);
            return;
        }
    };

    if tx.send(WatchEvent::State(job)).await.is_err() {
        return;
    }

    let mut watermark: Option<chrono::DateTime<chrono::Utc>> = None;
    let mut tick = tokio::time::interval(fallback);

    loop {
        // First tick completes immediately, draining any pre-existing log
        tokio::select! {
            _ = sub.changed() => {}
            _ = tick.tick() => {}
        }

        // Read the status before the log: completion is only written after
        // both pipes are drained, so a terminal status here guarantees the
        // fetch below sees every line.
        let job = match job_repository::find_by_id(&db, job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(e) => {
                warn!("watch for job {} failed to load the job: {}", job_id, e);
                continue;
            }
        };

        let entries = match log_repository::find_by_job(&db, job_id, watermark).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("watch for job {} failed to fetch logs: {}", job_id, e);
                continue;
            }
        };

        for entry in entries {
            watermark = Some(match watermark {
                Some(mark) => mark.max(entry.timestamp),
                None => entry.timestamp,
            });
            if tx.send(WatchEvent::Log(entry)).await.is_err() {
                return;
            }
        }

        if job.status.is_terminal() {
            let _ = tx.send(WatchEvent::Complete(job)).await;
            return;
        }

        if tx.send(WatchEvent::State(job)).await.is_err() {
            return;
        }
    }
}
