//! Streaming API Handler
//!
//! Long-lived SSE endpoint giving a client a live view of one job. The
//! watch engine in `service::watch` produces the events; this handler
//! only adapts them to SSE framing.

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::watch::{WatchEvent, watch_job};
use crate::service::job_service;

const SESSION_CHANNEL_CAPACITY: usize = 64;

/// GET /job/{id}/stream
///
/// Emits `state`, `log`, and `complete` events until the job reaches a
/// terminal state, then closes. Any number of sessions may watch the same
/// job; each is independently paced. Client disconnect tears down the
/// watcher and its broker subscription.
pub async fn stream_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    // 404 before committing to a stream response
    job_service::get_job(&state.db, id).await?;

    tracing::debug!("Streaming session attached to job {}", id);

    let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
    tokio::spawn(watch_job(
        state.db.clone(),
        state.broker.clone(),
        id,
        tx,
        state.stream_fallback,
    ));

    let stream = ReceiverStream::new(rx).map(to_sse_event);

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: WatchEvent) -> Result<Event, axum::Error> {
    match event {
        WatchEvent::State(job) => Event::default().event("state").json_data(job),
        WatchEvent::Log(entry) => Event::default().event("log").json_data(entry),
        WatchEvent::Complete(job) => Event::default().event("complete").json_data(job),
    }
}
