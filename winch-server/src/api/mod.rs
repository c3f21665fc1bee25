//! API Module
//!
//! HTTP API layer for the control plane.
//! Each submodule handles endpoints for a specific concern.

pub mod error;
pub mod health;
pub mod job;
pub mod stream;

use axum::{
    Router,
    routing::{delete, get, post},
};
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::db::Db;
use crate::events::JobBroker;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub broker: JobBroker,
    pub stream_fallback: Duration,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Job endpoints
        .route("/job/launch", post(job::launch_job))
        .route("/job/list", get(job::list_jobs))
        .route("/job/{id}", get(job::get_job))
        .route("/job/{id}", delete(job::delete_job))
        .route("/job/{id}/logs", get(job::get_job_logs))
        .route("/job/{id}/result", post(job::attach_result))
        .route("/job/{id}/stream", get(stream::stream_job))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
