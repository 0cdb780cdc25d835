//! HTTP API handlers.
//!
//! # Endpoints
//!
//! - `POST /events`        – hand a transfer event to the ingest pipeline
//! - `GET  /replay/jobs`   – most recent replay jobs
//! - `GET  /replay/stats`  – replay job aggregates per status
//! - `POST /replay/tick`   – start a replay run outside the schedule

pub mod events;
pub mod replay;

use axum::{
    Router,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chintel_core::entities::replay_job::JobStoreError;

use crate::state::AppState;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new().merge(events::router()).merge(replay::router())
}

/// Errors that can occur in API handlers.
#[derive(Debug)]
pub enum ApiError {
    /// The request was well-formed JSON but semantically invalid.
    BadRequest(String),
    /// The ingest pipeline is shutting down.
    IngestClosed,
    /// A replay run is already in progress.
    ReplayRunning,
    /// The replay job store failed.
    JobStore(JobStoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(reason) => (StatusCode::BAD_REQUEST, reason).into_response(),
            ApiError::IngestClosed => {
                (StatusCode::SERVICE_UNAVAILABLE, "ingest pipeline is closed").into_response()
            }
            ApiError::ReplayRunning => {
                (StatusCode::CONFLICT, "replay already running").into_response()
            }
            ApiError::JobStore(e) => {
                tracing::error!(error = %e, "Replay job store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}
