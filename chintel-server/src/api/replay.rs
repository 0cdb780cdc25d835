//! Replay job endpoints.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chintel_core::processors::TickOutcome;
use chintel_sdk::objects::{JobStatsResponse, ListJobsQuery, ReplayJobResponse, TickAccepted};

use crate::api::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/replay/jobs", get(list_jobs))
        .route("/replay/stats", get(job_stats))
        .route("/replay/tick", post(trigger_tick))
}

/// `GET /replay/jobs?limit=N`: most recent jobs first.
async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<ReplayJobResponse>>, ApiError> {
    let jobs = state
        .jobs
        .recent(query.clamped_limit())
        .await
        .map_err(ApiError::JobStore)?;
    Ok(Json(jobs.into_iter().map(Into::into).collect()))
}

/// `GET /replay/stats`: aggregates keyed by job status.
async fn job_stats(State(state): State<AppState>) -> Result<Json<JobStatsResponse>, ApiError> {
    let stats = state.jobs.stats().await.map_err(ApiError::JobStore)?;
    Ok(Json(
        stats
            .into_iter()
            .map(|(status, stats)| (status.into(), stats))
            .collect(),
    ))
}

/// `POST /replay/tick`: start a run now.
///
/// Answers before the run finishes; progress is visible through
/// `/replay/jobs`. A failed manual run goes through the same retry policy
/// as a scheduled one, and scheduler shutdown waits for it to finish.
async fn trigger_tick(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    if state.scheduler.is_running() {
        return Err(ApiError::ReplayRunning);
    }

    let scheduler = state.scheduler.clone();
    tokio::spawn(async move {
        match scheduler.tick().await {
            TickOutcome::Skipped => tracing::debug!("Manual replay skipped, run in progress"),
            TickOutcome::Completed(jobs) => {
                tracing::info!(jobs = jobs.len(), "Manual replay finished");
            }
            TickOutcome::Failed {
                error,
                retry_scheduled,
            } => tracing::warn!(error = %error, retry_scheduled, "Manual replay failed"),
        }
    });

    Ok((StatusCode::ACCEPTED, Json(TickAccepted { started: true })))
}
