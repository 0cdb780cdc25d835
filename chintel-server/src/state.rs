//! Application state shared across all request handlers.

use chintel_core::entities::replay_job::ReplayJobStore;
use chintel_core::events::TransferEventSender;
use chintel_core::processors::ReplayScheduler;
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool, used for readiness checks.
    pub db: PgPool,
    /// Ingest channel feeding the `IngestRunner`.
    pub events: TransferEventSender,
    /// Shared handle to the background replay scheduler.
    pub scheduler: ReplayScheduler,
    pub jobs: Arc<dyn ReplayJobStore>,
    /// Renders the Prometheus exposition for `/metrics`.
    pub metrics: PrometheusHandle,
}
