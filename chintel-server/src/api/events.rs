//! Event ingest endpoint.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::post};
use chintel_sdk::objects::{EventAccepted, EventSource, EventStatus, TransferEvent};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::api::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/events", post(ingest_event))
}

/// `POST /events`: queue a live transfer event for processing.
///
/// Pipeline state sent by the client (status, retries, risk) is discarded.
/// Blocks while the ingest channel is full.
async fn ingest_event(
    State(state): State<AppState>,
    Json(payload): Json<TransferEvent>,
) -> Result<impl IntoResponse, ApiError> {
    let event = sanitize(payload)?;
    let accepted = EventAccepted {
        tx_hash: event.tx_hash.clone(),
    };

    tracing::debug!(
        chain_id = event.chain_id,
        tx_hash = %event.tx_hash,
        "Event received over HTTP"
    );
    state
        .events
        .send(event)
        .await
        .map_err(|_| ApiError::IngestClosed)?;

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

fn sanitize(event: TransferEvent) -> Result<TransferEvent, ApiError> {
    let required = [
        ("txHash", &event.tx_hash),
        ("from", &event.from),
        ("to", &event.to),
        ("value", &event.value),
    ];
    if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
        return Err(ApiError::BadRequest(format!("{field} must not be empty")));
    }
    if Decimal::from_str(event.value.trim()).is_err() {
        return Err(ApiError::BadRequest(format!(
            "value is not a decimal number: {}",
            event.value
        )));
    }

    Ok(TransferEvent {
        source: EventSource::Live,
        status: EventStatus::Pending,
        retry_count: 0,
        risk_result: None,
        last_error: None,
        ..event
    })
}
