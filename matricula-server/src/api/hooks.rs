//! Wompi webhook intake.
//!
//! Wompi retries deliveries until it sees a 2xx, so the handler verifies
//! the checksum, acknowledges immediately, and runs reconciliation in the
//! background. The event body is never trusted for state: reconciliation
//! always re-fetches the transaction from the gateway.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use matricula_wompi::events::EventNotification;

use crate::state::AppState;

/// `POST /hooks/wompi` — receive a gateway event.
pub async fn receive_wompi_event(
    State(state): State<AppState>,
    Json(event): Json<EventNotification>,
) -> impl IntoResponse {
    if let Err(err) = event.verify_checksum(&state.config.gateway.events_secret) {
        tracing::warn!(event = %event.event, error = %err, "rejected wompi event, bad checksum");
        return StatusCode::UNAUTHORIZED;
    }

    let Some(external_id) = event.transaction_id() else {
        // Acknowledged so the gateway stops retrying an event we will never
        // be able to use.
        tracing::warn!(event = %event.event, "wompi event without a transaction id");
        return StatusCode::OK;
    };
    let external_id = external_id.to_owned();

    let reconciler = state.reconciler.clone();
    tokio::spawn(async move {
        match reconciler.reconcile(&external_id).await {
            Ok(outcome) => {
                tracing::info!(
                    external_id = %external_id,
                    outcome = outcome.label(),
                    "webhook reconcile finished"
                );
            }
            Err(err) => {
                tracing::error!(
                    external_id = %external_id,
                    error = %err,
                    "webhook reconcile failed"
                );
            }
        }
    });

    StatusCode::OK
}
