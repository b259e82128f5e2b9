use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Serialize;

use super::OpsApiError;
use crate::api::extractors::OpsAuth;
use crate::state::AppState;

/// Result of a manual reconcile.
#[derive(Serialize)]
struct ReconcileResponse {
    external_id: String,
    outcome: &'static str,
    changed: bool,
}

/// `POST /transactions/{external_id}/reconcile` — reconcile one transaction
/// against a fresh gateway snapshot.
///
/// Safe to call any number of times; a snapshot that matches the stored
/// status reports `unchanged`.
pub(super) async fn reconcile_transaction(
    state: State<AppState>,
    _auth: OpsAuth,
    Path(external_id): Path<String>,
) -> Result<impl IntoResponse, OpsApiError> {
    let outcome = state
        .reconciler
        .reconcile(&external_id)
        .await
        .map_err(OpsApiError::Reconcile)?;

    Ok(Json(ReconcileResponse {
        external_id,
        outcome: outcome.label(),
        changed: outcome.changed(),
    }))
}
