use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};
use matricula_core::store::SweepScope;
use serde::Deserialize;
use uuid::Uuid;

use super::OpsApiError;
use crate::api::extractors::OpsAuth;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(super) struct SweepParams {
    /// Restrict the sweep to a single enrollment.
    enrollment_id: Option<Uuid>,
}

/// `POST /sweep` — re-check pending transactions against the gateway now.
///
/// Returns the sweep report; individual failures are listed rather than
/// failing the request.
pub(super) async fn sweep_pending(
    state: State<AppState>,
    _auth: OpsAuth,
    Query(params): Query<SweepParams>,
) -> Result<impl IntoResponse, OpsApiError> {
    let scope = match params.enrollment_id {
        Some(enrollment_id) => SweepScope::Enrollment(enrollment_id),
        None => SweepScope::Global,
    };

    let report = state
        .sweeper
        .sweep_pending(scope)
        .await
        .map_err(OpsApiError::Store)?;

    Ok(Json(report))
}
