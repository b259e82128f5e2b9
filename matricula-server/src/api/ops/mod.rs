//! Operator endpoints.
//!
//! These endpoints back the school administration tooling and require the
//! `Authorization: Bearer {ops_token}` header.
//!
//! # Endpoints
//!
//! - `POST /transactions/{external_id}/reconcile`     – reconcile one transaction now
//! - `POST /sweep`                                    – sweep pending transactions now
//! - `POST /enrollments/{enrollment_id}/payment-link` – create and attach a payment link

use axum::{Router, http::StatusCode, response::IntoResponse, routing::post};
use matricula_core::processors::ReconcileError;
use matricula_core::store::StoreError;
use matricula_wompi::WompiError;

use crate::state::AppState;

mod payment_link;
mod reconcile;
mod sweep;

/// Build the Ops API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/transactions/{external_id}/reconcile",
            post(reconcile::reconcile_transaction),
        )
        .route("/sweep", post(sweep::sweep_pending))
        .route(
            "/enrollments/{enrollment_id}/payment-link",
            post(payment_link::create_payment_link),
        )
}

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

/// Errors that can occur in Ops API handlers.
#[derive(Debug)]
pub(crate) enum OpsApiError {
    Store(StoreError),
    Reconcile(ReconcileError),
    Gateway(WompiError),
    NotFound,
    AlreadyPaid,
}

impl IntoResponse for OpsApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            OpsApiError::Store(e) => {
                tracing::error!(error = %e, "Ops API store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            OpsApiError::Reconcile(e) => {
                tracing::error!(error = %e, "Ops API reconcile error");
                let status = if e.retryable() {
                    StatusCode::BAD_GATEWAY
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (status, "reconciliation failed").into_response()
            }
            OpsApiError::Gateway(e) => {
                tracing::error!(error = %e, "Ops API gateway error");
                (StatusCode::BAD_GATEWAY, "payment gateway error").into_response()
            }
            OpsApiError::NotFound => {
                (StatusCode::NOT_FOUND, "resource not found").into_response()
            }
            OpsApiError::AlreadyPaid => {
                (StatusCode::CONFLICT, "enrollment is already paid").into_response()
            }
        }
    }
}
