use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use compact_str::CompactString;
use matricula_core::entities::PaymentState;
use matricula_core::store::ReconcileStore;
use matricula_wompi::objects::PaymentLinkRequest;
use serde::Serialize;
use url::Url;
use uuid::Uuid;

use super::OpsApiError;
use crate::api::extractors::OpsAuth;
use crate::state::AppState;

#[derive(Serialize)]
struct PaymentLinkResponse {
    enrollment_id: Uuid,
    payment_link_id: String,
    checkout_url: String,
}

/// `POST /enrollments/{enrollment_id}/payment-link` — create a single-use
/// Wompi payment link for the enrollment fee and attach it to the
/// enrollment.
///
/// Transactions paid through the link carry its id back as
/// `payment_link_id`, which is how reconciliation finds its way to this
/// enrollment.
pub(super) async fn create_payment_link(
    state: State<AppState>,
    _auth: OpsAuth,
    Path(enrollment_id): Path<Uuid>,
) -> Result<impl IntoResponse, OpsApiError> {
    let enrollment = state
        .store
        .enrollment_by_id(enrollment_id)
        .await
        .map_err(OpsApiError::Store)?
        .ok_or(OpsApiError::NotFound)?;

    if enrollment.payment_state == PaymentState::Paid {
        return Err(OpsApiError::AlreadyPaid);
    }

    let full_name = enrollment.full_name();
    let request = PaymentLinkRequest {
        name: format!("Matrícula - {full_name}"),
        description: format!("Pago de matrícula para {full_name}"),
        single_use: true,
        collect_shipping: false,
        currency: CompactString::from(state.config.fees.currency.as_str()),
        amount_in_cents: state.config.fees.enrollment_in_cents,
        redirect_url: state.config.fees.redirect_url.as_ref().map(Url::to_string),
        expires_at: None,
    };

    let link = state
        .wompi
        .create_payment_link(&request)
        .await
        .map_err(OpsApiError::Gateway)?;

    let updated = state
        .store
        .attach_payment_link(enrollment_id, &link.id)
        .await
        .map_err(OpsApiError::Store)?;
    if updated.is_none() {
        // Paid in the window between the read above and this write; the
        // fresh link is left unattached.
        tracing::warn!(
            enrollment_id = %enrollment_id,
            payment_link_id = %link.id,
            "enrollment paid before the link could be attached"
        );
        return Err(OpsApiError::AlreadyPaid);
    }

    tracing::info!(
        enrollment_id = %enrollment_id,
        payment_link_id = %link.id,
        "payment link attached"
    );

    Ok(Json(PaymentLinkResponse {
        enrollment_id,
        payment_link_id: link.id.to_string(),
        checkout_url: link.checkout_url(),
    }))
}
