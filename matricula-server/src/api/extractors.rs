//! Custom Axum extractors for request authentication.
//!
//! Provides `OpsAuth`, which verifies the operator bearer token on the
//! `/ops` endpoints. Token comparison is constant-time.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};

use crate::state::AppState;

/// An Axum extractor that verifies the operator bearer token.
///
/// # Header format
///
/// ```text
/// Authorization: Bearer {ops_token}
/// ```
pub struct OpsAuth;

/// Errors returned by the [`OpsAuth`] extractor.
#[derive(Debug)]
pub enum OpsAuthError {
    MissingHeader,
    InvalidHeader,
    TokenMismatch,
}

impl IntoResponse for OpsAuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            OpsAuthError::MissingHeader => {
                (StatusCode::UNAUTHORIZED, "missing Authorization header")
            }
            OpsAuthError::InvalidHeader => (
                StatusCode::BAD_REQUEST,
                "invalid Authorization header format",
            ),
            OpsAuthError::TokenMismatch => (StatusCode::UNAUTHORIZED, "invalid operator token"),
        };
        (status, message).into_response()
    }
}

impl FromRequestParts<AppState> for OpsAuth {
    type Rejection = OpsAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(OpsAuthError::MissingHeader)?
            .to_str()
            .map_err(|_| OpsAuthError::InvalidHeader)?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or(OpsAuthError::InvalidHeader)?;

        ring::constant_time::verify_slices_are_equal(
            token.as_bytes(),
            state.config.ops.token.as_bytes(),
        )
        .map_err(|_| OpsAuthError::TokenMismatch)?;

        Ok(OpsAuth)
    }
}
