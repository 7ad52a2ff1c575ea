//! OTP authentication endpoints.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use quad_common::{SessionClaims, VerifiedSession};
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SendOtpRequest {
    email: Option<String>,
}

#[derive(Serialize)]
pub struct SendOtpResponse {
    message: &'static str,
    expires_in: u64,
    /// Only present in `disclose` mode
    #[serde(skip_serializing_if = "Option::is_none")]
    otp: Option<String>,
}

/// Issue an OTP for an email address
pub async fn send_otp(
    State(state): State<AppState>,
    Json(payload): Json<SendOtpRequest>,
) -> Result<Json<SendOtpResponse>, ApiError> {
    let email = payload.email.unwrap_or_default();
    let issued = state.otp.request_challenge(&email).await?;

    Ok(Json(SendOtpResponse {
        message: "OTP sent",
        expires_in: issued.expires_in_secs,
        otp: issued.disclosed_code().map(str::to_string),
    }))
}

#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    email: Option<String>,
    otp: Option<String>,
}

/// Verify an OTP and return a session credential
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<VerifiedSession>, ApiError> {
    let email = payload.email.unwrap_or_default();
    let otp = payload.otp.unwrap_or_default();

    let session = state.otp.verify_challenge(&email, &otp).await?;
    Ok(Json(session))
}

#[derive(Deserialize)]
pub struct SessionQuery {
    token: String,
}

/// Validate a session credential
///
/// Returns:
/// - 200: Valid credential, with its claims
/// - 401: Invalid, foreign, or expired credential
pub async fn session(
    State(state): State<AppState>,
    Query(params): Query<SessionQuery>,
) -> Result<Json<SessionClaims>, StatusCode> {
    match state.sessions.validate(&params.token) {
        Ok(claims) => Ok(Json(claims)),
        Err(e) => {
            tracing::debug!(error = %e, "Rejected session credential");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

#[derive(Serialize)]
pub struct PublicKeyResponse {
    issuer: String,
    algorithm: &'static str,
    public_key: String,
}

/// Session verification key, for services that validate credentials themselves
pub async fn public_key(State(state): State<AppState>) -> Json<PublicKeyResponse> {
    Json(PublicKeyResponse {
        issuer: state.sessions.issuer().to_string(),
        algorithm: "ed25519",
        public_key: state.sessions.public_key_b64(),
    })
}
