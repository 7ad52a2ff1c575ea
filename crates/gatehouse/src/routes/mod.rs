//! HTTP route handlers for Gatehouse.

use std::time::Duration;

use axum::{
    Json, Router,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use quad_common::AuthError;
use serde::Serialize;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::HttpConfig;
use crate::state::AppState;

mod auth;
mod health;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let http = state.config.http.clone();

    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/metrics", get(health::metrics))

        // OTP authentication
        .nest("/auth", auth_routes())

        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(http.request_timeout_secs)))
        .layer(cors_layer(&http))

        // Add shared state
        .with_state(state)
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/send-otp", post(auth::send_otp))
        .route("/verify-otp", post(auth::verify_otp))
        .route("/session", get(auth::session))
        .route("/public-key", get(auth::public_key))
}

fn cors_layer(http: &HttpConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if http.allowed_origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = http
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    cors.allow_origin(AllowOrigin::list(origins))
}

/// Error body returned for every failed auth call
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining_attempts: Option<u32>,
    /// Client should request a new code rather than retry
    reissue: bool,
}

/// HTTP rendering of `AuthError`
pub struct ApiError(pub AuthError);

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let remaining_attempts = match err {
            AuthError::Mismatch { remaining_attempts } => Some(remaining_attempts),
            _ => None,
        };

        // Backend details stay in the logs
        let error = match err {
            AuthError::IssuerFailure(_) => {
                "Code accepted but the session could not be issued, request a new OTP".to_string()
            }
            AuthError::Store(_) => "Authentication is temporarily unavailable".to_string(),
            ref other => other.to_string(),
        };

        let body = ErrorBody {
            error,
            code: err.code(),
            remaining_attempts,
            reissue: err.requires_reissue(),
        };

        (status, Json(body)).into_response()
    }
}
