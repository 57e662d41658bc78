use super::state::AppState;
use crate::error::SessionError;
use crate::settings::EndpointSettings;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct EndpointRequest {
    /// Backend base URL, e.g. `https://backend.example:5000`
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub configured: bool,
    pub reachable: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, code: &str) -> Self {
        Self {
            error: error.into(),
            code: code.to_string(),
        }
    }
}

fn session_error(err: SessionError) -> Response {
    let status = match err {
        SessionError::Configuration => StatusCode::PRECONDITION_FAILED,
        SessionError::DeviceAccess(_) => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::Transport(_) | SessionError::ServerProcessing(_) => StatusCode::BAD_GATEWAY,
        SessionError::EmptyCapture => StatusCode::UNPROCESSABLE_ENTITY,
    };

    (status, Json(ErrorResponse::new(err.to_string(), err.code()))).into_response()
}

fn valid_backend_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));
    matches!(rest, Some(host) if !host.is_empty())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /session
/// Current session snapshot
pub async fn get_session(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.session.snapshot()))
}

/// POST /session/start
/// Start a recording attempt (no-op unless idle or errored)
pub async fn start_recording(State(state): State<AppState>) -> Response {
    match state.session.start().await {
        Ok(()) => (StatusCode::OK, Json(state.session.snapshot())).into_response(),
        Err(e) => {
            error!("Failed to start recording: {}", e);
            session_error(e)
        }
    }
}

/// POST /session/stop
/// Stop recording and wait for the transcription server-side
pub async fn stop_recording(State(state): State<AppState>) -> Response {
    match state.session.stop().await {
        Ok(()) => (StatusCode::OK, Json(state.session.snapshot())).into_response(),
        Err(e) => {
            error!("Failed to stop recording: {}", e);
            session_error(e)
        }
    }
}

/// POST /session/reset
/// Discard the current attempt and go back to idle
pub async fn reset_session(State(state): State<AppState>) -> impl IntoResponse {
    state.session.reset().await;
    (StatusCode::OK, Json(state.session.snapshot()))
}

/// GET /session/result.svg
/// Handwriting SVG of the last completed attempt
pub async fn get_result_svg(State(state): State<AppState>) -> Response {
    match state.session.snapshot().result {
        Some(result) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "image/svg+xml")],
            result.svg,
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("No transcription result yet", "NO_RESULT")),
        )
            .into_response(),
    }
}

/// GET /settings/endpoint
pub async fn get_endpoint(State(state): State<AppState>) -> Json<EndpointSettings> {
    Json(state.settings.settings())
}

/// PUT /settings/endpoint
/// Persist a new backend URL and reconnect to it
pub async fn set_endpoint(
    State(state): State<AppState>,
    Json(req): Json<EndpointRequest>,
) -> Response {
    let url = req.url.trim();
    if !valid_backend_url(url) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "URL must start with http:// or https://",
                "INVALID_URL",
            )),
        )
            .into_response();
    }

    if let Err(e) = state.settings.set_url(url) {
        error!("Failed to save backend URL: {:#}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(
                format!("Failed to save settings: {}", e),
                "SETTINGS_ERROR",
            )),
        )
            .into_response();
    }

    info!("Backend URL set to {}", url);
    let session = state.session.clone();
    tokio::spawn(async move { session.sync_endpoint().await });

    (StatusCode::OK, Json(state.settings.settings())).into_response()
}

/// DELETE /settings/endpoint
pub async fn clear_endpoint(State(state): State<AppState>) -> Response {
    if let Err(e) = state.settings.clear() {
        error!("Failed to clear backend URL: {:#}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(
                format!("Failed to save settings: {}", e),
                "SETTINGS_ERROR",
            )),
        )
            .into_response();
    }

    info!("Backend URL cleared");
    state.session.sync_endpoint().await;

    (StatusCode::OK, Json(state.settings.settings())).into_response()
}

/// GET /settings/endpoint/ping
/// Probe `<url>/ping` on the configured backend
pub async fn ping_endpoint(State(state): State<AppState>) -> Json<PingResponse> {
    let reachable = state.settings.check_liveness().await;
    Json(PingResponse {
        configured: state.settings.is_configured(),
        reachable,
    })
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
