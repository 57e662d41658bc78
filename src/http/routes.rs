use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recording control
        .route("/session", get(handlers::get_session))
        .route("/session/start", post(handlers::start_recording))
        .route("/session/stop", post(handlers::stop_recording))
        .route("/session/reset", post(handlers::reset_session))
        .route("/session/result.svg", get(handlers::get_result_svg))
        // Backend endpoint settings
        .route(
            "/settings/endpoint",
            get(handlers::get_endpoint)
                .put(handlers::set_endpoint)
                .delete(handlers::clear_endpoint),
        )
        .route("/settings/endpoint/ping", get(handlers::ping_endpoint))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
