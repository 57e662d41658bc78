//! HTTP API server for local control of the recorder
//!
//! This module provides a REST API over the recording session:
//! - GET /session - Current snapshot
//! - POST /session/start, /session/stop, /session/reset - Drive the state machine
//! - GET /session/result.svg - Last handwriting result
//! - GET|PUT|DELETE /settings/endpoint - Backend URL
//! - GET /settings/endpoint/ping - Backend liveness
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{EndpointRequest, ErrorResponse, PingResponse};
pub use routes::create_router;
pub use state::AppState;
