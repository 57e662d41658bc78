// HTTP control API tests
//
// Requests go straight into the router with tower's oneshot; the session
// underneath talks to the fake transport and a manual backend.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use common::*;
use handscribe::http::{create_router, AppState, ErrorResponse, PingResponse};
use handscribe::session::{Phase, RecordingSession, SessionSnapshot};
use handscribe::settings::EndpointSettings;
use handscribe::transport::{ServerEvent, TranscriptionPayload};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower::ServiceExt;

fn app(session: &RecordingSession) -> Router {
    create_router(AppState::new(session.clone()))
}

async fn send(app: Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

fn parse<T: DeserializeOwned>(bytes: &[u8]) -> T {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let session = new_session(
        unconfigured_settings(),
        &FakeTransport::new(),
        ManualHandle::new().provider(),
    );

    let (status, body) = send(app(&session), Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn test_get_session_reports_idle() {
    let session = new_session(
        configured_settings(BACKEND_URL),
        &FakeTransport::new(),
        ManualHandle::new().provider(),
    );

    let (status, body) = send(app(&session), Method::GET, "/session", None).await;

    assert_eq!(status, StatusCode::OK);
    let snapshot: SessionSnapshot = parse(&body);
    assert_eq!(snapshot.phase, Phase::Idle);
    assert!(snapshot.configured);

    let raw: serde_json::Value = parse(&body);
    assert_eq!(raw["phase"], "idle");
}

#[tokio::test]
async fn test_start_without_endpoint_is_precondition_failed() {
    let session = new_session(
        unconfigured_settings(),
        &FakeTransport::new(),
        ManualHandle::new().provider(),
    );

    let (status, body) = send(app(&session), Method::POST, "/session/start", None).await;

    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    let error: ErrorResponse = parse(&body);
    assert_eq!(error.code, "CONFIGURATION_ERROR");
    assert_eq!(session.phase(), Phase::Error);
}

#[tokio::test]
async fn test_record_through_api() {
    let transport = FakeTransport::new();
    let handle = ManualHandle::new();
    let session = new_session(configured_settings(BACKEND_URL), &transport, handle.provider());

    let (status, body) = send(app(&session), Method::POST, "/session/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse::<SessionSnapshot>(&body).phase, Phase::Recording);

    handle.fire(2);

    let (status, body) = send(app(&session), Method::POST, "/session/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    let snapshot: SessionSnapshot = parse(&body);
    assert_eq!(snapshot.phase, Phase::Processing);
    assert_eq!(snapshot.frames_captured, 2);

    transport.inject(ServerEvent::TranscriptionResult(TranscriptionPayload {
        success: true,
        text: Some("note to self".to_string()),
        svg: Some("<svg>ink</svg>".to_string()),
        error: None,
    }));
    wait_for_phase(&session, Phase::Complete).await;

    let response = app(&session)
        .oneshot(
            Request::builder()
                .uri("/session/result.svg")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "image/svg+xml"
    );
    let svg = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&svg[..], b"<svg>ink</svg>");

    let (status, body) = send(app(&session), Method::POST, "/session/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse::<SessionSnapshot>(&body).phase, Phase::Idle);

    session.shutdown().await;
}

#[tokio::test]
async fn test_stop_with_no_audio_is_unprocessable() {
    let session = new_session(
        configured_settings(BACKEND_URL),
        &FakeTransport::new(),
        ManualHandle::new().provider(),
    );

    send(app(&session), Method::POST, "/session/start", None).await;
    let (status, body) = send(app(&session), Method::POST, "/session/stop", None).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(parse::<ErrorResponse>(&body).code, "EMPTY_CAPTURE_ERROR");

    session.shutdown().await;
}

#[tokio::test]
async fn test_device_failure_is_service_unavailable() {
    let session = new_session(
        configured_settings(BACKEND_URL),
        &FakeTransport::new(),
        FailingBackend::provider(),
    );

    let (status, body) = send(app(&session), Method::POST, "/session/start", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let error: ErrorResponse = parse(&body);
    assert_eq!(error.code, "DEVICE_ACCESS_ERROR");
    assert_eq!(error.error, "Permission denied");
}

#[tokio::test]
async fn test_connect_failure_is_bad_gateway() {
    let session = new_session(
        configured_settings(BACKEND_URL),
        &FakeTransport::unreachable(),
        ManualHandle::new().provider(),
    );

    let (status, body) = send(app(&session), Method::POST, "/session/start", None).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(parse::<ErrorResponse>(&body).code, "TRANSPORT_ERROR");
}

#[tokio::test]
async fn test_result_svg_missing_before_completion() {
    let session = new_session(
        configured_settings(BACKEND_URL),
        &FakeTransport::new(),
        ManualHandle::new().provider(),
    );

    let (status, body) = send(app(&session), Method::GET, "/session/result.svg", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(parse::<ErrorResponse>(&body).code, "NO_RESULT");
}

#[tokio::test]
async fn test_endpoint_settings_lifecycle() {
    let settings = unconfigured_settings();
    let transport = FakeTransport::new();
    let session = new_session(Arc::clone(&settings), &transport, ManualHandle::new().provider());

    let (status, body) = send(app(&session), Method::GET, "/settings/endpoint", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parse::<EndpointSettings>(&body), EndpointSettings::unconfigured());

    let (status, body) = send(
        app(&session),
        Method::PUT,
        "/settings/endpoint",
        Some(r#"{"url":" http://10.0.0.5:5000 "}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        parse::<EndpointSettings>(&body),
        EndpointSettings::with_url("http://10.0.0.5:5000")
    );
    assert_eq!(settings.url().as_deref(), Some("http://10.0.0.5:5000"));

    let (status, body) = send(app(&session), Method::DELETE, "/settings/endpoint", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!parse::<EndpointSettings>(&body).configured);
    assert!(!settings.is_configured());

    session.shutdown().await;
}

#[tokio::test]
async fn test_put_endpoint_rejects_bad_scheme() {
    let settings = unconfigured_settings();
    let session = new_session(
        Arc::clone(&settings),
        &FakeTransport::new(),
        ManualHandle::new().provider(),
    );

    for url in ["ftp://backend", "backend:5000", "http://", ""] {
        let body = serde_json::json!({ "url": url }).to_string();
        let (status, response) =
            send(app(&session), Method::PUT, "/settings/endpoint", Some(&body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "{:?}", url);
        assert_eq!(parse::<ErrorResponse>(&response).code, "INVALID_URL");
    }
    assert!(!settings.is_configured());
}

#[tokio::test]
async fn test_ping_unconfigured_endpoint() {
    let session = new_session(
        unconfigured_settings(),
        &FakeTransport::new(),
        ManualHandle::new().provider(),
    );

    let (status, body) = send(app(&session), Method::GET, "/settings/endpoint/ping", None).await;

    assert_eq!(status, StatusCode::OK);
    let ping: PingResponse = parse(&body);
    assert!(!ping.configured);
    assert!(!ping.reachable);
}
