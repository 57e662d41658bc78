// Capture engine tests
//
// Verify the active flag gates frame delivery, frames are copied and
// forwarded in order, and the device is released on every exit path.

mod common;

use common::*;
use handscribe::audio::{AudioBackendConfig, FrameSink};
use handscribe::capture::{CaptureEngine, CaptureError, CapturedFrames, FrameTap};
use handscribe::transport::{OutboundEvent, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

async fn connected_transport() -> Arc<FakeTransport> {
    let transport = FakeTransport::new();
    transport.open(BACKEND_URL).await.unwrap();
    transport
}

fn engine(settings_url: Option<&str>, transport: &Arc<FakeTransport>) -> CaptureEngine {
    let settings = match settings_url {
        Some(url) => configured_settings(url),
        None => unconfigured_settings(),
    };
    CaptureEngine::new(
        settings,
        Arc::clone(transport) as Arc<dyn Transport>,
        AudioBackendConfig::default(),
    )
}

#[tokio::test]
async fn test_start_requires_configured_endpoint() {
    let transport = connected_transport().await;
    let handle = ManualHandle::new();
    let mut capture = engine(None, &transport);

    let err = capture
        .start(ManualBackend::boxed(&handle))
        .await
        .unwrap_err();

    assert_eq!(err, CaptureError::BackendNotConfigured);
    assert_eq!(handle.starts(), 0, "device untouched");
    assert!(!capture.is_active());
}

#[tokio::test]
async fn test_frames_are_stored_and_forwarded() {
    let transport = connected_transport().await;
    let handle = ManualHandle::new();
    let mut capture = engine(Some(BACKEND_URL), &transport);

    capture.start(ManualBackend::boxed(&handle)).await.unwrap();
    assert!(capture.is_active());

    assert_eq!(handle.fire(3), 3);

    let frames = capture.frames().snapshot();
    assert_eq!(frames.len(), 3);
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.sequence, i as u64);
        assert_eq!(frame.samples.len(), 4096);
        assert_eq!(frame.sample_rate, 16000);
        assert_eq!(frame.channels, 1);
    }
    assert_eq!(frames[1].timestamp_ms, 256, "4096 samples at 16kHz");

    let forwarded: Vec<Vec<f32>> = transport
        .sent()
        .into_iter()
        .filter_map(|event| match event {
            OutboundEvent::AudioData(samples) => Some(samples),
            _ => None,
        })
        .collect();
    let stored: Vec<Vec<f32>> = frames.into_iter().map(|f| f.samples).collect();
    assert_eq!(forwarded, stored);
}

#[tokio::test]
async fn test_stop_releases_device_and_counts_frames() {
    let transport = connected_transport().await;
    let handle = ManualHandle::new();
    let mut capture = engine(Some(BACKEND_URL), &transport);

    capture.start(ManualBackend::boxed(&handle)).await.unwrap();
    handle.fire(2);

    assert_eq!(capture.stop().await.unwrap(), 2);
    assert!(!capture.is_active());
    assert!(handle.is_released());
    assert_eq!(handle.stops(), 1);
}

#[tokio::test]
async fn test_stop_without_frames_is_empty_capture() {
    let transport = connected_transport().await;
    let handle = ManualHandle::new();
    let mut capture = engine(Some(BACKEND_URL), &transport);

    capture.start(ManualBackend::boxed(&handle)).await.unwrap();

    assert_eq!(capture.stop().await.unwrap_err(), CaptureError::EmptyCapture);
    assert!(handle.is_released(), "device released even when empty");
}

#[tokio::test]
async fn test_late_frames_are_dropped_after_stop() {
    let transport = connected_transport().await;
    let handle = ManualHandle::new();
    let mut capture = engine(Some(BACKEND_URL), &transport);

    capture.start(ManualBackend::boxed(&handle)).await.unwrap();
    handle.fire(1);
    let sink = handle.sink().unwrap();
    capture.stop().await.unwrap();

    assert!(!sink.is_active());
    assert_eq!(handle.fire_stale(&sink, 4), 0);
    assert_eq!(capture.frames().len(), 1);
    assert_eq!(transport.audio_frames(), 1);
}

#[tokio::test]
async fn test_failed_device_start_leaves_engine_inactive() {
    let transport = connected_transport().await;
    let mut capture = engine(Some(BACKEND_URL), &transport);

    let backend = (FailingBackend::provider())(capture.config()).unwrap();
    let err = capture.start(backend).await.unwrap_err();

    assert_eq!(err, CaptureError::DeviceAccess("Permission denied".to_string()));
    assert!(!capture.is_active());
    assert!(capture.frames().is_empty());
}

#[tokio::test]
async fn test_restart_clears_previous_frames() {
    let transport = connected_transport().await;
    let handle = ManualHandle::new();
    let mut capture = engine(Some(BACKEND_URL), &transport);

    capture.start(ManualBackend::boxed(&handle)).await.unwrap();
    handle.fire(3);
    capture.stop().await.unwrap();

    capture.start(ManualBackend::boxed(&handle)).await.unwrap();
    handle.fire(1);

    assert_eq!(capture.frames().len(), 1);
    assert_eq!(capture.frames().snapshot()[0].sequence, 0);
}

#[tokio::test]
async fn test_discard_releases_and_clears() {
    let transport = connected_transport().await;
    let handle = ManualHandle::new();
    let mut capture = engine(Some(BACKEND_URL), &transport);

    capture.start(ManualBackend::boxed(&handle)).await.unwrap();
    handle.fire(2);
    capture.discard().await;

    assert!(handle.is_released());
    assert!(capture.frames().is_empty());
    assert!(!capture.is_active());
}

#[test]
fn test_tap_rejects_frames_once_deactivated() {
    let transport = FakeTransport::new();
    let active = Arc::new(AtomicBool::new(true));
    let frames = CapturedFrames::new();
    let tap = FrameTap::new(
        Arc::clone(&active),
        frames.clone(),
        Arc::clone(&transport) as Arc<dyn Transport>,
        16000,
    );

    assert!(tap.push(&test_frame(0.1)));
    FrameTap::deactivate(&active, &frames);

    assert!(!active.load(Ordering::SeqCst));
    assert!(!tap.is_active());
    assert!(!tap.push(&test_frame(0.2)));
    assert_eq!(frames.len(), 1);
}
