// ABOUTME: End-to-end smoke test for the full stopmo lifecycle.
// ABOUTME: Drives upload, undo, build, events, ledger recovery, and reset through the router.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use http::Request;
use stopmo_core::{ButtonEvent, EventKind, RampCurve};
use stopmo_server::{AppState, ChannelSubscriber, SharedState, create_router};
use stopmo_store::{FrameIngest, SessionStore};
use stopmo_video::{EncodeError, Encoder, VideoAssembler};
use tower::ServiceExt;

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
const TOKEN: &str = "smoke-token";

/// Stands in for ffmpeg: keeps the edit script and writes a placeholder video.
#[derive(Default)]
struct ScriptCapturingEncoder {
    scripts: Mutex<Vec<String>>,
}

#[async_trait]
impl Encoder for ScriptCapturingEncoder {
    async fn encode(&self, script: &Path, output: &Path) -> Result<(), EncodeError> {
        let text = tokio::fs::read_to_string(script).await.unwrap();
        self.scripts.lock().unwrap().push(text);
        tokio::fs::write(output, b"fake mp4").await.unwrap();
        Ok(())
    }
}

/// Helper to create a test AppState with a temp directory.
fn test_app_state(home: &Path, encoder: Arc<ScriptCapturingEncoder>) -> SharedState {
    let store = Arc::new(SessionStore::new(home.join("frames"), home.join("videos")).unwrap());
    let ingest = FrameIngest::new(Arc::clone(&store), 1024 * 1024);
    let assembler = Arc::new(VideoAssembler::new(
        Arc::clone(&store),
        Some(encoder as Arc<dyn Encoder>),
        RampCurve::default(),
    ));
    Arc::new(AppState::new(store, ingest, assembler).with_event_token(Some(TOKEN.to_string())))
}

/// Helper to extract JSON body from a response.
async fn call(app: &axum::Router, req: Request<Body>) -> (u16, serde_json::Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status().as_u16();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn smoke_test_full_lifecycle() {
    let dir = tempfile::TempDir::new().unwrap();
    let encoder = Arc::new(ScriptCapturingEncoder::default());
    let state = test_app_state(dir.path(), Arc::clone(&encoder));
    let app = create_router(Arc::clone(&state));

    // 1. Upload 41 frames, then undo one.
    for expected in 1..=41 {
        let (status, json) = call(
            &app,
            Request::post("/frames?session=kid1")
                .body(Body::from(JPEG.to_vec()))
                .unwrap(),
        )
        .await;
        assert_eq!(status, 201);
        assert_eq!(json["index"], expected);
    }
    let (status, _) = call(
        &app,
        Request::delete("/frames/last?session=kid1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, 204);

    // 2. Build: 40 frames play at roughly 5.42 fps.
    let (status, json) = call(
        &app,
        Request::post("/video?session=kid1").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, 200, "build failed: {json}");
    assert_eq!(json["videoUrl"], "/media/videos/kid1/latest.mp4");
    assert_eq!(json["frames"], 40);
    let fps = json["fps"].as_f64().unwrap();
    assert!((fps - 5.42).abs() < 0.01, "fps was {fps}");

    let script = encoder.scripts.lock().unwrap()[0].clone();
    assert_eq!(script.matches("000040.jpg").count(), 2);
    assert!(!script.contains("000041.jpg"));

    let resp = app
        .clone()
        .oneshot(
            Request::get("/media/videos/kid1/latest.mp4")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // 3. Events: bad token reaches nobody, good token reaches the viewer.
    let (viewer, mut inbox) = ChannelSubscriber::new(8, Duration::from_millis(100));
    state.bus.register(Arc::new(viewer));
    let ingress = |token: &str| {
        Request::post("/events")
            .header("authorization", format!("Bearer {token}"))
            .header("content-type", "application/json")
            .body(Body::from(r#"{"type":"capture"}"#))
            .unwrap()
    };
    let (status, _) = call(&app, ingress("wrong")).await;
    assert_eq!(status, 401);
    assert!(inbox.try_recv().is_err());
    let (status, _) = call(&app, ingress(TOKEN)).await;
    assert_eq!(status, 200);
    assert_eq!(inbox.try_recv().unwrap(), ButtonEvent::new(EventKind::Capture));

    // 4. Corrupt ledger: the next upload starts over at index 1 and health reports it.
    let ledger = dir.path().join("frames/kid2/frames.json");
    std::fs::create_dir_all(ledger.parent().unwrap()).unwrap();
    std::fs::write(&ledger, "][ not json").unwrap();
    let (status, json) = call(
        &app,
        Request::post("/frames?session=kid2")
            .body(Body::from(JPEG.to_vec()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, 201);
    assert_eq!(json["index"], 1);

    let (_, health) = call(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(health["ledgerRecoveries"], 1);
    assert_eq!(health["subscribers"], 1);

    // 5. Reset clears frames and the video; directories survive.
    let (status, json) = call(
        &app,
        Request::delete("/frames/all?session=kid1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["framesRemoved"], 40);
    assert_eq!(json["videosRemoved"], 1);
    assert!(dir.path().join("frames/kid1").is_dir());
    assert!(dir.path().join("videos/kid1").is_dir());

    let (status, _) = call(
        &app,
        Request::post("/video?session=kid1").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn smoke_test_build_recovers_ledger_from_disk() {
    let dir = tempfile::TempDir::new().unwrap();
    let encoder = Arc::new(ScriptCapturingEncoder::default());
    let state = test_app_state(dir.path(), Arc::clone(&encoder));
    let app = create_router(state);

    // Frames copied in by hand, no ledger.
    let frames = dir.path().join("frames/_default");
    std::fs::create_dir_all(&frames).unwrap();
    for name in ["000003.jpg", "000001.jpg", "000002.jpg"] {
        std::fs::write(frames.join(name), JPEG).unwrap();
    }

    let (status, json) = call(&app, Request::post("/video").body(Body::empty()).unwrap()).await;
    assert_eq!(status, 200, "build failed: {json}");
    assert_eq!(json["frames"], 3);
    assert_eq!(json["videoUrl"], "/media/videos/_default/latest.mp4");

    // The next upload continues after the recovered frames.
    let (_, json) = call(
        &app,
        Request::post("/frames").body(Body::from(JPEG.to_vec())).unwrap(),
    )
    .await;
    assert_eq!(json["index"], 4);
}
