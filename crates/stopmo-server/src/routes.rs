// ABOUTME: Route definitions for the stopmo HTTP API.
// ABOUTME: Assembles API routes, static media mounts, auth, CORS, and tracing into one Axum Router.

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use stopmo_core::FrameFormat;
use stopmo_store::{FRAMES_MOUNT, VIDEOS_MOUNT};
use tower::Layer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::SharedState;
use crate::auth::AuthLayer;

/// Build the complete Axum router with all routes and shared state.
pub fn create_router(state: SharedState) -> Router {
    let frame_limit = state.ingest.max_frame_bytes();

    let mut router = Router::new()
        .route("/health", get(health))
        .route(
            "/frames",
            post(api::frames::upload_frame).layer(DefaultBodyLimit::max(frame_limit)),
        )
        .route("/frames/last", delete(api::frames::undo_last))
        .route("/frames/all", delete(api::frames::reset_all))
        .route("/video", post(api::video::build_video))
        .route(
            "/events",
            get(api::events::subscribe).post(api::events::ingest_event),
        )
        .nest_service(
            FRAMES_MOUNT,
            middleware::from_fn(frame_files_only).layer(ServeDir::new(state.store.frames_root())),
        )
        .nest_service(
            VIDEOS_MOUNT,
            middleware::from_fn(video_files_only).layer(ServeDir::new(state.store.videos_root())),
        )
        .layer(AuthLayer::new(state.event_token.clone()))
        .with_state(state.clone());

    if let Some(origin) = &state.cors_origin {
        match HeaderValue::from_str(origin) {
            Ok(origin) => {
                router = router.layer(
                    CorsLayer::new()
                        .allow_origin(origin)
                        .allow_methods([Method::GET, Method::POST, Method::DELETE])
                        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
                );
            }
            Err(_) => tracing::warn!(origin = %origin, "ignoring invalid CORS origin"),
        }
    }

    router.layer(TraceLayer::new_for_http())
}

/// Last path segment of a static media request.
fn requested_name(req: &Request) -> &str {
    req.uri().path().rsplit('/').next().unwrap_or_default()
}

/// Frame directories also hold the ledger; only images are served.
async fn frame_files_only(req: Request, next: Next) -> Response {
    if FrameFormat::is_frame_name(requested_name(&req)) {
        next.run(req).await
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Hides in-progress encoder output, which is written under a dot name.
async fn video_files_only(req: Request, next: Next) -> Response {
    let name = requested_name(&req);
    let is_video = !name.starts_with('.')
        && name
            .rsplit_once('.')
            .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("mp4"));
    if is_video {
        next.run(req).await
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Health check handler with the operator-facing counters.
async fn health(State(state): State<SharedState>) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "ledgerRecoveries": state.store.ledger_recoveries(),
        "subscribers": state.bus.len(),
        "encoderAvailable": state.assembler.has_encoder(),
    }))
}
