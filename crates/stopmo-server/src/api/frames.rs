// ABOUTME: Frame API handlers: upload the next frame, undo the last one, reset the session.
// ABOUTME: Ledger work runs on the blocking pool under the session's mutation lock.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use super::SessionQuery;
use crate::app_state::SharedState;
use crate::error::ApiError;

/// POST /frames - Store the request body as the session's next frame.
pub async fn upload_frame(
    State(state): State<SharedState>,
    Query(query): Query<SessionQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let worker = Arc::clone(&state);
    let accepted = tokio::task::spawn_blocking(move || {
        worker.ingest.accept(query.session.as_deref(), &body)
    })
    .await??;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "index": accepted.index,
            "locator": accepted.locator,
        })),
    )
        .into_response())
}

/// DELETE /frames/last - Undo the most recent capture.
pub async fn undo_last(
    State(state): State<SharedState>,
    Query(query): Query<SessionQuery>,
) -> Result<Response, ApiError> {
    let worker = Arc::clone(&state);
    let popped =
        tokio::task::spawn_blocking(move || worker.store.undo(query.session.as_deref())).await??;

    Ok(match popped {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => (
            StatusCode::OK,
            Json(serde_json::json!({ "nothingToUndo": true })),
        )
            .into_response(),
    })
}

/// DELETE /frames/all - Remove every frame and video of the session.
pub async fn reset_all(
    State(state): State<SharedState>,
    Query(query): Query<SessionQuery>,
) -> Result<Response, ApiError> {
    let worker = Arc::clone(&state);
    let summary =
        tokio::task::spawn_blocking(move || worker.store.reset(query.session.as_deref())).await??;

    Ok(Json(serde_json::json!({
        "ok": true,
        "framesRemoved": summary.frames_removed,
        "videosRemoved": summary.videos_removed,
    }))
    .into_response())
}
