// ABOUTME: Video build handler.
// ABOUTME: The build runs as its own task so a client hanging up does not stop the encoder.

use axum::Json;
use axum::extract::{Query, State};

use super::SessionQuery;
use crate::app_state::SharedState;
use crate::error::ApiError;

/// POST /video - Assemble the session's frames into its latest video.
pub async fn build_video(
    State(state): State<SharedState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let artifact = state.assembler.spawn_build(query.session).await??;

    Ok(Json(serde_json::json!({
        "videoUrl": artifact.locator,
        "frames": artifact.frames,
        "fps": artifact.fps,
        "builtAt": artifact.built_at,
    })))
}
