// ABOUTME: API error type mapping domain failures onto HTTP status codes and JSON bodies.
// ABOUTME: Bodies are {"error": message} with an optional "detail" carrying encoder diagnostics.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use stopmo_core::UnknownEventKind;
use stopmo_store::{IngestError, SessionError, StoreError};
use stopmo_video::BuildError;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{message}")]
    Encoder {
        message: String,
        detail: Option<String>,
    },

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Encoder { .. } | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "request failed: {}", self);
        }
        let mut body = serde_json::json!({ "error": self.to_string() });
        if let ApiError::Encoder {
            detail: Some(detail),
            ..
        } = &self
        {
            body["detail"] = serde_json::Value::String(detail.clone());
        }
        (status, Json(body)).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::InvalidId(_) => ApiError::BadRequest(e.to_string()),
            SessionError::Io(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Session(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::TooLarge { .. } => ApiError::PayloadTooLarge(e.to_string()),
            IngestError::Empty | IngestError::UnsupportedFormat => {
                ApiError::BadRequest(e.to_string())
            }
            IngestError::Store(e) => e.into(),
        }
    }
}

impl From<BuildError> for ApiError {
    fn from(e: BuildError) -> Self {
        match e {
            BuildError::NoFrames => ApiError::BadRequest(e.to_string()),
            BuildError::EncoderUnavailable => ApiError::ServiceUnavailable(e.to_string()),
            BuildError::Encode(ref encode) => ApiError::Encoder {
                detail: encode.detail().map(str::to_string),
                message: e.to_string(),
            },
            BuildError::Store(e) => e.into(),
            BuildError::Io(_) | BuildError::Task(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<UnknownEventKind> for ApiError {
    fn from(e: UnknownEventKind) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl From<JoinError> for ApiError {
    fn from(e: JoinError) -> Self {
        ApiError::Internal(format!("background task failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stopmo_video::EncodeError;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn build_errors_map_to_statuses() {
        assert_eq!(ApiError::from(BuildError::NoFrames).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(BuildError::EncoderUnavailable).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        let timed_out = BuildError::Encode(EncodeError::TimedOut {
            after: std::time::Duration::from_secs(1),
        });
        assert_eq!(ApiError::from(timed_out).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn invalid_session_is_a_bad_request() {
        let err = ApiError::from(IngestError::Store(StoreError::Session(
            SessionError::InvalidId("..".to_string()),
        )));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn encoder_failure_carries_detail() {
        let err = ApiError::from(BuildError::Encode(EncodeError::Failed {
            status: Some(1),
            stderr: "moov atom not found".to_string(),
        }));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        assert_eq!(json["detail"], "moov atom not found");
        assert!(json["error"].as_str().unwrap().contains("encoding failed"));
    }

    #[tokio::test]
    async fn plain_errors_have_no_detail() {
        let resp = ApiError::from(UnknownEventKind("jump".to_string())).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert!(json.get("detail").is_none());
        assert!(json["error"].as_str().unwrap().contains("jump"));
    }
}
