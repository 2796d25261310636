// ABOUTME: Event forwarder posting button presses to the server's authenticated ingress.
// ABOUTME: Each send reports an explicit outcome; the run loop logs failures and carries on without retrying.

use std::time::Duration;

use futures::StreamExt;
use reqwest::Url;
use stopmo_core::{ButtonEvent, EventKind};
use thiserror::Error;

use crate::mapping::map_token;
use crate::source::TokenStream;

/// Where the forwarder posts when no backend is given.
pub const DEFAULT_BACKEND: &str = "http://127.0.0.1:8000";

/// Per-request limit for one forward.
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid backend url {0:?}")]
    InvalidBackend(String),

    #[error("request to event ingress failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// What the server said about one forwarded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    Delivered,
    Rejected { status: u16, body: String },
}

/// Tally of a forwarding run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub delivered: usize,
    pub rejected: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct Forwarder {
    client: reqwest::Client,
    endpoint: Url,
    token: Option<String>,
}

impl Forwarder {
    pub fn new(backend: &str, token: Option<String>) -> Result<Self, ForwardError> {
        let base = backend.trim_end_matches('/');
        let endpoint = Url::parse(&format!("{base}/events"))
            .map_err(|_| ForwardError::InvalidBackend(backend.to_string()))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ForwardError::InvalidBackend(backend.to_string()));
        }
        let client = reqwest::Client::builder().timeout(FORWARD_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Post one event. Non-2xx responses come back as `Rejected`, not as errors.
    pub async fn send(&self, kind: EventKind) -> Result<ForwardOutcome, ForwardError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&ButtonEvent::new(kind));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(ForwardOutcome::Delivered);
        }
        let body = response.text().await.unwrap_or_default();
        Ok(ForwardOutcome::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    /// Forward every token from `tokens` until the stream ends.
    pub async fn run(&self, mut tokens: TokenStream) -> ForwardStats {
        let mut stats = ForwardStats::default();
        while let Some(token) = tokens.next().await {
            let Some(kind) = map_token(&token) else {
                tracing::warn!(token = %token, "ignoring unknown button token");
                stats.skipped += 1;
                continue;
            };
            match self.send(kind).await {
                Ok(ForwardOutcome::Delivered) => {
                    tracing::info!(event = %kind, "forwarded");
                    stats.delivered += 1;
                }
                Ok(ForwardOutcome::Rejected { status, body }) => {
                    tracing::warn!(event = %kind, status, body = %body, "server rejected event");
                    stats.rejected += 1;
                }
                Err(e) => {
                    tracing::warn!(event = %kind, "forward failed: {}", e);
                    stats.failed += 1;
                }
            }
        }
        stats
    }
}
