// ABOUTME: Configuration loading and validation for the stopmo server.
// ABOUTME: Reads STOPMO_* environment variables and enforces the bind/token constraints.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use http::HeaderValue;
use stopmo_core::{CadenceError, RampCurve};
use stopmo_store::DEFAULT_MAX_FRAME_BYTES;
use stopmo_video::DEFAULT_ENCODE_TIMEOUT;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("STOPMO_BIND is not a valid socket address: {0}")]
    InvalidBind(String),

    #[error("STOPMO_BIND {0} is not a loopback address; set STOPMO_ALLOW_REMOTE=true to listen on it")]
    NonLoopbackBind(SocketAddr),

    #[error("STOPMO_ALLOW_REMOTE is true but STOPMO_EVENT_TOKEN is not set; refusing to start without authentication")]
    RemoteWithoutToken,

    #[error("{var} is not a valid number: {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("STOPMO_CORS_ORIGIN is not a valid origin: {0:?}")]
    InvalidCorsOrigin(String),

    #[error("invalid cadence settings: {0}")]
    Cadence(#[from] CadenceError),
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct StopmoConfig {
    pub home: PathBuf,
    pub frames_dir: PathBuf,
    pub videos_dir: PathBuf,
    pub bind: SocketAddr,
    pub allow_remote: bool,
    pub event_token: Option<String>,
    pub cors_origin: String,
    pub ffmpeg: Option<PathBuf>,
    pub encode_timeout: Duration,
    pub max_frame_bytes: usize,
    pub ramp: RampCurve,
}

impl StopmoConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - STOPMO_HOME: data directory (default: ~/.stopmo)
    /// - STOPMO_FRAMES_DIR / STOPMO_VIDEOS_DIR: storage roots (default: under STOPMO_HOME)
    /// - STOPMO_BIND: socket address to bind (default: 127.0.0.1:8000)
    /// - STOPMO_ALLOW_REMOTE: allow a non-loopback bind (default: false)
    /// - STOPMO_EVENT_TOKEN: bearer token for event ingress (optional)
    /// - STOPMO_CORS_ORIGIN: browser origin allowed to call the API (default: http://localhost:5173)
    /// - STOPMO_FFMPEG: encoder binary (default: looked up on PATH)
    /// - STOPMO_ENCODE_TIMEOUT_SECS, STOPMO_MAX_FRAME_BYTES
    /// - STOPMO_RAMP_MIN_FPS, STOPMO_RAMP_MAX_FPS, STOPMO_RAMP_RATE
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let home = var("STOPMO_HOME").map(PathBuf::from).unwrap_or_else(|| {
            var("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join(".stopmo")
        });
        let frames_dir = var("STOPMO_FRAMES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("session_frames"));
        let videos_dir = var("STOPMO_VIDEOS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join("videos"));

        let bind_str = var("STOPMO_BIND").unwrap_or_else(|| "127.0.0.1:8000".to_string());
        let bind: SocketAddr = bind_str
            .parse()
            .map_err(|_| ConfigError::InvalidBind(bind_str))?;

        let allow_remote = var("STOPMO_ALLOW_REMOTE")
            .map(|v| v == "true" || v == "1" || v == "yes")
            .unwrap_or(false);

        let event_token = var("STOPMO_EVENT_TOKEN");

        let cors_origin =
            var("STOPMO_CORS_ORIGIN").unwrap_or_else(|| "http://localhost:5173".to_string());
        if HeaderValue::from_str(&cors_origin).is_err() {
            return Err(ConfigError::InvalidCorsOrigin(cors_origin));
        }

        let ffmpeg = var("STOPMO_FFMPEG").map(PathBuf::from);

        let encode_timeout = match var("STOPMO_ENCODE_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_number("STOPMO_ENCODE_TIMEOUT_SECS", &v)?),
            None => DEFAULT_ENCODE_TIMEOUT,
        };
        let max_frame_bytes = match var("STOPMO_MAX_FRAME_BYTES") {
            Some(v) => parse_number("STOPMO_MAX_FRAME_BYTES", &v)?,
            None => DEFAULT_MAX_FRAME_BYTES,
        };

        let defaults = RampCurve::default();
        let ramp = RampCurve::new(
            optional_number(&var, "STOPMO_RAMP_MIN_FPS", defaults.min_fps())?,
            optional_number(&var, "STOPMO_RAMP_MAX_FPS", defaults.max_fps())?,
            optional_number(&var, "STOPMO_RAMP_RATE", defaults.rate_constant())?,
        )?;

        // Security validation: listening beyond loopback needs explicit opt-in and a token
        if !allow_remote && !bind.ip().is_loopback() {
            return Err(ConfigError::NonLoopbackBind(bind));
        }
        if allow_remote && event_token.is_none() {
            return Err(ConfigError::RemoteWithoutToken);
        }

        Ok(Self {
            home,
            frames_dir,
            videos_dir,
            bind,
            allow_remote,
            event_token,
            cors_origin,
            ffmpeg,
            encode_timeout,
            max_frame_bytes,
            ramp,
        })
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: value.to_string(),
    })
}

fn optional_number(
    var: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: f64,
) -> Result<f64, ConfigError> {
    match var(key) {
        Some(v) => parse_number(key, &v),
        None => Ok(default),
    }
}
