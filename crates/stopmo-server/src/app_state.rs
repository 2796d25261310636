// ABOUTME: Shared application state for the stopmo HTTP server.
// ABOUTME: Wires the session store, frame ingest, video assembler, and event bus from config.

use std::sync::Arc;

use stopmo_store::{FrameIngest, SessionError, SessionStore};
use stopmo_video::{Encoder, FfmpegEncoder, VideoAssembler};

use crate::bus::EventBus;
use crate::config::StopmoConfig;

/// Shared application state accessible by all Axum handlers.
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub ingest: FrameIngest,
    pub assembler: Arc<VideoAssembler>,
    pub bus: Arc<EventBus>,
    /// Bearer token for event ingress; `None` rejects every ingress call.
    pub event_token: Option<String>,
    /// Browser origin allowed by CORS; `None` disables the CORS layer.
    pub cors_origin: Option<String>,
}

/// Type alias for the Arc-wrapped state used with Axum's State extractor.
pub type SharedState = Arc<AppState>;

impl AppState {
    /// Assemble state from ready-made parts, with no ingress token and no CORS.
    pub fn new(store: Arc<SessionStore>, ingest: FrameIngest, assembler: Arc<VideoAssembler>) -> Self {
        Self {
            store,
            ingest,
            assembler,
            bus: Arc::new(EventBus::new()),
            event_token: None,
            cors_origin: None,
        }
    }

    pub fn with_event_token(mut self, token: Option<String>) -> Self {
        self.event_token = token;
        self
    }

    pub fn with_cors_origin(mut self, origin: Option<String>) -> Self {
        self.cors_origin = origin;
        self
    }

    /// Build production state: create the storage roots and set up the encoder.
    ///
    /// The encoder binary is located again at every build, so a missing one
    /// only fails builds until it is installed.
    pub fn from_config(config: &StopmoConfig) -> Result<Self, SessionError> {
        let store = Arc::new(SessionStore::new(
            config.frames_dir.clone(),
            config.videos_dir.clone(),
        )?);
        let ingest = FrameIngest::new(Arc::clone(&store), config.max_frame_bytes);

        let encoder = FfmpegEncoder::lookup(config.ffmpeg.clone(), config.encode_timeout);
        match encoder.locate() {
            Some(binary) => tracing::info!(binary = %binary.display(), "using video encoder"),
            None => tracing::warn!("no ffmpeg binary found; video builds will fail until one is installed"),
        }
        let encoder: Arc<dyn Encoder> = Arc::new(encoder);
        let assembler = Arc::new(VideoAssembler::new(Arc::clone(&store), Some(encoder), config.ramp));

        Ok(Self::new(store, ingest, assembler)
            .with_event_token(config.event_token.clone())
            .with_cors_origin(Some(config.cors_origin.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn config_for(home: &TempDir) -> StopmoConfig {
        let vars = HashMap::from([
            ("STOPMO_HOME".to_string(), home.path().display().to_string()),
            (
                "STOPMO_FFMPEG".to_string(),
                home.path().join("bin/ffmpeg").display().to_string(),
            ),
        ]);
        StopmoConfig::from_lookup(move |key: &str| vars.get(key).cloned()).unwrap()
    }

    #[test]
    fn storage_roots_are_created() {
        let home = TempDir::new().unwrap();
        let state = AppState::from_config(&config_for(&home)).unwrap();
        assert!(state.store.frames_root().is_dir());
        assert!(state.store.videos_root().is_dir());
        assert!(state.event_token.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn encoder_installed_after_startup_is_picked_up() {
        use std::os::unix::fs::PermissionsExt;

        let home = TempDir::new().unwrap();
        let state = AppState::from_config(&config_for(&home)).unwrap();
        assert!(!state.assembler.has_encoder());

        let bin = home.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join("ffmpeg"), "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(bin.join("ffmpeg"), std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(state.assembler.has_encoder());
    }
}
