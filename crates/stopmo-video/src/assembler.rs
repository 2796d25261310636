// ABOUTME: Video assembler: snapshots a session's frames, computes the cadence, and runs the encoder.
// ABOUTME: Output overwrites the session's latest.mp4; temporary files are removed on every path.

use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use stopmo_core::{EditScript, RampCurve};
use stopmo_store::{KeyedLocks, SessionError, SessionId, SessionStore, StoreError};
use thiserror::Error;
use tokio::task::JoinHandle;
use ulid::Ulid;

use crate::encoder::{EncodeError, Encoder};

/// Fixed per-session output name; each build replaces it.
pub const LATEST_VIDEO_NAME: &str = "latest.mp4";

/// Errors that can occur while building a video.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("video encoder is not available")]
    EncoderUnavailable,

    #[error("no frames to build")]
    NoFrames,

    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("build task failed: {0}")]
    Task(String),
}

impl From<SessionError> for BuildError {
    fn from(e: SessionError) -> Self {
        BuildError::Store(StoreError::Session(e))
    }
}

/// A finished video.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoArtifact {
    pub session: String,
    pub locator: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub frames: usize,
    pub fps: f64,
    pub frame_duration: f64,
    pub built_at: DateTime<Utc>,
}

/// Builds one video per session from its ledger.
pub struct VideoAssembler {
    store: Arc<SessionStore>,
    encoder: Option<Arc<dyn Encoder>>,
    curve: RampCurve,
    work_dir: PathBuf,
    build_locks: KeyedLocks<tokio::sync::Mutex<()>>,
}

impl VideoAssembler {
    /// With no `encoder`, or one that reports itself unavailable, builds fail
    /// fast with `EncoderUnavailable`.
    pub fn new(store: Arc<SessionStore>, encoder: Option<Arc<dyn Encoder>>, curve: RampCurve) -> Self {
        Self {
            store,
            encoder,
            curve,
            work_dir: std::env::temp_dir(),
            build_locks: KeyedLocks::new(),
        }
    }

    /// Directory for edit scripts. Must not be one of the served roots.
    pub fn with_work_dir(mut self, work_dir: PathBuf) -> Self {
        self.work_dir = work_dir;
        self
    }

    /// Whether a build started now would find its encoder.
    pub fn has_encoder(&self) -> bool {
        self.encoder.as_ref().is_some_and(|e| e.available())
    }

    pub fn curve(&self) -> &RampCurve {
        &self.curve
    }

    /// Run a build as a background task. The build keeps going if the caller
    /// stops waiting; only the encoder timeout ends it early.
    pub fn spawn_build(self: &Arc<Self>, session: Option<String>) -> JoinHandle<Result<VideoArtifact, BuildError>> {
        let assembler = Arc::clone(self);
        tokio::spawn(async move { assembler.build(session.as_deref()).await })
    }

    /// Build the session's video and return where to fetch it.
    pub async fn build(&self, session: Option<&str>) -> Result<VideoArtifact, BuildError> {
        // Checked before any directory is created or file is read.
        let encoder = self
            .encoder
            .clone()
            .filter(|e| e.available())
            .ok_or(BuildError::EncoderUnavailable)?;
        let session_id = SessionId::parse(session)?;

        let lock = self.build_locks.get(session_id.as_str());
        let _build_guard = lock.lock().await;

        let store = Arc::clone(&self.store);
        let owned = session_id.as_str().to_string();
        let input = tokio::task::spawn_blocking(move || store.frames_for_build(Some(&owned)))
            .await
            .map_err(|e| BuildError::Task(e.to_string()))??;

        let count = NonZeroUsize::new(input.frames.len()).ok_or(BuildError::NoFrames)?;
        let fps = self.curve.fps(count);
        let frame_duration = self.curve.frame_duration(count);
        let script = EditScript::build(&input.frames, frame_duration).ok_or(BuildError::NoFrames)?;

        let video_dir = &input.paths.video_dir;
        tokio::fs::create_dir_all(video_dir).await?;

        let build_id = Ulid::new().to_string().to_lowercase();
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let script_file = TempFile::new(self.work_dir.join(format!("stopmo-list-{build_id}.txt")));
        tokio::fs::write(script_file.path(), script.render()).await?;
        let partial = TempFile::new(video_dir.join(format!(".build_{build_id}.mp4")));

        tracing::info!(
            session = %session_id,
            frames = count.get(),
            fps,
            frame_duration,
            "building video"
        );

        encoder
            .encode(script_file.path(), partial.path())
            .await
            .map_err(|e| {
                if e.is_missing_binary() {
                    tracing::warn!(session = %session_id, "encoder disappeared before the build ran");
                    BuildError::EncoderUnavailable
                } else {
                    BuildError::Encode(e)
                }
            })?;

        let final_path = video_dir.join(LATEST_VIDEO_NAME);
        remove_stale_videos(video_dir, partial.path()).await?;
        tokio::fs::rename(partial.path(), &final_path).await?;

        tracing::info!(session = %session_id, path = %final_path.display(), "video built");

        Ok(VideoArtifact {
            session: session_id.to_string(),
            locator: input.paths.video_locator(LATEST_VIDEO_NAME),
            path: final_path,
            frames: count.get(),
            fps,
            frame_duration,
            built_at: Utc::now(),
        })
    }
}

/// Deletes its file when dropped, whatever happened in between.
struct TempFile {
    path: PathBuf,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), "failed to remove temp file: {}", e),
        }
    }
}

/// Remove every `.mp4` in `dir` except `keep` and the current
/// `latest.mp4`, which the following rename replaces in place.
async fn remove_stale_videos(dir: &Path, keep: &Path) -> io::Result<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_mp4 = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("mp4"));
        let is_latest = entry.file_name() == LATEST_VIDEO_NAME;
        if is_mp4 && !is_latest && path != keep {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "removed stale video"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(())
}
