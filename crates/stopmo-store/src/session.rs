// ABOUTME: Session store: maps a session identifier to its frame dir, video dir, and ledger.
// ABOUTME: Validates identifiers, creates directories on demand, and serializes ledger mutation.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use stopmo_core::{DEFAULT_SESSION, ManifestEntry};
use thiserror::Error;

use crate::ledger::{LEDGER_FILE_NAME, LedgerError, ManifestLedger};
use crate::locks::KeyedLocks;

/// URL prefix under which frame directories are served.
pub const FRAMES_MOUNT: &str = "/media/frames";
/// URL prefix under which video directories are served.
pub const VIDEOS_MOUNT: &str = "/media/videos";

const MAX_SESSION_LEN: usize = 64;

/// Errors from resolving a session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session id {0:?}: use 1-64 letters, digits, '-', '_' or '.'")]
    InvalidId(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Errors from session-scoped ledger operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// A validated session identifier, safe to use as a single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Parse an optional identifier. Absent or empty maps to the default
    /// session; anything that could escape its directory is rejected.
    pub fn parse(raw: Option<&str>) -> Result<Self, SessionError> {
        let raw = match raw {
            None => return Ok(Self::default()),
            Some(s) if s.is_empty() => return Ok(Self::default()),
            Some(s) => s,
        };

        let valid_chars = raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid_chars || raw.len() > MAX_SESSION_LEN || raw == "." || raw == ".." {
            return Err(SessionError::InvalidId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self(DEFAULT_SESSION.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three artifacts owned by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub session: SessionId,
    pub frame_dir: PathBuf,
    pub video_dir: PathBuf,
    pub ledger_path: PathBuf,
}

impl SessionPaths {
    /// Public locator for a frame file of this session.
    pub fn frame_locator(&self, file: &str) -> String {
        format!("{}/{}/{}", FRAMES_MOUNT, self.session, file)
    }

    /// Public locator for a video file of this session.
    pub fn video_locator(&self, file: &str) -> String {
        format!("{}/{}/{}", VIDEOS_MOUNT, self.session, file)
    }
}

/// Outcome of a full session reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetSummary {
    pub frames_removed: usize,
    pub videos_removed: usize,
}

/// Frames ready for assembly, captured under the session lock.
#[derive(Debug, Clone)]
pub struct BuildInput {
    pub paths: SessionPaths,
    pub frames: Vec<PathBuf>,
}

/// Root of all session storage. One per process.
pub struct SessionStore {
    frames_root: PathBuf,
    videos_root: PathBuf,
    ledger_locks: KeyedLocks<Mutex<()>>,
    recoveries: AtomicU64,
}

impl SessionStore {
    /// Create a store rooted at the given directories, creating them if needed.
    ///
    /// Relative roots are anchored to the working directory here, so every
    /// path handed out later (including frame paths in edit scripts) is absolute.
    pub fn new(frames_root: PathBuf, videos_root: PathBuf) -> Result<Self, SessionError> {
        fs::create_dir_all(&frames_root)?;
        fs::create_dir_all(&videos_root)?;
        let frames_root = std::path::absolute(&frames_root)?;
        let videos_root = std::path::absolute(&videos_root)?;
        Ok(Self {
            frames_root,
            videos_root,
            ledger_locks: KeyedLocks::new(),
            recoveries: AtomicU64::new(0),
        })
    }

    pub fn frames_root(&self) -> &Path {
        &self.frames_root
    }

    pub fn videos_root(&self) -> &Path {
        &self.videos_root
    }

    /// Paths for a session without touching the filesystem.
    pub fn paths_for(&self, session: &SessionId) -> SessionPaths {
        let frame_dir = self.frames_root.join(session.as_str());
        let video_dir = self.videos_root.join(session.as_str());
        let ledger_path = frame_dir.join(LEDGER_FILE_NAME);
        SessionPaths {
            session: session.clone(),
            frame_dir,
            video_dir,
            ledger_path,
        }
    }

    /// Resolve a session to its artifacts, creating both directories.
    pub fn resolve(&self, session: Option<&str>) -> Result<SessionPaths, SessionError> {
        let id = SessionId::parse(session)?;
        let paths = self.paths_for(&id);
        fs::create_dir_all(&paths.frame_dir)?;
        fs::create_dir_all(&paths.video_dir)?;
        Ok(paths)
    }

    /// Number of corrupt ledgers recovered to empty since startup.
    pub fn ledger_recoveries(&self) -> u64 {
        self.recoveries.load(Ordering::Relaxed)
    }

    /// Run `f` against the session's ledger while holding the session's
    /// mutation lock. Other sessions are not blocked.
    pub fn with_ledger<T, E>(
        &self,
        session: Option<&str>,
        f: impl FnOnce(&SessionPaths, &mut ManifestLedger) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let paths = self.resolve(session).map_err(StoreError::from)?;
        let lock = self.ledger_locks.get(paths.session.as_str());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (mut ledger, health) = ManifestLedger::open(&paths.frame_dir, &paths.ledger_path);
        if health.is_recovered() {
            self.recoveries.fetch_add(1, Ordering::Relaxed);
        }
        f(&paths, &mut ledger)
    }

    /// Undo the most recent capture. `None` means there was nothing to undo.
    pub fn undo(&self, session: Option<&str>) -> Result<Option<ManifestEntry>, StoreError> {
        self.with_ledger(session, |paths, ledger| {
            let popped = ledger.pop_last()?;
            match &popped {
                Some(entry) => tracing::info!(session = %paths.session, index = entry.index, "undid frame"),
                None => tracing::debug!(session = %paths.session, "nothing to undo"),
            }
            Ok(popped)
        })
    }

    /// Remove every frame and video of the session and reset the ledger to
    /// empty. Both directories survive.
    pub fn reset(&self, session: Option<&str>) -> Result<ResetSummary, StoreError> {
        self.with_ledger(session, |paths, ledger| {
            let frames_removed = ledger.clear()?;
            let videos_removed = clear_files(&paths.video_dir)?;
            tracing::info!(
                session = %paths.session,
                frames_removed,
                videos_removed,
                "session reset"
            );
            Ok(ResetSummary {
                frames_removed,
                videos_removed,
            })
        })
    }

    /// Snapshot the frames to assemble: reconcile an empty ledger from disk,
    /// then keep only entries whose files exist.
    pub fn frames_for_build(&self, session: Option<&str>) -> Result<BuildInput, StoreError> {
        self.with_ledger(session, |paths, ledger| {
            if ledger.is_empty() {
                ledger.reconcile_from_disk()?;
            }
            Ok(BuildInput {
                paths: paths.clone(),
                frames: ledger.existing_frames(),
            })
        })
    }
}

fn clear_files(dir: &Path) -> io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(removed)
}
