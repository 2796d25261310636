// ABOUTME: Persistence layer for stopmo, owning every session's on-disk artifacts.
// ABOUTME: Provides session resolution, the atomic frame ledger, frame ingest, and keyed locks.

pub mod ingest;
pub mod ledger;
pub mod locks;
pub mod session;

pub use ingest::{AcceptedFrame, DEFAULT_MAX_FRAME_BYTES, FrameIngest, IngestError};
pub use ledger::{LEDGER_FILE_NAME, LedgerError, LedgerHealth, LedgerLoad, ManifestLedger};
pub use locks::KeyedLocks;
pub use session::{
    BuildInput, FRAMES_MOUNT, ResetSummary, SessionError, SessionId, SessionPaths, SessionStore,
    StoreError, VIDEOS_MOUNT,
};
