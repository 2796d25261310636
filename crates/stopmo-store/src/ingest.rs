// ABOUTME: Frame ingest: validates an uploaded frame, writes it at the next index, and records it.
// ABOUTME: The load/compute-next/write/append sequence runs under the session's ledger lock.

use std::fs;
use std::io;
use std::sync::Arc;

use stopmo_core::{FrameFormat, frame_file_name};
use thiserror::Error;

use crate::session::{SessionStore, StoreError};

/// Default upload limit: 10 MiB.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 10 * 1024 * 1024;

/// Errors that can occur while accepting a frame.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("frame is empty")]
    Empty,

    #[error("frame is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("frame is not a JPEG or PNG image")]
    UnsupportedFormat,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Whether the upload itself was rejected (as opposed to a storage failure).
    pub fn is_validation(&self) -> bool {
        match self {
            IngestError::Empty | IngestError::TooLarge { .. } | IngestError::UnsupportedFormat => {
                true
            }
            IngestError::Store(StoreError::Session(crate::SessionError::InvalidId(_))) => true,
            IngestError::Store(_) => false,
        }
    }
}

impl From<io::Error> for IngestError {
    fn from(e: io::Error) -> Self {
        IngestError::Store(StoreError::Io(e))
    }
}

/// A frame that has been written and recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedFrame {
    pub index: u64,
    pub file: String,
    pub locator: String,
}

/// Accepts uploaded frames into session ledgers.
pub struct FrameIngest {
    store: Arc<SessionStore>,
    max_frame_bytes: usize,
}

impl FrameIngest {
    pub fn new(store: Arc<SessionStore>, max_frame_bytes: usize) -> Self {
        Self {
            store,
            max_frame_bytes,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Check an upload before any state is touched.
    pub fn validate(&self, bytes: &[u8]) -> Result<FrameFormat, IngestError> {
        if bytes.is_empty() {
            return Err(IngestError::Empty);
        }
        if bytes.len() > self.max_frame_bytes {
            return Err(IngestError::TooLarge {
                size: bytes.len(),
                limit: self.max_frame_bytes,
            });
        }
        FrameFormat::detect(bytes).ok_or(IngestError::UnsupportedFormat)
    }

    /// Store `bytes` as the next frame of `session` and return its index and
    /// locator.
    pub fn accept(&self, session: Option<&str>, bytes: &[u8]) -> Result<AcceptedFrame, IngestError> {
        let format = self.validate(bytes)?;

        self.store.with_ledger(session, |paths, ledger| {
            if ledger.is_empty() {
                ledger.reconcile_from_disk().map_err(StoreError::from)?;
            }

            let index = ledger.next_index();
            let file = frame_file_name(index, format);
            let frame_path = paths.frame_dir.join(&file);
            fs::write(&frame_path, bytes)?;

            if let Err(e) = ledger.append(file.clone()) {
                // Don't leave an orphan behind a failed ledger write.
                let _ = fs::remove_file(&frame_path);
                return Err(StoreError::from(e).into());
            }

            tracing::info!(session = %paths.session, index, file = %file, "frame accepted");

            Ok(AcceptedFrame {
                index,
                locator: paths.frame_locator(&file),
                file,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LEDGER_FILE_NAME, ManifestLedger};
    use std::path::Path;
    use std::thread;
    use stopmo_core::ManifestEntry;
    use tempfile::TempDir;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00];

    fn ingest_in(dir: &TempDir) -> FrameIngest {
        let store = SessionStore::new(dir.path().join("frames"), dir.path().join("videos")).unwrap();
        FrameIngest::new(Arc::new(store), DEFAULT_MAX_FRAME_BYTES)
    }

    fn frame_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|n| FrameFormat::is_frame_name(n))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn accept_assigns_index_and_locator() {
        let dir = TempDir::new().unwrap();
        let ingest = ingest_in(&dir);

        let first = ingest.accept(Some("kid1"), JPEG).unwrap();
        assert_eq!(first.index, 1);
        assert_eq!(first.file, "000001.jpg");
        assert_eq!(first.locator, "/media/frames/kid1/000001.jpg");

        let second = ingest.accept(Some("kid1"), PNG).unwrap();
        assert_eq!(second.index, 2);
        assert_eq!(second.file, "000002.png");

        let written = fs::read(dir.path().join("frames/kid1/000001.jpg")).unwrap();
        assert_eq!(written, JPEG);
    }

    #[test]
    fn rejects_invalid_uploads_without_state_change() {
        let dir = TempDir::new().unwrap();
        let ingest = FrameIngest::new(
            Arc::new(SessionStore::new(dir.path().join("frames"), dir.path().join("videos")).unwrap()),
            16,
        );

        assert!(matches!(ingest.accept(Some("kid1"), b""), Err(IngestError::Empty)));
        assert!(matches!(
            ingest.accept(Some("kid1"), b"GIF89a..."),
            Err(IngestError::UnsupportedFormat)
        ));
        let mut big = JPEG.to_vec();
        big.extend_from_slice(&[0u8; 32]);
        assert!(matches!(
            ingest.accept(Some("kid1"), &big),
            Err(IngestError::TooLarge { size: 42, limit: 16 })
        ));
        assert!(!dir.path().join("frames/kid1").exists());

        let err = ingest.accept(Some("../x"), JPEG).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn appends_then_undos_leave_contiguous_ledger() {
        for (n, m) in [(1, 0), (1, 1), (5, 2), (7, 7), (10, 3)] {
            let dir = TempDir::new().unwrap();
            let ingest = ingest_in(&dir);
            let store = ingest.store();

            for _ in 0..n {
                ingest.accept(Some("s"), JPEG).unwrap();
            }
            for _ in 0..m {
                assert!(store.undo(Some("s")).unwrap().is_some());
            }

            let paths = store.resolve(Some("s")).unwrap();
            let load = ManifestLedger::load(&paths.ledger_path);
            let indices: Vec<u64> = load.entries.iter().map(|e| e.index).collect();
            let expected: Vec<u64> = (1..=(n - m) as u64).collect();
            assert_eq!(indices, expected, "n={n} m={m}");
            assert_eq!(frame_files(&paths.frame_dir).len(), n - m, "n={n} m={m}");
        }
    }

    #[test]
    fn corrupt_ledger_never_aborts_append() {
        let dir = TempDir::new().unwrap();
        let ingest = ingest_in(&dir);
        let paths = ingest.store().resolve(Some("kid1")).unwrap();
        fs::write(&paths.ledger_path, "{{{ definitely not a ledger").unwrap();

        let accepted = ingest.accept(Some("kid1"), JPEG).unwrap();
        assert_eq!(accepted.index, 1);
        assert_eq!(ingest.store().ledger_recoveries(), 1);
    }

    #[test]
    fn kid1_upload_undo_reset_scenario() {
        let dir = TempDir::new().unwrap();
        let ingest = ingest_in(&dir);
        let store = ingest.store();

        for _ in 0..3 {
            ingest.accept(Some("kid1"), JPEG).unwrap();
        }
        let paths = store.resolve(Some("kid1")).unwrap();
        assert_eq!(
            ManifestLedger::load(&paths.ledger_path).entries,
            vec![
                ManifestEntry::new(1, "000001.jpg"),
                ManifestEntry::new(2, "000002.jpg"),
                ManifestEntry::new(3, "000003.jpg"),
            ]
        );

        let undone = store.undo(Some("kid1")).unwrap().unwrap();
        assert_eq!(undone.index, 3);
        assert!(!paths.frame_dir.join("000003.jpg").exists());
        assert_eq!(ManifestLedger::load(&paths.ledger_path).entries.len(), 2);

        store.reset(Some("kid1")).unwrap();
        assert!(ManifestLedger::load(&paths.ledger_path).entries.is_empty());
        assert!(paths.frame_dir.is_dir());
        let remaining: Vec<String> = fs::read_dir(&paths.frame_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(remaining, vec![LEDGER_FILE_NAME.to_string()]);
    }

    #[test]
    fn concurrent_ingest_into_one_session_never_reuses_an_index() {
        let dir = TempDir::new().unwrap();
        let ingest = Arc::new(ingest_in(&dir));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ingest = Arc::clone(&ingest);
                thread::spawn(move || {
                    (0..5)
                        .map(|_| ingest.accept(Some("shared"), JPEG).unwrap().index)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut indices: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        indices.sort();
        assert_eq!(indices, (1..=40).collect::<Vec<u64>>());

        let paths = ingest.store().resolve(Some("shared")).unwrap();
        assert_eq!(ManifestLedger::load(&paths.ledger_path).entries.len(), 40);
        assert_eq!(frame_files(&paths.frame_dir).len(), 40);
    }

    #[test]
    fn sessions_are_independent() {
        let dir = TempDir::new().unwrap();
        let ingest = ingest_in(&dir);

        assert_eq!(ingest.accept(Some("a"), JPEG).unwrap().index, 1);
        assert_eq!(ingest.accept(Some("b"), JPEG).unwrap().index, 1);
        assert_eq!(ingest.accept(Some("a"), JPEG).unwrap().index, 2);
        assert_eq!(ingest.accept(None, JPEG).unwrap().locator, "/media/frames/_default/000001.jpg");
    }
}
