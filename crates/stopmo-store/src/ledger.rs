// ABOUTME: Ordered, durable record of a session's captured frames (the manifest ledger).
// ABOUTME: Writes are atomic (temp file, fsync, rename); corrupt ledgers recover to empty.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use stopmo_core::{FrameFormat, ManifestEntry};
use thiserror::Error;

/// Name of the ledger file kept inside each session's frame directory.
pub const LEDGER_FILE_NAME: &str = "frames.json";

/// Errors that can occur while mutating or persisting a ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How a ledger load went. `Recovered` means the file existed but could not
/// be used and was treated as empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerHealth {
    Missing,
    Loaded,
    Recovered { reason: String },
}

impl LedgerHealth {
    pub fn is_recovered(&self) -> bool {
        matches!(self, LedgerHealth::Recovered { .. })
    }
}

/// Result of reading a ledger file.
#[derive(Debug, Clone)]
pub struct LedgerLoad {
    pub entries: Vec<ManifestEntry>,
    pub health: LedgerHealth,
}

/// In-memory view of one session's ledger, bound to its frame directory.
///
/// Not synchronized on its own: callers serialize access per session (see
/// `SessionStore::with_ledger`).
#[derive(Debug)]
pub struct ManifestLedger {
    frame_dir: PathBuf,
    path: PathBuf,
    entries: Vec<ManifestEntry>,
}

impl ManifestLedger {
    /// Load the ledger at `path`, whose frames live in `frame_dir`.
    pub fn open(frame_dir: &Path, path: &Path) -> (Self, LedgerHealth) {
        let LedgerLoad { entries, health } = Self::load(path);
        if let LedgerHealth::Recovered { reason } = &health {
            tracing::warn!(
                ledger = %path.display(),
                recovered = true,
                "ledger unreadable, continuing as empty: {}",
                reason
            );
        }
        let ledger = Self {
            frame_dir: frame_dir.to_path_buf(),
            path: path.to_path_buf(),
            entries,
        };
        (ledger, health)
    }

    /// Read a ledger file. A missing file is empty; an unreadable or
    /// malformed one is empty and reported as `Recovered`. Never fails.
    pub fn load(path: &Path) -> LedgerLoad {
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return LedgerLoad {
                    entries: Vec::new(),
                    health: LedgerHealth::Missing,
                };
            }
            Err(e) => return recovered(format!("read failed: {e}")),
        };

        let entries: Vec<ManifestEntry> = match serde_json::from_str(&contents) {
            Ok(entries) => entries,
            Err(e) => return recovered(format!("malformed json: {e}")),
        };

        if let Some(bad) = entries.iter().find(|e| !is_plain_file_name(&e.file)) {
            return recovered(format!("entry {} has invalid file {:?}", bad.index, bad.file));
        }

        LedgerLoad {
            entries,
            health: LedgerHealth::Loaded,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_dir(&self) -> &Path {
        &self.frame_dir
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index the next appended entry will receive.
    pub fn next_index(&self) -> u64 {
        self.entries.last().map_or(1, |last| last.index + 1)
    }

    /// Append `file` at the next index and persist the whole sequence.
    pub fn append(&mut self, file: impl Into<String>) -> Result<ManifestEntry, LedgerError> {
        let entry = ManifestEntry::new(self.next_index(), file);
        self.entries.push(entry.clone());
        if let Err(e) = self.persist() {
            self.entries.pop();
            return Err(e);
        }
        Ok(entry)
    }

    /// Remove the most recent entry and its frame file. Returns `None` when
    /// there is nothing to undo. An empty ledger is reconciled from disk first
    /// so stray frames can still be undone.
    pub fn pop_last(&mut self) -> Result<Option<ManifestEntry>, LedgerError> {
        if self.entries.is_empty() {
            self.reconcile_from_disk()?;
        }
        let Some(last) = self.entries.pop() else {
            return Ok(None);
        };

        remove_if_exists(&self.frame_dir.join(&last.file))?;
        if let Err(e) = self.persist() {
            self.entries.push(last);
            return Err(e);
        }
        Ok(Some(last))
    }

    /// Empty the ledger and delete every file in the frame directory except
    /// the ledger itself. Returns the number of files removed.
    pub fn clear(&mut self) -> Result<usize, LedgerError> {
        let ledger_name = self.path.file_name();
        let mut removed = 0;

        if self.frame_dir.exists() {
            for entry in fs::read_dir(&self.frame_dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                if Some(entry.file_name().as_os_str()) == ledger_name {
                    continue;
                }
                if remove_if_exists(&entry.path())? {
                    removed += 1;
                }
            }
        }

        self.entries.clear();
        self.persist()?;
        Ok(removed)
    }

    /// Rebuild an empty ledger from frame files on disk, in file-name order
    /// with indices 1..n. Returns whether anything was rebuilt.
    pub fn reconcile_from_disk(&mut self) -> Result<bool, LedgerError> {
        if !self.entries.is_empty() {
            return Ok(false);
        }

        let names = frame_files_on_disk(&self.frame_dir)?;
        if names.is_empty() {
            return Ok(false);
        }

        self.entries = names
            .into_iter()
            .zip(1u64..)
            .map(|(file, index)| ManifestEntry::new(index, file))
            .collect();

        tracing::info!(
            frame_dir = %self.frame_dir.display(),
            frames = self.entries.len(),
            "rebuilt ledger from frame files on disk"
        );

        if let Err(e) = self.persist() {
            self.entries.clear();
            return Err(e);
        }
        Ok(true)
    }

    /// Frame paths, in ledger order, whose files still exist. Missing files
    /// are skipped.
    pub fn existing_frames(&self) -> Vec<PathBuf> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let path = self.frame_dir.join(&entry.file);
                if path.is_file() {
                    Some(path)
                } else {
                    tracing::debug!(index = entry.index, file = %entry.file, "frame file missing, skipping");
                    None
                }
            })
            .collect()
    }

    /// Write the ledger with temp file + fsync + atomic rename, so readers see
    /// either the old or the new contents and never a partial write.
    pub fn persist(&self) -> Result<(), LedgerError> {
        write_atomic(&self.path, &self.entries)
    }
}

fn recovered(reason: String) -> LedgerLoad {
    LedgerLoad {
        entries: Vec::new(),
        health: LedgerHealth::Recovered { reason },
    }
}

fn write_atomic(path: &Path, entries: &[ManifestEntry]) -> Result<(), LedgerError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let json = serde_json::to_vec(entries)?;
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);

    let mut file = File::create(&tmp_path)?;
    file.write_all(&json)?;
    file.flush()?;
    file.sync_all()?;
    drop(file);

    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    // Best-effort: make the rename itself durable.
    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }

    Ok(())
}

/// Sorted names of frame files directly inside `dir`.
fn frame_files_on_disk(dir: &Path) -> io::Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string()
            && FrameFormat::is_frame_name(&name)
        {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}
