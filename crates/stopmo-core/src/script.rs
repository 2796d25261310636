// ABOUTME: Edit script builder in the ffmpeg concat-demuxer list format.
// ABOUTME: Gives every frame a duration and repeats the final frame so it gets display time too.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// A single `file` directive, optionally followed by a `duration` directive.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptEntry {
    pub path: PathBuf,
    pub duration: Option<f64>,
}

/// Ordered list of frames with per-frame display time.
///
/// The concat demuxer applies a `duration` to the transition into the next
/// entry, so the last frame is listed a second time without a duration.
#[derive(Debug, Clone, PartialEq)]
pub struct EditScript {
    entries: Vec<ScriptEntry>,
}

impl EditScript {
    /// Build a script for `frames` in the given order. Returns `None` for an
    /// empty frame list.
    pub fn build<P: AsRef<Path>>(frames: &[P], frame_duration: f64) -> Option<Self> {
        let last = frames.last()?;
        let mut entries: Vec<ScriptEntry> = frames
            .iter()
            .map(|p| ScriptEntry {
                path: p.as_ref().to_path_buf(),
                duration: Some(frame_duration),
            })
            .collect();
        entries.push(ScriptEntry {
            path: last.as_ref().to_path_buf(),
            duration: None,
        });
        Some(Self { entries })
    }

    pub fn entries(&self) -> &[ScriptEntry] {
        &self.entries
    }

    /// Render to the text format read by `ffmpeg -f concat`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let _ = writeln!(out, "file '{}'", escape_path(&entry.path));
            if let Some(duration) = entry.duration {
                let _ = writeln!(out, "duration {:.6}", duration);
            }
        }
        out
    }
}

/// Quote a path for a single-quoted concat directive: `'` becomes `'\''`.
fn escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', r"'\''")
}
