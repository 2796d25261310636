// ABOUTME: Ledger entry and frame file naming types for a capture session.
// ABOUTME: Frame names are zero-padded so lexicographic and capture order coincide.

use serde::{Deserialize, Serialize};

/// Session name used when a request does not carry one.
pub const DEFAULT_SESSION: &str = "_default";

/// Width of the zero-padded index in frame file names.
const INDEX_WIDTH: usize = 6;

/// One captured frame in a session's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// 1-based capture position, dense and strictly increasing.
    pub index: u64,
    /// File name of the frame inside the session's frame directory.
    pub file: String,
}

impl ManifestEntry {
    pub fn new(index: u64, file: impl Into<String>) -> Self {
        Self {
            index,
            file: file.into(),
        }
    }
}

/// Image formats accepted as frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Jpeg,
    Png,
}

impl FrameFormat {
    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    /// Sniff the format from the leading bytes of an upload.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(&Self::PNG_SIGNATURE) {
            Some(Self::Png)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    /// Whether a file name on disk looks like a frame (by extension).
    pub fn is_frame_name(name: &str) -> bool {
        let Some((stem, ext)) = name.rsplit_once('.') else {
            return false;
        };
        if stem.is_empty() || stem.starts_with('.') {
            return false;
        }
        matches!(
            ext.to_ascii_lowercase().as_str(),
            "jpg" | "jpeg" | "png"
        )
    }
}

/// Build the on-disk name for the frame at `index`, e.g. `000042.jpg`.
pub fn frame_file_name(index: u64, format: FrameFormat) -> String {
    format!("{:0width$}.{}", index, format.extension(), width = INDEX_WIDTH)
}
