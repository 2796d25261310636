// ABOUTME: External encoder seam: discovery of the ffmpeg binary and the subprocess contract.
// ABOUTME: Fixed non-interactive flags, bounded timeout with forced kill, bounded stderr excerpt.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

/// Default wall-clock limit for one encode.
pub const DEFAULT_ENCODE_TIMEOUT: Duration = Duration::from_secs(300);

/// Maximum number of diagnostic bytes attached to a failure.
pub const STDERR_EXCERPT_LIMIT: usize = 4000;

/// Errors from running the encoder.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to run encoder {}: {source}", .binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("encoder exited with {}", describe_status(.status))]
    Failed { status: Option<i32>, stderr: String },

    #[error("encoder did not finish within {}s and was killed", .after.as_secs())]
    TimedOut { after: Duration },
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

impl EncodeError {
    /// Diagnostic excerpt to show the caller, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            EncodeError::Failed { stderr, .. } if !stderr.is_empty() => Some(stderr),
            _ => None,
        }
    }

    /// True when the binary itself could not be found.
    pub fn is_missing_binary(&self) -> bool {
        matches!(self, EncodeError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Something that turns an edit script into a video file.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Whether a build can run right now. Checked before any file work.
    fn available(&self) -> bool {
        true
    }

    /// Encode the frames listed in `script` into `output`, replacing it.
    async fn encode(&self, script: &Path, output: &Path) -> Result<(), EncodeError>;
}

/// Drives an `ffmpeg` binary through the concat demuxer.
///
/// The binary is located again on every call, so one installed (or removed)
/// while the server runs is noticed by the next build.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    explicit: Option<PathBuf>,
    timeout: Duration,
}

impl FfmpegEncoder {
    /// Run exactly `binary`.
    pub fn new(binary: PathBuf, timeout: Duration) -> Self {
        Self::lookup(Some(binary), timeout)
    }

    /// Run `explicit` if given, otherwise whatever `ffmpeg` is on `PATH`.
    pub fn lookup(explicit: Option<PathBuf>, timeout: Duration) -> Self {
        Self { explicit, timeout }
    }

    /// The binary a build would run now.
    pub fn locate(&self) -> Option<PathBuf> {
        discover_encoder(self.explicit.as_deref())
    }

    fn missing(&self) -> EncodeError {
        EncodeError::Spawn {
            binary: self
                .explicit
                .clone()
                .unwrap_or_else(|| PathBuf::from("ffmpeg")),
            source: io::ErrorKind::NotFound.into(),
        }
    }

    /// Full argument list for one run. Forces yuv420p and variable frame
    /// timing so per-frame durations from the script are honored.
    pub fn args(script: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-loglevel", "error", "-y", "-nostdin", "-f", "concat", "-safe", "0", "-i",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(script.as_os_str().to_os_string());
        args.extend(
            ["-vsync", "vfr", "-pix_fmt", "yuv420p"]
                .iter()
                .map(OsString::from),
        );
        args.push(output.as_os_str().to_os_string());
        args
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    fn available(&self) -> bool {
        self.locate().is_some()
    }

    async fn encode(&self, script: &Path, output: &Path) -> Result<(), EncodeError> {
        let binary = self.locate().ok_or_else(|| self.missing())?;
        let child = Command::new(&binary)
            .args(Self::args(script, output))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future on timeout kills the process.
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EncodeError::Spawn {
                binary: binary.clone(),
                source,
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| EncodeError::Spawn {
                binary: binary.clone(),
                source,
            })?,
            Err(_) => {
                tracing::error!(
                    binary = %binary.display(),
                    timeout_secs = self.timeout.as_secs(),
                    "encoder timed out, killed"
                );
                return Err(EncodeError::TimedOut {
                    after: self.timeout,
                });
            }
        };

        if output.status.success() {
            return Ok(());
        }

        let stderr = excerpt(&output.stderr, STDERR_EXCERPT_LIMIT);
        tracing::error!(status = ?output.status.code(), "encoder failed: {}", stderr.trim());
        Err(EncodeError::Failed {
            status: output.status.code(),
            stderr,
        })
    }
}

/// First `limit` bytes of `bytes` as text, cut on a character boundary.
pub fn excerpt(bytes: &[u8], limit: usize) -> String {
    let text = String::from_utf8_lossy(&bytes[..bytes.len().min(limit)]);
    // A cut through a multi-byte character shows up as a trailing U+FFFD.
    let text = text.trim_end_matches('\u{FFFD}');
    let mut out = text.to_string();
    while out.len() > limit {
        out.pop();
    }
    out
}

/// Find the encoder: an explicit path wins, otherwise search `PATH` for
/// `ffmpeg`.
pub fn discover_encoder(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return is_executable(path).then(|| path.to_path_buf());
    }
    search_path("ffmpeg", std::env::var_os("PATH"))
}

fn search_path(name: &str, path_var: Option<OsString>) -> Option<PathBuf> {
    let path_var = path_var?;
    std::env::split_paths(&path_var)
        .flat_map(|dir| candidates(&dir, name))
        .find(|candidate| is_executable(candidate))
}

fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    let mut out = vec![dir.join(name)];
    if cfg!(windows) {
        out.push(dir.join(format!("{name}.exe")));
    }
    out
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
