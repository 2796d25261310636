// ABOUTME: Command sources producing a cancellable stream of raw button tokens.
// ABOUTME: A device source reads newline-delimited tokens; the keyboard source maps c/p/r and stops on q.

use std::fs::File;
use std::future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use futures::{Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_util::sync::CancellationToken;

/// Lazy, possibly endless sequence of raw tokens.
pub type TokenStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Something that produces button tokens until it runs dry or is cancelled.
pub trait CommandSource: Send {
    /// Short label for logs.
    fn name(&self) -> String;

    /// Start producing tokens. The stream ends when `cancel` fires.
    fn tokens(self: Box<Self>, cancel: CancellationToken) -> TokenStream;
}

/// Newline-delimited tokens read from a character device such as a serial tty.
pub struct DeviceSource {
    path: PathBuf,
    file: tokio::fs::File,
}

impl DeviceSource {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: tokio::fs::File::from_std(file),
        })
    }
}

impl CommandSource for DeviceSource {
    fn name(&self) -> String {
        format!("device {}", self.path.display())
    }

    fn tokens(self: Box<Self>, cancel: CancellationToken) -> TokenStream {
        line_tokens(self.file, cancel)
    }
}

/// Interactive source: `c`, `p` and `r` mean capture, play and reset; `q` quits.
pub struct KeyboardSource {
    reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl KeyboardSource {
    /// Read from the process's standard input.
    pub fn stdin() -> Self {
        Self::from_reader(tokio::io::stdin())
    }

    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            reader: Box::new(reader),
        }
    }
}

impl CommandSource for KeyboardSource {
    fn name(&self) -> String {
        "keyboard".to_string()
    }

    fn tokens(self: Box<Self>, cancel: CancellationToken) -> TokenStream {
        let stream = line_tokens(self.reader, cancel)
            .take_while(|key| future::ready(!key.eq_ignore_ascii_case("q")))
            .map(|key| match key.to_ascii_lowercase().as_str() {
                "c" => "capture".to_string(),
                "p" => "play".to_string(),
                "r" => "reset".to_string(),
                _ => key,
            });
        Box::pin(stream)
    }
}

/// Pick the device when it can be opened, otherwise fall back to the keyboard.
pub fn probe(device: Option<&Path>) -> Box<dyn CommandSource> {
    if let Some(path) = device {
        match DeviceSource::open(path) {
            Ok(source) => {
                tracing::info!(device = %path.display(), "reading buttons from device");
                return Box::new(source);
            }
            Err(e) => {
                tracing::warn!(device = %path.display(), "device unavailable, using keyboard: {}", e);
            }
        }
    }
    tracing::info!("reading buttons from keyboard (c=capture, p=play, r=reset, q=quit)");
    Box::new(KeyboardSource::stdin())
}

/// Trimmed, non-empty lines from `reader` until EOF, a read error, or cancellation.
fn line_tokens<R>(reader: R, cancel: CancellationToken) -> TokenStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let stream = LinesStream::new(BufReader::new(reader).lines())
        .take_while(|line| {
            future::ready(match line {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!("input read failed, stopping: {}", e);
                    false
                }
            })
        })
        .filter_map(|line| {
            future::ready(
                line.ok()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty()),
            )
        })
        .take_until(cancel.cancelled_owned());
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    async fn collect(source: Box<dyn CommandSource>) -> Vec<String> {
        source.tokens(CancellationToken::new()).collect().await
    }

    #[tokio::test]
    async fn device_lines_become_tokens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tty");
        std::fs::write(&path, "BTN_A\r\n\n  BTN_B \nBTN_C\n").unwrap();

        let source = probe(Some(&path));
        assert!(source.name().starts_with("device"));
        assert_eq!(collect(source).await, vec!["BTN_A", "BTN_B", "BTN_C"]);
    }

    #[tokio::test]
    async fn probe_falls_back_to_keyboard() {
        let dir = TempDir::new().unwrap();
        assert_eq!(probe(Some(&dir.path().join("missing"))).name(), "keyboard");
        assert_eq!(probe(None).name(), "keyboard");
    }

    #[tokio::test]
    async fn keyboard_maps_keys_and_stops_on_q() {
        let input = Cursor::new(b"c\nP\nx\nr\nq\nc\n".to_vec());
        let source = Box::new(KeyboardSource::from_reader(input));
        assert_eq!(collect(source).await, vec!["capture", "play", "x", "reset"]);
    }

    #[tokio::test]
    async fn cancellation_ends_an_idle_stream() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();
        let mut tokens = Box::new(KeyboardSource::from_reader(reader)).tokens(cancel.clone());

        writer.write_all(b"c\n").await.unwrap();
        assert_eq!(tokens.next().await.as_deref(), Some("capture"));

        // Writer stays open; only cancellation can end the stream now.
        cancel.cancel();
        let next = tokio::time::timeout(Duration::from_secs(5), tokens.next())
            .await
            .expect("stream should end after cancel");
        assert_eq!(next, None);
        drop(writer);
    }
}
