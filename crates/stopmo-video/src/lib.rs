// ABOUTME: Video assembly for stopmo: turns a session ledger into one encoded video.
// ABOUTME: Provides the encoder seam (trait + ffmpeg process driver) and the assembler.

pub mod assembler;
pub mod encoder;

pub use assembler::{BuildError, LATEST_VIDEO_NAME, VideoArtifact, VideoAssembler};
pub use encoder::{
    DEFAULT_ENCODE_TIMEOUT, EncodeError, Encoder, FfmpegEncoder, STDERR_EXCERPT_LIMIT,
    discover_encoder,
};
