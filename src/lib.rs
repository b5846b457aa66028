//! Nugget Clipper - cut MP3 clips out of online media
//!
//! This library turns a media URL plus a start/end timestamp into a trimmed MP3 file.
//! The clip pipeline drives an external fetcher (yt-dlp) and an external transcoder
//! (FFmpeg) over a per-run workspace and guarantees the workspace is cleaned up on
//! every exit path.

pub mod cli;
pub mod config;
pub mod fetcher;
pub mod pipeline;
pub mod server;
pub mod timerange;
pub mod transcoder;
pub mod utils;
pub mod workspace;

#[cfg(all(test, unix))]
mod test_support;

pub use cli::{Cli, Commands, LogFormat};
pub use config::Config;
pub use fetcher::{FetchError, MediaFetcher};
pub use pipeline::{ClipPipeline, ClipRequest, ClipResult, ClipRun, PipelineState};
pub use timerange::{RangeError, TimeRange, TimestampPolicy};
pub use transcoder::{MediaTranscoder, TranscodeError, TranscodeEvent, TranscodeHandle, TranscodeJob};
pub use workspace::{Workspace, WorkspaceManager};

/// Result type used by the binary and configuration layers
pub type Result<T> = anyhow::Result<T>;

/// Terminal errors of a single clip run
#[derive(thiserror::Error, Debug)]
pub enum ClipError {
    #[error("Failed to prepare workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    InvalidRange(#[from] RangeError),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),
}
