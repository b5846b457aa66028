use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod ytdlp;

pub use ytdlp::YtDlpFetcher;

/// Reasons a download can fail
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("Invalid source URL: {0}")]
    InvalidUrl(String),

    #[error("Audio download failed: {0}")]
    Failed(String),

    #[error("Audio download failed, temporary MP3 file not found.")]
    MissingArtifact(PathBuf),

    #[error("Failed to run downloader: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audio download timed out after {0:?}")]
    Timeout(Duration),

    #[error("Audio download cancelled")]
    Cancelled,
}

/// Retrieves the audio track of a remote media URL onto local disk
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download the best available audio for `url`.
    ///
    /// `dest_prefix` is a path without extension; implementations may append one.
    /// Returns the path the audio was actually written to.
    async fn fetch(&self, url: &str, dest_prefix: &Path) -> Result<PathBuf, FetchError>;

    /// Get the name of this fetcher
    fn name(&self) -> &'static str;
}
