use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::{FetchError, MediaFetcher};
use crate::utils::{self, process, process::ProcessGroupGuard};

/// Audio fetcher backed by yt-dlp
pub struct YtDlpFetcher {
    yt_dlp_path: String,
}

impl YtDlpFetcher {
    pub fn new() -> Self {
        Self::with_path("yt-dlp")
    }

    pub fn with_path(yt_dlp_path: impl Into<String>) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
        }
    }

    /// Check if yt-dlp is available
    pub async fn check_availability(&self) -> bool {
        Command::new(&self.yt_dlp_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn build_args(url: &str, dest_prefix: &Path) -> Vec<String> {
        vec![
            url.to_string(),
            // Extract the best audio and convert it to MP3
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            "mp3".to_string(),
            "--audio-quality".to_string(),
            "0".to_string(),
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "--output".to_string(),
            format!("{}.%(ext)s", dest_prefix.display()),
            // Report where the post-processed file ended up
            "--print".to_string(),
            "after_move:filepath".to_string(),
        ]
    }

    /// Last path yt-dlp printed, or the conventional `<prefix>.mp3`
    fn resolve_output(stdout: &str, dest_prefix: &Path) -> PathBuf {
        stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("{}.mp3", dest_prefix.display())))
    }
}

/// Pick the most useful line out of yt-dlp's stderr
fn summarize_stderr(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

    lines
        .iter()
        .rev()
        .find(|line| line.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|line| line.trim_start_matches("ERROR:").trim().to_string())
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(&self, url: &str, dest_prefix: &Path) -> Result<PathBuf, FetchError> {
        let url = utils::validate_and_normalize_url(url)
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        tracing::debug!("Downloading audio for {} to {}.*", url, dest_prefix.display());

        let mut command = Command::new(&self.yt_dlp_path);
        command
            .args(Self::build_args(&url, dest_prefix))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // yt-dlp forks ffmpeg for the mp3 conversion; if this future is dropped
        // the guard takes the whole group down with it
        let child = process::spawn_in_new_group(&mut command)?;
        let mut group = ProcessGroupGuard::new(&child);
        let output = child.wait_with_output().await?;

        if !output.status.success() {
            group.kill();
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = summarize_stderr(&stderr)
                .unwrap_or_else(|| format!("yt-dlp exited with {}", output.status));
            return Err(FetchError::Failed(reason));
        }
        group.disarm();

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(Self::resolve_output(&stdout, dest_prefix))
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new()
    }
}
