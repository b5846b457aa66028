//! Stand-ins for yt-dlp and ffmpeg used by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nugget_clipper::fetcher::{FetchError, MediaFetcher};
use nugget_clipper::pipeline::{ClipPipeline, PipelineSettings};
use nugget_clipper::transcoder::{MediaTranscoder, TranscodeError, TranscodeHandle, TranscodeJob};
use nugget_clipper::workspace::WorkspaceManager;

/// Writes a small fake MP3 next to the requested prefix
pub struct FileFetcher {
    pub delay: Duration,
}

impl FileFetcher {
    pub fn instant() -> Self {
        Self { delay: Duration::ZERO }
    }

    pub fn slow(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl MediaFetcher for FileFetcher {
    async fn fetch(&self, _url: &str, dest_prefix: &Path) -> Result<PathBuf, FetchError> {
        let path = dest_prefix.with_extension("mp3");
        tokio::fs::write(&path, b"ID3 fake audio").await?;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(path)
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// Like [`FileFetcher`], remembering which prefix each URL was given
#[derive(Clone, Default)]
pub struct RecordingFetcher {
    pub delay: Duration,
    pub calls: Arc<Mutex<Vec<(String, PathBuf)>>>,
}

impl RecordingFetcher {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<(String, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaFetcher for RecordingFetcher {
    async fn fetch(&self, url: &str, dest_prefix: &Path) -> Result<PathBuf, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), dest_prefix.to_path_buf()));

        let path = dest_prefix.with_extension("mp3");
        tokio::fs::write(&path, url.as_bytes()).await?;
        tokio::time::sleep(self.delay).await;

        // Still ours after the other runs had their turn
        let content = tokio::fs::read(&path).await?;
        if content != url.as_bytes() {
            return Err(FetchError::Failed(format!("{} was overwritten", path.display())));
        }
        Ok(path)
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Always fails like yt-dlp on an unavailable video
pub struct FailingFetcher;

#[async_trait]
impl MediaFetcher for FailingFetcher {
    async fn fetch(&self, _url: &str, _dest_prefix: &Path) -> Result<PathBuf, FetchError> {
        Err(FetchError::Failed("ERROR: Video unavailable".to_string()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Copies the input to the output after an optional delay.
///
/// A slow worker watches for abandonment and records that it stopped early.
pub struct CopyTranscoder {
    pub delay: Duration,
    pub stopped_early: Arc<AtomicBool>,
}

impl CopyTranscoder {
    pub fn instant() -> Self {
        Self::slow(Duration::ZERO)
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            stopped_early: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl MediaTranscoder for CopyTranscoder {
    async fn transcode(&self, job: TranscodeJob) -> Result<TranscodeHandle, TranscodeError> {
        let delay = self.delay;
        let stopped_early = Arc::clone(&self.stopped_early);

        Ok(TranscodeHandle::spawn(move |reporter| async move {
            let mut completion = reporter.completion;
            reporter.progress.report(50.0);

            tokio::select! {
                _ = completion.abandoned() => {
                    stopped_early.store(true, Ordering::SeqCst);
                }
                _ = tokio::time::sleep(delay) => {
                    let result = tokio::fs::copy(&job.input, &job.output)
                        .await
                        .map(|_| ())
                        .map_err(TranscodeError::from);
                    completion.finish(result);
                }
            }
        }))
    }

    fn name(&self) -> &'static str {
        "copy"
    }
}

/// Fails like ffmpeg on a corrupt input, after leaving a partial output behind
pub struct FailingTranscoder;

#[async_trait]
impl MediaTranscoder for FailingTranscoder {
    async fn transcode(&self, job: TranscodeJob) -> Result<TranscodeHandle, TranscodeError> {
        Ok(TranscodeHandle::spawn(move |reporter| async move {
            let _ = tokio::fs::write(&job.output, b"partial").await;
            reporter
                .completion
                .failed(TranscodeError::failed("Invalid data found when processing input", Some(1)));
        }))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Output and temp directories living under one scratch dir
pub struct Dirs {
    pub root: tempfile::TempDir,
}

impl Dirs {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("create scratch dir"),
        }
    }

    pub fn output(&self) -> PathBuf {
        self.root.path().join("output")
    }

    pub fn temp(&self) -> PathBuf {
        self.root.path().join("tmp")
    }

    pub fn workspaces(&self) -> WorkspaceManager {
        WorkspaceManager::new(self.output(), self.temp())
    }

    pub fn pipeline(
        &self,
        fetcher: impl MediaFetcher + 'static,
        transcoder: impl MediaTranscoder + 'static,
        settings: PipelineSettings,
    ) -> ClipPipeline {
        ClipPipeline::new(self.workspaces(), Arc::new(fetcher), Arc::new(transcoder), settings)
    }

    /// File names currently in `dir`, missing dir counts as empty
    pub fn entries(dir: &Path) -> Vec<String> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}
