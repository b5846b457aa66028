//! Clip production pipeline.
//!
//! One run walks `Idle -> WorkspaceAcquired -> Fetching -> Fetched ->
//! RangeValidated -> Transcoding -> Succeeded | Failed -> Released`. The
//! workspace is released exactly once on every path that acquired it, keeping
//! the final clip only when the run succeeded.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::config::Config;
use crate::fetcher::{FetchError, MediaFetcher, YtDlpFetcher};
use crate::timerange::{self, TimestampPolicy};
use crate::transcoder::{FfmpegTranscoder, MediaTranscoder, TranscodeError, TranscodeJob, TranscodeOptions};
use crate::utils;
use crate::workspace::{Workspace, WorkspaceManager};
use crate::ClipError;

pub mod state;

pub use state::PipelineState;
use state::StateTracker;

/// User input for one clip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipRequest {
    pub source_url: String,
    pub start_time: String,
    pub end_time: String,
}

impl ClipRequest {
    pub fn new(source_url: impl Into<String>, start_time: impl Into<String>, end_time: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            start_time: start_time.into(),
            end_time: end_time.into(),
        }
    }
}

/// Terminal outcome of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipResult {
    Success { download_url: String },
    Failure { message: String },
}

impl ClipResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ClipResult::Success { .. })
    }
}

/// Result of a run together with the states it went through
#[derive(Debug, Clone)]
pub struct ClipRun {
    pub result: ClipResult,
    pub history: Vec<PipelineState>,
    pub elapsed: Duration,
    /// Where the clip was written, on success
    pub output_path: Option<PathBuf>,
}

/// Knobs for a pipeline instance
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub timestamp_policy: TimestampPolicy,
    /// Check the time range before downloading instead of after
    pub validate_before_fetch: bool,
    pub fetch_timeout: Duration,
    pub transcode_timeout: Duration,
    pub transcode_options: TranscodeOptions,
    /// URL prefix clips are served under
    pub public_output_path: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timestamp_policy: config.pipeline.timestamp_policy,
            validate_before_fetch: config.pipeline.validate_before_fetch,
            fetch_timeout: config.pipeline.fetch_timeout(),
            transcode_timeout: config.pipeline.transcode_timeout(),
            transcode_options: TranscodeOptions {
                audio_bitrate: config.pipeline.audio_bitrate.clone(),
                ..TranscodeOptions::default()
            },
            public_output_path: config.server.public_output_path.clone(),
        }
    }

    pub fn download_url(&self, file_name: &str) -> String {
        format!("{}/{}", self.public_output_path.trim_end_matches('/'), file_name)
    }
}

/// Orchestrates workspace, fetcher and transcoder for clip requests
pub struct ClipPipeline {
    workspaces: WorkspaceManager,
    fetcher: Arc<dyn MediaFetcher>,
    transcoder: Arc<dyn MediaTranscoder>,
    settings: PipelineSettings,
    cancel: Option<watch::Receiver<bool>>,
}

impl ClipPipeline {
    pub fn new(
        workspaces: WorkspaceManager,
        fetcher: Arc<dyn MediaFetcher>,
        transcoder: Arc<dyn MediaTranscoder>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            workspaces,
            fetcher,
            transcoder,
            settings,
            cancel: None,
        }
    }

    /// Pipeline wired to yt-dlp and ffmpeg as configured
    pub fn from_config(config: &Config) -> Self {
        let fetcher = YtDlpFetcher::with_path(config.tools.yt_dlp_path.clone());
        let transcoder = FfmpegTranscoder::with_path(config.tools.ffmpeg_path.clone());
        tracing::debug!(
            "Clip pipeline using fetcher={} transcoder={}",
            fetcher.name(),
            transcoder.name()
        );

        Self::new(
            WorkspaceManager::from_config(&config.pipeline),
            Arc::new(fetcher),
            Arc::new(transcoder),
            PipelineSettings::from_config(config),
        )
    }

    /// Abort in-flight runs once `cancel` flips to `true`
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Produce one clip
    pub async fn produce_clip(&self, request: ClipRequest) -> ClipResult {
        self.run(request).await.result
    }

    /// Produce one clip and report the states the run went through
    pub async fn run(&self, request: ClipRequest) -> ClipRun {
        let started = Instant::now();
        let mut tracker = StateTracker::new();

        let outcome = match self.workspaces.acquire().await {
            Ok(mut workspace) => {
                tracker.enter(PipelineState::WorkspaceAcquired);

                let outcome = self
                    .drive(&request, &mut workspace, &mut tracker)
                    .await
                    .map(|()| {
                        (
                            self.settings.download_url(workspace.public_output_name()),
                            workspace.final_output_path().to_path_buf(),
                        )
                    });

                tracker.enter(if outcome.is_ok() {
                    PipelineState::Succeeded
                } else {
                    PipelineState::Failed
                });
                self.workspaces.release(&mut workspace, outcome.is_ok()).await;
                tracker.enter(PipelineState::Released);

                outcome
            }
            Err(e) => {
                tracker.enter(PipelineState::Failed);
                Err(ClipError::Workspace(e))
            }
        };

        let elapsed = started.elapsed();
        let mut output_path = None;
        let result = match outcome {
            Ok((download_url, path)) => {
                output_path = Some(path);
                tracing::info!(
                    "[Step 3/3] Clip ready at {} after {}",
                    download_url,
                    utils::format_duration(elapsed.as_secs_f64())
                );
                ClipResult::Success { download_url }
            }
            Err(e) => {
                tracing::error!("Error in processing pipeline: {}", e);
                ClipResult::Failure { message: e.to_string() }
            }
        };

        ClipRun {
            result,
            history: tracker.into_history(),
            elapsed,
            output_path,
        }
    }

    async fn drive(
        &self,
        request: &ClipRequest,
        workspace: &mut Workspace,
        tracker: &mut StateTracker,
    ) -> Result<(), ClipError> {
        if self.settings.validate_before_fetch {
            timerange::parse_range(&request.start_time, &request.end_time, self.settings.timestamp_policy)?;
        }

        tracker.enter(PipelineState::Fetching);
        tracing::info!(
            "[Step 1/3] Starting audio download from {}",
            utils::extract_domain(&request.source_url).unwrap_or_else(|| request.source_url.clone())
        );

        let fetched = self.fetch(&request.source_url, workspace.temp_input_path()).await?;
        workspace.record_fetched_input(&fetched);
        if !utils::is_regular_file(&fetched).await {
            return Err(FetchError::MissingArtifact(fetched).into());
        }

        tracker.enter(PipelineState::Fetched);
        tracing::info!("[Step 1/3] Download finished. File saved to: {}", fetched.display());

        let range = timerange::parse_range(&request.start_time, &request.end_time, self.settings.timestamp_policy)?;
        tracker.enter(PipelineState::RangeValidated);

        tracing::info!("[Step 2/3] Starting FFmpeg to cut audio {}", range);
        let job = TranscodeJob {
            input: fetched,
            output: workspace.final_output_path().to_path_buf(),
            start_seconds: range.start_seconds,
            duration_seconds: range.duration_seconds,
            options: self.settings.transcode_options.clone(),
        };

        tracker.enter(PipelineState::Transcoding);
        self.transcode(job).await?;

        let clip_size = verify_output(workspace.final_output_path()).await?;
        tracing::info!(
            "[Step 2/3] FFmpeg processing finished successfully ({})",
            utils::format_file_size(clip_size)
        );

        Ok(())
    }

    async fn fetch(&self, url: &str, dest_prefix: &Path) -> Result<PathBuf, FetchError> {
        let timeout = self.settings.fetch_timeout;
        let mut cancel = self.cancel.clone();

        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => Err(FetchError::Cancelled),
            result = tokio::time::timeout(timeout, self.fetcher.fetch(url, dest_prefix)) => {
                result.unwrap_or(Err(FetchError::Timeout(timeout)))
            }
        }
    }

    async fn transcode(&self, job: TranscodeJob) -> Result<(), TranscodeError> {
        let timeout = self.settings.transcode_timeout;
        let mut cancel = self.cancel.clone();
        let mut handle = self.transcoder.transcode(job).await?;

        let outcome = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => Err(TranscodeError::Cancelled),
            result = tokio::time::timeout(
                timeout,
                handle.wait_with_progress(|percent| {
                    tracing::debug!("[FFmpeg Progress] Processing: {}% done", percent.floor());
                }),
            ) => result.unwrap_or(Err(TranscodeError::Timeout(timeout))),
        };

        if matches!(outcome, Err(TranscodeError::Cancelled | TranscodeError::Timeout(_))) {
            handle.abort().await;
        }

        outcome
    }
}

/// Resolves when the cancel flag turns true; never resolves without one
async fn cancelled(cancel: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = cancel {
        let fired = rx.wait_for(|cancelled| *cancelled).await.is_ok();
        if fired {
            return;
        }
    }
    std::future::pending::<()>().await
}

/// A completed transcode must have left a file behind
async fn verify_output(path: &Path) -> Result<u64, TranscodeError> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Ok(metadata.len()),
        _ => Err(TranscodeError::failed(
            format!("output file {} was not produced", path.display()),
            None,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::MockMediaFetcher;
    use crate::transcoder::{MockMediaTranscoder, TranscodeHandle};
    use tempfile::TempDir;

    fn fetcher_writing_file() -> MockMediaFetcher {
        let mut fetcher = MockMediaFetcher::new();
        fetcher.expect_fetch().times(1).returning(|_, prefix| {
            let path = prefix.with_extension("mp3");
            std::fs::write(&path, b"source audio").unwrap();
            Ok(path)
        });
        fetcher
    }

    fn transcoder_writing_output() -> MockMediaTranscoder {
        let mut transcoder = MockMediaTranscoder::new();
        transcoder.expect_transcode().times(1).returning(|job| {
            Ok(TranscodeHandle::spawn(move |reporter| async move {
                reporter.progress.report(50.0);
                std::fs::write(&job.output, b"clip").unwrap();
                reporter.completion.completed();
            }))
        });
        transcoder
    }

    fn idle_transcoder() -> MockMediaTranscoder {
        let mut transcoder = MockMediaTranscoder::new();
        transcoder.expect_transcode().never();
        transcoder
    }

    fn pipeline(root: &TempDir, fetcher: MockMediaFetcher, transcoder: MockMediaTranscoder) -> ClipPipeline {
        ClipPipeline::new(
            WorkspaceManager::new(root.path().join("output"), root.path().join("tmp")),
            Arc::new(fetcher),
            Arc::new(transcoder),
            PipelineSettings::default(),
        )
    }

    fn files_in(dir: &Path) -> Vec<PathBuf> {
        match std::fs::read_dir(dir) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_successful_run_walks_every_state() {
        let root = TempDir::new().unwrap();
        let pipeline = pipeline(&root, fetcher_writing_file(), transcoder_writing_output());

        let run = pipeline.run(ClipRequest::new("https://youtu.be/abc", "00:10", "00:40")).await;

        assert_eq!(
            run.history,
            vec![
                PipelineState::Idle,
                PipelineState::WorkspaceAcquired,
                PipelineState::Fetching,
                PipelineState::Fetched,
                PipelineState::RangeValidated,
                PipelineState::Transcoding,
                PipelineState::Succeeded,
                PipelineState::Released,
            ]
        );

        let ClipResult::Success { download_url } = run.result else {
            panic!("expected success, got {:?}", run.result);
        };
        let name = download_url.strip_prefix("/output/").unwrap();
        let output_path = root.path().join("output").join(name);
        assert!(output_path.is_file());
        assert_eq!(run.output_path, Some(output_path));
        assert!(files_in(&root.path().join("tmp")).is_empty());
    }

    #[tokio::test]
    async fn test_transcode_job_carries_range_and_options() {
        let root = TempDir::new().unwrap();
        let mut transcoder = MockMediaTranscoder::new();
        transcoder
            .expect_transcode()
            .withf(|job| {
                job.start_seconds == 90
                    && job.duration_seconds == 3633
                    && job.options.audio_bitrate == "192k"
                    && job.options.strip_video
                    && job.input.extension().is_some_and(|ext| ext == "mp3")
            })
            .times(1)
            .returning(|job| {
                Ok(TranscodeHandle::spawn(move |reporter| async move {
                    std::fs::write(&job.output, b"clip").unwrap();
                    reporter.completion.completed();
                }))
            });
        let pipeline = pipeline(&root, fetcher_writing_file(), transcoder);

        let result = pipeline.produce_clip(ClipRequest::new("https://youtu.be/abc", "01:30", "1:02:03")).await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_fetch_failure_reports_reason_and_leaves_nothing() {
        let root = TempDir::new().unwrap();
        let mut fetcher = MockMediaFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_, _| Err(FetchError::Failed("Video unavailable".to_string())));
        let pipeline = pipeline(&root, fetcher, idle_transcoder());

        let run = pipeline.run(ClipRequest::new("https://youtu.be/gone", "0", "10")).await;

        let ClipResult::Failure { message } = run.result else {
            panic!("expected failure");
        };
        assert!(message.contains("Video unavailable"));
        assert_eq!(run.history.last(), Some(&PipelineState::Released));
        assert!(run.history.contains(&PipelineState::Failed));
        assert!(files_in(&root.path().join("output")).is_empty());
    }

    #[tokio::test]
    async fn test_fetch_without_file_fails_verification() {
        let root = TempDir::new().unwrap();
        let mut fetcher = MockMediaFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_, prefix| Ok(prefix.with_extension("mp3")));
        let pipeline = pipeline(&root, fetcher, idle_transcoder());

        let result = pipeline.produce_clip(ClipRequest::new("https://youtu.be/abc", "0", "10")).await;

        assert_eq!(
            result,
            ClipResult::Failure {
                message: "Audio download failed, temporary MP3 file not found.".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_invalid_range_fails_after_fetch_and_cleans_up() {
        let root = TempDir::new().unwrap();
        let pipeline = pipeline(&root, fetcher_writing_file(), idle_transcoder());

        let run = pipeline.run(ClipRequest::new("https://youtu.be/abc", "01:30", "01:00")).await;

        assert_eq!(
            run.result,
            ClipResult::Failure {
                message: "End time must be after start time.".to_string()
            }
        );
        assert!(run.history.contains(&PipelineState::Fetched));
        assert!(!run.history.contains(&PipelineState::RangeValidated));
        assert!(files_in(&root.path().join("tmp")).is_empty());
    }

    #[tokio::test]
    async fn test_validate_before_fetch_skips_download() {
        let root = TempDir::new().unwrap();
        let mut fetcher = MockMediaFetcher::new();
        fetcher.expect_fetch().never();
        let mut pipeline = pipeline(&root, fetcher, idle_transcoder());
        pipeline.settings.validate_before_fetch = true;

        let run = pipeline.run(ClipRequest::new("https://youtu.be/abc", "50", "40")).await;

        assert!(!run.result.is_success());
        assert!(!run.history.contains(&PipelineState::Fetching));
        assert_eq!(run.history.last(), Some(&PipelineState::Released));
    }

    #[tokio::test]
    async fn test_transcode_failure_removes_input_and_partial_output() {
        let root = TempDir::new().unwrap();
        let mut transcoder = MockMediaTranscoder::new();
        transcoder.expect_transcode().times(1).returning(|job| {
            Ok(TranscodeHandle::spawn(move |reporter| async move {
                std::fs::write(&job.output, b"half a cl").unwrap();
                reporter
                    .completion
                    .failed(TranscodeError::failed("Conversion failed!", Some(1)));
            }))
        });
        let pipeline = pipeline(&root, fetcher_writing_file(), transcoder);

        let result = pipeline.produce_clip(ClipRequest::new("https://youtu.be/abc", "0", "10")).await;

        assert_eq!(
            result,
            ClipResult::Failure {
                message: "Failed to process audio. FFmpeg error: Conversion failed!".to_string()
            }
        );
        assert!(files_in(&root.path().join("tmp")).is_empty());
        assert!(files_in(&root.path().join("output")).is_empty());
    }

    #[tokio::test]
    async fn test_completed_without_output_is_a_failure() {
        let root = TempDir::new().unwrap();
        let mut transcoder = MockMediaTranscoder::new();
        transcoder.expect_transcode().times(1).returning(|_| {
            Ok(TranscodeHandle::spawn(|reporter| async move {
                reporter.completion.completed();
            }))
        });
        let pipeline = pipeline(&root, fetcher_writing_file(), transcoder);

        let run = pipeline.run(ClipRequest::new("https://youtu.be/abc", "0", "10")).await;

        assert!(!run.result.is_success());
        assert!(run.history.contains(&PipelineState::Failed));
    }

    #[tokio::test]
    async fn test_workspace_error_is_terminal_without_release() {
        let root = TempDir::new().unwrap();
        let blocker = root.path().join("output");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let mut fetcher = MockMediaFetcher::new();
        fetcher.expect_fetch().never();
        let pipeline = pipeline(&root, fetcher, idle_transcoder());

        let run = pipeline.run(ClipRequest::new("https://youtu.be/abc", "0", "10")).await;

        assert_eq!(run.history, vec![PipelineState::Idle, PipelineState::Failed]);
        let ClipResult::Failure { message } = run.result else {
            panic!("expected failure");
        };
        assert!(message.starts_with("Failed to prepare workspace"));
    }

    #[test]
    fn test_download_url() {
        let mut settings = PipelineSettings::default();
        assert_eq!(settings.download_url("a.mp3"), "/output/a.mp3");

        settings.public_output_path = "/clips/".to_string();
        assert_eq!(settings.download_url("a.mp3"), "/clips/a.mp3");
    }
}
