//! Trim-and-encode capability.
//!
//! A transcode runs on its own task and talks back through a [`TranscodeHandle`]:
//! any number of advisory progress updates followed by exactly one terminal
//! event. The terminal event travels over a oneshot channel, so a worker cannot
//! report twice, and a handle that is dropped or aborted tells the worker to
//! stop.

use async_trait::async_trait;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub mod ffmpeg;

pub use ffmpeg::FfmpegTranscoder;

/// How long `abort` waits for a worker to wind down before killing its task
const ABORT_GRACE: Duration = Duration::from_secs(5);

#[derive(thiserror::Error, Debug)]
pub enum TranscodeError {
    #[error("Failed to process audio. FFmpeg error: {reason}")]
    Failed { reason: String, exit_code: Option<i32> },

    #[error("Failed to process audio. Could not run transcoder: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to process audio. Transcoding timed out after {0:?}")]
    Timeout(Duration),

    #[error("Audio processing cancelled")]
    Cancelled,

    #[error("Failed to process audio. Transcoder stopped without reporting a result")]
    Aborted,
}

impl TranscodeError {
    pub fn failed(reason: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::Failed {
            reason: reason.into(),
            exit_code,
        }
    }
}

/// Encoder settings for the output clip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeOptions {
    /// Target bitrate, e.g. "192k"
    pub audio_bitrate: String,

    /// Drop any video stream (cover art, music videos)
    pub strip_video: bool,

    pub audio_codec: String,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            audio_bitrate: "192k".to_string(),
            strip_video: true,
            audio_codec: "libmp3lame".to_string(),
        }
    }
}

/// One trim-and-encode request
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub start_seconds: u64,
    pub duration_seconds: u64,
    pub options: TranscodeOptions,
}

/// Events observed on a [`TranscodeHandle`]
#[derive(Debug)]
pub enum TranscodeEvent {
    /// Advisory percentage in `0.0..=100.0`
    Progress(f64),
    Completed,
    Failed(TranscodeError),
}

/// Worker side: progress updates, cloneable
#[derive(Debug, Clone)]
pub struct ProgressSink(mpsc::UnboundedSender<f64>);

impl ProgressSink {
    pub fn report(&self, percent: f64) {
        let _ = self.0.send(percent.clamp(0.0, 100.0));
    }
}

/// Worker side: the single terminal event
#[derive(Debug)]
pub struct Completion(oneshot::Sender<Result<(), TranscodeError>>);

impl Completion {
    pub fn completed(self) {
        let _ = self.0.send(Ok(()));
    }

    pub fn failed(self, error: TranscodeError) {
        let _ = self.0.send(Err(error));
    }

    pub fn finish(self, result: Result<(), TranscodeError>) {
        let _ = self.0.send(result);
    }

    /// Resolves once nobody is listening for the result anymore
    pub async fn abandoned(&mut self) {
        self.0.closed().await
    }

    pub fn is_abandoned(&self) -> bool {
        self.0.is_closed()
    }
}

/// Everything a transcode worker uses to report back
#[derive(Debug)]
pub struct TranscodeReporter {
    pub progress: ProgressSink,
    pub completion: Completion,
}

/// Caller side of a running transcode
#[derive(Debug)]
pub struct TranscodeHandle {
    progress: mpsc::UnboundedReceiver<f64>,
    outcome: Option<oneshot::Receiver<Result<(), TranscodeError>>>,
    worker: Option<JoinHandle<()>>,
}

impl TranscodeHandle {
    /// Run `worker` on a new task and return the handle listening to it
    pub fn spawn<F, Fut>(worker: F) -> Self
    where
        F: FnOnce(TranscodeReporter) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let reporter = TranscodeReporter {
            progress: ProgressSink(progress_tx),
            completion: Completion(outcome_tx),
        };
        let task = tokio::spawn(worker(reporter));

        Self {
            progress: progress_rx,
            outcome: Some(outcome_rx),
            worker: Some(task),
        }
    }

    /// Next event, or `None` once the terminal event has been delivered
    pub async fn next_event(&mut self) -> Option<TranscodeEvent> {
        enum Next {
            Progress(f64),
            Terminal(Result<Result<(), TranscodeError>, oneshot::error::RecvError>),
        }

        let next = {
            let outcome = self.outcome.as_mut()?;
            tokio::select! {
                biased;
                Some(percent) = self.progress.recv() => Next::Progress(percent),
                result = outcome => Next::Terminal(result),
            }
        };

        match next {
            Next::Progress(percent) => Some(TranscodeEvent::Progress(percent)),
            Next::Terminal(result) => {
                self.outcome = None;
                self.progress.close();
                Some(match result {
                    Ok(Ok(())) => TranscodeEvent::Completed,
                    Ok(Err(e)) => TranscodeEvent::Failed(e),
                    Err(_) => TranscodeEvent::Failed(TranscodeError::Aborted),
                })
            }
        }
    }

    /// Wait for the terminal event, passing progress updates to `on_progress`
    pub async fn wait_with_progress<P>(&mut self, mut on_progress: P) -> Result<(), TranscodeError>
    where
        P: FnMut(f64),
    {
        while let Some(event) = self.next_event().await {
            match event {
                TranscodeEvent::Progress(percent) => on_progress(percent),
                TranscodeEvent::Completed => return Ok(()),
                TranscodeEvent::Failed(e) => return Err(e),
            }
        }
        Err(TranscodeError::Aborted)
    }

    /// Stop listening and wait for the worker to shut down its subprocess
    pub async fn abort(mut self) {
        self.outcome = None;
        self.progress.close();

        if let Some(mut worker) = self.worker.take() {
            if tokio::time::timeout(ABORT_GRACE, &mut worker).await.is_err() {
                tracing::warn!("Transcode worker ignored abort, killing task");
                worker.abort();
            }
        }
    }
}

/// Trims and re-encodes a local audio file
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaTranscoder: Send + Sync {
    /// Start transcoding `job`; fails only if the work could not be started
    async fn transcode(&self, job: TranscodeJob) -> Result<TranscodeHandle, TranscodeError>;

    /// Get the name of this transcoder
    fn name(&self) -> &'static str;
}
