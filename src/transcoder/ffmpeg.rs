use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use super::{MediaTranscoder, ProgressSink, TranscodeError, TranscodeHandle, TranscodeJob};

/// Diagnostic lines kept for error messages
const STDERR_TAIL: usize = 5;

/// Builder for FFmpeg command lines
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Arguments before -i
    input_args: Vec<String>,
    /// Arguments after -i
    output_args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    /// Build the command for a clip job
    pub fn for_job(job: &TranscodeJob) -> Self {
        let cmd = Self::new(&job.input, &job.output)
            .seek(job.start_seconds)
            .duration(job.duration_seconds);

        let cmd = if job.options.strip_video { cmd.no_video() } else { cmd };

        cmd.audio_codec(&job.options.audio_codec)
            .audio_bitrate(&job.options.audio_bitrate)
    }

    fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Seek before decoding
    pub fn seek(self, seconds: u64) -> Self {
        self.input_arg("-ss").input_arg(seconds.to_string())
    }

    pub fn duration(self, seconds: u64) -> Self {
        self.input_arg("-t").input_arg(seconds.to_string())
    }

    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-v".to_string(),
            "error".to_string(),
            // Machine-readable progress on stderr
            "-progress".to_string(),
            "pipe:2".to_string(),
            "-nostats".to_string(),
        ];

        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Progress state accumulated from `-progress` output
#[derive(Debug, Clone, Default)]
pub struct FfmpegProgress {
    /// Output time in milliseconds
    pub out_time_ms: u64,
    pub is_complete: bool,
}

impl FfmpegProgress {
    pub fn percentage(&self, total_duration_ms: u64) -> f64 {
        if total_duration_ms == 0 {
            return 0.0;
        }
        ((self.out_time_ms as f64 / total_duration_ms as f64) * 100.0).min(100.0)
    }
}

/// Outcome of feeding one stderr line to the parser
#[derive(Debug, PartialEq)]
enum StderrLine {
    /// A `progress=` line closed a progress block
    Block,
    /// Some other `key=value` progress field
    Field,
    /// Anything else is an FFmpeg diagnostic
    Diagnostic,
}

fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> StderrLine {
    let Some((key, value)) = line.trim().split_once('=') else {
        return StderrLine::Diagnostic;
    };

    match key {
        // ffmpeg reports out_time_ms in microseconds as well
        "out_time_ms" | "out_time_us" => {
            if let Ok(us) = value.parse::<u64>() {
                current.out_time_ms = us / 1000;
            }
            StderrLine::Field
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            StderrLine::Block
        }
        k if !k.is_empty() && k.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') => StderrLine::Field,
        _ => StderrLine::Diagnostic,
    }
}

/// Transcoder that shells out to ffmpeg
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::with_path("ffmpeg")
    }

    pub fn with_path(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream progress until ffmpeg closes stderr, then collect its exit status
async fn run_to_exit(
    child: &mut Child,
    stderr: ChildStderr,
    total_duration_ms: u64,
    progress: ProgressSink,
) -> Result<(), TranscodeError> {
    // Split on raw bytes; ffmpeg echoes file metadata that need not be UTF-8
    let mut segments = BufReader::new(stderr).split(b'\n');
    let mut state = FfmpegProgress::default();
    let mut diagnostics: Vec<String> = Vec::new();

    while let Some(segment) = segments.next_segment().await? {
        let line = String::from_utf8_lossy(&segment);
        let line = line.trim();
        match parse_progress_line(line, &mut state) {
            StderrLine::Block => progress.report(state.percentage(total_duration_ms)),
            StderrLine::Field => {}
            StderrLine::Diagnostic => {
                if !line.is_empty() {
                    if diagnostics.len() == STDERR_TAIL {
                        diagnostics.remove(0);
                    }
                    diagnostics.push(line.to_string());
                }
            }
        }
    }

    let status = child.wait().await?;
    if status.success() {
        return Ok(());
    }

    let reason = diagnostics
        .last()
        .cloned()
        .unwrap_or_else(|| format!("ffmpeg exited with {}", status));
    tracing::debug!("ffmpeg stderr tail: {:?}", diagnostics);

    Err(TranscodeError::failed(reason, status.code()))
}

#[async_trait]
impl MediaTranscoder for FfmpegTranscoder {
    async fn transcode(&self, job: TranscodeJob) -> Result<TranscodeHandle, TranscodeError> {
        let args = FfmpegCommand::for_job(&job).build_args();
        tracing::debug!("Running: {} {}", self.ffmpeg_path, args.join(" "));

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TranscodeError::failed("ffmpeg stderr was not captured", None))?;
        let total_duration_ms = job.duration_seconds.saturating_mul(1000);

        Ok(TranscodeHandle::spawn(move |reporter| async move {
            let mut completion = reporter.completion;

            let result = tokio::select! {
                result = run_to_exit(&mut child, stderr, total_duration_ms, reporter.progress) => Some(result),
                _ = completion.abandoned() => None,
            };

            match result {
                Some(result) => completion.finish(result),
                None => {
                    tracing::info!("Transcode abandoned, stopping ffmpeg");
                    if let Err(e) = child.kill().await {
                        tracing::warn!("Failed to kill ffmpeg: {}", e);
                    }
                }
            }
        }))
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}
