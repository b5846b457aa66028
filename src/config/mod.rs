use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::timerange::TimestampPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Clip pipeline settings
    pub pipeline: PipelineConfig,

    /// External tool locations
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Directory with the static front-end
    pub public_dir: PathBuf,

    /// URL prefix under which finished clips are served
    pub public_output_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Where finished clips are written
    pub output_dir: PathBuf,

    /// Where downloads land before trimming (system temp dir if unset)
    pub temp_dir: Option<PathBuf>,

    /// Target MP3 bitrate, e.g. "192k"
    pub audio_bitrate: String,

    /// Upper bound on the download step
    pub fetch_timeout_secs: u64,

    /// Upper bound on the trim/encode step
    pub transcode_timeout_secs: u64,

    /// How malformed start/end timestamps are handled
    pub timestamp_policy: TimestampPolicy,

    /// Reject bad ranges before downloading anything
    pub validate_before_fetch: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// yt-dlp executable
    pub yt_dlp_path: String,

    /// ffmpeg executable
    pub ffmpeg_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            public_dir: PathBuf::from("public"),
            public_output_path: "/output".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            temp_dir: None,
            audio_bitrate: "192k".to_string(),
            fetch_timeout_secs: 600,
            transcode_timeout_secs: 600,
            timestamp_policy: TimestampPolicy::Lenient,
            validate_before_fetch: false,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn transcode_timeout(&self) -> Duration {
        Duration::from_secs(self.transcode_timeout_secs)
    }

    /// Temp directory for downloads, falling back to the system temp dir
    pub fn resolved_temp_dir(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("nugget-clipper"))
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config = Self::from_yaml(&content)?;
            tracing::debug!("Loaded configuration from {}", config_path.display());
            Ok(config)
        } else {
            let config = Self::default();
            config.save().await?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
            Ok(config)
        }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("nugget-clipper").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be non-zero");
        }

        let output_path = &self.server.public_output_path;
        if !output_path.starts_with('/') || output_path.trim_end_matches('/').is_empty() {
            anyhow::bail!("public_output_path must be an absolute URL path like '/output'");
        }

        if self.tools.yt_dlp_path.trim().is_empty() || self.tools.ffmpeg_path.trim().is_empty() {
            anyhow::bail!("Tool paths for yt-dlp and ffmpeg must be configured");
        }

        if self.pipeline.fetch_timeout_secs == 0 || self.pipeline.transcode_timeout_secs == 0 {
            anyhow::bail!("Pipeline timeouts must be at least one second");
        }

        let bitrate = &self.pipeline.audio_bitrate;
        let digits = bitrate.strip_suffix('k').unwrap_or("");
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            anyhow::bail!("Audio bitrate must look like '192k', got '{}'", bitrate);
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Listen: {}:{}", self.server.host, self.server.port);
        println!("  Public Dir: {}", self.server.public_dir.display());
        println!("  Output Dir: {}", self.pipeline.output_dir.display());
        println!("  Temp Dir: {}", self.pipeline.resolved_temp_dir().display());
        println!("  Bitrate: {}", self.pipeline.audio_bitrate);
        println!("  Timestamps: {:?}", self.pipeline.timestamp_policy);
        println!("  yt-dlp: {}", self.tools.yt_dlp_path);
        println!("  ffmpeg: {}", self.tools.ffmpeg_path);
    }
}
