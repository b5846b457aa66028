use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::Config;

#[derive(Parser)]
#[command(
    name = "nugget",
    about = "Nugget Clipper - cut MP3 clips out of YouTube and other online media",
    version,
    long_about = "Downloads the audio track of a media URL with yt-dlp, trims it to the requested window with FFmpeg and publishes the result as an MP3. Run it as a small web service or one clip at a time from the terminal."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Directory finished clips are written to
    #[arg(long, global = true, env = "NUGGET_OUTPUT_DIR", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the clip web service
    Serve {
        /// Address to bind
        #[arg(long, env = "NUGGET_HOST")]
        host: Option<String>,

        /// Port to bind
        #[arg(short, long, env = "NUGGET_PORT")]
        port: Option<u16>,

        /// Directory with the static front-end
        #[arg(long, value_name = "DIR")]
        public_dir: Option<PathBuf>,
    },

    /// Cut a single clip and print where it was saved
    Clip {
        /// Media URL (YouTube, SoundCloud, anything yt-dlp understands)
        #[arg(value_name = "URL")]
        url: String,

        /// Clip start (SS, MM:SS or HH:MM:SS)
        #[arg(short, long)]
        start: String,

        /// Clip end (SS, MM:SS or HH:MM:SS)
        #[arg(short, long)]
        end: String,
    },

    /// Check that yt-dlp and ffmpeg are installed
    Check,

    /// Show the effective configuration
    Config {
        /// Print as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

impl Cli {
    /// Apply command line overrides on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(dir) = &self.output_dir {
            config.pipeline.output_dir = dir.clone();
        }

        if let Commands::Serve {
            host,
            port,
            public_dir,
        } = &self.command
        {
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            if let Some(port) = port {
                config.server.port = *port;
            }
            if let Some(dir) = public_dir {
                config.server.public_dir = dir.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::parse_from([
            "nugget",
            "--output-dir",
            "/srv/clips",
            "serve",
            "--host",
            "0.0.0.0",
            "--port",
            "8080",
        ]);
        let mut config = Config::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pipeline.output_dir, PathBuf::from("/srv/clips"));
        assert_eq!(config.server.public_dir, PathBuf::from("public"));
    }

    #[test]
    fn test_clip_arguments() {
        let cli = Cli::parse_from(["nugget", "clip", "https://youtu.be/abc", "-s", "01:30", "-e", "02:00"]);
        match cli.command {
            Commands::Clip { url, start, end } => {
                assert_eq!(url, "https://youtu.be/abc");
                assert_eq!(start, "01:30");
                assert_eq!(end, "02:00");
            }
            _ => panic!("expected clip command"),
        }
    }

    #[test]
    fn test_config_json_flag() {
        let cli = Cli::parse_from(["nugget", "config", "--json"]);
        assert!(matches!(cli.command, Commands::Config { json: true }));
    }
}
