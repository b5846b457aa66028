use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nugget_clipper::pipeline::{ClipPipeline, ClipRequest, ClipResult};
use nugget_clipper::{server, utils, Cli, Commands, Config, LogFormat};

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_filter = if verbose {
        "nugget_clipper=debug,nugget=debug,tower_http=debug"
    } else {
        "nugget_clipper=info,nugget=info,tower_http=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let mut config = Config::load().await?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    match cli.command {
        Commands::Serve { .. } => {
            // Missing tools are not fatal here; they may show up on PATH later
            let missing_deps = utils::check_dependencies(&config.tools).await;
            for dep in &missing_deps {
                tracing::warn!("Dependency not found: {}", dep);
            }

            server::serve(config).await?;
        }
        Commands::Clip { url, start, end } => {
            run_clip(&config, ClipRequest::new(url, start, end)).await?;
        }
        Commands::Check => {
            let missing_deps = utils::check_dependencies(&config.tools).await;
            if missing_deps.is_empty() {
                println!("All external tools are available:");
                println!("  • {}", config.tools.yt_dlp_path);
                println!("  • {}", config.tools.ffmpeg_path);
            } else {
                eprintln!("⚠️  Missing dependencies:");
                for dep in &missing_deps {
                    eprintln!("   • {}", dep);
                }
                anyhow::bail!("{} required tool(s) missing", missing_deps.len());
            }
        }
        Commands::Config { json: true } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Config { json: false } => config.display(),
    }

    Ok(())
}

/// Run one clip from the terminal; Ctrl-C cancels it and cleans up
async fn run_clip(config: &Config, request: ClipRequest) -> Result<()> {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let pipeline = ClipPipeline::from_config(config).with_cancel(cancel_rx);

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    progress.enable_steady_tick(Duration::from_millis(120));
    progress.set_message(format!(
        "Cutting {} - {} from {}",
        request.start_time, request.end_time, request.source_url
    ));

    let run = pipeline.run(request).await;

    match run.result {
        ClipResult::Success { download_url } => {
            progress.finish_with_message(format!(
                "Clip ready in {}",
                utils::format_duration(run.elapsed.as_secs_f64())
            ));
            match run.output_path {
                Some(path) => println!("Clip saved to: {}", path.display()),
                None => println!("Clip published at: {}", download_url),
            }
            Ok(())
        }
        ClipResult::Failure { message } => {
            progress.abandon_with_message("Clip failed");
            anyhow::bail!(message)
        }
    }
}
