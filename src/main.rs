use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use media_fetch::cli::{Cli, Commands};
use media_fetch::config::Config;
use media_fetch::pipeline::{FetchPipeline, FetchRequest, OutputKind};
use media_fetch::{server, utils};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "media_fetch=debug,tower_http=debug"
    } else {
        "media_fetch=info,tower_http=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    if cli.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Serve {
            bind,
            downloads_dir,
            token,
        } => {
            if let Some(bind) = bind {
                config.server.bind_address = bind;
            }
            if let Some(dir) = downloads_dir {
                config.storage.downloads_dir = dir;
            }
            if let Some(token) = token {
                config.auth.token = Some(token);
            }
            config.validate()?;

            warn_missing_dependencies(&config).await;
            server::serve(config).await?;
        }
        Commands::Fetch {
            url,
            audio,
            with_audio,
            downloads_dir,
        } => {
            if let Some(dir) = downloads_dir {
                config.storage.downloads_dir = dir;
            }
            // Local runs are trusted
            config.auth.token = None;
            config.validate()?;

            warn_missing_dependencies(&config).await;

            let output = if audio {
                OutputKind::Audio
            } else if with_audio {
                OutputKind::VideoWithAudio
            } else {
                OutputKind::Video
            };

            let pipeline = FetchPipeline::from_config(&config)?;

            let progress = ProgressBar::new_spinner();
            progress.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
            );
            progress.enable_steady_tick(Duration::from_millis(120));
            progress.set_message(format!("Fetching {}", url));

            let result = pipeline.fetch(&FetchRequest::new(url, None, output)).await;
            progress.finish_and_clear();

            let outcome = result?;
            if let Some(video) = &outcome.video {
                println!("Video saved to: {}", video.path.display());
            }
            if let Some(audio) = &outcome.audio {
                println!("Audio saved to: {}", audio.path.display());
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                let path = match &cli.config {
                    Some(path) => {
                        config.save_to(path)?;
                        path.clone()
                    }
                    None => config.save()?,
                };
                println!("Configuration written to: {}", path.display());
            }
        }
        Commands::Strategies => {
            println!("Extraction strategies (tried in order):");
            for (index, kind) in config.extraction.strategies.iter().enumerate() {
                println!("  {}. {}", index + 1, kind.as_str());
            }
        }
    }

    Ok(())
}

/// Check for required external tools (non-fatal; they may appear later)
async fn warn_missing_dependencies(config: &Config) {
    let missing = utils::check_dependencies(&config.tools).await;
    for dep in missing {
        tracing::warn!("Dependency not found: {}", dep);
    }
}
