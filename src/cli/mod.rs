use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "media-fetch",
    about = "Media Fetch - download video or audio from a URL and convert it to mp4/mp3",
    version,
    long_about = "A small HTTP service (and CLI) that fetches media with a stream resolver, falls back to a full yt-dlp download when that fails, and converts the result with ffmpeg."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Read configuration from this file instead of the default location
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve {
        /// Address to listen on
        #[arg(long, env = "MEDIA_FETCH_BIND", value_name = "ADDR")]
        bind: Option<String>,

        /// Directory for downloaded and converted files
        #[arg(long, env = "MEDIA_FETCH_DOWNLOADS_DIR", value_name = "DIR")]
        downloads_dir: Option<PathBuf>,

        /// Token every media request must carry
        #[arg(long, env = "MEDIA_FETCH_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Fetch a single URL without starting the server
    Fetch {
        /// Media page URL
        #[arg(value_name = "URL")]
        url: String,

        /// Produce an mp3 instead of an mp4
        #[arg(long, conflicts_with = "with_audio")]
        audio: bool,

        /// Produce an mp4 and an mp3 extracted from it
        #[arg(long)]
        with_audio: bool,

        /// Directory for the produced files
        #[arg(long, value_name = "DIR")]
        downloads_dir: Option<PathBuf>,
    },

    /// Show or write the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List extraction strategies in the order they are tried
    Strategies,
}
