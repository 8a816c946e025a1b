//! Media Fetch - a small HTTP service that downloads video and audio from a URL
//!
//! Media is resolved through an ordered chain of extraction strategies (a direct
//! stream resolver fed by `you-get` first, a full `yt-dlp` download as fallback)
//! and then converted to mp4/mp3 with `ffmpeg` before being handed back to the caller.

pub mod auth;
pub mod cli;
pub mod config;
pub mod extractors;
pub mod pipeline;
pub mod server;
pub mod storage;
pub mod transcode;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use extractors::{ExtractionStrategy, MediaKind, StrategyChain};
pub use pipeline::{FetchOutcome, FetchPipeline, FetchRequest, OutputKind};
pub use transcode::{FfmpegTranscoder, Transcoder};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Errors surfaced by the fetch pipeline
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("Invalid token")]
    Unauthorized,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Could not create staging directory: {0}")]
    StagingDir(String),

    #[error("{strategy} extraction failed: {message}")]
    ExtractionFailed {
        strategy: &'static str,
        message: String,
    },

    #[error("{0}")]
    DownloadFailed(String),

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("{0}")]
    Unknown(String),
}

impl From<anyhow::Error> for FetchError {
    fn from(e: anyhow::Error) -> Self {
        FetchError::Unknown(format!("{:#}", e))
    }
}
