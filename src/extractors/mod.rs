use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

pub mod resolver;
pub mod ytdlp;

use crate::config::Config;
use crate::{FetchError, Result};

/// What the caller wants out of a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Highest-resolution video (with audio where available)
    Video,
    /// Best audio-only stream
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extraction strategies that can be named in the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Resolve stream URLs from metadata and download them over HTTP
    Resolver,
    /// Let yt-dlp select, download and merge formats itself
    YtDlp,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Resolver => "resolver",
            StrategyKind::YtDlp => "yt-dlp",
        }
    }
}

/// A file produced by one of the strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downloaded {
    pub path: PathBuf,
    pub strategy: &'static str,
}

/// Trait for turning a media URL into a file inside the staging directory
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &'static str;

    /// Download the requested kind of media into `staging_dir` and return the file path
    async fn fetch(&self, url: &Url, kind: MediaKind, staging_dir: &Path) -> Result<PathBuf>;
}

/// Ordered list of strategies, tried until one succeeds
pub struct StrategyChain {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl StrategyChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Build the chain in the order the config asks for
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut chain = Self::new();

        for kind in &config.extraction.strategies {
            match kind {
                StrategyKind::Resolver => {
                    chain.register(Box::new(resolver::StreamResolver::new(&config.tools.you_get)?));
                }
                StrategyKind::YtDlp => {
                    chain.register(Box::new(ytdlp::YtDlpDownloader::new(&config.tools.yt_dlp)));
                }
            }
        }

        Ok(chain)
    }

    /// Append a strategy; it is tried after every strategy already registered
    pub fn register(&mut self, strategy: Box<dyn ExtractionStrategy>) {
        self.strategies.push(strategy);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, strategy: Box<dyn ExtractionStrategy>) -> Self {
        self.register(strategy);
        self
    }

    /// Strategy names in priority order
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Try each strategy in order. Failures of all but the last are logged and
    /// dropped; the last failure becomes [`FetchError::DownloadFailed`].
    pub async fn fetch(
        &self,
        url: &Url,
        kind: MediaKind,
        staging_dir: &Path,
    ) -> std::result::Result<Downloaded, FetchError> {
        let mut last_error = None;

        for (index, strategy) in self.strategies.iter().enumerate() {
            tracing::info!(strategy = strategy.name(), %kind, "Fetching {}", url);

            match strategy.fetch(url, kind, staging_dir).await {
                Ok(path) => {
                    tracing::info!(strategy = strategy.name(), "Downloaded {}", path.display());
                    return Ok(Downloaded {
                        path,
                        strategy: strategy.name(),
                    });
                }
                Err(e) => {
                    let failure = FetchError::ExtractionFailed {
                        strategy: strategy.name(),
                        message: format!("{:#}", e),
                    };
                    if index + 1 < self.strategies.len() {
                        tracing::warn!("{}; trying next strategy", failure);
                    } else {
                        tracing::error!("{}", failure);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(match last_error {
            Some(e) => FetchError::DownloadFailed(format!("{:#}", e)),
            None => FetchError::DownloadFailed("no extraction strategy configured".to_string()),
        })
    }
}

impl Default for StrategyChain {
    fn default() -> Self {
        Self::new()
    }
}
