use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::auth::TokenGuard;
use crate::config::Config;
use crate::extractors::{MediaKind, StrategyChain};
use crate::storage::StagingDir;
use crate::transcode::{Container, ConversionJob, FfmpegTranscoder, Transcoder};
use crate::utils::{extension_of, validate_url};
use crate::{FetchError, Result};

/// What a request wants back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// An mp4 file
    Video,
    /// An mp3 file
    Audio,
    /// An mp4 file plus an mp3 extracted from it
    VideoWithAudio,
}

impl OutputKind {
    /// Which kind of stream the extractors should look for
    pub fn media_kind(&self) -> MediaKind {
        match self {
            OutputKind::Video | OutputKind::VideoWithAudio => MediaKind::Video,
            OutputKind::Audio => MediaKind::Audio,
        }
    }
}

/// Everything the pipeline needs for one call
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub token: Option<String>,
    pub output: OutputKind,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, token: Option<String>, output: OutputKind) -> Self {
        Self {
            url: url.into(),
            token,
            output,
        }
    }
}

/// A file left in the staging directory for the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaFile {
    pub path: PathBuf,
    /// Lower-cased file extension
    pub container: String,
    /// `false` when the downloaded file already had the target container
    pub converted: bool,
}

impl MediaFile {
    fn new(path: PathBuf, converted: bool) -> Self {
        let container = extension_of(&path).unwrap_or_default();
        Self {
            path,
            container,
            converted,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("download.{}", self.container))
    }
}

/// Result of a successful fetch
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
    pub video: Option<MediaFile>,
    pub audio: Option<MediaFile>,
    /// Strategy that produced the download
    pub strategy: &'static str,
}

/// Token check, staging, extraction with fallback, then conversion
pub struct FetchPipeline {
    guard: TokenGuard,
    staging: StagingDir,
    strategies: StrategyChain,
    transcoder: Box<dyn Transcoder>,
}

impl FetchPipeline {
    pub fn new(
        guard: TokenGuard,
        staging: StagingDir,
        strategies: StrategyChain,
        transcoder: Box<dyn Transcoder>,
    ) -> Self {
        Self {
            guard,
            staging,
            strategies,
            transcoder,
        }
    }

    /// Wire up the default strategies and ffmpeg from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            TokenGuard::new(config.auth.token.clone()),
            StagingDir::new(&config.storage.downloads_dir),
            StrategyChain::from_config(config)?,
            Box::new(FfmpegTranscoder::new(&config.tools.ffmpeg)),
        ))
    }

    pub fn staging(&self) -> &StagingDir {
        &self.staging
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.names()
    }

    pub fn auth_enabled(&self) -> bool {
        self.guard.is_enabled()
    }

    /// The token check on its own, for callers that want to fail early
    pub fn verify_token(&self, token: Option<&str>) -> std::result::Result<(), FetchError> {
        self.guard.verify(token)
    }

    pub async fn fetch_video(&self, url: &str, token: Option<String>) -> std::result::Result<FetchOutcome, FetchError> {
        self.fetch(&FetchRequest::new(url, token, OutputKind::Video)).await
    }

    pub async fn fetch_audio(&self, url: &str, token: Option<String>) -> std::result::Result<FetchOutcome, FetchError> {
        self.fetch(&FetchRequest::new(url, token, OutputKind::Audio)).await
    }

    pub async fn fetch_video_with_audio(
        &self,
        url: &str,
        token: Option<String>,
    ) -> std::result::Result<FetchOutcome, FetchError> {
        self.fetch(&FetchRequest::new(url, token, OutputKind::VideoWithAudio)).await
    }

    /// Run one request end to end
    pub async fn fetch(&self, request: &FetchRequest) -> std::result::Result<FetchOutcome, FetchError> {
        // Nothing touches the disk or network before these two checks
        self.guard.verify(request.token.as_deref())?;
        let url = validate_url(&request.url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        self.staging
            .ensure()
            .await
            .map_err(|e| FetchError::StagingDir(format!("{:#}", e)))?;

        let downloaded = self
            .strategies
            .fetch(&url, request.output.media_kind(), self.staging.path())
            .await?;

        let (video, audio) = match request.output {
            OutputKind::Video => {
                let video = self.convert_replacing(downloaded.path, Container::Mp4).await?;
                (Some(video), None)
            }
            OutputKind::Audio => {
                let audio = self.convert_replacing(downloaded.path, Container::Mp3).await?;
                (None, Some(audio))
            }
            OutputKind::VideoWithAudio => {
                let video = self.convert_replacing(downloaded.path, Container::Mp4).await?;
                let audio = self.derive(&video.path, Container::Mp3).await?;
                (Some(video), Some(audio))
            }
        };

        Ok(FetchOutcome {
            video,
            audio,
            strategy: downloaded.strategy,
        })
    }

    /// Convert unless the file already has the target container; the original
    /// is deleted once the conversion succeeds.
    async fn convert_replacing(
        &self,
        source: PathBuf,
        container: Container,
    ) -> std::result::Result<MediaFile, FetchError> {
        if extension_of(&source).as_deref() == Some(container.extension()) {
            tracing::debug!("{} is already {}, skipping conversion", source.display(), container.extension());
            return Ok(MediaFile::new(source, false));
        }

        let job = ConversionJob::to_container(&source, container);
        self.run_conversion(&job).await?;

        if let Err(e) = fs_err::tokio::remove_file(&source).await {
            tracing::warn!("Could not remove original after conversion: {}", e);
        }

        Ok(MediaFile::new(job.target, true))
    }

    /// Always convert, keeping the source
    async fn derive(&self, source: &Path, container: Container) -> std::result::Result<MediaFile, FetchError> {
        let job = ConversionJob::to_container(source, container);
        self.run_conversion(&job).await?;
        Ok(MediaFile::new(job.target, true))
    }

    async fn run_conversion(&self, job: &ConversionJob) -> std::result::Result<(), FetchError> {
        tracing::info!(kind = ?job.kind, "Converting {} -> {}", job.source.display(), job.target.display());

        if let Err(e) = self.transcoder.convert(job).await {
            // Never leave a half-written target behind
            let _ = fs_err::tokio::remove_file(&job.target).await;
            return Err(FetchError::ConversionFailed(format!("{:#}", e)));
        }

        if !is_file(&job.target).await? {
            return Err(FetchError::ConversionFailed(format!(
                "transcoder finished but {} was not created",
                job.target.display()
            )));
        }

        Ok(())
    }
}

/// `false` when nothing exists at `path`; other I/O failures are errors
async fn is_file(path: &Path) -> Result<bool> {
    match fs_err::tokio::metadata(path).await {
        Ok(metadata) => Ok(metadata.is_file()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
