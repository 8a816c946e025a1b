//! ffmpeg invocation.
//!
//! Every conversion is described by a [`ConversionKind`] whose [`ArgTemplate`]
//! spells out the exact argument list; [`FfmpegTranscoder`] fills in the paths
//! and waits for the process to exit.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::Result;

/// Target containers the service produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Mp4,
    Mp3,
}

impl Container {
    pub fn extension(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Mp3 => "mp3",
        }
    }

    /// MIME type used when the file is streamed back
    pub fn mime_type(&self) -> &'static str {
        match self {
            Container::Mp4 => "video/mp4",
            Container::Mp3 => "audio/mpeg",
        }
    }

    /// Conversion that produces this container
    pub fn conversion(&self) -> ConversionKind {
        match self {
            Container::Mp4 => ConversionKind::Remux,
            Container::Mp3 => ConversionKind::ExtractAudio,
        }
    }
}

/// What ffmpeg is asked to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionKind {
    /// Re-wrap (transcoding where needed) into the target container
    Remux,
    /// Keep only the best audio stream, highest VBR quality
    ExtractAudio,
}

/// Placeholder-based argument list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgTemplate {
    pub args: &'static [&'static str],
}

const SOURCE: &str = "{source}";
const TARGET: &str = "{target}";

const REMUX: ArgTemplate = ArgTemplate {
    args: &["-i", SOURCE, TARGET, "-y"],
};

const EXTRACT_AUDIO: ArgTemplate = ArgTemplate {
    args: &["-i", SOURCE, "-q:a", "0", "-map", "a", TARGET, "-y"],
};

impl ConversionKind {
    pub fn template(&self) -> ArgTemplate {
        match self {
            ConversionKind::Remux => REMUX,
            ConversionKind::ExtractAudio => EXTRACT_AUDIO,
        }
    }
}

impl ArgTemplate {
    /// Substitute the source and target paths
    pub fn render(&self, source: &Path, target: &Path) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| match *arg {
                SOURCE => source.to_string_lossy().into_owned(),
                TARGET => target.to_string_lossy().into_owned(),
                other => other.to_string(),
            })
            .collect()
    }
}

/// One source -> target conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub source: PathBuf,
    pub target: PathBuf,
    pub kind: ConversionKind,
}

impl ConversionJob {
    /// Convert `source` into a sibling file with the container's extension
    pub fn to_container(source: &Path, container: Container) -> Self {
        Self {
            source: source.to_path_buf(),
            target: source.with_extension(container.extension()),
            kind: container.conversion(),
        }
    }
}

/// Seam between the pipeline and the external transcoder
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Run the conversion to completion; `job.target` exists on success
    async fn convert(&self, job: &ConversionJob) -> Result<()>;
}

/// Transcoder backed by the ffmpeg binary
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_path: &str) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.to_string(),
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert(&self, job: &ConversionJob) -> Result<()> {
        let args = job.kind.template().render(&job.source, &job.target);
        tracing::debug!("Running {} {}", self.ffmpeg_path, args.join(" "));

        let output = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to run {}: {}", self.ffmpeg_path, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffmpeg exited with {}: {}", output.status, tail(&stderr, 5));
        }

        Ok(())
    }
}

/// Last `lines` non-empty lines of tool output; ffmpeg prints its banner first
fn tail(text: &str, lines: usize) -> String {
    let kept: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    kept[kept.len().saturating_sub(lines)..].join("\n")
}
