use anyhow::Context;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use url::Url;
use uuid::Uuid;

use super::{ExtractionStrategy, MediaKind};
use crate::utils::{format_file_size, sanitize_filename};
use crate::Result;

/// Containers that never carry a video track
const AUDIO_CONTAINERS: &[&str] = &["mp3", "m4a", "aac", "ogg", "opus", "flac", "wav"];

/// Primary strategy: read the stream list from `you-get --json`, pick one
/// stream and download it ourselves over HTTP.
pub struct StreamResolver {
    you_get_path: String,
    client: Client,
}

/// Document printed by `you-get --json`
#[derive(Debug, Deserialize)]
struct VideoInfo {
    title: Option<String>,
    #[serde(default)]
    streams: BTreeMap<String, StreamEntry>,
    #[serde(default)]
    extra: Extra,
}

/// Request hints some sites need for the stream URLs to work
#[derive(Debug, Default, Deserialize)]
struct Extra {
    ua: Option<String>,
    referer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamEntry {
    container: Option<String>,
    quality: Option<String>,
    mime: Option<String>,
    size: Option<f64>,
    /// Flat list of URLs, or a list of lists for separate DASH tracks
    #[serde(default)]
    src: Vec<serde_json::Value>,
}

/// One downloadable stream, normalised from a you-get entry
#[derive(Debug, Clone)]
struct StreamFormat {
    format_id: String,
    url: Option<String>,
    ext: Option<String>,
    mime: Option<String>,
    height: Option<u32>,
    size: Option<u64>,
    http_headers: Vec<(String, String)>,
}

impl StreamFormat {
    fn from_entry(format_id: &str, entry: &StreamEntry, extra: &Extra) -> Self {
        // Multi-part and DASH streams need merging, only single-URL ones are direct
        let url = match entry.src.as_slice() {
            [serde_json::Value::String(url)] => Some(url.clone()),
            _ => None,
        };

        let mut http_headers = Vec::new();
        if let Some(ua) = &extra.ua {
            http_headers.push(("User-Agent".to_string(), ua.clone()));
        }
        if let Some(referer) = &extra.referer {
            http_headers.push(("Referer".to_string(), referer.clone()));
        }

        Self {
            format_id: format_id.to_string(),
            url,
            ext: entry.container.as_ref().map(|c| c.to_ascii_lowercase()),
            mime: entry.mime.clone(),
            height: entry.quality.as_deref().and_then(height_of),
            size: entry.size.filter(|s| s.is_finite() && *s >= 0.0).map(|s| s as u64),
            http_headers,
        }
    }

    fn is_direct(&self) -> bool {
        self.url.is_some()
    }

    fn is_audio_only(&self) -> bool {
        match self.mime.as_deref() {
            Some(mime) => mime.starts_with("audio/"),
            None => matches!(self.ext.as_deref(), Some(ext) if AUDIO_CONTAINERS.contains(&ext)),
        }
    }
}

/// Vertical resolution from labels such as `hd720`, `1080p` or `medium`
fn height_of(quality: &str) -> Option<u32> {
    let digits: String = quality.chars().filter(|c| c.is_ascii_digit()).collect();
    if let Ok(height) = digits.parse() {
        return Some(height);
    }

    match quality.to_ascii_lowercase().as_str() {
        "tiny" => Some(144),
        "small" => Some(240),
        "medium" => Some(360),
        "large" => Some(480),
        _ => None,
    }
}

impl VideoInfo {
    fn formats(&self) -> Vec<StreamFormat> {
        self.streams
            .iter()
            .map(|(id, entry)| StreamFormat::from_entry(id, entry, &self.extra))
            .collect()
    }
}

impl StreamResolver {
    pub fn new(you_get_path: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("media-fetch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            you_get_path: you_get_path.to_string(),
            client,
        })
    }

    /// Get the stream list using you-get
    async fn get_video_info(&self, url: &str) -> Result<VideoInfo> {
        tracing::debug!("Extracting video info for: {}", url);

        let output = Command::new(&self.you_get_path)
            .args(["--json", url])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.you_get_path))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("you-get failed: {}", error.trim());
        }

        let info: VideoInfo = serde_json::from_slice(&output.stdout)
            .context("Failed to parse you-get metadata")?;

        Ok(info)
    }

    /// Stream the selected format to `target`, going through a `.part` file so a
    /// failed transfer never leaves a file under the final name.
    async fn download_stream(&self, format: &StreamFormat, target: &Path) -> Result<u64> {
        let stream_url = format
            .url
            .as_deref()
            .context("Selected stream has no URL")?;

        let mut request = self.client.get(stream_url);
        for (name, value) in &format.http_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Failed to download stream {}: HTTP {}", format.format_id, response.status());
        }

        let staging_dir = target.parent().unwrap_or_else(|| Path::new("."));
        let part_path = staging_dir.join(format!(".{}.part", Uuid::new_v4()));

        let written = match write_body(response, &part_path).await {
            Ok(written) => written,
            Err(e) => {
                let _ = fs_err::tokio::remove_file(&part_path).await;
                return Err(e);
            }
        };

        fs_err::tokio::rename(&part_path, target).await?;
        Ok(written)
    }
}

async fn write_body(response: reqwest::Response, path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut written = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(written)
}

/// Pick the stream to download: highest resolution direct stream for video,
/// largest audio-only stream for audio.
fn select_stream(formats: &[StreamFormat], kind: MediaKind) -> Option<&StreamFormat> {
    let candidates = formats.iter().filter(|f| f.is_direct());

    match kind {
        MediaKind::Video => candidates
            .filter(|f| !f.is_audio_only())
            .max_by_key(|f| (f.height.unwrap_or(0), f.size.unwrap_or(0))),
        MediaKind::Audio => candidates
            .filter(|f| f.is_audio_only())
            .max_by_key(|f| f.size.unwrap_or(0)),
    }
}

/// `<title>.<ext>`, the way the stream would name itself
fn target_filename(title: Option<&str>, format: &StreamFormat, kind: MediaKind) -> String {
    let title = sanitize_filename(title.unwrap_or("media"));
    let ext = format.ext.as_deref().unwrap_or(match kind {
        MediaKind::Video => "mp4",
        MediaKind::Audio => "m4a",
    });
    format!("{}.{}", title, ext)
}

#[async_trait]
impl ExtractionStrategy for StreamResolver {
    fn name(&self) -> &'static str {
        "resolver"
    }

    async fn fetch(&self, url: &Url, kind: MediaKind, staging_dir: &Path) -> Result<PathBuf> {
        let info = self.get_video_info(url.as_str()).await?;
        let formats = info.formats();

        let format = select_stream(&formats, kind)
            .with_context(|| format!("No directly downloadable {} stream for {}", kind, url))?;

        let target = staging_dir.join(target_filename(info.title.as_deref(), format, kind));
        tracing::debug!(
            format_id = %format.format_id,
            expected_size = %format.size.map(format_file_size).unwrap_or_else(|| "unknown".to_string()),
            "Downloading stream to {}",
            target.display()
        );

        let written = self.download_stream(format, &target).await?;
        tracing::debug!("Wrote {} to {}", format_file_size(written), target.display());

        Ok(target)
    }
}
