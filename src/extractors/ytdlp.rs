use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use url::Url;

use super::{ExtractionStrategy, MediaKind};
use crate::Result;

/// Fallback strategy: hand the whole job (format selection, download, merge) to yt-dlp
pub struct YtDlpDownloader {
    yt_dlp_path: String,
}

impl YtDlpDownloader {
    pub fn new(yt_dlp_path: &str) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.to_string(),
        }
    }

    /// Build the yt-dlp argument list for one download
    fn build_args(url: &Url, kind: MediaKind, staging_dir: &Path) -> Vec<String> {
        let template = staging_dir.join("%(title)s.%(ext)s");

        vec![
            "--format".to_string(),
            format_selector(kind).to_string(),
            "--output".to_string(),
            template.to_string_lossy().into_owned(),
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            // Final path after merging/moving, one per line on stdout
            "--print".to_string(),
            "after_move:filepath".to_string(),
            url.to_string(),
        ]
    }
}

/// yt-dlp format selection string for a media kind
pub fn format_selector(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Video => "bestvideo+bestaudio/best",
        MediaKind::Audio => "bestaudio/best",
    }
}

/// Last non-empty line printed by `--print after_move:filepath`
fn extract_printed_path(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(PathBuf::from)
}

#[async_trait]
impl ExtractionStrategy for YtDlpDownloader {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn fetch(&self, url: &Url, kind: MediaKind, staging_dir: &Path) -> Result<PathBuf> {
        let args = Self::build_args(url, kind, staging_dir);
        tracing::debug!("Running {} {}", self.yt_dlp_path, args.join(" "));

        let output = Command::new(&self.yt_dlp_path)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.yt_dlp_path))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp failed: {}", error.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = extract_printed_path(&stdout)
            .context("yt-dlp did not report the downloaded file path")?;

        if !fs_err::tokio::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
            anyhow::bail!("yt-dlp reported {} but the file does not exist", path.display());
        }

        Ok(path)
    }
}

impl Default for YtDlpDownloader {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}
