use anyhow::Result;
use std::path::Path;
use url::Url;

use crate::config::ToolsConfig;

/// Validate a URL before handing it to any extractor
pub fn validate_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim())
        .map_err(|_| anyhow::anyhow!("Invalid URL format: {}", url))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    if parsed.host_str().is_none() {
        anyhow::bail!("URL has no host: {}", url);
    }

    Ok(parsed)
}

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Sanitize a media title so it can be used as a file name inside the staging directory
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned = filename
        .chars()
        .map(|c| {
            match c {
                // Path separators and characters Windows refuses in names
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            }
        })
        .collect::<String>();

    let trimmed = cleaned.trim().trim_start_matches('.').trim();
    if trimmed.is_empty() {
        "media".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Lower-cased extension of a path, if any
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Check if the current environment has the external tools we shell out to
pub async fn check_dependencies(tools: &ToolsConfig) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(&tools.you_get).await {
        missing.push(format!("{} - required by the stream resolver", tools.you_get));
    }

    if !check_command_available(&tools.yt_dlp).await {
        missing.push(format!("{} - required by the yt-dlp fallback", tools.yt_dlp));
    }

    // ffmpeg spells it `-version`, the extractors `--version`
    if !check_command_available_with(&tools.ffmpeg, "-version").await {
        missing.push(format!("{} - required for mp4/mp3 conversion", tools.ffmpeg));
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str) -> bool {
    check_command_available_with(command, "--version").await
}

async fn check_command_available_with(command: &str, version_flag: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(version_flag)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1.0 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1048576), "1.0 MB");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Hello World!"), "Hello World!");
        assert_eq!(sanitize_filename("AC/DC: Live?"), "AC_DC_ Live_");
        assert_eq!(sanitize_filename("  spaced  "), "spaced");
        assert_eq!(sanitize_filename("../etc"), "_etc");
        assert_eq!(sanitize_filename("..."), "media");
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(&PathBuf::from("a/clip.WEBM")), Some("webm".to_string()));
        assert_eq!(extension_of(&PathBuf::from("a/clip")), None);
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com/watch?v=abc123").is_ok());
        assert!(validate_url("http://example.com").is_ok());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("not-a-url").is_err());
        assert!(validate_url("").is_err());
    }

    #[tokio::test]
    async fn missing_tools_are_reported() {
        let tools = ToolsConfig {
            you_get: "definitely-not-you-get-xyz".to_string(),
            yt_dlp: "definitely-not-yt-dlp-xyz".to_string(),
            ffmpeg: "definitely-not-ffmpeg-xyz".to_string(),
        };
        let missing = check_dependencies(&tools).await;
        assert_eq!(missing.len(), 3);
        assert!(missing[0].starts_with("definitely-not-you-get-xyz"));
    }
}
