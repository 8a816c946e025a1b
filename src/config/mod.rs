use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::extractors::StrategyKind;

/// Upper bound for `storage.max_age_secs` (100 years)
pub const MAX_RETENTION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Shared-secret token check
    pub auth: AuthConfig,

    /// Staging directory and retention
    pub storage: StorageConfig,

    /// External tool locations
    pub tools: ToolsConfig,

    /// Extraction strategy order
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to
    pub bind_address: String,

    /// Comma-separated list of allowed CORS origins (any origin when unset)
    pub cors_allowed_origins: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Expected token for every media endpoint; endpoints are open when unset
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory where downloaded and converted files are written
    pub downloads_dir: PathBuf,

    /// Periodically delete old files from the downloads directory
    pub retention_enabled: bool,

    /// Files older than this many seconds are removed by the sweeper
    pub max_age_secs: u64,

    /// Seconds between two sweeps
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// you-get executable, metadata source for the stream resolver
    pub you_get: String,

    /// yt-dlp executable
    pub yt_dlp: String,

    /// ffmpeg executable
    pub ffmpeg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Strategies in the order they are tried
    pub strategies: Vec<StrategyKind>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            cors_allowed_origins: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            downloads_dir: PathBuf::from("downloads"),
            retention_enabled: true,
            max_age_secs: 24 * 60 * 60,
            sweep_interval_secs: 60 * 60,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            you_get: "you-get".to_string(),
            yt_dlp: "yt-dlp".to_string(),
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            strategies: vec![StrategyKind::Resolver, StrategyKind::YtDlp],
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults when none exists
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("No config file at {}, using defaults", config_path.display());
            Ok(Self::default())
        }
    }

    /// Load and validate a specific config file
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = fs_err::read_to_string(path)
            .context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, config_path: &std::path::Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("media-fetch").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!("Invalid bind address: {}", self.server.bind_address);
        }

        if self.storage.downloads_dir.as_os_str().is_empty() {
            anyhow::bail!("Downloads directory must not be empty");
        }

        if matches!(&self.auth.token, Some(token) if token.is_empty()) {
            anyhow::bail!("Auth token must not be empty; remove it to disable auth");
        }

        if self.storage.retention_enabled && self.storage.sweep_interval_secs == 0 {
            anyhow::bail!("storage.sweep_interval_secs must be greater than zero");
        }

        if self.storage.max_age_secs > MAX_RETENTION_SECS {
            anyhow::bail!(
                "storage.max_age_secs must be at most {} (disable retention to keep files forever)",
                MAX_RETENTION_SECS
            );
        }

        if self.extraction.strategies.is_empty() {
            anyhow::bail!("At least one extraction strategy must be configured");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Bind Address: {}", self.server.bind_address);
        if let Some(origins) = &self.server.cors_allowed_origins {
            println!("  CORS Origins: {}", origins);
        }
        println!(
            "  Auth: {}",
            if self.auth.token.is_some() { "token required" } else { "disabled" }
        );
        println!("  Downloads Dir: {}", self.storage.downloads_dir.display());
        if self.storage.retention_enabled {
            println!(
                "  Retention: files older than {}s, swept every {}s",
                self.storage.max_age_secs, self.storage.sweep_interval_secs
            );
        } else {
            println!("  Retention: disabled");
        }
        println!("  you-get: {}", self.tools.you_get);
        println!("  yt-dlp: {}", self.tools.yt_dlp);
        println!("  ffmpeg: {}", self.tools.ffmpeg);
        let order: Vec<&str> = self.extraction.strategies.iter().map(|s| s.as_str()).collect();
        println!("  Strategies: {}", order.join(" -> "));
    }
}
