use anyhow::Context;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Result;

/// Directory where downloads and conversions land
#[derive(Debug, Clone)]
pub struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the directory (and parents) if missing; succeeds if it already exists
    pub async fn ensure(&self) -> Result<()> {
        fs_err::tokio::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Remove regular files whose modification time is older than `max_age`.
    /// Returns how many files were deleted.
    pub async fn sweep(&self, max_age: Duration) -> Result<usize> {
        // An age the calendar cannot represent means nothing is old enough to expire
        let cutoff = match chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        {
            Some(cutoff) => cutoff,
            None => return Ok(0),
        };

        let mut entries = match tokio::fs::read_dir(&self.path).await {
            Ok(entries) => entries,
            // Nothing downloaded yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to list {}", self.path.display()))
            }
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };

            let modified: DateTime<Utc> = match metadata.modified() {
                Ok(time) => time.into(),
                Err(_) => continue,
            };

            if modified <= cutoff {
                match fs_err::tokio::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!("Could not remove expired file: {}", e),
                }
            }
        }

        Ok(removed)
    }

    /// Sweep forever every `interval`
    pub async fn run_sweeper(self, max_age: Duration, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match self.sweep(max_age).await {
                Ok(0) => tracing::debug!("Retention sweep removed nothing"),
                Ok(count) => tracing::info!("Retention sweep removed {} file(s) from {}", count, self.path.display()),
                Err(e) => tracing::warn!("Retention sweep failed: {:#}", e),
            }
        }
    }
}
