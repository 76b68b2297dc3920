//! Append-only audit trail of poll cycles

use crate::error::Result;
use chrono::{DateTime, Local};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;

/// Timestamped poll lines, one blank line between cycles.
///
/// Once the file grows past `max_bytes` it is moved to `<name>.1` and a new
/// file is started.
#[derive(Debug, Clone)]
pub struct PollLog {
    path: PathBuf,
    max_bytes: u64,
}

impl PollLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn rolled_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".1");
        PathBuf::from(name)
    }

    async fn roll_if_needed(&self) -> Result<()> {
        match fs::metadata(&self.path).await {
            Ok(meta) if meta.len() >= self.max_bytes => {
                fs::rename(&self.path, self.rolled_path()).await?;
                tracing::debug!("Rolled poll log {}", self.path.display());
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Append one poll cycle.
    pub async fn append_cycle(&self, lines: &[(DateTime<Local>, String)]) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        self.roll_if_needed().await?;

        let mut buf = String::new();
        for (at, line) in lines {
            buf.push_str(&format!("[{}] {}\n", at.format("%Y-%m-%d %H:%M:%S"), line));
        }
        buf.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
