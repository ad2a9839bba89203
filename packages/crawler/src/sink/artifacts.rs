//! Tab-separated log of uploaded artifacts.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const HEADER: &str = "recorded_at\tsource\tkey\turl\n";

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactEntry {
    pub recorded_at: DateTime<Utc>,
    pub source: String,
    pub key: String,
    pub url: String,
}

/// Append-only TSV file. Writers are serialized so rows never interleave.
pub struct ArtifactLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ArtifactLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: &ArtifactEntry) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open artifact log {}", self.path.display()))?;

        let mut line = String::new();
        if file.metadata().await?.len() == 0 {
            line.push_str(HEADER);
        }
        line.push_str(&format!(
            "{}\t{}\t{}\t{}\n",
            entry.recorded_at.to_rfc3339(),
            field(&entry.source),
            field(&entry.key),
            field(&entry.url)
        ));

        file.write_all(line.as_bytes())
            .await
            .context("Failed to write artifact log")?;
        file.flush().await?;
        Ok(())
    }
}

fn field(value: &str) -> String {
    value.replace(['\t', '\n', '\r'], " ")
}
