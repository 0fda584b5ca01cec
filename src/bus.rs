use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Transport between the producer and the consumer.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, payload: &serde_json::Value) -> Result<()>;
    /// Take every pending message body.
    async fn receive(&self) -> Result<Vec<String>>;
}

/// One JSON file per message in a directory. Files are written under a
/// temporary name and renamed, so `receive` never sees a partial body.
pub struct SpoolBus {
    dir: PathBuf,
    sequence: AtomicU64,
}

impl SpoolBus {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sequence: AtomicU64::new(0),
        }
    }

    fn next_name(&self) -> String {
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.9f");
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{stamp}-{}-{seq:06}", std::process::id())
    }
}

#[async_trait]
impl MessageBus for SpoolBus {
    async fn publish(&self, payload: &serde_json::Value) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create spool {}", self.dir.display()))?;

        let name = self.next_name();
        let staging = self.dir.join(format!("{name}.tmp"));
        let body = serde_json::to_vec(payload).context("Failed to serialize message")?;
        tokio::fs::write(&staging, body)
            .await
            .with_context(|| format!("Failed to write {}", staging.display()))?;
        tokio::fs::rename(&staging, self.dir.join(format!("{name}.json")))
            .await
            .context("Failed to publish spooled message")?;
        Ok(())
    }

    async fn receive(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read spool {}", self.dir.display()))
            }
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut messages = Vec::with_capacity(paths.len());
        for path in paths {
            let body = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            tokio::fs::remove_file(&path)
                .await
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            messages.push(body);
        }
        Ok(messages)
    }
}
