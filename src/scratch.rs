use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::config::ScratchConfig;

/// Keeps the most recent encode/decode result in one well-known file and
/// removes it once `ttl` passes without a newer write.
pub struct ScratchStore {
    path: PathBuf,
    ttl: Duration,
    generation: Arc<AtomicU64>,
}

impl ScratchStore {
    pub fn new(config: &ScratchConfig) -> Self {
        Self::with_ttl(config.path.clone(), Duration::from_secs(config.ttl_secs))
    }

    pub fn with_ttl(path: PathBuf, ttl: Duration) -> Self {
        Self {
            path,
            ttl,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the scratch file with `content` and schedule its removal.
    pub async fn write(&self, content: &str) -> Result<PathBuf> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&self.path, content)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let latest = Arc::clone(&self.generation);
        let path = self.path.clone();
        let ttl = self.ttl;

        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if latest.load(Ordering::SeqCst) != generation {
                return;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("Expired scratch file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove scratch file {}: {}", path.display(), e),
            }
        });

        Ok(self.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_overwrites_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScratchStore::with_ttl(dir.path().join("out.txt"), Duration::from_secs(60));

        store.write("first").await.unwrap();
        let path = store.write("second").await.unwrap();

        assert_eq!(std::fs::read_to_string(path).unwrap(), "second");
    }

    #[tokio::test]
    async fn test_write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScratchStore::with_ttl(
            dir.path().join("nested/deeper/out.txt"),
            Duration::from_secs(60),
        );

        store.write("data").await.unwrap();
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_file_expires_after_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScratchStore::with_ttl(dir.path().join("out.txt"), Duration::from_millis(50));

        store.write("short lived").await.unwrap();
        assert!(store.path().exists());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_newer_write_postpones_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = ScratchStore::with_ttl(dir.path().join("out.txt"), Duration::from_millis(200));

        store.write("old").await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        store.write("new").await.unwrap();

        // First timer has fired by now but sees a newer generation.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "new");

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!store.path().exists());
    }
}
