use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::CacheBackend;
use crate::artifact::{Artifact, CacheKey, Format};

/// One file per key under `root`, written atomically via temp+rename;
/// freshness is derived from the blob's mtime against `ttl`, so an
/// operator can simply `touch` or delete files by hand.
pub struct DiskCache {
    root: PathBuf,
    ttl: Duration,
}

#[derive(Serialize, Deserialize)]
struct Meta {
    format: Format,
}

impl DiskCache {
    #[must_use]
    pub fn new(root: PathBuf, ttl: Duration) -> Self {
        Self { root, ttl }
    }

    fn blob_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.bin", key.to_storage_key()))
    }

    fn meta_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}.meta.json", key.to_storage_key()))
    }
}

#[async_trait]
impl CacheBackend for DiskCache {
    async fn get(&self, key: &CacheKey) -> anyhow::Result<Option<Artifact>> {
        let blob_path = self.blob_path(key);
        let meta_path = self.meta_path(key);

        let metadata = match tokio::fs::metadata(&blob_path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let age = metadata
            .modified()?
            .elapsed()
            .unwrap_or(Duration::from_secs(0));
        if age > self.ttl {
            return Ok(None);
        }

        let meta_raw = match tokio::fs::read(&meta_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let meta: Meta = serde_json::from_slice(&meta_raw)?;
        let bytes = tokio::fs::read(&blob_path).await?;

        Ok(Some(Artifact::new(meta.format, bytes)))
    }

    async fn set(
        &self,
        key: &CacheKey,
        artifact: &Artifact,
        _ttl: Duration,
    ) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;

        let blob_path = self.blob_path(key);
        let tmp_path = self
            .root
            .join(format!("{}.tmp-{}", key.to_storage_key(), std::process::id()));
        tokio::fs::write(&tmp_path, &artifact.bytes).await?;
        tokio::fs::rename(&tmp_path, &blob_path).await?;

        let meta = Meta {
            format: artifact.format,
        };
        tokio::fs::write(self.meta_path(key), serde_json::to_vec(&meta)?).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{Format, RenderRequest};

    #[tokio::test]
    async fn round_trips_through_temp_rename() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().to_path_buf(), Duration::from_secs(60));
        let key = RenderRequest::new("https://example.com", Format::Html)
            .cache_key()
            .unwrap();
        let artifact = Artifact::new(Format::Html, b"<html></html>".to_vec());

        assert!(cache.get(&key).await.unwrap().is_none());
        cache.set(&key, &artifact, Duration::from_secs(60)).await.unwrap();
        let hit = cache.get(&key).await.unwrap().unwrap();
        assert_eq!(hit.bytes, artifact.bytes);
        assert_eq!(hit.format, Format::Html);
    }

    #[tokio::test]
    async fn expires_past_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().to_path_buf(), Duration::from_millis(10));
        let key = RenderRequest::new("https://example.com", Format::Html)
            .cache_key()
            .unwrap();
        let artifact = Artifact::new(Format::Html, b"<html></html>".to_vec());
        cache.set(&key, &artifact, Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get(&key).await.unwrap().is_none());
    }
}
