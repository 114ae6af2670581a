use async_trait::async_trait;
use std::time::Duration;

use super::CacheBackend;
use crate::artifact::{Artifact, CacheKey};

/// Always-miss backend, the default (§4.6).
pub struct NoopCache;

#[async_trait]
impl CacheBackend for NoopCache {
    async fn get(&self, _key: &CacheKey) -> anyhow::Result<Option<Artifact>> {
        Ok(None)
    }

    async fn set(&self, _key: &CacheKey, _artifact: &Artifact, _ttl: Duration) -> anyhow::Result<()> {
        Ok(())
    }
}
