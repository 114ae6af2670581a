//! Cache facade (§4.6): a uniform `get`/`set` contract over pluggable
//! backends. Errors never fail a render — the facade logs and returns a
//! miss instead.

mod disk;
mod noop;
mod object_store;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::artifact::{Artifact, CacheKey};
use crate::config::{CacheBackendKind, GatewayConfig};

pub use disk::DiskCache;
pub use noop::NoopCache;
pub use object_store::ObjectStoreCache;

/// A pluggable cache backend. `get` returns `Ok(None)` on a clean miss;
/// backend errors are logged by the facade and treated as a miss too.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &CacheKey) -> anyhow::Result<Option<Artifact>>;
    async fn set(&self, key: &CacheKey, artifact: &Artifact, ttl: Duration) -> anyhow::Result<()>;
}

/// Facade handed to the coordinator; wraps whichever backend the config
/// selected and never lets a backend error escape into the render path.
#[derive(Clone)]
pub struct CacheFacade {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl CacheFacade {
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> anyhow::Result<Self> {
        let backend: Arc<dyn CacheBackend> = match config.cache_backend() {
            CacheBackendKind::None => Arc::new(NoopCache),
            CacheBackendKind::Disk => {
                let root = config
                    .cache_root()
                    .ok_or_else(|| anyhow::anyhow!("cache_backend=disk requires cache_root"))?;
                Arc::new(DiskCache::new(root.clone(), config.cache_ttl()))
            }
            CacheBackendKind::ObjectStore => {
                let url = config.cache_object_store_url().ok_or_else(|| {
                    anyhow::anyhow!("cache_backend=object-store requires cache_object_store_url")
                })?;
                Arc::new(ObjectStoreCache::new(url.to_string())?)
            }
        };
        Ok(Self {
            backend,
            ttl: config.cache_ttl(),
        })
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Artifact> {
        match self.backend.get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, key = %key.to_storage_key(), "cache get failed, treating as miss");
                None
            }
        }
    }

    pub async fn set(&self, key: &CacheKey, artifact: &Artifact) {
        if let Err(e) = self.backend.set(key, artifact, self.ttl).await {
            warn!(error = %e, key = %key.to_storage_key(), "cache set failed");
        }
    }
}
