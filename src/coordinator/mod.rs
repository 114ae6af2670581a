//! Render coordinator (§4.4): the single entry point that wires cache,
//! circuit breaker, pool, and session together for one request.

mod browser;

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

pub use browser::BrowserSessionFactory;

use crate::artifact::{Artifact, RenderRequest};
use crate::breaker::CircuitBreaker;
use crate::cache::CacheFacade;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::policy;
use crate::pool::PagePool;

/// A single upstream key shared by every request in this gateway: one CDP
/// endpoint, one breaker state. Kept as a named constant rather than a
/// literal sprinkled through the coordinator.
const UPSTREAM_KEY: &str = "cdp-endpoint";

/// Wires the page pool, circuit breaker, and cache into the single
/// `do_render` operation the HTTP layer calls (§4.4).
#[derive(Clone)]
pub struct RenderCoordinator {
    pool: PagePool,
    breaker: Arc<CircuitBreaker>,
    breaker_enabled: bool,
    cache: CacheFacade,
    allowed_domains: Option<Vec<String>>,
    render_timeout: Duration,
}

impl RenderCoordinator {
    #[must_use]
    pub fn new(
        pool: PagePool,
        breaker: Arc<CircuitBreaker>,
        breaker_enabled: bool,
        cache: CacheFacade,
        allowed_domains: Option<Vec<String>>,
        render_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            breaker,
            breaker_enabled,
            cache,
            allowed_domains,
            render_timeout,
        }
    }

    #[must_use]
    pub fn from_parts(config: &GatewayConfig, pool: PagePool, cache: CacheFacade) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            config.breaker_fail_max(),
            config.breaker_reset_timeout(),
        ));
        Self::new(
            pool,
            breaker,
            config.breaker_enabled(),
            cache,
            config.allowed_domains().map(<[String]>::to_vec),
            config.render_timeout(),
        )
    }

    /// Runs the steps of §4.4 in order: domain check, cache get, breaker
    /// check, acquire, render, release + record + cache put. The domain
    /// check happens before any pool acquisition or CDP traffic, so a
    /// disallowed host is rejected without ever touching the browser (§8).
    #[instrument(skip(self, request), fields(url = %request.url, format = %request.format))]
    pub async fn do_render(&self, request: RenderRequest) -> Result<Artifact, GatewayError> {
        let canonical_url = request.canonical_url()?;
        let host = policy::host_of(&canonical_url);
        if !policy::is_host_allowed(&host, self.allowed_domains.as_deref()) {
            return Err(GatewayError::Policy(format!("{host} is not on the allow-list")));
        }

        let cache_key = request.cache_key()?;

        if let Some(hit) = self.cache.get(&cache_key).await {
            info!("cache hit");
            return Ok(hit);
        }

        if self.breaker_enabled && !self.breaker.should_attempt(UPSTREAM_KEY) {
            return Err(GatewayError::UpstreamOpen);
        }

        let deadline = Instant::now() + self.render_timeout;
        let mut guard = self.pool.acquire(deadline).await?;

        let result = guard.session_mut().render(&request, deadline).await;

        match &result {
            Ok(_) => {
                guard.mark_healthy();
                if self.breaker_enabled {
                    self.breaker.record_success(UPSTREAM_KEY);
                }
            }
            Err(e) => {
                if !e.condemns_session() {
                    guard.mark_healthy();
                }
                if self.breaker_enabled && e.counts_as_breaker_failure() {
                    self.breaker.record_failure(UPSTREAM_KEY);
                }
                warn!(error = %e, "render failed");
            }
        }

        let artifact = result?;
        self.cache.set(&cache_key, &artifact).await;
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Format;
    use crate::cache::CacheFacade;
    use crate::pool::SessionFactory;
    use crate::session::PageSession;
    use async_trait::async_trait;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct PanicsIfCalled(Arc<AtomicBool>);

    #[async_trait]
    impl SessionFactory for PanicsIfCalled {
        async fn create(&self) -> Result<PageSession, GatewayError> {
            self.0.store(true, Ordering::SeqCst);
            Err(GatewayError::Other(anyhow::anyhow!(
                "factory must never be called for a blocked host"
            )))
        }
    }

    fn test_config() -> GatewayConfig {
        GatewayConfig::builder()
            .listen_addr("127.0.0.1:0".parse::<SocketAddr>().unwrap())
            .cdp_endpoint("127.0.0.1:9222")
            .allowed_domains(vec!["allowed.example".to_string()])
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn blocked_host_never_reaches_the_pool() {
        let config = test_config();
        let called = Arc::new(AtomicBool::new(false));
        let factory: Arc<dyn SessionFactory> = Arc::new(PanicsIfCalled(called.clone()));
        let pool = PagePool::new(1, factory);
        let cache = CacheFacade::from_config(&config).unwrap();
        let coordinator = RenderCoordinator::from_parts(&config, pool, cache);

        let request = RenderRequest::new("https://blocked.example/", Format::Html);
        let result = coordinator.do_render(request).await;

        assert!(matches!(result, Err(GatewayError::Policy(_))));
        assert!(
            !called.load(Ordering::SeqCst),
            "pool/factory must not be touched for a blocked host"
        );
    }

    #[tokio::test]
    async fn allowed_host_reaches_the_pool() {
        let config = test_config();
        let called = Arc::new(AtomicBool::new(false));
        let factory: Arc<dyn SessionFactory> = Arc::new(PanicsIfCalled(called.clone()));
        let pool = PagePool::new(1, factory);
        let cache = CacheFacade::from_config(&config).unwrap();
        let coordinator = RenderCoordinator::from_parts(&config, pool, cache);

        let request = RenderRequest::new("https://allowed.example/", Format::Html);
        let result = coordinator.do_render(request).await;

        // The stub factory always errors, but it must have been reached.
        assert!(result.is_err());
        assert!(called.load(Ordering::SeqCst));
    }
}
