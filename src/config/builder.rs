//! Type-safe builder for `GatewayConfig` using the typestate pattern.
//!
//! Mirrors the two-required-field typestate builder the crawler config used:
//! the listen address and CDP endpoint must both be supplied before `build()`
//! becomes callable, everything else carries a documented default (§6.1).

use anyhow::{anyhow, Result};
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use super::types::{CacheBackendKind, GatewayConfig};

pub struct WithListenAddr;
pub struct WithCdpEndpoint;

pub struct GatewayConfigBuilder<State = ()> {
    listen_addr: Option<SocketAddr>,
    cdp_endpoint: Option<String>,
    render_timeout: Duration,
    poll_interval: Duration,
    network_idle_settle: Duration,
    concurrency: usize,
    max_iterations: u32,
    user_agent: Option<String>,
    block_fonts: bool,
    allowed_domains: Option<Vec<String>>,
    cache_backend: CacheBackendKind,
    cache_ttl: Duration,
    cache_root: Option<PathBuf>,
    cache_object_store_url: Option<String>,
    breaker_enabled: bool,
    breaker_fail_max: u32,
    breaker_reset_timeout: Duration,
    log_json: bool,
    _phantom: PhantomData<State>,
}

impl Default for GatewayConfigBuilder<()> {
    fn default() -> Self {
        Self {
            listen_addr: None,
            cdp_endpoint: None,
            render_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(200),
            network_idle_settle: Duration::from_millis(500),
            concurrency: 2 * num_cpus::get(),
            max_iterations: 200,
            user_agent: None,
            block_fonts: true,
            allowed_domains: None,
            cache_backend: CacheBackendKind::None,
            cache_ttl: Duration::from_secs(3600),
            cache_root: None,
            cache_object_store_url: None,
            breaker_enabled: true,
            breaker_fail_max: 5,
            breaker_reset_timeout: Duration::from_secs(60),
            log_json: false,
            _phantom: PhantomData,
        }
    }
}

impl GatewayConfig {
    #[must_use]
    pub fn builder() -> GatewayConfigBuilder<()> {
        GatewayConfigBuilder::default()
    }
}

impl GatewayConfigBuilder<()> {
    #[must_use]
    pub fn listen_addr(self, addr: SocketAddr) -> GatewayConfigBuilder<WithListenAddr> {
        GatewayConfigBuilder {
            listen_addr: Some(addr),
            cdp_endpoint: self.cdp_endpoint,
            render_timeout: self.render_timeout,
            poll_interval: self.poll_interval,
            network_idle_settle: self.network_idle_settle,
            concurrency: self.concurrency,
            max_iterations: self.max_iterations,
            user_agent: self.user_agent,
            block_fonts: self.block_fonts,
            allowed_domains: self.allowed_domains,
            cache_backend: self.cache_backend,
            cache_ttl: self.cache_ttl,
            cache_root: self.cache_root,
            cache_object_store_url: self.cache_object_store_url,
            breaker_enabled: self.breaker_enabled,
            breaker_fail_max: self.breaker_fail_max,
            breaker_reset_timeout: self.breaker_reset_timeout,
            log_json: self.log_json,
            _phantom: PhantomData,
        }
    }
}

impl GatewayConfigBuilder<WithListenAddr> {
    #[must_use]
    pub fn cdp_endpoint(self, endpoint: impl Into<String>) -> GatewayConfigBuilder<WithCdpEndpoint> {
        GatewayConfigBuilder {
            listen_addr: self.listen_addr,
            cdp_endpoint: Some(endpoint.into()),
            render_timeout: self.render_timeout,
            poll_interval: self.poll_interval,
            network_idle_settle: self.network_idle_settle,
            concurrency: self.concurrency,
            max_iterations: self.max_iterations,
            user_agent: self.user_agent,
            block_fonts: self.block_fonts,
            allowed_domains: self.allowed_domains,
            cache_backend: self.cache_backend,
            cache_ttl: self.cache_ttl,
            cache_root: self.cache_root,
            cache_object_store_url: self.cache_object_store_url,
            breaker_enabled: self.breaker_enabled,
            breaker_fail_max: self.breaker_fail_max,
            breaker_reset_timeout: self.breaker_reset_timeout,
            log_json: self.log_json,
            _phantom: PhantomData,
        }
    }
}

// Knobs available in any state, mirroring the crawler config's `methods.rs`.
impl<State> GatewayConfigBuilder<State> {
    #[must_use]
    pub fn render_timeout(mut self, d: Duration) -> Self {
        self.render_timeout = d;
        self
    }

    #[must_use]
    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.poll_interval = d;
        self
    }

    #[must_use]
    pub fn network_idle_settle(mut self, d: Duration) -> Self {
        self.network_idle_settle = d;
        self
    }

    #[must_use]
    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n;
        self
    }

    #[must_use]
    pub fn max_iterations(mut self, n: u32) -> Self {
        self.max_iterations = n;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    #[must_use]
    pub fn block_fonts(mut self, block: bool) -> Self {
        self.block_fonts = block;
        self
    }

    #[must_use]
    pub fn allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = Some(domains);
        self
    }

    #[must_use]
    pub fn cache_backend(mut self, kind: CacheBackendKind) -> Self {
        self.cache_backend = kind;
        self
    }

    #[must_use]
    pub fn cache_ttl(mut self, d: Duration) -> Self {
        self.cache_ttl = d;
        self
    }

    #[must_use]
    pub fn cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache_root = Some(root.into());
        self
    }

    #[must_use]
    pub fn cache_object_store_url(mut self, url: impl Into<String>) -> Self {
        self.cache_object_store_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn breaker_enabled(mut self, enabled: bool) -> Self {
        self.breaker_enabled = enabled;
        self
    }

    #[must_use]
    pub fn breaker_fail_max(mut self, n: u32) -> Self {
        self.breaker_fail_max = n;
        self
    }

    #[must_use]
    pub fn breaker_reset_timeout(mut self, d: Duration) -> Self {
        self.breaker_reset_timeout = d;
        self
    }

    #[must_use]
    pub fn log_json(mut self, json: bool) -> Self {
        self.log_json = json;
        self
    }
}

impl GatewayConfigBuilder<WithCdpEndpoint> {
    /// Validates cross-field constraints and produces the final config.
    pub fn build(self) -> Result<GatewayConfig> {
        let listen_addr = self
            .listen_addr
            .ok_or_else(|| anyhow!("listen_addr is required"))?;
        let cdp_endpoint = self
            .cdp_endpoint
            .ok_or_else(|| anyhow!("cdp_endpoint is required"))?;

        if self.concurrency == 0 {
            return Err(anyhow!("concurrency must be at least 1"));
        }
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be at least 1"));
        }
        if self.breaker_reset_timeout.is_zero() {
            return Err(anyhow!("breaker_reset_timeout must be non-zero"));
        }
        if self.breaker_fail_max == 0 {
            return Err(anyhow!("breaker_fail_max must be at least 1"));
        }
        if matches!(self.cache_backend, CacheBackendKind::Disk) && self.cache_root.is_none() {
            return Err(anyhow!("cache_backend=disk requires cache_root"));
        }
        if matches!(self.cache_backend, CacheBackendKind::ObjectStore)
            && self.cache_object_store_url.is_none()
        {
            return Err(anyhow!(
                "cache_backend=object-store requires cache_object_store_url"
            ));
        }

        Ok(GatewayConfig {
            listen_addr,
            cdp_endpoint,
            render_timeout: self.render_timeout,
            poll_interval: self.poll_interval,
            network_idle_settle: self.network_idle_settle,
            concurrency: self.concurrency,
            max_iterations: self.max_iterations,
            user_agent: self.user_agent,
            block_fonts: self.block_fonts,
            allowed_domains: self.allowed_domains,
            cache_backend: self.cache_backend,
            cache_ttl: self.cache_ttl,
            cache_root: self.cache_root,
            cache_object_store_url: self.cache_object_store_url,
            breaker_enabled: self.breaker_enabled,
            breaker_fail_max: self.breaker_fail_max,
            breaker_reset_timeout: self.breaker_reset_timeout,
            log_json: self.log_json,
        })
    }
}
