//! Core configuration type for the rendering gateway.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Which cache backend to use (§4.6 / §6.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheBackendKind {
    None,
    Disk,
    ObjectStore,
}

/// Fully resolved, validated configuration for the gateway (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// HTTP bind address for the front door.
    pub(crate) listen_addr: SocketAddr,
    /// Websocket endpoint for the browser's `/devtools/browser` target.
    pub(crate) cdp_endpoint: String,

    pub(crate) render_timeout: Duration,
    pub(crate) poll_interval: Duration,
    pub(crate) network_idle_settle: Duration,
    pub(crate) concurrency: usize,
    pub(crate) max_iterations: u32,

    pub(crate) user_agent: Option<String>,

    pub(crate) block_fonts: bool,
    pub(crate) allowed_domains: Option<Vec<String>>,

    pub(crate) cache_backend: CacheBackendKind,
    pub(crate) cache_ttl: Duration,
    pub(crate) cache_root: Option<PathBuf>,
    pub(crate) cache_object_store_url: Option<String>,

    pub(crate) breaker_enabled: bool,
    pub(crate) breaker_fail_max: u32,
    pub(crate) breaker_reset_timeout: Duration,

    pub(crate) log_json: bool,
}

impl GatewayConfig {
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    #[must_use]
    pub fn cdp_endpoint(&self) -> &str {
        &self.cdp_endpoint
    }

    #[must_use]
    pub fn render_timeout(&self) -> Duration {
        self.render_timeout
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn network_idle_settle(&self) -> Duration {
        self.network_idle_settle
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[must_use]
    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    #[must_use]
    pub fn block_fonts(&self) -> bool {
        self.block_fonts
    }

    #[must_use]
    pub fn allowed_domains(&self) -> Option<&[String]> {
        self.allowed_domains.as_deref()
    }

    #[must_use]
    pub fn cache_backend(&self) -> &CacheBackendKind {
        &self.cache_backend
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    #[must_use]
    pub fn cache_root(&self) -> Option<&PathBuf> {
        self.cache_root.as_ref()
    }

    #[must_use]
    pub fn cache_object_store_url(&self) -> Option<&str> {
        self.cache_object_store_url.as_deref()
    }

    #[must_use]
    pub fn breaker_enabled(&self) -> bool {
        self.breaker_enabled
    }

    #[must_use]
    pub fn breaker_fail_max(&self) -> u32 {
        self.breaker_fail_max
    }

    #[must_use]
    pub fn breaker_reset_timeout(&self) -> Duration {
        self.breaker_reset_timeout
    }

    #[must_use]
    pub fn log_json(&self) -> bool {
        self.log_json
    }
}
