//! Loads a [`GatewayConfig`] from environment variables (§6.1), falling back
//! to the builder's defaults for anything unset.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;

use super::builder::GatewayConfigBuilder;
use super::types::{CacheBackendKind, GatewayConfig};

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env_var(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {key}={raw}: {e}")),
        None => Ok(None),
    }
}

impl GatewayConfig {
    /// Builds a config from `GATEWAY_*` environment variables, applying the
    /// same defaults as [`GatewayConfig::builder`] for anything unset.
    pub fn from_env() -> Result<GatewayConfig> {
        let listen_addr: SocketAddr = env_var("GATEWAY_LISTEN_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string())
            .parse()
            .context("GATEWAY_LISTEN_ADDR")?;

        let cdp_endpoint =
            env_var("GATEWAY_CDP_ENDPOINT").unwrap_or_else(|| "127.0.0.1:9222".to_string());

        let mut builder = GatewayConfigBuilder::default()
            .listen_addr(listen_addr)
            .cdp_endpoint(cdp_endpoint);

        if let Some(secs) = parse_env::<u64>("GATEWAY_RENDER_TIMEOUT_SECS")? {
            builder = builder.render_timeout(Duration::from_secs(secs));
        }
        if let Some(ms) = parse_env::<u64>("GATEWAY_POLL_INTERVAL_MS")? {
            builder = builder.poll_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_env::<u64>("GATEWAY_NETWORK_IDLE_MS")? {
            builder = builder.network_idle_settle(Duration::from_millis(ms));
        }
        if let Some(n) = parse_env::<usize>("GATEWAY_CONCURRENCY")? {
            builder = builder.concurrency(n);
        }
        if let Some(n) = parse_env::<u32>("GATEWAY_MAX_ITERATIONS")? {
            builder = builder.max_iterations(n);
        }
        if let Some(ua) = env_var("GATEWAY_USER_AGENT") {
            builder = builder.user_agent(ua);
        }
        if let Some(b) = parse_env::<bool>("GATEWAY_BLOCK_FONTS")? {
            builder = builder.block_fonts(b);
        }
        if let Some(list) = env_var("GATEWAY_ALLOWED_DOMAINS") {
            let domains = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            builder = builder.allowed_domains(domains);
        }
        if let Some(kind) = env_var("GATEWAY_CACHE_BACKEND") {
            let kind = match kind.as_str() {
                "none" => CacheBackendKind::None,
                "disk" => CacheBackendKind::Disk,
                "object-store" => CacheBackendKind::ObjectStore,
                other => anyhow::bail!("invalid GATEWAY_CACHE_BACKEND={other}"),
            };
            builder = builder.cache_backend(kind);
        }
        if let Some(secs) = parse_env::<u64>("GATEWAY_CACHE_TTL_SECS")? {
            builder = builder.cache_ttl(Duration::from_secs(secs));
        }
        if let Some(root) = env_var("GATEWAY_CACHE_ROOT") {
            builder = builder.cache_root(root);
        }
        if let Some(url) = env_var("GATEWAY_CACHE_OBJECT_STORE_URL") {
            builder = builder.cache_object_store_url(url);
        }
        if let Some(b) = parse_env::<bool>("GATEWAY_BREAKER_ENABLED")? {
            builder = builder.breaker_enabled(b);
        }
        if let Some(n) = parse_env::<u32>("GATEWAY_BREAKER_FAIL_MAX")? {
            builder = builder.breaker_fail_max(n);
        }
        if let Some(secs) = parse_env::<u64>("GATEWAY_BREAKER_RESET_SECS")? {
            builder = builder.breaker_reset_timeout(Duration::from_secs(secs));
        }
        if let Some(fmt) = env_var("GATEWAY_LOG_FORMAT") {
            builder = builder.log_json(fmt.eq_ignore_ascii_case("json"));
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // `std::env::set_var` is process-global; serialize the tests in this
    // module so they don't race each other under `cargo test`'s default
    // multi-threaded test runner.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_apply_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("GATEWAY_CONCURRENCY");
        std::env::remove_var("GATEWAY_LISTEN_ADDR");
        std::env::remove_var("GATEWAY_CDP_ENDPOINT");
        let cfg = GatewayConfig::from_env().unwrap();
        assert_eq!(cfg.listen_addr().to_string(), "127.0.0.1:8080");
        assert_eq!(cfg.cdp_endpoint(), "127.0.0.1:9222");
        assert!(cfg.concurrency() >= 1);
    }

    #[test]
    fn rejects_invalid_cache_backend() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("GATEWAY_CACHE_BACKEND", "bogus");
        let err = GatewayConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("GATEWAY_CACHE_BACKEND"));
        std::env::remove_var("GATEWAY_CACHE_BACKEND");
    }
}
