// Prerendering gateway: HTTP front door over a headless-Chrome CDP pool.

use anyhow::{Context, Result};
use prerender_gateway::cache::CacheFacade;
use prerender_gateway::config::GatewayConfig;
use prerender_gateway::coordinator::{BrowserSessionFactory, RenderCoordinator};
use prerender_gateway::http::router;
use prerender_gateway::pool::PagePool;
use std::sync::Arc;
use tracing::info;

fn init_tracing(json: bool) {
    let subscriber = tracing_subscriber::fmt().with_env_filter(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    );
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = GatewayConfig::from_env().context("loading gateway configuration")?;
    init_tracing(config.log_json());

    info!(
        listen_addr = %config.listen_addr(),
        cdp_endpoint = config.cdp_endpoint(),
        concurrency = config.concurrency(),
        "starting prerender gateway"
    );

    let factory = Arc::new(BrowserSessionFactory::connect(&config).await?);
    let pool = PagePool::new(config.concurrency(), factory);
    let cache = CacheFacade::from_config(&config)?;
    let coordinator = RenderCoordinator::from_parts(&config, pool, cache);

    let listener = tokio::net::TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("binding {}", config.listen_addr()))?;

    axum::serve(listener, router(coordinator))
        .await
        .context("serving HTTP")?;

    Ok(())
}
