//! Creates fresh page sessions against the configured CDP endpoint: one
//! long-lived transport to the browser's `/devtools/browser` target used
//! only to mint new page targets, and one short-lived transport per page
//! handed off to a [`PageSession`] (§6, outbound CDP).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::cdp::CdpTransport;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::policy::PolicyFilter;
use crate::pool::SessionFactory;
use crate::session::PageSession;

#[derive(Deserialize)]
struct BrowserVersion {
    #[serde(rename = "webSocketDebuggerUrl")]
    websocket_debugger_url: String,
}

pub struct BrowserSessionFactory {
    browser_transport: Arc<CdpTransport>,
    page_ws_base: String,
    policy: PolicyFilter,
    poll_interval: Duration,
    network_idle_settle: Duration,
    max_iterations: u32,
    user_agent: Option<String>,
}

impl BrowserSessionFactory {
    /// Discovers the browser's websocket endpoint via `/json/version`,
    /// connects the long-lived browser transport, and derives the base URL
    /// used to address individual pages.
    pub async fn connect(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let version_url = format!("http://{}/json/version", config.cdp_endpoint());
        let version: BrowserVersion = reqwest::get(&version_url)
            .await
            .map_err(|e| GatewayError::Other(anyhow::anyhow!("fetching {version_url}: {e}")))?
            .json()
            .await
            .map_err(|e| GatewayError::Other(anyhow::anyhow!("parsing {version_url}: {e}")))?;

        let browser_transport =
            Arc::new(CdpTransport::connect(&version.websocket_debugger_url).await?);

        let page_ws_base = format!("ws://{}/devtools/page/", config.cdp_endpoint());

        Ok(Self {
            browser_transport,
            page_ws_base,
            policy: PolicyFilter::new(
                config.block_fonts(),
                config.allowed_domains().map(<[String]>::to_vec),
            ),
            poll_interval: config.poll_interval(),
            network_idle_settle: config.network_idle_settle(),
            max_iterations: config.max_iterations(),
            user_agent: config.user_agent().map(str::to_string),
        })
    }
}

#[async_trait]
impl SessionFactory for BrowserSessionFactory {
    async fn create(&self) -> Result<PageSession, GatewayError> {
        let created = self
            .browser_transport
            .call("Target.createTarget", json!({ "url": "about:blank" }))
            .await?;
        let target_id = created
            .get("targetId")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| GatewayError::Other(anyhow::anyhow!("Target.createTarget missing targetId")))?
            .to_string();

        let page_url = format!("{}{}", self.page_ws_base, target_id);
        let transport = CdpTransport::connect(&page_url).await?;

        for method in ["Page.enable", "Network.enable", "DOM.enable", "Runtime.enable"] {
            transport.call(method, json!({})).await?;
        }

        Ok(PageSession::new(
            transport,
            target_id,
            self.policy.clone(),
            self.poll_interval,
            self.network_idle_settle,
            self.max_iterations,
            self.user_agent.clone(),
        ))
    }
}
