//! Page session: owns one CDP target and drives the navigation state
//! machine described in §4.2 (configure → navigate → intercept → await
//! readiness → extract → reset).

mod interception;

use serde_json::json;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::artifact::{Artifact, Format, RenderRequest};
use crate::cdp::{CdpTransport, EventSubscription};
use crate::error::{GatewayError, NavigateError};
use crate::policy::PolicyFilter;

pub use interception::InterceptOutcome;

const NAVIGATE_ACK_BUDGET: Duration = Duration::from_secs(2);
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns one browser tab. Reused across renders until unhealthy or
/// `generation_count` reaches `max_iterations`.
pub struct PageSession {
    transport: CdpTransport,
    target_id: String,
    policy: PolicyFilter,
    poll_interval: Duration,
    network_idle_settle: Duration,
    max_iterations: u32,
    generation_count: u32,
    user_agent: Option<String>,
    user_agent_applied: bool,
    current_url: Option<String>,
    healthy: bool,
}

impl PageSession {
    #[must_use]
    pub fn new(
        transport: CdpTransport,
        target_id: impl Into<String>,
        policy: PolicyFilter,
        poll_interval: Duration,
        network_idle_settle: Duration,
        max_iterations: u32,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            transport,
            target_id: target_id.into(),
            policy,
            poll_interval,
            network_idle_settle,
            max_iterations,
            generation_count: 0,
            user_agent,
            user_agent_applied: false,
            current_url: None,
            healthy: true,
        }
    }

    /// True iff the session is still healthy and hasn't hit its recycle
    /// threshold (§4.2, §4.3).
    #[must_use]
    pub fn usable(&self) -> bool {
        self.healthy && !self.transport.is_dead() && self.generation_count < self.max_iterations
    }

    #[must_use]
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    fn deadline_budget(deadline: Instant, ceiling: Duration) -> Duration {
        let remaining = deadline.saturating_duration_since(Instant::now());
        remaining.min(ceiling)
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
        deadline: Instant,
        ceiling: Duration,
    ) -> Result<serde_json::Value, GatewayError> {
        let budget = Self::deadline_budget(deadline, ceiling);
        if budget.is_zero() {
            return Err(GatewayError::Timeout);
        }
        match timeout(budget, self.transport.call(method, params)).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(GatewayError::Timeout),
        }
    }

    /// Runs the full render state machine for one request against this
    /// session. On any error the caller must treat the session per
    /// `GatewayError::condemns_session`.
    #[instrument(skip(self, request), fields(target = %self.target_id, url = %request.url))]
    pub async fn render(
        &mut self,
        request: &RenderRequest,
        deadline: Instant,
    ) -> Result<Artifact, GatewayError> {
        self.configure(request, deadline).await?;
        self.navigate(&request.url, deadline).await?;
        self.await_readiness(deadline).await?;
        let artifact = self.extract(request, deadline).await?;
        self.reset(deadline).await?;
        self.generation_count += 1;
        Ok(artifact)
    }

    /// Step 1: the user-agent override is applied once per session (from
    /// config, not per-request) and is a no-op on subsequent renders.
    async fn configure(
        &mut self,
        request: &RenderRequest,
        deadline: Instant,
    ) -> Result<(), GatewayError> {
        if !self.user_agent_applied {
            if let Some(ua) = self.user_agent.clone() {
                self.call(
                    "Network.setUserAgentOverride",
                    json!({ "userAgent": ua }),
                    deadline,
                    DEFAULT_CALL_TIMEOUT,
                )
                .await?;
            }
            self.user_agent_applied = true;
        }

        let width = request.options.viewport_width.unwrap_or(1280);
        let height = request.options.viewport_height.unwrap_or(800);
        self.call(
            "Emulation.setDeviceMetricsOverride",
            json!({
                "width": width,
                "height": height,
                "deviceScaleFactor": 1,
                "mobile": false,
            }),
            deadline,
            DEFAULT_CALL_TIMEOUT,
        )
        .await?;

        self.call(
            "Network.setRequestInterception",
            json!({ "patterns": [{ "urlPattern": "*" }] }),
            deadline,
            DEFAULT_CALL_TIMEOUT,
        )
        .await?;

        Ok(())
    }

    /// Step 2: navigate and require a `frameStartedLoading` ack within a
    /// short bound.
    async fn navigate(&mut self, url: &str, deadline: Instant) -> Result<(), GatewayError> {
        self.current_url = Some(url.to_string());
        let mut ack = self.transport.events("Page.frameStartedLoading");
        self.call(
            "Page.navigate",
            json!({ "url": url }),
            deadline,
            DEFAULT_CALL_TIMEOUT,
        )
        .await
        .map_err(|e| match e {
            GatewayError::Transport(_) | GatewayError::Timeout => e,
            other => GatewayError::Navigate(NavigateError::upstream(other.to_string())),
        })?;

        let budget = Self::deadline_budget(deadline, NAVIGATE_ACK_BUDGET);
        if budget.is_zero() {
            return Err(GatewayError::Timeout);
        }
        match timeout(budget, ack.next()).await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(GatewayError::Transport(
                "CDP event stream closed awaiting navigation ack".to_string(),
            )),
            Err(_) => Err(GatewayError::Navigate(NavigateError::upstream(
                "no frameStartedLoading observed",
            ))),
        }
    }

    /// Step 3 runs concurrently with step 4 in a real browser (interception
    /// events arrive as navigation proceeds); here we drain and answer them
    /// inline via `Network.requestIntercepted` events while polling for
    /// readiness, delegating the continue/fail decision to the policy
    /// filter (§4.7).
    async fn drain_intercepted(
        &self,
        main_url: &str,
        events: &mut EventSubscription,
    ) -> Result<(), GatewayError> {
        while let Some(event) = events.try_next() {
            let outcome = self.policy.decide(main_url, &event.params);
            self.answer_interception(&event.params, outcome).await?;
        }
        Ok(())
    }

    async fn answer_interception(
        &self,
        params: &serde_json::Value,
        outcome: InterceptOutcome,
    ) -> Result<(), GatewayError> {
        let interception_id = params
            .get("interceptionId")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();

        let body = match outcome {
            InterceptOutcome::Continue => json!({ "interceptionId": interception_id }),
            InterceptOutcome::Fail => json!({
                "interceptionId": interception_id,
                "errorReason": "BlockedByClient",
            }),
        };

        // Best-effort: the browser may have already timed the interception
        // out under a slow policy decision, which isn't fatal to the render.
        if let Err(e) = self
            .transport
            .call("Network.continueInterceptedRequest", body)
            .await
        {
            warn!(error = %e, "failed to answer intercepted request");
        }
        Ok(())
    }

    /// Step 4: poll `window.prerenderReady` (or fall back to load+idle) on a
    /// fixed interval until ready or the deadline is reached.
    async fn await_readiness(&mut self, deadline: Instant) -> Result<(), GatewayError> {
        let main_url = self.primary_url_hint();
        let mut intercepted = self.transport.events("Network.requestIntercepted");
        let mut load_fired = self.transport.events("Page.loadEventFired");
        let mut has_loaded = false;
        let mut idle_since: Option<Instant> = None;

        loop {
            self.drain_intercepted(&main_url, &mut intercepted).await?;

            if Instant::now() >= deadline {
                return Err(GatewayError::Timeout);
            }

            if !has_loaded && load_fired.try_next().is_some() {
                has_loaded = true;
            }

            let ready = self
                .call(
                    "Runtime.evaluate",
                    json!({
                        "expression": "window.prerenderReady",
                        "returnByValue": true,
                    }),
                    deadline,
                    DEFAULT_CALL_TIMEOUT,
                )
                .await?;

            let explicit = ready
                .get("result")
                .and_then(|r| r.get("value"))
                .cloned();

            match explicit {
                Some(serde_json::Value::Bool(true)) => return Ok(()),
                Some(serde_json::Value::Bool(false)) => {
                    idle_since = None;
                }
                _ => {
                    if has_loaded {
                        let now = Instant::now();
                        let since = *idle_since.get_or_insert(now);
                        if now.duration_since(since) >= self.network_idle_settle {
                            return Ok(());
                        }
                    }
                }
            }

            let sleep_for = self.poll_interval.min(
                deadline.saturating_duration_since(Instant::now()),
            );
            if sleep_for.is_zero() {
                return Err(GatewayError::Timeout);
            }
            tokio::time::sleep(sleep_for).await;
        }
    }

    fn primary_url_hint(&self) -> String {
        self.current_url.clone().unwrap_or_default()
    }

    /// Step 5: format-specific extraction call.
    async fn extract(
        &self,
        request: &RenderRequest,
        deadline: Instant,
    ) -> Result<Artifact, GatewayError> {
        let bytes = match request.format {
            Format::Html => {
                let doc = self
                    .call(
                        "DOM.getDocument",
                        json!({}),
                        deadline,
                        DEFAULT_CALL_TIMEOUT,
                    )
                    .await?;
                let node_id = doc
                    .get("root")
                    .and_then(|r| r.get("nodeId"))
                    .cloned()
                    .ok_or_else(|| {
                        GatewayError::Extract("DOM.getDocument missing root nodeId".to_string())
                    })?;
                let outer = self
                    .call(
                        "DOM.getOuterHTML",
                        json!({ "nodeId": node_id }),
                        deadline,
                        DEFAULT_CALL_TIMEOUT,
                    )
                    .await?;
                let html = outer
                    .get("outerHTML")
                    .and_then(serde_json::Value::as_str)
                    .ok_or_else(|| {
                        GatewayError::Extract("DOM.getOuterHTML missing outerHTML".to_string())
                    })?;
                html.as_bytes().to_vec()
            }
            Format::Mhtml => {
                let snap = self
                    .call(
                        "Page.captureSnapshot",
                        json!({ "format": "mhtml" }),
                        deadline,
                        DEFAULT_CALL_TIMEOUT,
                    )
                    .await?;
                snap.get("data")
                    .and_then(serde_json::Value::as_str)
                    .ok_or_else(|| {
                        GatewayError::Extract("Page.captureSnapshot missing data".to_string())
                    })?
                    .as_bytes()
                    .to_vec()
            }
            Format::Pdf => {
                let mut params = serde_json::Map::new();
                if let Some(w) = request.options.paper_width_in {
                    params.insert("paperWidth".to_string(), json!(w));
                }
                if let Some(h) = request.options.paper_height_in {
                    params.insert("paperHeight".to_string(), json!(h));
                }
                let pdf = self
                    .call(
                        "Page.printToPDF",
                        serde_json::Value::Object(params),
                        deadline,
                        DEFAULT_CALL_TIMEOUT,
                    )
                    .await?;
                decode_base64_field(&pdf, "data")?
            }
            Format::Png | Format::Jpeg => {
                let format_name = if request.format == Format::Png {
                    "png"
                } else {
                    "jpeg"
                };
                let mut params = serde_json::Map::new();
                params.insert("format".to_string(), json!(format_name));
                if let Some(q) = request.options.quality {
                    params.insert("quality".to_string(), json!(q));
                }
                let shot = self
                    .call(
                        "Page.captureScreenshot",
                        serde_json::Value::Object(params),
                        deadline,
                        DEFAULT_CALL_TIMEOUT,
                    )
                    .await?;
                decode_base64_field(&shot, "data")?
            }
        };

        debug!(bytes = bytes.len(), format = %request.format, "extracted artifact");
        Ok(Artifact::new(request.format, bytes))
    }

    /// Step 6: navigate to `about:blank`, drop interception, bump the
    /// recycle counter.
    async fn reset(&mut self, deadline: Instant) -> Result<(), GatewayError> {
        self.call(
            "Page.navigate",
            json!({ "url": "about:blank" }),
            deadline,
            DEFAULT_CALL_TIMEOUT,
        )
        .await?;
        self.call(
            "Network.setRequestInterception",
            json!({ "patterns": [] }),
            deadline,
            DEFAULT_CALL_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    /// Idempotent teardown: closes the CDP target and drops the transport.
    pub async fn close(&mut self) {
        if !self.healthy {
            return;
        }
        self.healthy = false;
        let _ = self
            .transport
            .call("Target.closeTarget", json!({ "targetId": self.target_id }))
            .await;
    }
}

fn decode_base64_field(value: &serde_json::Value, field: &str) -> Result<Vec<u8>, GatewayError> {
    use base64::Engine;
    let raw = value
        .get(field)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| GatewayError::Extract(format!("response missing {field}")))?;
    base64::engine::general_purpose::STANDARD
        .decode(raw)
        .map_err(|e| GatewayError::Extract(format!("invalid base64 in {field}: {e}")))
}
