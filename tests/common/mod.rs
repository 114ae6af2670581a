//! A minimal fake CDP endpoint for integration tests: accepts any number of
//! websocket connections and acknowledges every command with a canned
//! result, optionally emitting a `Page.frameStartedLoading` event right
//! after a `Page.navigate` call. Enough to exercise pool/session bookkeeping
//! without a real browser.

use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

/// Drives the fake server's `Runtime.evaluate` responses for
/// `window.prerenderReady`, so tests can steer the readiness polling loop
/// down a specific branch. Shared and mutable so a test can flip it mid-run.
#[derive(Clone)]
pub struct FakeReadiness(Arc<Mutex<Option<bool>>>);

impl FakeReadiness {
    #[must_use]
    pub fn new(initial: Option<bool>) -> Self {
        Self(Arc::new(Mutex::new(initial)))
    }

    pub fn set(&self, value: Option<bool>) {
        *self.0.lock().unwrap() = value;
    }
}

pub struct FakeCdpServer {
    pub addr: std::net::SocketAddr,
    _handle: tokio::task::JoinHandle<()>,
}

impl FakeCdpServer {
    /// Spawns a server that always reports `window.prerenderReady === true`,
    /// suitable for tests that just need a render to complete quickly.
    pub async fn spawn() -> Self {
        Self::spawn_with_readiness(FakeReadiness::new(Some(true))).await
    }

    /// Spawns a server whose readiness answers are driven by `readiness`.
    pub async fn spawn_with_readiness(readiness: FakeReadiness) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => break,
                };
                let readiness = readiness.clone();
                tokio::spawn(async move {
                    let ws = match tokio_tungstenite::accept_async(stream).await {
                        Ok(ws) => ws,
                        Err(_) => return,
                    };
                    let (mut write, mut read) = ws.split();
                    while let Some(Ok(Message::Text(text))) = read.next().await {
                        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
                            continue;
                        };
                        let Some(id) = frame.get("id").and_then(Value::as_u64) else {
                            continue;
                        };
                        let method = frame.get("method").and_then(Value::as_str).unwrap_or_default();

                        if method == "Page.navigate" {
                            let event = json!({ "method": "Page.frameStartedLoading", "params": {} });
                            if write.send(Message::Text(event.to_string())).await.is_err() {
                                break;
                            }
                        }

                        let result = fake_result(method, &readiness);
                        let reply = json!({ "id": id, "result": result });
                        if write.send(Message::Text(reply.to_string())).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        Self {
            addr,
            _handle: handle,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/", self.addr)
    }
}

fn fake_result(method: &str, readiness: &FakeReadiness) -> Value {
    match method {
        "Runtime.evaluate" => match *readiness.0.lock().unwrap() {
            Some(b) => json!({ "result": { "value": b } }),
            None => json!({ "result": {} }),
        },
        "DOM.getDocument" => json!({ "root": { "nodeId": 1 } }),
        "DOM.getOuterHTML" => json!({ "outerHTML": "<html><body>fake</body></html>" }),
        "Page.captureSnapshot" => json!({ "data": "From: fake\nfake mhtml snapshot" }),
        "Page.printToPDF" => json!({ "data": base64_of(b"%PDF-fake") }),
        "Page.captureScreenshot" => json!({ "data": base64_of(b"\x89PNG-fake") }),
        _ => json!({}),
    }
}

fn base64_of(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
