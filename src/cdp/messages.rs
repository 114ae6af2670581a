//! Wire types for CDP JSON-RPC-like frames (§4.1, §6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound `{id, method, params}` command frame.
#[derive(Debug, Serialize)]
pub struct CdpCommand<'a> {
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

/// Either a response to a command (`id` present) or an unsolicited event
/// (`method` present with no `id`). CDP never sends both on the same frame.
#[derive(Debug, Deserialize)]
pub struct CdpFrame {
    pub id: Option<u64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<CdpErrorPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CdpErrorPayload {
    pub code: i64,
    pub message: String,
}

/// A demultiplexed CDP event, ready for broadcast to `events()` subscribers.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
}
