//! One websocket connection to a single CDP target (§4.1).
//!
//! A background reader task owns the socket's read half and demultiplexes
//! every inbound frame: replies go to the parked oneshot for their
//! sequence-id, events are broadcast to subscribers. `call` and `events`
//! never touch the socket directly, so they can be issued concurrently
//! without racing each other — mirrors the single-reader-task shape the
//! pack's own CDP session wrappers use for their event-listener fan-out.

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};

use super::messages::{CdpCommand, CdpErrorPayload, CdpEvent, CdpFrame};

const EVENT_BROADCAST_CAPACITY: usize = 1024;

#[derive(Debug, thiserror::Error, Clone)]
pub enum TransportError {
    #[error("CDP socket closed")]
    Closed,
    #[error("CDP websocket error: {0}")]
    Socket(String),
    #[error("malformed CDP frame: {0}")]
    Malformed(String),
    #[error("CDP error {code}: {message}")]
    Protocol { code: i64, message: String },
}

impl From<CdpErrorPayload> for TransportError {
    fn from(e: CdpErrorPayload) -> Self {
        TransportError::Protocol {
            code: e.code,
            message: e.message,
        }
    }
}

type PendingMap = Arc<DashMap<u64, oneshot::Sender<Result<Value, TransportError>>>>;

/// A live CDP connection to one target (browser endpoint or a single page).
pub struct CdpTransport {
    write_tx: tokio::sync::mpsc::UnboundedSender<Message>,
    events_tx: broadcast::Sender<CdpEvent>,
    pending: PendingMap,
    next_id: AtomicU64,
    dead: Arc<AtomicBool>,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl CdpTransport {
    /// Connects to a CDP websocket URL (browser or per-target).
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        debug!(url, "connecting CDP websocket");
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Socket(e.to_string()))?;
        debug!(url, "CDP websocket connected");

        let (mut write_half, mut read_half) = ws.split();
        let (write_tx, mut write_rx) = tokio::sync::mpsc::unbounded_channel::<Message>();
        let (events_tx, _) = broadcast::channel(EVENT_BROADCAST_CAPACITY);
        let pending: PendingMap = Arc::new(DashMap::new());
        let dead = Arc::new(AtomicBool::new(false));

        // Dedicated writer task: serializes sends onto the socket so `call`
        // never has to hold a lock across an await on the sink itself.
        tokio::spawn(async move {
            while let Some(msg) = write_rx.recv().await {
                if write_half.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let reader_pending = Arc::clone(&pending);
        let reader_events = events_tx.clone();
        let reader_dead = Arc::clone(&dead);
        let reader_handle = tokio::spawn(async move {
            loop {
                let raw = match read_half.next().await {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        trace!("CDP websocket closed");
                        break;
                    }
                    Some(Ok(_)) => continue, // binary/ping/pong: not CDP traffic
                    Some(Err(e)) => {
                        warn!(error = %e, "CDP websocket read error");
                        break;
                    }
                };

                let frame: CdpFrame = match serde_json::from_str(&raw) {
                    Ok(f) => f,
                    Err(e) => {
                        warn!(error = %e, "failed to parse CDP frame, dropping");
                        continue;
                    }
                };

                if let Some(id) = frame.id {
                    if let Some((_, tx)) = reader_pending.remove(&id) {
                        let result = match frame.error {
                            Some(err) => Err(TransportError::from(err)),
                            None => Ok(frame.result.unwrap_or(Value::Null)),
                        };
                        let _ = tx.send(result);
                    }
                    continue;
                }

                if let Some(method) = frame.method {
                    let _ = reader_events.send(CdpEvent {
                        method,
                        params: frame.params.unwrap_or(Value::Null),
                    });
                }
            }

            // Connection is dead: fail every outstanding call, drop the
            // broadcast sender so live subscribers observe the stream end.
            reader_dead.store(true, Ordering::SeqCst);
            for entry in reader_pending.iter() {
                let _ = entry.key();
            }
            reader_pending.clear();
        });

        Ok(Self {
            write_tx,
            events_tx,
            pending,
            next_id: AtomicU64::new(1),
            dead,
            reader_handle,
        })
    }

    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst) || self.reader_handle.is_finished()
    }

    /// Issues a CDP command and awaits its matching response (§4.1). Does not
    /// itself enforce a deadline — callers wrap this in `tokio::time::timeout`
    /// using the render's remaining deadline (§5).
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        if self.is_dead() {
            return Err(TransportError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let command = CdpCommand { id, method, params };
        let text = serde_json::to_string(&command)
            .map_err(|e| TransportError::Malformed(e.to_string()))?;

        if self.write_tx.send(Message::Text(text)).is_err() {
            self.pending.remove(&id);
            return Err(TransportError::Closed);
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => {
                // Sender dropped without a reply: the reader task died mid-call.
                Err(TransportError::Closed)
            }
        }
    }

    /// Subscribes to CDP events whose method matches `pattern` exactly,
    /// returning a lazy, cancellable sequence (§4.1). Dropping the
    /// subscription cancels it; no callbacks in the public contract.
    #[must_use]
    pub fn events(&self, pattern: impl Into<String>) -> EventSubscription {
        EventSubscription {
            pattern: pattern.into(),
            receiver: self.events_tx.subscribe(),
        }
    }
}

impl Drop for CdpTransport {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

/// A cancellable, ordered sequence of CDP events matching one method name.
pub struct EventSubscription {
    pattern: String,
    receiver: broadcast::Receiver<CdpEvent>,
}

impl EventSubscription {
    /// Awaits the next event matching this subscription's pattern, skipping
    /// events for other methods (still consuming them from the broadcast so
    /// slow subscribers don't see stale lag against fast-moving unrelated
    /// traffic indefinitely).
    pub async fn next(&mut self) -> Option<CdpEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.method == self.pattern => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, pattern = %self.pattern, "event subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll for an already-buffered matching event, used by
    /// callers that interleave event draining with other polling (§4.2's
    /// interception step running alongside readiness polling).
    pub fn try_next(&mut self) -> Option<CdpEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if event.method == self.pattern => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(skipped = n, pattern = %self.pattern, "event subscriber lagged");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_from_protocol_payload() {
        let payload = CdpErrorPayload {
            code: -32000,
            message: "boom".to_string(),
        };
        let err: TransportError = payload.into();
        match err {
            TransportError::Protocol { code, message } => {
                assert_eq!(code, -32000);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
