//! Bounded page pool (§4.3). Sessions are acquired through a scoped guard
//! whose `Drop` releases the session as unhealthy unless the caller marks it
//! healthy first, so a panicking or cancelled render can't leak a session
//! into `busy` forever.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::GatewayError;
use crate::session::PageSession;

/// Produces fresh page sessions backed by a new CDP target. Implemented by
/// the coordinator's browser handle; mocked in tests.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self) -> Result<PageSession, GatewayError>;
}

type Waiter = oneshot::Sender<Result<PageSession, GatewayError>>;

struct PoolState {
    idle: Vec<PageSession>,
    /// Total sessions counted against capacity: `idle.len() + busy`.
    total: usize,
    waiters: VecDeque<Waiter>,
}

#[derive(Clone)]
pub struct PagePool {
    state: Arc<Mutex<PoolState>>,
    factory: Arc<dyn SessionFactory>,
    capacity: usize,
}

impl PagePool {
    #[must_use]
    pub fn new(capacity: usize, factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            state: Arc::new(Mutex::new(PoolState {
                idle: Vec::new(),
                total: 0,
                waiters: VecDeque::new(),
            })),
            factory,
            capacity,
        }
    }

    /// Returns an idle session, creates a new one if under capacity, or
    /// enqueues on the FIFO waitlist until one is released or `deadline`
    /// passes (§4.3).
    pub async fn acquire(&self, deadline: Instant) -> Result<PageGuard, GatewayError> {
        enum Plan {
            Idle(PageSession),
            Create,
            Wait(oneshot::Receiver<Result<PageSession, GatewayError>>),
        }

        let plan = {
            let mut state = self.state.lock();
            if let Some(session) = state.idle.pop() {
                Plan::Idle(session)
            } else if state.total < self.capacity {
                state.total += 1;
                Plan::Create
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Plan::Wait(rx)
            }
        };

        let session = match plan {
            Plan::Idle(session) => session,
            Plan::Create => match self.factory.create().await {
                Ok(session) => session,
                Err(e) => {
                    self.state.lock().total -= 1;
                    return Err(e);
                }
            },
            Plan::Wait(rx) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match tokio::time::timeout(remaining, rx).await {
                    Ok(Ok(Ok(session))) => session,
                    Ok(Ok(Err(e))) => return Err(e),
                    Ok(Err(_)) | Err(_) => return Err(GatewayError::PoolExhausted),
                }
            }
        };

        Ok(PageGuard {
            session: Some(session),
            healthy: false,
            pool: self.clone(),
        })
    }

    /// Returns a session to the pool, or destroys it and (if a waiter is
    /// queued) attempts to create a replacement for them. Called only from
    /// `PageGuard::drop`.
    async fn release(&self, mut session: PageSession, healthy: bool) {
        if healthy && session.usable() {
            let waiter = {
                let mut state = self.state.lock();
                state.waiters.pop_front()
            };
            match waiter {
                Some(tx) => {
                    // If the waiter already gave up, reclaim the session
                    // instead of dropping it on the floor.
                    if let Err(Ok(returned)) = tx.send(Ok(session)) {
                        self.state.lock().idle.push(returned);
                    }
                }
                None => {
                    self.state.lock().idle.push(session);
                }
            }
            return;
        }

        let waiter = {
            let mut state = self.state.lock();
            state.total -= 1;
            state.waiters.pop_front()
        };
        session.close().await;

        if let Some(tx) = waiter {
            match self.factory.create().await {
                Ok(new_session) => {
                    self.state.lock().total += 1;
                    let _ = tx.send(Ok(new_session));
                }
                Err(e) => {
                    warn!(error = %e, "failed to create replacement session for waiter");
                    let _ = tx.send(Err(e));
                }
            }
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// RAII loan of a [`PageSession`]. Dropping the guard without calling
/// [`PageGuard::mark_healthy`] releases the session as unhealthy, which
/// destroys it (§4.3).
pub struct PageGuard {
    session: Option<PageSession>,
    healthy: bool,
    pool: PagePool,
}

impl PageGuard {
    pub fn mark_healthy(&mut self) {
        self.healthy = true;
    }

    pub fn session_mut(&mut self) -> &mut PageSession {
        self.session
            .as_mut()
            .expect("session only taken on drop")
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            let pool = self.pool.clone();
            let healthy = self.healthy;
            tokio::spawn(async move {
                pool.release(session, healthy).await;
            });
        }
    }
}
