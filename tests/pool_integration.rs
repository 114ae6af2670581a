//! Exercises the page pool's capacity and FIFO-waitlist invariants (§4.3,
//! §8) against real `PageSession`s backed by a fake CDP endpoint, so no
//! live browser is required.

mod common;

use async_trait::async_trait;
use common::FakeCdpServer;
use prerender_gateway::cdp::CdpTransport;
use prerender_gateway::policy::PolicyFilter;
use prerender_gateway::{GatewayError, PagePool, PageSession, SessionFactory};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct FakeSessionFactory {
    ws_url: String,
    counter: AtomicU32,
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn create(&self) -> Result<PageSession, GatewayError> {
        let transport = CdpTransport::connect(&self.ws_url).await?;
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(PageSession::new(
            transport,
            format!("fake-{id}"),
            PolicyFilter::new(false, None),
            Duration::from_millis(10),
            Duration::from_millis(10),
            200,
            None,
        ))
    }
}

fn deadline(secs: u64) -> Instant {
    Instant::now() + Duration::from_secs(secs)
}

#[tokio::test]
async fn acquire_creates_up_to_capacity_then_waits() {
    let server = FakeCdpServer::spawn().await;
    let factory = Arc::new(FakeSessionFactory {
        ws_url: server.ws_url(),
        counter: AtomicU32::new(0),
    });
    let pool = PagePool::new(2, factory);

    let g1 = pool.acquire(deadline(5)).await.unwrap();
    let g2 = pool.acquire(deadline(5)).await.unwrap();

    // Capacity is 2 and both are on loan; a third acquire must wait and
    // time out against a short deadline rather than over-allocate.
    let third = pool.acquire(Instant::now() + Duration::from_millis(50)).await;
    assert!(matches!(third, Err(GatewayError::PoolExhausted)));

    drop(g1);
    drop(g2);
}

#[tokio::test]
async fn released_healthy_session_unblocks_a_waiter() {
    let server = FakeCdpServer::spawn().await;
    let factory = Arc::new(FakeSessionFactory {
        ws_url: server.ws_url(),
        counter: AtomicU32::new(0),
    });
    let pool = PagePool::new(1, factory);

    let mut first = pool.acquire(deadline(5)).await.unwrap();
    first.mark_healthy();

    let pool_clone = pool.clone();
    let waiter = tokio::spawn(async move { pool_clone.acquire(deadline(5)).await });

    // Give the waiter a moment to enqueue before releasing.
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(first);

    let second = waiter.await.unwrap();
    assert!(second.is_ok());
}

#[tokio::test]
async fn unhealthy_release_destroys_the_session_and_frees_capacity() {
    let server = FakeCdpServer::spawn().await;
    let factory = Arc::new(FakeSessionFactory {
        ws_url: server.ws_url(),
        counter: AtomicU32::new(0),
    });
    let pool = PagePool::new(1, factory);

    let guard = pool.acquire(deadline(5)).await.unwrap();
    // No `mark_healthy()` call: dropping condemns the session.
    drop(guard);

    // A fresh acquire must succeed promptly since capacity was freed.
    let reacquired = pool.acquire(deadline(5)).await;
    assert!(reacquired.is_ok());
}
