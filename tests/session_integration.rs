//! Exercises `PageSession`'s render state machine against a fake CDP
//! endpoint (§4.2, §8): the `max_iterations` recycle boundary, the
//! `prerenderReady === false` indefinite-timeout boundary, and the
//! format-specific extraction branches.

mod common;

use common::{FakeCdpServer, FakeReadiness};
use prerender_gateway::cdp::CdpTransport;
use prerender_gateway::policy::PolicyFilter;
use prerender_gateway::{Format, GatewayError, PageSession, RenderRequest};
use std::time::{Duration, Instant};

async fn session_against(server: &FakeCdpServer, max_iterations: u32) -> PageSession {
    let transport = CdpTransport::connect(&server.ws_url()).await.unwrap();
    PageSession::new(
        transport,
        "fake-target",
        PolicyFilter::new(false, None),
        Duration::from_millis(5),
        Duration::from_millis(20),
        max_iterations,
        None,
    )
}

fn deadline(millis: u64) -> Instant {
    Instant::now() + Duration::from_millis(millis)
}

#[tokio::test]
async fn becomes_unusable_once_generation_count_reaches_max_iterations() {
    let server = FakeCdpServer::spawn().await;
    let mut session = session_against(&server, 1).await;
    assert!(session.usable());

    let request = RenderRequest::new("https://example.test/", Format::Html);
    let artifact = session.render(&request, deadline(5_000)).await.unwrap();
    assert!(!artifact.bytes.is_empty());

    assert!(
        !session.usable(),
        "a session must stop being usable once generation_count reaches max_iterations"
    );
}

#[tokio::test]
async fn explicit_prerender_ready_false_times_out_instead_of_resolving() {
    let readiness = FakeReadiness::new(Some(false));
    let server = FakeCdpServer::spawn_with_readiness(readiness).await;
    let mut session = session_against(&server, 10).await;

    let request = RenderRequest::new("https://example.test/", Format::Html);
    let result = session.render(&request, deadline(150)).await;

    assert!(
        matches!(result, Err(GatewayError::Timeout)),
        "expected a timeout, got {result:?}"
    );
}

#[tokio::test]
async fn extracts_each_format_with_its_own_cdp_call() {
    let server = FakeCdpServer::spawn().await;
    let mut session = session_against(&server, 10).await;

    for format in [
        Format::Html,
        Format::Mhtml,
        Format::Pdf,
        Format::Png,
        Format::Jpeg,
    ] {
        let request = RenderRequest::new("https://example.test/", format);
        let artifact = session.render(&request, deadline(5_000)).await.unwrap();
        assert_eq!(artifact.format, format);
        assert_eq!(artifact.content_type, format.content_type());
        assert!(!artifact.bytes.is_empty());
    }

    let html = session
        .render(
            &RenderRequest::new("https://example.test/", Format::Html),
            deadline(5_000),
        )
        .await
        .unwrap();
    assert_eq!(
        String::from_utf8(html.bytes).unwrap(),
        "<html><body>fake</body></html>"
    );
}
