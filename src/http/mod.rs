//! HTTP front door (§4.9, §6): a thin axum router translating the five
//! path shapes into `RenderRequest`s and mapping coordinator errors onto
//! status codes. No logic beyond translation lives here.

use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::artifact::{Format, RenderRequest};
use crate::coordinator::RenderCoordinator;
use crate::error::GatewayError;

pub fn router(coordinator: RenderCoordinator) -> Router {
    Router::new()
        .route("/*url", get(render_default))
        .route("/html/*url", get(render_html))
        .route("/mhtml/*url", get(render_mhtml))
        .route("/pdf/*url", get(render_pdf))
        .route("/png/*url", get(render_png))
        .route("/jpeg/*url", get(render_jpeg))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(coordinator))
}

async fn render_default(
    State(coordinator): State<Arc<RenderCoordinator>>,
    Path(url): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    render(coordinator, url, query, Format::Html).await
}

async fn render_html(
    State(coordinator): State<Arc<RenderCoordinator>>,
    Path(url): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    render(coordinator, url, query, Format::Html).await
}

async fn render_mhtml(
    State(coordinator): State<Arc<RenderCoordinator>>,
    Path(url): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    render(coordinator, url, query, Format::Mhtml).await
}

async fn render_pdf(
    State(coordinator): State<Arc<RenderCoordinator>>,
    Path(url): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    render(coordinator, url, query, Format::Pdf).await
}

async fn render_png(
    State(coordinator): State<Arc<RenderCoordinator>>,
    Path(url): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    render(coordinator, url, query, Format::Png).await
}

async fn render_jpeg(
    State(coordinator): State<Arc<RenderCoordinator>>,
    Path(url): Path<String>,
    RawQuery(query): RawQuery,
) -> Response {
    render(coordinator, url, query, Format::Jpeg).await
}

/// Reconstructs the remainder-of-path-plus-query-string as the target URL
/// (§6) and drives it through the coordinator.
async fn render(
    coordinator: Arc<RenderCoordinator>,
    path_url: String,
    query: Option<String>,
    format: Format,
) -> Response {
    let url = match query {
        Some(q) if !q.is_empty() => format!("{path_url}?{q}"),
        _ => path_url,
    };

    let request = RenderRequest::new(url, format);
    match coordinator.do_render(request).await {
        Ok(artifact) => {
            let mut response = artifact.bytes.into_response();
            if let Ok(value) = HeaderValue::from_str(artifact.content_type) {
                response
                    .headers_mut()
                    .insert(axum::http::header::CONTENT_TYPE, value);
            }
            response
        }
        Err(e) => gateway_error_response(&e),
    }
}

fn gateway_error_response(error: &GatewayError) -> Response {
    let status: StatusCode = error.status_code();
    (status, error.to_string()).into_response()
}
