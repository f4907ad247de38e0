//! HTTP routes of the aggregator

use about_core::MetricsCollector;
use about_discovery::ServiceRegistry;
use about_export::cache::build_response;
use about_export::{CacheExporter, Observers, RequestInfo};
use bytes::Bytes;
use http_body_util::Full;
use hyper::http::request::Parts;
use hyper::{header, Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;

/// Shared state behind every connection
pub struct AppState {
    pub cache: Arc<CacheExporter>,
    pub registry: ServiceRegistry,
    pub metrics: MetricsCollector,
    pub observers: Observers,
}

/// Handle one request, notifying the access observers around routing
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let info = RequestInfo::from_request(&req);
    state.observers.request(&info);

    let (parts, _) = req.into_parts();
    let response = route(&parts, &state).await;

    state.observers.response(&info, response.status());
    Ok(response)
}

async fn route(req: &Parts, state: &AppState) -> Response<Full<Bytes>> {
    let method = &req.method;
    match req.uri.path() {
        "/__/about" if method == Method::GET => {
            let accept = req
                .headers
                .get(header::ACCEPT)
                .and_then(|v| v.to_str().ok());
            state.cache.respond(accept).await
        }
        "/reload" if method == Method::POST => reload(state),
        "/metrics" if method == Method::GET => match state.metrics.gather() {
            Ok(text) => build_response(
                StatusCode::OK,
                "text/plain; version=0.0.4",
                Bytes::from(text),
            ),
            Err(e) => {
                debug!("Failed to gather metrics: {}", e);
                build_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain; charset=utf-8",
                    Bytes::from_static(b"Failed to gather metrics\n"),
                )
            }
        },
        "/healthz" if method == Method::GET => build_response(
            StatusCode::OK,
            "text/plain; charset=utf-8",
            Bytes::from_static(b"OK\n"),
        ),
        "/__/about" | "/reload" | "/metrics" | "/healthz" => build_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "text/plain; charset=utf-8",
            Bytes::from_static(b"Method Not Allowed\n"),
        ),
        _ => build_response(
            StatusCode::NOT_FOUND,
            "text/plain; charset=utf-8",
            Bytes::from_static(b"Not Found\n"),
        ),
    }
}

/// Start a discovery scan in the background and acknowledge immediately
fn reload(state: &AppState) -> Response<Full<Bytes>> {
    let registry = state.registry.clone();
    tokio::spawn(async move {
        registry.discover().await;
    });
    build_response(
        StatusCode::OK,
        "application/json",
        Bytes::from_static(b"{\"ok\":true}"),
    )
}
