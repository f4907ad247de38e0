//! In-memory exporter backing the `/__/about` endpoint

use about_api::AboutDocument;
use about_core::{AboutStore, Exporter, KeyStrategy, MetricsCollector};
use anyhow::Result;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use tracing::{debug, warn};

use crate::render;

/// CacheExporter keeps the latest about document per service for HTTP readers
#[derive(Clone)]
pub struct CacheExporter {
    store: AboutStore,
    metrics: Option<MetricsCollector>,
}

impl CacheExporter {
    pub fn new(strategy: KeyStrategy) -> Self {
        Self {
            store: AboutStore::new(strategy),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Point-in-time copy of the cached documents
    pub async fn snapshot(&self) -> Vec<AboutDocument> {
        self.store.snapshot().await
    }

    /// Whether an `Accept` header asks for JSON
    pub fn wants_json(accept: Option<&str>) -> bool {
        accept
            .map(|value| {
                value.split(',').any(|range| {
                    range
                        .split(';')
                        .next()
                        .map(|media| media.trim().eq_ignore_ascii_case("application/json"))
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }

    /// Render one snapshot as JSON or HTML depending on `accept`
    pub async fn respond(&self, accept: Option<&str>) -> Response<Full<Bytes>> {
        let abouts = self.snapshot().await;

        if Self::wants_json(accept) {
            match serde_json::to_vec(&abouts) {
                Ok(body) => build_response(StatusCode::OK, "application/json", Bytes::from(body)),
                Err(e) => {
                    warn!("Failed to encode about documents: {}", e);
                    build_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "text/plain; charset=utf-8",
                        Bytes::from_static(b"Internal Server Error\n"),
                    )
                }
            }
        } else {
            build_response(
                StatusCode::OK,
                "text/html; charset=utf-8",
                Bytes::from(render::html_index(&abouts)),
            )
        }
    }
}

#[async_trait::async_trait]
impl Exporter for CacheExporter {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn handle(&self, about: &AboutDocument) -> Result<()> {
        let size = self.store.insert(about.clone()).await;
        if let Some(metrics) = &self.metrics {
            metrics.cached_services.set(size as i64);
        }
        debug!("Cached about for {} ({} entries)", about.service.qualified_name(), size);
        Ok(())
    }
}

/// Build a response, falling back to an empty 500 if the parts are rejected
pub fn build_response(status: StatusCode, content_type: &str, body: Bytes) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(Full::new(body))
        .unwrap_or_else(|_| {
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        })
}
