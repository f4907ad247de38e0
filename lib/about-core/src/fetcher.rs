//! Worker pool fetching `__/about` for every discovered service

use about_api::{AboutDoc, AboutDocument, Payload, ServiceDescriptor};
use bytes::Bytes;
use futures::future::join_all;
use hyper::{Method, Request};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::{ErrorSink, HttpClient, MetricsCollector, PipelineError};

/// Number of concurrent fetch workers
pub const DEFAULT_WORKERS: usize = 5;

/// How about response bodies are interpreted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Decode the body as an `AboutDoc`
    #[default]
    Structured,
    /// Keep the body bytes as they are
    Raw,
}

impl FromStr for PayloadFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "structured" | "json" => Ok(PayloadFormat::Structured),
            "raw" | "blob" => Ok(PayloadFormat::Raw),
            other => Err(format!(
                "Invalid payload format: {}. Must be structured or raw",
                other
            )),
        }
    }
}

/// MetadataFetcher turns service descriptors into about documents
///
/// A fixed number of workers share one input queue; each descriptor is fetched once, with
/// no retry. Failures are reported on the error channel and the descriptor is skipped.
#[derive(Clone)]
pub struct MetadataFetcher {
    client: Arc<dyn HttpClient>,
    workers: usize,
    format: PayloadFormat,
    metrics: Option<MetricsCollector>,
}

impl MetadataFetcher {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self {
            client,
            workers: DEFAULT_WORKERS,
            format: PayloadFormat::default(),
            metrics: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_format(mut self, format: PayloadFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run the worker pool until `services` is closed and drained
    pub async fn run(
        self,
        services: mpsc::Receiver<ServiceDescriptor>,
        abouts: mpsc::Sender<AboutDocument>,
        errors: ErrorSink,
    ) {
        info!("Starting {} about fetch workers", self.workers);

        let services = Arc::new(Mutex::new(services));
        let handles: Vec<_> = (0..self.workers)
            .map(|id| {
                let fetcher = self.clone();
                let services = services.clone();
                let abouts = abouts.clone();
                let errors = errors.clone();
                tokio::spawn(async move { fetcher.worker(id, services, abouts, errors).await })
            })
            .collect();
        drop(abouts);

        for result in join_all(handles).await {
            if let Err(e) = result {
                debug!("Fetch worker ended abnormally: {}", e);
            }
        }
        info!("About fetch workers stopped");
    }

    async fn worker(
        &self,
        id: usize,
        services: Arc<Mutex<mpsc::Receiver<ServiceDescriptor>>>,
        abouts: mpsc::Sender<AboutDocument>,
        errors: ErrorSink,
    ) {
        loop {
            let next = services.lock().await.recv().await;
            let Some(service) = next else {
                break;
            };

            match self.fetch(&service).await {
                Ok(about) => {
                    self.record("success");
                    if abouts.send(about).await.is_err() {
                        debug!("Worker {}: about channel closed", id);
                        break;
                    }
                }
                Err(err) => {
                    self.record(match &err {
                        PipelineError::FetchStatus { .. } => "status",
                        PipelineError::FetchDecode { .. } => "decode",
                        _ => "transport",
                    });
                    errors.report(err);
                }
            }
        }
        debug!("Worker {} finished", id);
    }

    /// Fetch and decode the about document of a single service
    pub async fn fetch(&self, service: &ServiceDescriptor) -> Result<AboutDocument, PipelineError> {
        let url = service.about_url();
        let request = Request::builder()
            .method(Method::GET)
            .uri(url.as_str())
            .body(Bytes::new())
            .map_err(|e| PipelineError::FetchTransport {
                base_url: service.base_url.clone(),
                cause: e.to_string(),
            })?;

        let response = self
            .client
            .send(request)
            .await
            .map_err(|e| PipelineError::FetchTransport {
                base_url: service.base_url.clone(),
                cause: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(PipelineError::FetchStatus {
                status: response.status().as_u16(),
                base_url: service.base_url.clone(),
            });
        }

        let body = response.into_body();
        let payload = match self.format {
            PayloadFormat::Raw => Payload::Raw(body),
            PayloadFormat::Structured => {
                let doc: AboutDoc =
                    serde_json::from_slice(&body).map_err(|_| PipelineError::FetchDecode {
                        base_url: service.base_url.clone(),
                    })?;
                Payload::Structured(doc)
            }
        };

        debug!("Fetched about for {}", service.qualified_name());
        Ok(AboutDocument::new(service.clone(), payload))
    }

    fn record(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.fetch_total.with_label_values(&[outcome]).inc();
        }
    }
}
