//! Core of the about aggregation pipeline
//!
//! This library provides:
//! - Shared HTTP transport and the `HttpClient` seam used by fetchers and exporters
//! - MetadataFetcher: a fixed pool of workers turning descriptors into about documents
//! - ExportRouter: fan-out of every about document to each registered exporter
//! - AboutStore: the keyed snapshot of the latest document per service
//! - ErrorSink: a bounded, lossy error channel drained by a logger

pub mod error;
pub mod errors;
pub mod exporter;
pub mod fetcher;
pub mod http;
pub mod metrics;
pub mod store;

pub use error::{PipelineError, Stage};
pub use errors::{ErrorLog, ErrorSink};
pub use exporter::{ExportRouter, Exporter};
pub use fetcher::{MetadataFetcher, PayloadFormat};
pub use http::{ClientConfig, HttpClient, SharedClient, TransportError};
pub use metrics::MetricsCollector;
pub use store::{AboutStore, KeyStrategy};

/// Capacity of the intermediate pipeline buffers
pub const DEFAULT_BUFFER_SIZE: usize = 10;
