//! Exporters republishing aggregated about documents
//!
//! - CacheExporter: in-memory snapshot served as JSON or an HTML index
//! - ConfluenceExporter: rewrites a Confluence page with every known service
pub mod access;
pub mod cache;
pub mod confluence;
pub mod render;

pub use cache::CacheExporter;
pub use confluence::{ConfluenceError, ConfluenceExporter, RemoteError};
pub use access::{AccessLog, AccessObserver, HttpMetrics, Observers, RequestInfo};
