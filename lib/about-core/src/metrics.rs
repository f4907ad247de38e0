//! Prometheus metrics for the pipeline and the HTTP surface

use anyhow::Result;
use prometheus::core::Collector;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Handles onto one metrics registry
///
/// Clones share the registry, so every stage can hold its own copy.
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Registry,

    pub services_discovered_total: IntCounter,
    /// Labelled by `outcome`: success, transport, status, decode
    pub fetch_total: IntCounterVec,
    pub exports_total: IntCounterVec,
    pub errors_reported_total: IntCounterVec,
    pub errors_dropped_total: IntCounter,
    pub cached_services: IntGauge,

    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
    pub http_responses_total: IntCounterVec,
}

fn register<C: Collector + Clone + 'static>(registry: &Registry, collector: C) -> Result<C> {
    registry.register(Box::new(collector.clone()))?;
    Ok(collector)
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    Ok(IntCounterVec::new(Opts::new(name, help), labels)?)
}

impl MetricsCollector {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let r = &registry;

        Ok(Self {
            services_discovered_total: register(
                r,
                IntCounter::new(
                    "about_services_discovered_total",
                    "Services emitted by discovery scans",
                )?,
            )?,
            fetch_total: register(
                r,
                counter_vec("about_fetch_total", "About endpoint fetches by outcome", &["outcome"])?,
            )?,
            exports_total: register(
                r,
                counter_vec(
                    "about_exports_total",
                    "Exporter calls by exporter and outcome",
                    &["exporter", "outcome"],
                )?,
            )?,
            errors_reported_total: register(
                r,
                counter_vec(
                    "about_errors_reported_total",
                    "Errors reported by pipeline stage",
                    &["stage"],
                )?,
            )?,
            errors_dropped_total: register(
                r,
                IntCounter::new(
                    "about_errors_dropped_total",
                    "Errors dropped because the error channel was full",
                )?,
            )?,
            cached_services: register(
                r,
                IntGauge::new(
                    "about_cached_services",
                    "Services currently held by the HTTP cache",
                )?,
            )?,
            http_requests_total: register(
                r,
                counter_vec("http_requests_total", "HTTP requests by method and route", &["method", "path"])?,
            )?,
            http_request_duration_seconds: register(
                r,
                HistogramVec::new(
                    HistogramOpts::new("http_request_duration_seconds", "HTTP request latency in seconds"),
                    &["method", "path"],
                )?,
            )?,
            http_responses_total: register(
                r,
                counter_vec("http_responses_total", "HTTP responses by status", &["status"])?,
            )?,
            registry,
        })
    }

    /// Render every registered metric in the Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_the_registry() {
        let metrics = MetricsCollector::new().unwrap();
        let clone = metrics.clone();

        clone.errors_dropped_total.inc();
        clone.cached_services.set(4);

        assert_eq!(metrics.errors_dropped_total.get(), 1);
        let text = metrics.gather().unwrap();
        assert!(text.contains("about_errors_dropped_total 1"));
        assert!(text.contains("about_cached_services 4"));
    }

    #[test]
    fn test_labelled_families_are_exposed() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.fetch_total.with_label_values(&["status"]).inc();
        metrics
            .exports_total
            .with_label_values(&["confluence", "failure"])
            .inc();

        let text = metrics.gather().unwrap();
        assert!(text.contains("# TYPE about_fetch_total counter"));
        assert!(text.contains(r#"about_fetch_total{outcome="status"} 1"#));
        assert!(text.contains(r#"about_exports_total{exporter="confluence",outcome="failure"} 1"#));
    }

    #[test]
    fn test_independent_collectors() {
        let first = MetricsCollector::new().unwrap();
        let second = MetricsCollector::new().unwrap();
        first.services_discovered_total.inc();
        assert_eq!(second.services_discovered_total.get(), 0);
    }
}
