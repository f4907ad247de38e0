//! Fan-out of about documents to every registered exporter

use about_api::AboutDocument;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::{ErrorSink, MetricsCollector, PipelineError};

/// Upper bound on concurrently running calls into one exporter
pub const DEFAULT_EXPORT_CONCURRENCY: usize = 64;

/// Documents queued for one exporter before dispatch waits on it
pub const DEFAULT_EXPORT_QUEUE: usize = 256;

/// Exporter trait for sinks that record or republish about documents
#[async_trait::async_trait]
pub trait Exporter: Send + Sync {
    /// Short name used in logs, metrics and error reports
    fn name(&self) -> &'static str;

    async fn handle(&self, about: &AboutDocument) -> Result<()>;
}

/// ExportRouter delivers each about document to every exporter concurrently
///
/// Each exporter owns a lane: a bounded queue drained by its own dispatcher, which runs
/// every call as a separate task admitted through the lane's semaphore. A slow or hung
/// exporter only exhausts its own permits and queue, the other lanes keep flowing.
pub struct ExportRouter {
    exporters: Vec<Arc<dyn Exporter>>,
    concurrency: usize,
    queue_depth: usize,
    metrics: Option<MetricsCollector>,
}

impl ExportRouter {
    pub fn new() -> Self {
        Self {
            exporters: Vec::new(),
            concurrency: DEFAULT_EXPORT_CONCURRENCY,
            queue_depth: DEFAULT_EXPORT_QUEUE,
            metrics: None,
        }
    }

    /// Register an exporter
    pub fn add(mut self, exporter: Arc<dyn Exporter>) -> Self {
        self.exporters.push(exporter);
        self
    }

    /// Ceiling on in-flight calls, applied to each exporter separately
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn exporter_count(&self) -> usize {
        self.exporters.len()
    }

    /// Dispatch documents until `abouts` closes, then wait for in-flight calls
    pub async fn run(&self, mut abouts: mpsc::Receiver<AboutDocument>, errors: ErrorSink) {
        info!(
            "Export router started with {} exporters ({} calls each)",
            self.exporters.len(),
            self.concurrency
        );

        let mut lanes = Vec::with_capacity(self.exporters.len());
        let mut dispatchers = JoinSet::new();
        for exporter in &self.exporters {
            let (queue, pending) = mpsc::channel(self.queue_depth);
            lanes.push((exporter.name(), queue));
            dispatchers.spawn(dispatch(
                exporter.clone(),
                pending,
                Arc::new(Semaphore::new(self.concurrency)),
                errors.clone(),
                self.metrics.clone(),
            ));
        }

        while let Some(about) = abouts.recv().await {
            let about = Arc::new(about);
            for (name, queue) in &lanes {
                if queue.send(about.clone()).await.is_err() {
                    warn!("Export lane for {} closed, dropping {}", name, about.service.qualified_name());
                }
            }
        }

        debug!("About channel closed, draining {} export lanes", lanes.len());
        drop(lanes);
        while let Some(result) = dispatchers.join_next().await {
            if let Err(e) = result {
                warn!("Export dispatcher failed: {}", e);
            }
        }
        info!("Export router stopped");
    }
}

impl Default for ExportRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain one exporter's queue, running each call under a permit of `permits`
async fn dispatch(
    exporter: Arc<dyn Exporter>,
    mut pending: mpsc::Receiver<Arc<AboutDocument>>,
    permits: Arc<Semaphore>,
    errors: ErrorSink,
    metrics: Option<MetricsCollector>,
) {
    let mut calls = JoinSet::new();
    while let Some(about) = pending.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            warn!("Export semaphore for {} closed, stopping dispatch", exporter.name());
            break;
        };

        let task_exporter = exporter.clone();
        let errors = errors.clone();
        let metrics = metrics.clone();
        calls.spawn(async move {
            let exporter = task_exporter;
            let outcome = match exporter.handle(&about).await {
                Ok(()) => "success",
                Err(cause) => {
                    errors.report(PipelineError::Export {
                        exporter: exporter.name(),
                        service: about.service.qualified_name(),
                        cause,
                    });
                    "failure"
                }
            };
            if let Some(metrics) = metrics {
                metrics
                    .exports_total
                    .with_label_values(&[exporter.name(), outcome])
                    .inc();
            }
            drop(permit);
        });

        // Reap finished calls so the set does not grow with the stream
        while let Some(result) = calls.try_join_next() {
            if let Err(e) = result {
                warn!("Export task for {} failed: {}", exporter.name(), e);
            }
        }
    }

    while let Some(result) = calls.join_next().await {
        if let Err(e) = result {
            warn!("Export task for {} failed: {}", exporter.name(), e);
        }
    }
    debug!("Export lane for {} drained", exporter.name());
}

#[cfg(test)]
mod tests {
    use super::*;
    use about_api::{Payload, ServiceDescriptor};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingExporter {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Exporter for RecordingExporter {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn handle(&self, about: &AboutDocument) -> Result<()> {
            self.seen.lock().unwrap().push(about.service.name.clone());
            Ok(())
        }
    }

    struct FailingExporter;

    #[async_trait::async_trait]
    impl Exporter for FailingExporter {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn handle(&self, _about: &AboutDocument) -> Result<()> {
            Err(anyhow::anyhow!("remote unavailable"))
        }
    }

    /// Tracks how many calls overlap
    #[derive(Default)]
    struct SlowExporter {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Exporter for SlowExporter {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn handle(&self, _about: &AboutDocument) -> Result<()> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Never completes a call
    #[derive(Default)]
    struct HungExporter {
        started: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Exporter for HungExporter {
        fn name(&self) -> &'static str {
            "hung"
        }

        async fn handle(&self, _about: &AboutDocument) -> Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn about(name: &str) -> AboutDocument {
        AboutDocument::new(
            ServiceDescriptor::new(name, "billing"),
            Payload::Raw(Bytes::from_static(b"about")),
        )
    }

    #[tokio::test]
    async fn test_every_exporter_receives_document() {
        let first = Arc::new(RecordingExporter::default());
        let second = Arc::new(RecordingExporter::default());
        let router = ExportRouter::new().add(first.clone()).add(second.clone());

        let (tx, rx) = mpsc::channel(10);
        let (errors, mut log) = ErrorSink::channel(10);
        tx.send(about("svc")).await.unwrap();
        drop(tx);

        router.run(rx, errors).await;

        assert_eq!(*first.seen.lock().unwrap(), vec!["svc".to_string()]);
        assert_eq!(*second.seen.lock().unwrap(), vec!["svc".to_string()]);
        assert!(log.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_failing_exporter_does_not_affect_others() {
        let recording = Arc::new(RecordingExporter::default());
        let metrics = MetricsCollector::new().unwrap();
        let router = ExportRouter::new()
            .add(Arc::new(FailingExporter))
            .add(recording.clone())
            .with_metrics(metrics.clone());

        let (tx, rx) = mpsc::channel(10);
        let (errors, mut log) = ErrorSink::channel(10);
        tx.send(about("a")).await.unwrap();
        tx.send(about("b")).await.unwrap();
        drop(tx);

        router.run(rx, errors).await;

        assert_eq!(recording.seen.lock().unwrap().len(), 2);
        let mut messages = Vec::new();
        while let Some(err) = log.try_recv() {
            messages.push(err.to_string());
        }
        messages.sort();
        assert_eq!(
            messages,
            vec![
                "failing exporter failed for billing/a: remote unavailable".to_string(),
                "failing exporter failed for billing/b: remote unavailable".to_string(),
            ]
        );
        assert_eq!(
            metrics
                .exports_total
                .with_label_values(&["failing", "failure"])
                .get(),
            2
        );
    }

    #[tokio::test]
    async fn test_concurrency_ceiling_is_respected() {
        let slow = Arc::new(SlowExporter::default());
        let router = ExportRouter::new().add(slow.clone()).with_concurrency(3);

        let (tx, rx) = mpsc::channel(10);
        let (errors, _log) = ErrorSink::channel(10);
        let producer = tokio::spawn(async move {
            for i in 0..12 {
                tx.send(about(&format!("svc-{}", i))).await.unwrap();
            }
        });

        router.run(rx, errors).await;
        producer.await.unwrap();

        assert!(slow.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(slow.running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_slow_exporter_runs_alongside_others() {
        let slow = Arc::new(SlowExporter::default());
        let recording = Arc::new(RecordingExporter::default());
        let router = ExportRouter::new().add(slow.clone()).add(recording.clone());

        let (tx, rx) = mpsc::channel(10);
        let (errors, _log) = ErrorSink::channel(10);
        for i in 0..5 {
            tx.send(about(&format!("svc-{}", i))).await.unwrap();
        }
        drop(tx);

        router.run(rx, errors).await;

        assert_eq!(recording.seen.lock().unwrap().len(), 5);
        assert!(slow.peak.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn test_hung_exporter_does_not_starve_others() {
        let hung = Arc::new(HungExporter::default());
        let recording = Arc::new(RecordingExporter::default());
        let router = ExportRouter::new()
            .add(hung.clone())
            .add(recording.clone())
            .with_concurrency(2);

        let (tx, rx) = mpsc::channel(10);
        let (errors, _log) = ErrorSink::channel(10);
        let running = tokio::spawn(async move { router.run(rx, errors).await });

        for i in 0..10 {
            tx.send(about(&format!("svc-{}", i))).await.unwrap();
        }

        let delivered = tokio::time::timeout(Duration::from_secs(5), async {
            while recording.seen.lock().unwrap().len() < 10 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        assert!(delivered.is_ok(), "healthy exporter stalled behind a hung one");
        assert_eq!(recording.seen.lock().unwrap().len(), 10);
        assert!(hung.started.load(Ordering::SeqCst) <= 2);
        running.abort();
    }
}
