//! Lossy error channel shared by every pipeline stage
//!
//! Reporting never waits: when the buffer is full the event is counted and discarded.
//! Error telemetry is allowed to lose events under load; pipeline progress is not.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error};

use crate::{MetricsCollector, PipelineError};

/// Producer half of the error channel
#[derive(Clone)]
pub struct ErrorSink {
    tx: mpsc::Sender<PipelineError>,
    dropped: Arc<AtomicU64>,
    metrics: Option<MetricsCollector>,
}

/// Consumer half of the error channel
pub struct ErrorLog {
    rx: mpsc::Receiver<PipelineError>,
}

impl ErrorSink {
    /// Create a bounded error channel
    pub fn channel(capacity: usize) -> (ErrorSink, ErrorLog) {
        let (tx, rx) = mpsc::channel(capacity);
        let sink = ErrorSink {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            metrics: None,
        };
        (sink, ErrorLog { rx })
    }

    /// Record accepted and dropped errors in `metrics`
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Report an error without blocking
    pub fn report(&self, err: PipelineError) {
        let stage = err.stage();
        match self.tx.try_send(err) {
            Ok(()) => {
                if let Some(metrics) = &self.metrics {
                    metrics
                        .errors_reported_total
                        .with_label_values(&[stage.as_str()])
                        .inc();
                }
            }
            Err(TrySendError::Full(err)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                if let Some(metrics) = &self.metrics {
                    metrics.errors_dropped_total.inc();
                }
                debug!(stage = %stage, "Error channel full, dropping: {}", err);
            }
            Err(TrySendError::Closed(err)) => {
                debug!(stage = %stage, "Error channel closed, dropping: {}", err);
            }
        }
    }

    /// Number of errors discarded because the channel was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl ErrorLog {
    /// Wait for the next reported error
    pub async fn recv(&mut self) -> Option<PipelineError> {
        self.rx.recv().await
    }

    /// Take a reported error if one is buffered
    pub fn try_recv(&mut self) -> Option<PipelineError> {
        self.rx.try_recv().ok()
    }

    /// Log every reported error until all sinks are dropped
    pub async fn run(mut self) {
        while let Some(err) = self.rx.recv().await {
            error!(stage = %err.stage(), "{}", err);
        }
        debug!("Error channel closed");
    }
}
