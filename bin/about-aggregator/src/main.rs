use about_core::{ErrorSink, ExportRouter, MetadataFetcher, MetricsCollector, SharedClient};
use about_discovery::{KubeControlPlane, ServiceRegistry};
use about_export::{AccessLog, CacheExporter, ConfluenceExporter, HttpMetrics, Observers};
use anyhow::{Context, Result};
use clap::Parser;
use hyper::{server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod handler;

use config::{Args, LogFormat};
use handler::{handle_request, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting about-aggregator...");

    let metrics = MetricsCollector::new().context("Could not create metrics collector")?;
    let client = Arc::new(SharedClient::new(&args.client())?);

    let kube_client = args
        .cluster()
        .connect()
        .await
        .context("Could not create service discovery")?;

    // Exporters are built before anything starts so bad configuration fails fast
    let cache = Arc::new(CacheExporter::new(args.key_strategy()).with_metrics(metrics.clone()));
    let confluence = ConfluenceExporter::new(
        &args.confluence_host,
        &args.confluence_credentials,
        &args.confluence_page_id,
        client.clone(),
    )
    .context("Could not create confluence exporter")?
    .with_key_strategy(args.key_strategy());

    let (errors, error_log) = ErrorSink::channel(args.buffer_size);
    let errors = errors.with_metrics(metrics.clone());
    let (services_tx, services_rx) = mpsc::channel(args.buffer_size);
    let (abouts_tx, abouts_rx) = mpsc::channel(args.buffer_size);

    let registry = ServiceRegistry::new(
        Arc::new(KubeControlPlane::new(kube_client)),
        args.label.clone(),
        services_tx,
        errors.clone(),
    )
    .with_metrics(metrics.clone());

    let fetcher = MetadataFetcher::new(client.clone())
        .with_workers(args.workers)
        .with_format(args.payload_format)
        .with_metrics(metrics.clone());

    let router = ExportRouter::new()
        .add(cache.clone())
        .add(Arc::new(confluence))
        .with_concurrency(args.export_concurrency)
        .with_metrics(metrics.clone());
    info!("Export router initialized with {} exporters", router.exporter_count());

    tokio::spawn(error_log.run());
    tokio::spawn(fetcher.run(services_rx, abouts_tx, errors.clone()));
    {
        let errors = errors.clone();
        tokio::spawn(async move { router.run(abouts_rx, errors).await });
    }
    {
        let registry = registry.clone();
        tokio::spawn(async move {
            registry.discover().await;
        });
    }

    let state = Arc::new(AppState {
        cache,
        registry,
        metrics: metrics.clone(),
        observers: Observers::new()
            .with(AccessLog)
            .with(HttpMetrics::new(metrics)),
    });

    let addr: SocketAddr = ([0, 0, 0, 0], args.port).into();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Web server failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    tokio::select! {
        _ = serve(listener, state) => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutdown signal received, exiting...");
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Accept HTTP connections until the listener fails
async fn serve(listener: TcpListener, state: Arc<AppState>) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Error accepting connection: {}", e);
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| handle_request(req, state.clone()));

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Error serving HTTP connection from {}: {}", peer_addr, e);
            }
        });
    }
}
