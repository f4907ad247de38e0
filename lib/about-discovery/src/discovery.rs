//! Label-driven discovery of services exposing an about endpoint

use about_api::ServiceDescriptor;
use about_core::{ErrorSink, MetricsCollector, PipelineError};
use k8s_openapi::api::core::v1::{Namespace, Service};
use kube::api::ListParams;
use kube::{Api, Client};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Read access to the cluster control plane
#[async_trait::async_trait]
pub trait ControlPlane: Send + Sync {
    /// Names of all namespaces
    async fn list_namespaces(&self) -> anyhow::Result<Vec<String>>;

    /// Names of the services in `namespace` matching `label_selector`
    async fn list_services(&self, namespace: &str, label_selector: &str)
        -> anyhow::Result<Vec<String>>;
}

/// ControlPlane backed by the Kubernetes API
pub struct KubeControlPlane {
    client: Client,
}

impl KubeControlPlane {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ControlPlane for KubeControlPlane {
    async fn list_namespaces(&self) -> anyhow::Result<Vec<String>> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let list = namespaces.list(&ListParams::default()).await?;

        debug!("Discovered {} namespaces", list.items.len());
        Ok(list
            .items
            .into_iter()
            .filter_map(|ns| ns.metadata.name)
            .collect())
    }

    async fn list_services(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> anyhow::Result<Vec<String>> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(label_selector);
        let list = services.list(&params).await?;

        Ok(list
            .items
            .into_iter()
            .filter_map(|svc| svc.metadata.name)
            .collect())
    }
}

/// ServiceRegistry scans the control plane and emits a descriptor per matching service
///
/// Scans can be started at any time and are not coordinated with each other; overlapping
/// scans interleave their descriptors on the shared output channel.
#[derive(Clone)]
pub struct ServiceRegistry {
    control_plane: Arc<dyn ControlPlane>,
    label: String,
    services: mpsc::Sender<ServiceDescriptor>,
    errors: ErrorSink,
    metrics: Option<MetricsCollector>,
}

impl ServiceRegistry {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        label: impl Into<String>,
        services: mpsc::Sender<ServiceDescriptor>,
        errors: ErrorSink,
    ) -> Self {
        let label = label.into();
        if label.is_empty() {
            warn!("Empty label selector, discovery will not select any service");
        }
        Self {
            control_plane,
            label,
            services,
            errors,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run one discovery scan, returning the number of descriptors emitted
    ///
    /// A listing failure at any level reports one error and ends the scan.
    pub async fn discover(&self) -> usize {
        if self.label.is_empty() {
            debug!("Skipping discovery scan: empty label selector");
            return 0;
        }

        let namespaces = match self.control_plane.list_namespaces().await {
            Ok(namespaces) => namespaces,
            Err(e) => {
                self.errors
                    .report(PipelineError::ListNamespaces(e.to_string()));
                return 0;
            }
        };

        let mut count = 0;
        for namespace in namespaces {
            let names = match self
                .control_plane
                .list_services(&namespace, &self.label)
                .await
            {
                Ok(names) => names,
                Err(e) => {
                    self.errors.report(PipelineError::ListServices(e.to_string()));
                    return count;
                }
            };

            for name in names {
                let service = ServiceDescriptor::new(name, namespace.as_str());
                debug!("Discovered service {}", service.qualified_name());
                if self.services.send(service).await.is_err() {
                    warn!("Service channel closed, abandoning discovery scan");
                    return count;
                }
                count += 1;
                if let Some(metrics) = &self.metrics {
                    metrics.services_discovered_total.inc();
                }
            }
        }

        info!("Discovery scan for '{}' found {} services", self.label, count);
        count
    }
}
