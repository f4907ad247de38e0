//! Service discovery through the Kubernetes API
pub mod client;
pub mod discovery;

pub use client::ClusterConfig;
pub use discovery::{ControlPlane, KubeControlPlane, ServiceRegistry};
