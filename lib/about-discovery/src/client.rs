//! Kubernetes client construction

use anyhow::{anyhow, Context, Result};
use kube::{Client, Config};
use rustls_pemfile::certs;
use std::io::BufReader;
use tracing::info;

/// Location of the API server and the credentials used to reach it
///
/// An empty host falls back to the ambient configuration (kubeconfig or in-cluster).
#[derive(Clone, Debug)]
pub struct ClusterConfig {
    pub host: String,
    pub port: String,
    pub token_path: String,
    pub cert_path: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: "443".to_string(),
            token_path: "/var/run/secrets/kubernetes.io/serviceaccount/token".to_string(),
            cert_path: "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt".to_string(),
        }
    }
}

impl ClusterConfig {
    /// API server URL for an explicit host
    pub fn cluster_url(&self) -> String {
        if self.host.contains(':') {
            // IPv6 literal
            format!("https://[{}]:{}", self.host, self.port)
        } else {
            format!("https://{}:{}", self.host, self.port)
        }
    }

    /// Build a Kubernetes client
    pub async fn connect(&self) -> Result<Client> {
        if self.host.is_empty() {
            info!("No Kubernetes host configured, inferring client configuration");
            return Ok(Client::try_default().await?);
        }

        let url = self.cluster_url();
        let mut config = Config::new(
            url.parse()
                .with_context(|| format!("Invalid Kubernetes API url {}", url))?,
        );

        let ca = std::fs::read(&self.cert_path)
            .with_context(|| format!("Failed to read Kubernetes CA from {}", self.cert_path))?;
        config.root_cert = Some(load_der_certificates(&ca)?);
        config.auth_info.token_file = Some(self.token_path.clone());

        info!("Connecting to Kubernetes API at {}", url);
        Ok(Client::try_from(config)?)
    }
}

/// Decode every PEM certificate into DER
fn load_der_certificates(pem: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut reader = BufReader::new(pem);
    let ders = certs(&mut reader)
        .map(|cert| cert.map(|c| c.to_vec()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow!("Failed to parse certificates: {}", e))?;

    if ders.is_empty() {
        return Err(anyhow!("No certificates found in PEM data"));
    }
    Ok(ders)
}
