//! Command line and environment configuration

use about_core::{ClientConfig, KeyStrategy, PayloadFormat};
use about_discovery::ClusterConfig;
use clap::{Parser, ValueEnum};
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "about-aggregator",
    about = "Calls /__/about for services that expose the endpoint"
)]
pub struct Args {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Label to filter services via kubernetes api
    #[arg(long, env = "LABEL", default_value = "about=true")]
    pub label: String,

    /// Kubernetes service host; empty infers kubeconfig or in-cluster settings
    #[arg(long, env = "KUBERNETES_SERVICE_HOST", default_value = "")]
    pub kubernetes_service_host: String,

    /// Kubernetes service port
    #[arg(long, env = "KUBERNETES_SERVICE_PORT", default_value = "443")]
    pub kubernetes_service_port: String,

    /// Path to the kubernetes api token
    #[arg(
        long,
        env = "KUBERNETES_TOKEN_PATH",
        default_value = "/var/run/secrets/kubernetes.io/serviceaccount/token"
    )]
    pub kubernetes_token_path: String,

    /// Path to the kubernetes cert
    #[arg(
        long,
        env = "KUBERNETES_CERT_PATH",
        default_value = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt"
    )]
    pub kubernetes_cert_path: String,

    /// Confluence host
    #[arg(long, env = "CONFLUENCE_HOST", default_value = "")]
    pub confluence_host: String,

    /// Base 64 encoded <user:pass> used in Basic authentication
    #[arg(long, env = "CONFLUENCE_CREDENTIALS", default_value = "", hide_env_values = true)]
    pub confluence_credentials: String,

    /// Confluence page id
    #[arg(long, env = "CONFLUENCE_PAGE_ID", default_value = "")]
    pub confluence_page_id: String,

    /// Number of concurrent about fetch workers
    #[arg(long, env = "WORKERS", default_value_t = about_core::fetcher::DEFAULT_WORKERS)]
    pub workers: usize,

    /// Capacity of the service, about and error buffers
    #[arg(
        long,
        env = "BUFFER_SIZE",
        default_value_t = about_core::DEFAULT_BUFFER_SIZE,
        value_parser = parse_capacity
    )]
    pub buffer_size: usize,

    /// Maximum number of calls running at once into each exporter
    #[arg(long, env = "EXPORT_CONCURRENCY", default_value_t = about_core::exporter::DEFAULT_EXPORT_CONCURRENCY)]
    pub export_concurrency: usize,

    /// How about responses are interpreted: structured or raw
    #[arg(long, env = "PAYLOAD_FORMAT", default_value = "structured")]
    pub payload_format: PayloadFormat,

    /// Key cached services by namespace and name instead of name only
    #[arg(long, env = "KEY_BY_NAMESPACE", default_value_t = false)]
    pub key_by_namespace: bool,

    /// Whole-request timeout for outgoing calls in seconds; 0 disables it
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Args {
    pub fn cluster(&self) -> ClusterConfig {
        ClusterConfig {
            host: self.kubernetes_service_host.clone(),
            port: self.kubernetes_service_port.clone(),
            token_path: self.kubernetes_token_path.clone(),
            cert_path: self.kubernetes_cert_path.clone(),
        }
    }

    pub fn client(&self) -> ClientConfig {
        ClientConfig {
            request_timeout: match self.request_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            ..ClientConfig::default()
        }
    }

    pub fn key_strategy(&self) -> KeyStrategy {
        if self.key_by_namespace {
            KeyStrategy::NamespacedName
        } else {
            KeyStrategy::Name
        }
    }
}

/// Channel capacities must be positive
fn parse_capacity(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("capacity must be at least 1".to_string()),
        Ok(capacity) => Ok(capacity),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["about-aggregator"]).unwrap();
        assert_eq!(args.port, 8080);
        assert_eq!(args.label, "about=true");
        assert_eq!(args.workers, 5);
        assert_eq!(args.buffer_size, 10);
        assert_eq!(args.payload_format, PayloadFormat::Structured);
        assert_eq!(args.key_strategy(), KeyStrategy::Name);
        assert_eq!(args.client().request_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_flags() {
        let args = Args::try_parse_from([
            "about-aggregator",
            "--port",
            "9090",
            "--confluence-host",
            "https://wiki.example.com",
            "--confluence-page-id",
            "1234",
            "--payload-format",
            "raw",
            "--key-by-namespace",
            "--request-timeout-secs",
            "0",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(args.port, 9090);
        assert_eq!(args.confluence_page_id, "1234");
        assert_eq!(args.payload_format, PayloadFormat::Raw);
        assert_eq!(args.key_strategy(), KeyStrategy::NamespacedName);
        assert_eq!(args.client().request_timeout, None);
        assert_eq!(args.log_format, LogFormat::Json);
    }

    #[test]
    fn test_cluster_config() {
        let args = Args::try_parse_from([
            "about-aggregator",
            "--kubernetes-service-host",
            "10.0.0.1",
        ])
        .unwrap();
        let cluster = args.cluster();
        assert_eq!(cluster.host, "10.0.0.1");
        assert_eq!(cluster.port, "443");
    }

    #[test]
    fn test_invalid_payload_format() {
        assert!(Args::try_parse_from(["about-aggregator", "--payload-format", "xml"]).is_err());
    }

    #[test]
    fn test_zero_buffer_size_rejected() {
        let err = Args::try_parse_from(["about-aggregator", "--buffer-size", "0"]).unwrap_err();
        assert!(err.to_string().contains("capacity must be at least 1"));

        let args = Args::try_parse_from(["about-aggregator", "--buffer-size", "1"]).unwrap();
        assert_eq!(args.buffer_size, 1);
    }
}
