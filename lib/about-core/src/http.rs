//! Shared HTTP transport
//!
//! One client is built at startup and handed to every fetch worker and exporter. Callers
//! talk to it through `HttpClient` so tests can substitute canned responses.

use bytes::Bytes;
use hyper::{Request, Response};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Transport-level failure: the request never produced a response
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("{0}")]
    Request(String),

    #[error("request timed out")]
    Timeout,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Sends a request and returns the response with its body fully read
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError>;
}

/// Connection pooling and timeout settings for the shared client
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub max_idle_per_host: usize,
    pub connect_timeout: Duration,
    pub keepalive: Duration,
    /// Whole-request deadline; `None` lets a hung peer hold the caller indefinitely
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 128,
            connect_timeout: Duration::from_secs(30),
            keepalive: Duration::from_secs(30),
            request_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// Pooled HTTP/HTTPS client shared across the process
#[derive(Clone)]
pub struct SharedClient {
    client: reqwest::Client,
}

impl SharedClient {
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(config.max_idle_per_host)
            .connect_timeout(config.connect_timeout)
            .tcp_keepalive(config.keepalive);

        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder.build()?;
        info!(
            "Shared HTTP client initialized (max idle per host: {}, request timeout: {:?})",
            config.max_idle_per_host, config.request_timeout
        );

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl HttpClient for SharedClient {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, TransportError> {
        let request = reqwest::Request::try_from(request.map(reqwest::Body::from))?;
        debug!("{} {}", request.method(), request.url());

        let response = self.client.execute(request).await?;
        let status = response.status();
        let headers = response.headers().clone();

        // Read the whole body so the connection goes back to the pool
        let body = response.bytes().await?;

        let mut converted = Response::new(body);
        *converted.status_mut() = status;
        *converted.headers_mut() = headers;
        Ok(converted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.max_idle_per_host, 128);
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.keepalive, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_client_creation_without_timeout() {
        let config = ClientConfig {
            request_timeout: None,
            ..ClientConfig::default()
        };
        assert!(SharedClient::new(&config).is_ok());
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Request("host unreachable".to_string());
        assert_eq!(err.to_string(), "host unreachable");
    }
}
