//! Confluence exporter
//!
//! Every accepted document triggers a full read-modify-write of the configured page: the
//! accumulated set is rendered, the page is fetched, its body replaced and version bumped,
//! and the page written back. Overlapping calls from this process are serialized, but
//! nothing guards against concurrent edits by other clients; a stale version is rejected
//! by Confluence and surfaces as an update failure.

use about_api::{AboutDocument, Page};
use about_core::{AboutStore, Exporter, HttpClient, KeyStrategy, TransportError};
use bytes::Bytes;
use hyper::{header, Method, Request, StatusCode};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::render;

/// Failure of a single Confluence API call
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Could not build request for {url}: ({cause})")]
    Request { url: String, cause: String },

    #[error("Could not get response from {url}: ({source})")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("Confluence api returned status {0}")]
    Status(u16),

    #[error("Error decoding confluence response: ({0})")]
    Decode(#[source] serde_json::Error),

    #[error("Error encoding confluence page: ({0})")]
    Encode(#[source] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfluenceError {
    #[error("confluence host must not be empty")]
    MissingHost,

    #[error("confluence page id must not be empty")]
    MissingPageId,

    #[error("Could not get confluence page with ID {page_id}: ({source})")]
    GetPage {
        page_id: String,
        #[source]
        source: RemoteError,
    },

    #[error("Could not update confluence page with ID {page_id}: ({source})")]
    UpdatePage {
        page_id: String,
        #[source]
        source: RemoteError,
    },
}

/// ConfluenceExporter republishes every known service on one Confluence page
pub struct ConfluenceExporter {
    host: String,
    credentials: String,
    page_id: String,
    client: Arc<dyn HttpClient>,
    abouts: AboutStore,
    // Held for a whole render/get/put cycle
    update_lock: Mutex<()>,
}

impl ConfluenceExporter {
    /// Create an exporter; fails before any network use if host or page id is empty
    pub fn new(
        host: &str,
        credentials: &str,
        page_id: &str,
        client: Arc<dyn HttpClient>,
    ) -> Result<Self, ConfluenceError> {
        if host.is_empty() {
            return Err(ConfluenceError::MissingHost);
        }
        if page_id.is_empty() {
            return Err(ConfluenceError::MissingPageId);
        }

        info!("Confluence exporter targeting page {} on {}", page_id, host);
        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            credentials: credentials.to_string(),
            page_id: page_id.to_string(),
            client,
            abouts: AboutStore::new(KeyStrategy::Name),
            update_lock: Mutex::new(()),
        })
    }

    /// Key accumulated documents with `strategy` instead of by name
    pub fn with_key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.abouts = AboutStore::new(strategy);
        self
    }

    /// REST resource of the configured page
    pub fn page_url(&self) -> String {
        format!("{}/wiki/rest/api/content/{}", self.host, self.page_id)
    }

    /// Record `about` and rewrite the page with every accumulated document
    pub async fn update(&self, about: &AboutDocument) -> Result<(), ConfluenceError> {
        let _guard = self.update_lock.lock().await;

        self.abouts.insert(about.clone()).await;
        let abouts = self.abouts.snapshot().await;
        let content = render::storage_table(&abouts, &chrono::Utc::now().to_rfc3339());

        let mut page = self
            .get_page()
            .await
            .map_err(|source| ConfluenceError::GetPage {
                page_id: self.page_id.clone(),
                source,
            })?;

        page.revise(content);

        self.put_page(&page)
            .await
            .map_err(|source| ConfluenceError::UpdatePage {
                page_id: self.page_id.clone(),
                source,
            })?;

        info!(
            "Updated confluence page {} to version {} ({} services)",
            self.page_id,
            page.version.number,
            abouts.len()
        );
        Ok(())
    }

    async fn get_page(&self) -> Result<Page, RemoteError> {
        let body = self.call(Method::GET, Bytes::new()).await?;
        serde_json::from_slice(&body).map_err(RemoteError::Decode)
    }

    async fn put_page(&self, page: &Page) -> Result<(), RemoteError> {
        let body = serde_json::to_vec(page).map_err(RemoteError::Encode)?;
        self.call(Method::PUT, Bytes::from(body)).await?;
        Ok(())
    }

    /// Send an authenticated request to the page resource and require a 200
    async fn call(&self, method: Method, body: Bytes) -> Result<Bytes, RemoteError> {
        let url = self.page_url();
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(url.as_str())
            .header(header::AUTHORIZATION, format!("Basic {}", self.credentials));
        if method == Method::PUT {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }
        let request = builder.body(body).map_err(|e| RemoteError::Request {
            url: url.clone(),
            cause: e.to_string(),
        })?;

        debug!("{} {}", method, url);
        let response = self
            .client
            .send(request)
            .await
            .map_err(|source| RemoteError::Transport { url, source })?;

        if response.status() != StatusCode::OK {
            return Err(RemoteError::Status(response.status().as_u16()));
        }
        Ok(response.into_body())
    }
}

#[async_trait::async_trait]
impl Exporter for ConfluenceExporter {
    fn name(&self) -> &'static str {
        "confluence"
    }

    async fn handle(&self, about: &AboutDocument) -> anyhow::Result<()> {
        self.update(about).await?;
        Ok(())
    }
}
