use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, Secret};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use crate::models::document::{DocumentName, Namespace};

#[derive(thiserror::Error, Debug)]
pub enum DocumentStoreError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Document store returned {status} for {address}")]
    UnexpectedStatus { status: StatusCode, address: Url },

    #[error("Invalid document store address: {0}")]
    InvalidAddress(String),

    #[error("Document store unavailable: {0}")]
    Unavailable(String),
}

impl DocumentStoreError {
    /// Whether repeating the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            DocumentStoreError::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            DocumentStoreError::UnexpectedStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            DocumentStoreError::InvalidAddress(_) => false,
            DocumentStoreError::Unavailable(_) => true,
        }
    }
}

/// Name-addressed blob storage with an active and an archived namespace
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Retrievable address of `name` inside `namespace`
    fn address(&self, namespace: Namespace, name: &DocumentName) -> Url;

    /// Lightweight existence probe
    async fn exists(&self, address: &Url) -> Result<bool, DocumentStoreError>;

    async fn upload(
        &self,
        namespace: Namespace,
        name: &DocumentName,
        content: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<DocumentName, DocumentStoreError>;

    async fn check_health(&self) -> Result<(), DocumentStoreError>;
}

fn parse_base_url(raw: &str) -> Result<Url, DocumentStoreError> {
    let url = Url::parse(raw).map_err(|e| DocumentStoreError::InvalidAddress(e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(DocumentStoreError::InvalidAddress(format!(
            "{} cannot be used as a base URL",
            raw
        )));
    }
    Ok(url)
}

fn join_address(base_url: &Url, namespace: Namespace, name: &DocumentName) -> Url {
    let mut address = base_url.clone();
    // Base URLs are checked in the constructors, so path segments are always available
    if let Ok(mut segments) = address.path_segments_mut() {
        segments
            .pop_if_empty()
            .push(namespace.path_segment())
            .push(name.as_str());
    }
    address
}

/// Document store reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    client: Client,
    base_url: Url,
    access_token: Option<Secret<String>>,
}

impl HttpDocumentStore {
    pub fn new(
        base_url: &str,
        access_token: Option<Secret<String>>,
        timeout: Duration,
    ) -> Result<Self, DocumentStoreError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: parse_base_url(base_url)?,
            access_token,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    fn address(&self, namespace: Namespace, name: &DocumentName) -> Url {
        join_address(&self.base_url, namespace, name)
    }

    #[tracing::instrument(skip(self), fields(address = %address))]
    async fn exists(&self, address: &Url) -> Result<bool, DocumentStoreError> {
        let response = self
            .authorized(self.client.head(address.clone()))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(false),
            status => Err(DocumentStoreError::UnexpectedStatus {
                status,
                address: address.clone(),
            }),
        }
    }

    #[tracing::instrument(skip(self, content), fields(size = content.len()))]
    async fn upload(
        &self,
        namespace: Namespace,
        name: &DocumentName,
        content: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<DocumentName, DocumentStoreError> {
        let address = self.address(namespace, name);

        let mut request = self.authorized(self.client.put(address.clone())).body(content);
        if let Some(content_type) = content_type {
            request = request.header(header::CONTENT_TYPE, content_type);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            tracing::error!(status = %status, address = %address, "Document upload failed");
            return Err(DocumentStoreError::UnexpectedStatus { status, address });
        }

        tracing::info!(address = %address, "Document uploaded");

        Ok(name.clone())
    }

    async fn check_health(&self) -> Result<(), DocumentStoreError> {
        let response = self
            .authorized(self.client.head(self.base_url.clone()))
            .send()
            .await?;

        if response.status().is_server_error() {
            return Err(DocumentStoreError::Unavailable(format!(
                "Document store unavailable: HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// In-process document store.
///
/// Stands in for the blob store in tests and local runs; `archive` plays the
/// external process that moves documents once a cancellation is approved.
#[derive(Debug)]
pub struct MemoryDocumentStore {
    base_url: Url,
    stored: Mutex<HashSet<Url>>,
    failing_probes: Mutex<HashMap<Namespace, u32>>,
    probes: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new(base_url: &str) -> Result<Self, DocumentStoreError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            stored: Mutex::new(HashSet::new()),
            failing_probes: Mutex::new(HashMap::new()),
            probes: AtomicUsize::new(0),
        })
    }

    pub fn insert(&self, namespace: Namespace, name: &DocumentName) {
        let address = self.address(namespace, name);
        self.lock_stored().insert(address);
    }

    /// Number of blobs held across both namespaces
    pub fn stored_count(&self) -> usize {
        self.lock_stored().len()
    }

    pub fn contains(&self, namespace: Namespace, name: &DocumentName) -> bool {
        let address = self.address(namespace, name);
        self.lock_stored().contains(&address)
    }

    /// Moves a document from the active to the archived namespace
    pub fn archive(&self, name: &DocumentName) {
        let active = self.address(Namespace::Active, name);
        let archived = self.address(Namespace::Archived, name);
        let mut stored = self.lock_stored();
        if stored.remove(&active) {
            stored.insert(archived);
        }
    }

    /// Makes the next `count` probes into `namespace` fail transiently
    pub fn fail_probes(&self, namespace: Namespace, count: u32) {
        self.failing_probes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(namespace, count);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    fn lock_stored(&self) -> std::sync::MutexGuard<'_, HashSet<Url>> {
        self.stored
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn namespace_of(address: &Url) -> Option<Namespace> {
        let segments: Vec<&str> = address.path_segments()?.collect();
        let segment = segments.len().checked_sub(2).map(|i| segments[i])?;
        [Namespace::Active, Namespace::Archived]
            .into_iter()
            .find(|ns| ns.path_segment() == segment)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn address(&self, namespace: Namespace, name: &DocumentName) -> Url {
        join_address(&self.base_url, namespace, name)
    }

    async fn exists(&self, address: &Url) -> Result<bool, DocumentStoreError> {
        self.probes.fetch_add(1, Ordering::SeqCst);

        if let Some(namespace) = Self::namespace_of(address) {
            let mut failing = self
                .failing_probes
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(remaining) = failing.get_mut(&namespace).filter(|n| **n > 0) {
                *remaining -= 1;
                return Err(DocumentStoreError::Unavailable(format!(
                    "injected probe failure for {}",
                    address
                )));
            }
        }

        Ok(self.lock_stored().contains(address))
    }

    async fn upload(
        &self,
        namespace: Namespace,
        name: &DocumentName,
        _content: Vec<u8>,
        _content_type: Option<&str>,
    ) -> Result<DocumentName, DocumentStoreError> {
        self.insert(namespace, name);
        Ok(name.clone())
    }

    async fn check_health(&self) -> Result<(), DocumentStoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(raw: &str) -> DocumentName {
        DocumentName::parse(raw).unwrap()
    }

    #[test]
    fn test_address_percent_encodes_name() {
        let store = HttpDocumentStore::new(
            "http://files.example.com/storage/",
            None,
            Duration::from_secs(1),
        )
        .unwrap();

        let address = store.address(Namespace::Archived, &name("baja firmada #1.pdf"));
        assert_eq!(
            address.as_str(),
            "http://files.example.com/storage/cancelled_subscription_files/baja%20firmada%20%231.pdf"
        );
    }

    #[test]
    fn test_address_without_trailing_slash() {
        let store =
            HttpDocumentStore::new("http://files.example.com", None, Duration::from_secs(1))
                .unwrap();

        let address = store.address(Namespace::Active, &name("doc1.pdf"));
        assert_eq!(
            address.as_str(),
            "http://files.example.com/subscription_files/doc1.pdf"
        );
    }

    #[test]
    fn test_rejects_non_base_url() {
        let result = HttpDocumentStore::new("mailto:files@example.com", None, Duration::from_secs(1));
        assert!(matches!(result, Err(DocumentStoreError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_memory_store_archive_moves_document() {
        let store = MemoryDocumentStore::new("http://documents.test/").unwrap();
        let doc = name("doc1.pdf");
        store.insert(Namespace::Active, &doc);

        store.archive(&doc);

        assert!(!store.contains(Namespace::Active, &doc));
        assert!(store.contains(Namespace::Archived, &doc));
    }

    #[tokio::test]
    async fn test_memory_store_injected_probe_failures_are_consumed() {
        let store = MemoryDocumentStore::new("http://documents.test/").unwrap();
        let doc = name("doc1.pdf");
        store.insert(Namespace::Archived, &doc);
        store.fail_probes(Namespace::Archived, 1);

        let address = store.address(Namespace::Archived, &doc);
        assert!(store.exists(&address).await.is_err());
        assert!(store.exists(&address).await.unwrap());
        assert_eq!(store.probe_count(), 2);
    }
}
