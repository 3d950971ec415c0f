use futures::future::join_all;
use std::sync::Arc;
use url::Url;

use crate::models::document::{DocumentName, Namespace, ResolvedDocument};
use crate::services::document_store::DocumentStore;

/// Finds where a document currently lives.
///
/// Namespaces are probed in [`Namespace::RESOLUTION_ORDER`]. A document found
/// nowhere resolves to its archived address, so callers always get a link.
#[derive(Clone)]
pub struct DocumentResolver {
    store: Arc<dyn DocumentStore>,
    probe_retries: u32,
}

impl DocumentResolver {
    pub fn new(store: Arc<dyn DocumentStore>, probe_retries: u32) -> Self {
        Self {
            store,
            probe_retries,
        }
    }

    #[tracing::instrument(skip(self), fields(document = %name))]
    pub async fn resolve(&self, name: &DocumentName) -> Url {
        for namespace in Namespace::RESOLUTION_ORDER {
            let address = self.store.address(namespace, name);
            if self.probe(&address).await {
                tracing::debug!(address = %address, "Document resolved");
                return address;
            }
        }

        let fallback = self.store.address(Namespace::Archived, name);
        tracing::debug!(address = %fallback, "Document not found, using archived address");
        fallback
    }

    /// Resolves every name concurrently, preserving input order
    pub async fn resolve_all(&self, names: &[DocumentName]) -> Vec<ResolvedDocument> {
        join_all(names.iter().map(|name| async move {
            ResolvedDocument {
                name: name.clone(),
                address: self.resolve(name).await,
            }
        }))
        .await
    }

    // A probe that keeps failing counts as "not here"
    async fn probe(&self, address: &Url) -> bool {
        let mut attempt = 0;
        loop {
            match self.store.exists(address).await {
                Ok(found) => return found,
                Err(e) if e.is_transient() && attempt < self.probe_retries => {
                    attempt += 1;
                    tracing::warn!(address = %address, attempt, error = %e, "Probe failed, retrying");
                }
                Err(e) => {
                    tracing::warn!(address = %address, error = %e, "Probe failed, treating document as absent");
                    return false;
                }
            }
        }
    }
}
