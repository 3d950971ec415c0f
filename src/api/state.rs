use std::sync::Arc;

use crate::registry::SubscriptionRegistry;
use crate::services::{
    CancellationWorkflow, DocumentResolver, DocumentStore, RegistrationService,
};

/// Shared application state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn SubscriptionRegistry>,
    pub store: Arc<dyn DocumentStore>,
    pub registration: RegistrationService,
    pub workflow: CancellationWorkflow,
    pub resolver: DocumentResolver,
}

impl AppState {
    pub fn new(
        registry: Arc<dyn SubscriptionRegistry>,
        store: Arc<dyn DocumentStore>,
        probe_retries: u32,
    ) -> Self {
        let resolver = DocumentResolver::new(store.clone(), probe_retries);

        Self {
            registration: RegistrationService::new(registry.clone()),
            workflow: CancellationWorkflow::new(registry.clone(), store.clone(), resolver.clone()),
            resolver,
            registry,
            store,
        }
    }
}
