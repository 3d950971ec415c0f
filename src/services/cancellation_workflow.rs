use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::actor::Actor;
use crate::models::cancellation::{
    ApprovalStamp, ApprovedCancellation, Cancellation, DateAmendment, NewCancellation,
    PendingCancellation, SubscriptionSnapshot,
};
use crate::models::document::{DocumentName, DocumentReference, Namespace, ResolvedDocument};
use crate::registry::{RegistryError, SubscriptionRegistry};
use crate::services::document_resolver::DocumentResolver;
use crate::services::document_store::{DocumentStore, DocumentStoreError};

#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("Subscription {0} not found")]
    SubscriptionNotFound(Uuid),

    #[error("Subscription {0} is no longer active")]
    SubscriptionInactive(Uuid),

    #[error("Cancellation {0} not found")]
    CancellationNotFound(Uuid),

    #[error("Subscription {0} already has a pending cancellation")]
    AlreadyPending(Uuid),

    #[error("Cancellation {0} is not pending")]
    NotPending(Uuid),

    #[error("Cancellation {0} needs at least one supporting document before approval")]
    MissingDocuments(Uuid),

    #[error("Document {name} is already attached to cancellation {cancellation_id}")]
    DocumentAlreadyAttached {
        cancellation_id: Uuid,
        name: DocumentName,
    },

    #[error("Document {name} is not attached to cancellation {cancellation_id}")]
    DocumentNotAttached {
        cancellation_id: Uuid,
        name: DocumentName,
    },

    #[error("No date was given to amend")]
    EmptyAmendment,

    #[error("Document upload failed: {0}")]
    Upload(#[from] DocumentStoreError),

    #[error(transparent)]
    Registry(RegistryError),
}

impl From<RegistryError> for WorkflowError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::SubscriptionNotFound(id) => WorkflowError::SubscriptionNotFound(id),
            RegistryError::SubscriptionInactive(id) => WorkflowError::SubscriptionInactive(id),
            RegistryError::CancellationNotFound(id) => WorkflowError::CancellationNotFound(id),
            RegistryError::AlreadyPending(id) => WorkflowError::AlreadyPending(id),
            RegistryError::NotPending(id) => WorkflowError::NotPending(id),
            RegistryError::NoDocuments(id) => WorkflowError::MissingDocuments(id),
            RegistryError::DocumentAlreadyAttached {
                cancellation_id,
                name,
            } => WorkflowError::DocumentAlreadyAttached {
                cancellation_id,
                name,
            },
            RegistryError::DocumentNotAttached {
                cancellation_id,
                name,
            } => WorkflowError::DocumentNotAttached {
                cancellation_id,
                name,
            },
            other => WorkflowError::Registry(other),
        }
    }
}

/// Request to open a cancellation for an active subscription
#[derive(Debug, Clone)]
pub struct OpenCancellation {
    pub subscription_id: Uuid,
    pub effective_cancellation_date: DateTime<Utc>,
    pub large_family_expiration: Option<DateTime<Utc>>,
    pub observations: Option<String>,
    /// Extra documents on top of those already on the subscription
    pub documents: Vec<DocumentName>,
}

/// Pending -> approved lifecycle of subscription cancellations.
///
/// Approval is the only transition. It is all-or-nothing: the record is
/// reclassified, the subscription deactivated and a history snapshot written in
/// a single registry commit.
#[derive(Clone)]
pub struct CancellationWorkflow {
    registry: Arc<dyn SubscriptionRegistry>,
    store: Arc<dyn DocumentStore>,
    resolver: DocumentResolver,
}

impl CancellationWorkflow {
    pub fn new(
        registry: Arc<dyn SubscriptionRegistry>,
        store: Arc<dyn DocumentStore>,
        resolver: DocumentResolver,
    ) -> Self {
        Self {
            registry,
            store,
            resolver,
        }
    }

    #[tracing::instrument(skip(self, request), fields(subscription_id = %request.subscription_id, actor = %actor))]
    pub async fn open(
        &self,
        request: OpenCancellation,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<PendingCancellation, WorkflowError> {
        let subscription = self
            .registry
            .find_subscription(request.subscription_id)
            .await?
            .ok_or(WorkflowError::SubscriptionNotFound(request.subscription_id))?;

        if !subscription.is_active() {
            return Err(WorkflowError::SubscriptionInactive(subscription.id));
        }

        let mut documents = subscription.documents.clone();
        for name in request.documents {
            if !documents.contains(&name) {
                documents.push(name);
            }
        }

        let pending = self
            .registry
            .insert_cancellation(NewCancellation {
                snapshot: SubscriptionSnapshot::from(&subscription),
                effective_cancellation_date: request.effective_cancellation_date,
                large_family_expiration: request
                    .large_family_expiration
                    .or(subscription.large_family_expiration),
                observations: request.observations,
                documents,
                opened_by: actor.to_string(),
                opened_at: now,
            })
            .await?;

        tracing::info!(cancellation_id = %pending.id, "Cancellation opened");

        Ok(pending)
    }

    /// Adds a document to a pending record, uploading it first when it is new
    #[tracing::instrument(skip(self, document), fields(document = %document.name(), existing = document.is_existing(), actor = %actor))]
    pub async fn attach_document(
        &self,
        id: Uuid,
        document: DocumentReference,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<PendingCancellation, WorkflowError> {
        let pending = self.load_pending(id).await?;

        let (name, uploaded) = match document {
            DocumentReference::Existing { name } => {
                if pending.has_document(&name) {
                    return Err(WorkflowError::DocumentAlreadyAttached {
                        cancellation_id: id,
                        name,
                    });
                }
                (name, false)
            }
            DocumentReference::New {
                name,
                content,
                content_type,
            } => {
                let stored = DocumentName::unique_for(id, &name);
                let stored = self
                    .store
                    .upload(Namespace::Active, &stored, content, content_type.as_deref())
                    .await?;
                (stored, true)
            }
        };

        let updated = match self
            .registry
            .append_document(id, &name, actor.as_str(), now)
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                if uploaded {
                    tracing::warn!(
                        cancellation_id = %id,
                        stored_as = %name,
                        error = %e,
                        "Uploaded document left unattached"
                    );
                }
                return Err(e.into());
            }
        };

        tracing::info!(stored_as = %name, "Document attached");

        Ok(updated)
    }

    /// Detaches a document from a pending record. The blob itself is left in the store.
    pub async fn remove_document(
        &self,
        id: Uuid,
        name: &DocumentName,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<PendingCancellation, WorkflowError> {
        let updated = self
            .registry
            .remove_document(id, name, actor.as_str(), now)
            .await?;

        tracing::info!(cancellation_id = %id, document = %name, actor = %actor, "Document removed");

        Ok(updated)
    }

    pub async fn amend_dates(
        &self,
        id: Uuid,
        amendment: &DateAmendment,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<PendingCancellation, WorkflowError> {
        if amendment.is_empty() {
            return Err(WorkflowError::EmptyAmendment);
        }

        Ok(self
            .registry
            .amend_dates(id, amendment, actor.as_str(), now)
            .await?)
    }

    pub fn can_approve(pending: &PendingCancellation) -> bool {
        pending.can_approve()
    }

    #[tracing::instrument(skip(self), fields(actor = %actor))]
    pub async fn approve(
        &self,
        id: Uuid,
        actor: &Actor,
        approved_at: DateTime<Utc>,
    ) -> Result<ApprovedCancellation, WorkflowError> {
        let pending = self.load_pending(id).await?;
        if !Self::can_approve(&pending) {
            return Err(WorkflowError::MissingDocuments(id));
        }

        let approved = self
            .registry
            .approve_cancellation(
                id,
                ApprovalStamp {
                    approved_by: actor.to_string(),
                    approved_at,
                },
            )
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Approval failed, nothing was committed");
                WorkflowError::from(e)
            })?;

        tracing::info!(
            subscription_id = %approved.snapshot.subscription_id,
            documents = approved.documents.len(),
            "Cancellation approved"
        );

        Ok(approved)
    }

    pub async fn get(&self, id: Uuid) -> Result<Cancellation, WorkflowError> {
        self.registry
            .find_cancellation(id)
            .await?
            .ok_or(WorkflowError::CancellationNotFound(id))
    }

    pub async fn get_pending(&self, id: Uuid) -> Result<PendingCancellation, WorkflowError> {
        self.load_pending(id).await
    }

    /// Approved projection of `id`; pending records are not visible here
    pub async fn get_approved(&self, id: Uuid) -> Result<ApprovedCancellation, WorkflowError> {
        match self.get(id).await? {
            Cancellation::Approved(approved) => Ok(approved),
            Cancellation::Pending(_) => Err(WorkflowError::CancellationNotFound(id)),
        }
    }

    pub async fn list_pending(&self) -> Result<Vec<PendingCancellation>, WorkflowError> {
        Ok(self.registry.list_pending_cancellations().await?)
    }

    pub async fn list_approved(&self) -> Result<Vec<ApprovedCancellation>, WorkflowError> {
        Ok(self.registry.list_approved_cancellations().await?)
    }

    /// Current address of every document on the record, in record order
    pub async fn resolved_documents(
        &self,
        id: Uuid,
    ) -> Result<Vec<ResolvedDocument>, WorkflowError> {
        let cancellation = self.get(id).await?;
        Ok(self.resolver.resolve_all(cancellation.documents()).await)
    }

    async fn load_pending(&self, id: Uuid) -> Result<PendingCancellation, WorkflowError> {
        match self.get(id).await? {
            Cancellation::Pending(pending) => Ok(pending),
            Cancellation::Approved(_) => Err(WorkflowError::NotPending(id)),
        }
    }
}
