// Registry module - backing collection of subscriptions and cancellation records

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::cancellation::{
    ApprovalStamp, ApprovedCancellation, Cancellation, DateAmendment, NewCancellation,
    PendingCancellation,
};
use crate::models::document::DocumentName;
use crate::models::subscription::{
    NewSubscription, PlanType, PlateConflict, PlateSet, Subscription, SubscriptionHistoryEntry,
};

pub mod memory;
pub mod postgres;

pub use memory::{FaultPoint, MemoryRegistry};
pub use postgres::PgRegistry;

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(
        "License plate {} is already registered under plan type {}",
        .0.plate,
        .0.plan_type_id
    )]
    PlateTaken(PlateConflict),

    #[error("Subscription {0} not found")]
    SubscriptionNotFound(Uuid),

    #[error("Subscription {0} is no longer active")]
    SubscriptionInactive(Uuid),

    #[error("Cancellation {0} not found")]
    CancellationNotFound(Uuid),

    #[error("Subscription {0} already has a pending cancellation")]
    AlreadyPending(Uuid),

    #[error("Cancellation {0} is no longer pending")]
    NotPending(Uuid),

    #[error("Cancellation {0} has no supporting documents")]
    NoDocuments(Uuid),

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

    #[error("Stored record is inconsistent: {0}")]
    Corrupt(String),

    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

/// Durable collection the workflow reads and writes through.
///
/// Every mutating method is a single conditional write: it either applies in
/// full against the state it checked, or fails and leaves nothing behind.
#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    async fn health_check(&self) -> Result<(), RegistryError>;

    async fn find_plan_type(&self, id: i64) -> Result<Option<PlanType>, RegistryError>;

    async fn find_subscription(&self, id: Uuid) -> Result<Option<Subscription>, RegistryError>;

    async fn list_active_subscriptions(&self) -> Result<Vec<Subscription>, RegistryError>;

    /// Inserts a subscription, re-checking plate uniqueness under the same lock as the write
    async fn insert_subscription(
        &self,
        new: NewSubscription,
        created_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Subscription, RegistryError>;

    /// Replaces the plates of an active subscription, re-checking plate uniqueness
    async fn update_plates(
        &self,
        id: Uuid,
        plates: PlateSet,
        modified_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Subscription, RegistryError>;

    async fn subscription_history(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<SubscriptionHistoryEntry>, RegistryError>;

    /// Creates a pending record; rejected if the subscription already has one
    async fn insert_cancellation(
        &self,
        new: NewCancellation,
    ) -> Result<PendingCancellation, RegistryError>;

    async fn find_cancellation(&self, id: Uuid) -> Result<Option<Cancellation>, RegistryError>;

    async fn list_pending_cancellations(&self) -> Result<Vec<PendingCancellation>, RegistryError>;

    async fn list_approved_cancellations(&self)
        -> Result<Vec<ApprovedCancellation>, RegistryError>;

    async fn append_document(
        &self,
        id: Uuid,
        name: &DocumentName,
        modified_by: &str,
        at: DateTime<Utc>,
    ) -> Result<PendingCancellation, RegistryError>;

    async fn remove_document(
        &self,
        id: Uuid,
        name: &DocumentName,
        modified_by: &str,
        at: DateTime<Utc>,
    ) -> Result<PendingCancellation, RegistryError>;

    async fn amend_dates(
        &self,
        id: Uuid,
        amendment: &DateAmendment,
        modified_by: &str,
        at: DateTime<Utc>,
    ) -> Result<PendingCancellation, RegistryError>;

    /// Reclassifies the record as approved, deactivates its subscription and
    /// appends a history snapshot, all in one commit
    async fn approve_cancellation(
        &self,
        id: Uuid,
        stamp: ApprovalStamp,
    ) -> Result<ApprovedCancellation, RegistryError>;
}
