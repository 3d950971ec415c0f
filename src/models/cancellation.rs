use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::DocumentName;
use super::subscription::{PlateSet, Subscription, SubscriptionHistoryEntry};

/// Identifying fields copied from a subscription when its cancellation is opened
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionSnapshot {
    pub subscription_id: Uuid,
    pub owner_id: String,
    pub plan_type_id: i64,
    pub plates: PlateSet,
    pub access_card: Option<String>,
    pub ticket_code: Option<String>,
    pub remote_control_number: Option<String>,
    pub parking_lot: Option<String>,
    pub effective_date: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
}

impl From<&Subscription> for SubscriptionSnapshot {
    fn from(subscription: &Subscription) -> Self {
        Self {
            subscription_id: subscription.id,
            owner_id: subscription.owner_id.clone(),
            plan_type_id: subscription.plan_type_id,
            plates: subscription.plates.clone(),
            access_card: subscription.access_card.clone(),
            ticket_code: subscription.ticket_code.clone(),
            remote_control_number: subscription.remote_control_number.clone(),
            parking_lot: subscription.parking_lot.clone(),
            effective_date: subscription.effective_date,
            registered_at: subscription.registered_at,
        }
    }
}

/// A cancellation awaiting approval; documents may still change
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingCancellation {
    pub id: Uuid,
    pub snapshot: SubscriptionSnapshot,
    pub effective_cancellation_date: DateTime<Utc>,
    pub large_family_expiration: Option<DateTime<Utc>>,
    pub observations: Option<String>,
    pub documents: Vec<DocumentName>,
    pub opened_by: String,
    pub opened_at: DateTime<Utc>,
    pub modified_by: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl PendingCancellation {
    /// Approval needs at least one supporting document
    pub fn can_approve(&self) -> bool {
        !self.documents.is_empty()
    }

    pub fn has_document(&self, name: &DocumentName) -> bool {
        self.documents.contains(name)
    }
}

/// Terminal projection of a cancellation after approval. Never mutated again.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovedCancellation {
    pub id: Uuid,
    pub snapshot: SubscriptionSnapshot,
    pub effective_cancellation_date: DateTime<Utc>,
    pub large_family_expiration: Option<DateTime<Utc>>,
    pub observations: Option<String>,
    pub documents: Vec<DocumentName>,
    pub opened_by: String,
    pub opened_at: DateTime<Utc>,
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
}

impl ApprovedCancellation {
    /// History snapshot written in the same commit as the approval
    pub fn history_entry(&self) -> SubscriptionHistoryEntry {
        SubscriptionHistoryEntry {
            history_id: Uuid::new_v4(),
            subscription_id: self.snapshot.subscription_id,
            cancellation_id: Some(self.id),
            owner_id: self.snapshot.owner_id.clone(),
            plan_type_id: self.snapshot.plan_type_id,
            plates: self.snapshot.plates.clone(),
            access_card: self.snapshot.access_card.clone(),
            documents: self.documents.clone(),
            observations: self.observations.clone(),
            effective_date: self.snapshot.effective_date,
            effective_cancellation_date: Some(self.effective_cancellation_date),
            recorded_by: self.approved_by.clone(),
            recorded_at: self.approved_at,
        }
    }
}

/// Lifecycle of a cancellation record; each state only carries the fields valid in it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Cancellation {
    Pending(PendingCancellation),
    Approved(ApprovedCancellation),
}

impl Cancellation {
    pub fn id(&self) -> Uuid {
        match self {
            Cancellation::Pending(c) => c.id,
            Cancellation::Approved(c) => c.id,
        }
    }

    pub fn documents(&self) -> &[DocumentName] {
        match self {
            Cancellation::Pending(c) => &c.documents,
            Cancellation::Approved(c) => &c.documents,
        }
    }

    pub fn into_pending(self) -> Option<PendingCancellation> {
        match self {
            Cancellation::Pending(c) => Some(c),
            Cancellation::Approved(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationStatus {
    Pending,
    Approved,
}

impl CancellationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CancellationStatus::Pending => "pending",
            CancellationStatus::Approved => "approved",
        }
    }
}

/// Everything the registry needs to create a pending record
#[derive(Debug, Clone)]
pub struct NewCancellation {
    pub snapshot: SubscriptionSnapshot,
    pub effective_cancellation_date: DateTime<Utc>,
    pub large_family_expiration: Option<DateTime<Utc>>,
    pub observations: Option<String>,
    pub documents: Vec<DocumentName>,
    pub opened_by: String,
    pub opened_at: DateTime<Utc>,
}

/// Approval stamp applied in the single approval commit
#[derive(Debug, Clone)]
pub struct ApprovalStamp {
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
}

/// Date corrections allowed while a record is pending
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateAmendment {
    #[serde(default)]
    pub effective_cancellation_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub large_family_expiration: Option<DateTime<Utc>>,
}

impl DateAmendment {
    pub fn is_empty(&self) -> bool {
        self.effective_cancellation_date.is_none() && self.large_family_expiration.is_none()
    }
}
