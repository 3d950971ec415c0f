use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::DocumentName;

/// Subscription product a subscription is sold under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanType {
    pub id: i64,
    pub name: String,
    pub price_cents: i64,
    pub parking_code: String,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum PlateError {
    #[error("The first license plate is required")]
    MissingPrimary,

    #[error("License plate {0} appears more than once in the same subscription")]
    Repeated(String),
}

/// Up to three vehicle plates bound to one subscription.
///
/// Slot one is mandatory. Blank slots are stored as empty. No plate repeats
/// across the slots of the same set. Plates are kept exactly as entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlateSet {
    plate1: String,
    plate2: Option<String>,
    plate3: Option<String>,
}

impl PlateSet {
    pub fn new(
        plate1: impl Into<String>,
        plate2: Option<String>,
        plate3: Option<String>,
    ) -> Result<Self, PlateError> {
        let plate1 = plate1.into();
        if plate1.trim().is_empty() {
            return Err(PlateError::MissingPrimary);
        }

        let blank_to_none = |plate: Option<String>| plate.filter(|p| !p.trim().is_empty());
        let set = Self {
            plate1,
            plate2: blank_to_none(plate2),
            plate3: blank_to_none(plate3),
        };

        let plates: Vec<&str> = set.iter().collect();
        for (i, plate) in plates.iter().enumerate() {
            if plates[..i].contains(plate) {
                return Err(PlateError::Repeated(plate.to_string()));
            }
        }

        Ok(set)
    }

    pub fn primary(&self) -> &str {
        &self.plate1
    }

    pub fn secondary(&self) -> Option<&str> {
        self.plate2.as_deref()
    }

    pub fn tertiary(&self) -> Option<&str> {
        self.plate3.as_deref()
    }

    /// Non-empty plates in slot order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.plate1.as_str())
            .chain(self.plate2.as_deref())
            .chain(self.plate3.as_deref())
    }

    pub fn contains(&self, plate: &str) -> bool {
        self.iter().any(|p| p == plate)
    }

    /// First plate of `self` that is also claimed by `other`
    pub fn first_shared_with<'a>(&'a self, other: &PlateSet) -> Option<&'a str> {
        self.iter().find(|plate| other.contains(plate))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub owner_id: String,
    pub plan_type_id: i64,
    pub plates: PlateSet,
    pub access_card: Option<String>,
    pub ticket_code: Option<String>,
    pub remote_control_number: Option<String>,
    pub parking_lot: Option<String>,
    pub observations: Option<String>,
    pub documents: Vec<DocumentName>,
    pub effective_date: Option<DateTime<Utc>>,
    pub large_family_expiration: Option<DateTime<Utc>>,
    pub effective_cancellation_date: Option<DateTime<Utc>>,
    pub status: SubscriptionStatus,
    pub registered_at: DateTime<Utc>,
    pub created_by: String,
    pub modified_by: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}

/// Data needed to register a subscription
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub owner_id: String,
    pub plan_type_id: i64,
    pub plates: PlateSet,
    pub access_card: Option<String>,
    pub ticket_code: Option<String>,
    pub remote_control_number: Option<String>,
    pub parking_lot: Option<String>,
    pub observations: Option<String>,
    pub documents: Vec<DocumentName>,
    pub effective_date: Option<DateTime<Utc>>,
    pub large_family_expiration: Option<DateTime<Utc>>,
}

/// An active subscription that already claims one of the candidate plates
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlateConflict {
    pub plate: String,
    pub plan_type_id: i64,
    pub subscription_id: Uuid,
}

/// Scans `subscriptions` for an active one under `plan_type_id` sharing a plate with `candidate`.
///
/// Plates compare as exact strings.
pub fn find_plate_conflict<'a>(
    subscriptions: impl IntoIterator<Item = &'a Subscription>,
    plan_type_id: i64,
    candidate: &PlateSet,
    exclude: Option<Uuid>,
) -> Option<PlateConflict> {
    subscriptions
        .into_iter()
        .filter(|s| s.is_active() && s.plan_type_id == plan_type_id)
        .filter(|s| Some(s.id) != exclude)
        .find_map(|s| {
            candidate
                .first_shared_with(&s.plates)
                .map(|plate| PlateConflict {
                    plate: plate.to_string(),
                    plan_type_id,
                    subscription_id: s.id,
                })
        })
}

/// Snapshot appended when a subscription leaves the active set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionHistoryEntry {
    pub history_id: Uuid,
    pub subscription_id: Uuid,
    pub cancellation_id: Option<Uuid>,
    pub owner_id: String,
    pub plan_type_id: i64,
    pub plates: PlateSet,
    pub access_card: Option<String>,
    pub documents: Vec<DocumentName>,
    pub observations: Option<String>,
    pub effective_date: Option<DateTime<Utc>>,
    pub effective_cancellation_date: Option<DateTime<Utc>>,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
}
