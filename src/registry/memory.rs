use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{RegistryError, SubscriptionRegistry};
use crate::models::cancellation::{
    ApprovalStamp, ApprovedCancellation, Cancellation, DateAmendment, NewCancellation,
    PendingCancellation,
};
use crate::models::document::DocumentName;
use crate::models::subscription::{
    find_plate_conflict, NewSubscription, PlanType, PlateSet, Subscription,
    SubscriptionHistoryEntry, SubscriptionStatus,
};

/// Points at which a test can make the next write fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// Fetching the active subscription set
    ListActive,
    /// Attaching a document to a pending record
    DocumentWrite,
    /// After the approval record is written, before the subscription is deactivated
    ArchiveWrite,
    /// After the subscription is deactivated, before the history snapshot
    SubscriptionWrite,
}

#[derive(Debug, Clone, Default)]
struct State {
    plan_types: HashMap<i64, PlanType>,
    subscriptions: HashMap<Uuid, Subscription>,
    cancellations: HashMap<Uuid, Cancellation>,
    history: Vec<SubscriptionHistoryEntry>,
}

/// In-process registry with the same atomicity as the PostgreSQL one.
///
/// Multi-step writes are applied to a staged copy of the state that only
/// replaces the live state once every step succeeded.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    state: RwLock<State>,
    faults: Mutex<HashSet<FaultPoint>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_plan_type(&self, plan_type: PlanType) {
        self.state
            .write()
            .await
            .plan_types
            .insert(plan_type.id, plan_type);
    }

    /// Makes the next operation crossing `point` fail with `Unavailable`
    pub fn fail_next(&self, point: FaultPoint) {
        self.faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(point);
    }

    fn trip(&self, point: FaultPoint) -> Result<(), RegistryError> {
        let tripped = self
            .faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&point);

        if tripped {
            tracing::debug!(?point, "Injected registry fault");
            return Err(RegistryError::Unavailable(format!(
                "injected fault at {:?}",
                point
            )));
        }
        Ok(())
    }

    fn pending_mut(
        state: &mut State,
        id: Uuid,
    ) -> Result<&mut PendingCancellation, RegistryError> {
        match state.cancellations.get_mut(&id) {
            None => Err(RegistryError::CancellationNotFound(id)),
            Some(Cancellation::Approved(_)) => Err(RegistryError::NotPending(id)),
            Some(Cancellation::Pending(pending)) => Ok(pending),
        }
    }
}

#[async_trait]
impl SubscriptionRegistry for MemoryRegistry {
    async fn health_check(&self) -> Result<(), RegistryError> {
        Ok(())
    }

    async fn find_plan_type(&self, id: i64) -> Result<Option<PlanType>, RegistryError> {
        Ok(self.state.read().await.plan_types.get(&id).cloned())
    }

    async fn find_subscription(&self, id: Uuid) -> Result<Option<Subscription>, RegistryError> {
        Ok(self.state.read().await.subscriptions.get(&id).cloned())
    }

    async fn list_active_subscriptions(&self) -> Result<Vec<Subscription>, RegistryError> {
        self.trip(FaultPoint::ListActive)?;

        let state = self.state.read().await;
        let mut active: Vec<Subscription> = state
            .subscriptions
            .values()
            .filter(|s| s.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|s| (s.registered_at, s.id));
        Ok(active)
    }

    async fn insert_subscription(
        &self,
        new: NewSubscription,
        created_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Subscription, RegistryError> {
        let mut state = self.state.write().await;

        if let Some(conflict) =
            find_plate_conflict(state.subscriptions.values(), new.plan_type_id, &new.plates, None)
        {
            return Err(RegistryError::PlateTaken(conflict));
        }

        let subscription = Subscription {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            plan_type_id: new.plan_type_id,
            plates: new.plates,
            access_card: new.access_card,
            ticket_code: new.ticket_code,
            remote_control_number: new.remote_control_number,
            parking_lot: new.parking_lot,
            observations: new.observations,
            documents: new.documents,
            effective_date: new.effective_date,
            large_family_expiration: new.large_family_expiration,
            effective_cancellation_date: None,
            status: SubscriptionStatus::Active,
            registered_at: at,
            created_by: created_by.to_string(),
            modified_by: None,
            modified_at: None,
        };

        state
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(subscription)
    }

    async fn update_plates(
        &self,
        id: Uuid,
        plates: PlateSet,
        modified_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Subscription, RegistryError> {
        let mut state = self.state.write().await;

        let plan_type_id = match state.subscriptions.get(&id) {
            None => return Err(RegistryError::SubscriptionNotFound(id)),
            Some(s) if !s.is_active() => return Err(RegistryError::SubscriptionInactive(id)),
            Some(s) => s.plan_type_id,
        };

        if let Some(conflict) =
            find_plate_conflict(state.subscriptions.values(), plan_type_id, &plates, Some(id))
        {
            return Err(RegistryError::PlateTaken(conflict));
        }

        let subscription = state
            .subscriptions
            .get_mut(&id)
            .ok_or(RegistryError::SubscriptionNotFound(id))?;
        subscription.plates = plates;
        subscription.modified_by = Some(modified_by.to_string());
        subscription.modified_at = Some(at);
        Ok(subscription.clone())
    }

    async fn subscription_history(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<SubscriptionHistoryEntry>, RegistryError> {
        Ok(self
            .state
            .read()
            .await
            .history
            .iter()
            .filter(|h| h.subscription_id == subscription_id)
            .cloned()
            .collect())
    }

    async fn insert_cancellation(
        &self,
        new: NewCancellation,
    ) -> Result<PendingCancellation, RegistryError> {
        let mut state = self.state.write().await;
        let subscription_id = new.snapshot.subscription_id;

        match state.subscriptions.get(&subscription_id) {
            None => return Err(RegistryError::SubscriptionNotFound(subscription_id)),
            Some(s) if !s.is_active() => {
                return Err(RegistryError::SubscriptionInactive(subscription_id))
            }
            Some(_) => {}
        }

        let already_pending = state.cancellations.values().any(|c| {
            matches!(c, Cancellation::Pending(p) if p.snapshot.subscription_id == subscription_id)
        });
        if already_pending {
            return Err(RegistryError::AlreadyPending(subscription_id));
        }

        let pending = PendingCancellation {
            id: Uuid::new_v4(),
            snapshot: new.snapshot,
            effective_cancellation_date: new.effective_cancellation_date,
            large_family_expiration: new.large_family_expiration,
            observations: new.observations,
            documents: new.documents,
            opened_by: new.opened_by,
            opened_at: new.opened_at,
            modified_by: None,
            modified_at: None,
        };

        state
            .cancellations
            .insert(pending.id, Cancellation::Pending(pending.clone()));
        Ok(pending)
    }

    async fn find_cancellation(&self, id: Uuid) -> Result<Option<Cancellation>, RegistryError> {
        Ok(self.state.read().await.cancellations.get(&id).cloned())
    }

    async fn list_pending_cancellations(&self) -> Result<Vec<PendingCancellation>, RegistryError> {
        let state = self.state.read().await;
        let mut pending: Vec<PendingCancellation> = state
            .cancellations
            .values()
            .filter_map(|c| c.clone().into_pending())
            .collect();
        pending.sort_by_key(|c| (c.opened_at, c.id));
        Ok(pending)
    }

    async fn list_approved_cancellations(
        &self,
    ) -> Result<Vec<ApprovedCancellation>, RegistryError> {
        let state = self.state.read().await;
        let mut approved: Vec<ApprovedCancellation> = state
            .cancellations
            .values()
            .filter_map(|c| match c {
                Cancellation::Approved(a) => Some(a.clone()),
                Cancellation::Pending(_) => None,
            })
            .collect();
        approved.sort_by_key(|c| (c.approved_at, c.id));
        Ok(approved)
    }

    async fn append_document(
        &self,
        id: Uuid,
        name: &DocumentName,
        modified_by: &str,
        at: DateTime<Utc>,
    ) -> Result<PendingCancellation, RegistryError> {
        self.trip(FaultPoint::DocumentWrite)?;

        let mut state = self.state.write().await;
        let pending = Self::pending_mut(&mut state, id)?;

        if pending.has_document(name) {
            return Err(RegistryError::DocumentAlreadyAttached {
                cancellation_id: id,
                name: name.clone(),
            });
        }

        pending.documents.push(name.clone());
        pending.modified_by = Some(modified_by.to_string());
        pending.modified_at = Some(at);
        Ok(pending.clone())
    }

    async fn remove_document(
        &self,
        id: Uuid,
        name: &DocumentName,
        modified_by: &str,
        at: DateTime<Utc>,
    ) -> Result<PendingCancellation, RegistryError> {
        let mut state = self.state.write().await;
        let pending = Self::pending_mut(&mut state, id)?;

        if !pending.has_document(name) {
            return Err(RegistryError::DocumentNotAttached {
                cancellation_id: id,
                name: name.clone(),
            });
        }

        pending.documents.retain(|doc| doc != name);
        pending.modified_by = Some(modified_by.to_string());
        pending.modified_at = Some(at);
        Ok(pending.clone())
    }

    async fn amend_dates(
        &self,
        id: Uuid,
        amendment: &DateAmendment,
        modified_by: &str,
        at: DateTime<Utc>,
    ) -> Result<PendingCancellation, RegistryError> {
        let mut state = self.state.write().await;
        let pending = Self::pending_mut(&mut state, id)?;

        if let Some(date) = amendment.effective_cancellation_date {
            pending.effective_cancellation_date = date;
        }
        if let Some(date) = amendment.large_family_expiration {
            pending.large_family_expiration = Some(date);
        }
        pending.modified_by = Some(modified_by.to_string());
        pending.modified_at = Some(at);
        Ok(pending.clone())
    }

    async fn approve_cancellation(
        &self,
        id: Uuid,
        stamp: ApprovalStamp,
    ) -> Result<ApprovedCancellation, RegistryError> {
        let mut state = self.state.write().await;
        let mut staged = state.clone();

        let pending = Self::pending_mut(&mut staged, id)?.clone();
        if !pending.can_approve() {
            return Err(RegistryError::NoDocuments(id));
        }

        let approved = ApprovedCancellation {
            id: pending.id,
            snapshot: pending.snapshot,
            effective_cancellation_date: pending.effective_cancellation_date,
            large_family_expiration: pending.large_family_expiration,
            observations: pending.observations,
            documents: pending.documents,
            opened_by: pending.opened_by,
            opened_at: pending.opened_at,
            approved_by: stamp.approved_by,
            approved_at: stamp.approved_at,
        };
        staged
            .cancellations
            .insert(id, Cancellation::Approved(approved.clone()));
        self.trip(FaultPoint::ArchiveWrite)?;

        let subscription_id = approved.snapshot.subscription_id;
        let subscription = staged
            .subscriptions
            .get_mut(&subscription_id)
            .filter(|s| s.is_active())
            .ok_or(RegistryError::SubscriptionInactive(subscription_id))?;
        subscription.status = SubscriptionStatus::Cancelled;
        subscription.effective_cancellation_date = Some(approved.effective_cancellation_date);
        subscription.modified_by = Some(approved.approved_by.clone());
        subscription.modified_at = Some(approved.approved_at);
        self.trip(FaultPoint::SubscriptionWrite)?;

        staged.history.push(approved.history_entry());

        *state = staged;
        Ok(approved)
    }
}
