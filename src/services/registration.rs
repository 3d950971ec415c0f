use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::actor::Actor;
use crate::models::subscription::{
    NewSubscription, PlateConflict, PlateError, PlateSet, Subscription, SubscriptionHistoryEntry,
};
use crate::registry::{RegistryError, SubscriptionRegistry};
use crate::services::uniqueness_guard::{UniquenessError, UniquenessGuard};

#[derive(thiserror::Error, Debug)]
pub enum RegistrationError {
    #[error("Invalid license plates: {0}")]
    InvalidPlates(#[from] PlateError),

    #[error("Plan type {0} not found")]
    PlanTypeNotFound(i64),

    #[error("Subscription {0} not found")]
    SubscriptionNotFound(Uuid),

    #[error("Subscription {0} is no longer active")]
    SubscriptionInactive(Uuid),

    #[error(
        "License plate {} is already registered under plan type {}",
        .0.plate,
        .0.plan_type_id
    )]
    DuplicatePlate(PlateConflict),

    #[error(transparent)]
    Uniqueness(#[from] UniquenessError),

    #[error(transparent)]
    Registry(RegistryError),
}

impl From<RegistryError> for RegistrationError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::PlateTaken(conflict) => RegistrationError::DuplicatePlate(conflict),
            RegistryError::SubscriptionNotFound(id) => RegistrationError::SubscriptionNotFound(id),
            RegistryError::SubscriptionInactive(id) => RegistrationError::SubscriptionInactive(id),
            other => RegistrationError::Registry(other),
        }
    }
}

/// Creates subscriptions and keeps their plates unique per plan type
#[derive(Clone)]
pub struct RegistrationService {
    registry: Arc<dyn SubscriptionRegistry>,
    guard: UniquenessGuard,
}

impl RegistrationService {
    pub fn new(registry: Arc<dyn SubscriptionRegistry>) -> Self {
        Self {
            guard: UniquenessGuard::new(registry.clone()),
            registry,
        }
    }

    #[tracing::instrument(skip(self, new), fields(plan_type_id = new.plan_type_id, actor = %actor))]
    pub async fn register(
        &self,
        new: NewSubscription,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Subscription, RegistrationError> {
        if self.registry.find_plan_type(new.plan_type_id).await?.is_none() {
            return Err(RegistrationError::PlanTypeNotFound(new.plan_type_id));
        }

        if let Some(conflict) = self
            .guard
            .find_conflict(new.plan_type_id, &new.plates, None)
            .await?
        {
            tracing::info!(plate = %conflict.plate, "Registration rejected, plate already in use");
            return Err(RegistrationError::DuplicatePlate(conflict));
        }

        let subscription = self
            .registry
            .insert_subscription(new, actor.as_str(), now)
            .await?;

        tracing::info!(subscription_id = %subscription.id, "Subscription registered");

        Ok(subscription)
    }

    #[tracing::instrument(skip(self, plates), fields(actor = %actor))]
    pub async fn update_plates(
        &self,
        id: Uuid,
        plates: PlateSet,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Subscription, RegistrationError> {
        let current = self.get(id).await?;
        if !current.is_active() {
            return Err(RegistrationError::SubscriptionInactive(id));
        }

        if let Some(conflict) = self
            .guard
            .find_conflict(current.plan_type_id, &plates, Some(id))
            .await?
        {
            return Err(RegistrationError::DuplicatePlate(conflict));
        }

        let updated = self
            .registry
            .update_plates(id, plates, actor.as_str(), now)
            .await?;

        tracing::info!("Subscription plates updated");

        Ok(updated)
    }

    pub async fn get(&self, id: Uuid) -> Result<Subscription, RegistrationError> {
        self.registry
            .find_subscription(id)
            .await?
            .ok_or(RegistrationError::SubscriptionNotFound(id))
    }

    pub async fn list_active(&self) -> Result<Vec<Subscription>, RegistrationError> {
        Ok(self.registry.list_active_subscriptions().await?)
    }

    pub async fn history(
        &self,
        id: Uuid,
    ) -> Result<Vec<SubscriptionHistoryEntry>, RegistrationError> {
        // Unknown ids are reported rather than answered with an empty history
        self.get(id).await?;
        Ok(self.registry.subscription_history(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::subscription::PlanType;
    use crate::registry::MemoryRegistry;

    fn actor() -> Actor {
        Actor::new("clerk@example.com").unwrap()
    }

    fn new_subscription(plan_type_id: i64, plates: PlateSet) -> NewSubscription {
        NewSubscription {
            owner_id: "12345678Z".to_string(),
            plan_type_id,
            plates,
            access_card: Some("CARD-1".to_string()),
            ticket_code: None,
            remote_control_number: None,
            parking_lot: None,
            observations: None,
            documents: vec![],
            effective_date: None,
            large_family_expiration: None,
        }
    }

    async fn service() -> RegistrationService {
        let registry = Arc::new(MemoryRegistry::new());
        for id in [1, 2] {
            registry
                .add_plan_type(PlanType {
                    id,
                    name: format!("Plan {}", id),
                    price_cents: 3000,
                    parking_code: "P01".to_string(),
                })
                .await;
        }
        RegistrationService::new(registry)
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let service = service().await;
        let plates = PlateSet::new("ABC123", None, None).unwrap();

        let created = service
            .register(new_subscription(1, plates), &actor(), Utc::now())
            .await
            .unwrap();

        let fetched = service.get(created.id).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.created_by, "clerk@example.com");
        assert!(fetched.is_active());
    }

    #[tokio::test]
    async fn test_unknown_plan_type_is_rejected() {
        let service = service().await;
        let plates = PlateSet::new("ABC123", None, None).unwrap();

        let result = service
            .register(new_subscription(99, plates), &actor(), Utc::now())
            .await;
        assert!(matches!(result, Err(RegistrationError::PlanTypeNotFound(99))));
    }

    #[tokio::test]
    async fn test_duplicate_plate_rejected_within_plan_type_only() {
        let service = service().await;
        let plates = PlateSet::new("ABC123", None, None).unwrap();
        service
            .register(new_subscription(1, plates.clone()), &actor(), Utc::now())
            .await
            .unwrap();

        let duplicate = service
            .register(new_subscription(1, plates.clone()), &actor(), Utc::now())
            .await;
        assert!(matches!(duplicate, Err(RegistrationError::DuplicatePlate(c)) if c.plate == "ABC123"));

        service
            .register(new_subscription(2, plates), &actor(), Utc::now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_plates_checks_other_subscriptions() {
        let service = service().await;
        let first = service
            .register(
                new_subscription(1, PlateSet::new("AAA111", None, None).unwrap()),
                &actor(),
                Utc::now(),
            )
            .await
            .unwrap();
        service
            .register(
                new_subscription(1, PlateSet::new("BBB222", None, None).unwrap()),
                &actor(),
                Utc::now(),
            )
            .await
            .unwrap();

        let taken = PlateSet::new("AAA111", Some("BBB222".to_string()), None).unwrap();
        let result = service.update_plates(first.id, taken, &actor(), Utc::now()).await;
        assert!(matches!(result, Err(RegistrationError::DuplicatePlate(_))));

        let free = PlateSet::new("AAA111", Some("CCC333".to_string()), None).unwrap();
        let updated = service
            .update_plates(first.id, free, &actor(), Utc::now())
            .await
            .unwrap();
        assert_eq!(updated.plates.secondary(), Some("CCC333"));
        assert_eq!(updated.modified_by.as_deref(), Some("clerk@example.com"));
    }

    #[tokio::test]
    async fn test_history_of_unknown_subscription() {
        let service = service().await;
        let result = service.history(Uuid::new_v4()).await;
        assert!(matches!(result, Err(RegistrationError::SubscriptionNotFound(_))));
    }
}
