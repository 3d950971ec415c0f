use std::sync::Arc;
use uuid::Uuid;

use crate::models::subscription::{find_plate_conflict, PlateConflict, PlateSet};
use crate::registry::{RegistryError, SubscriptionRegistry};

#[derive(thiserror::Error, Debug)]
pub enum UniquenessError {
    #[error("Could not confirm plate uniqueness: {0}")]
    LookupFailed(#[source] RegistryError),
}

/// Pre-write plate check against the active subscription set.
///
/// The registry repeats the same check inside its write, so this only gives
/// callers an early, descriptive answer. A failed lookup is never read as
/// "no conflict".
#[derive(Clone)]
pub struct UniquenessGuard {
    registry: Arc<dyn SubscriptionRegistry>,
}

impl UniquenessGuard {
    pub fn new(registry: Arc<dyn SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    pub async fn find_conflict(
        &self,
        plan_type_id: i64,
        candidate: &PlateSet,
        exclude: Option<Uuid>,
    ) -> Result<Option<PlateConflict>, UniquenessError> {
        let active = self
            .registry
            .list_active_subscriptions()
            .await
            .map_err(|e| {
                tracing::error!(plan_type_id, error = %e, "Active subscription lookup failed");
                UniquenessError::LookupFailed(e)
            })?;

        Ok(find_plate_conflict(&active, plan_type_id, candidate, exclude))
    }

    pub async fn is_duplicate(
        &self,
        plan_type_id: i64,
        candidate: &PlateSet,
        exclude: Option<Uuid>,
    ) -> Result<bool, UniquenessError> {
        Ok(self
            .find_conflict(plan_type_id, candidate, exclude)
            .await?
            .is_some())
    }
}
