use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{RegistryError, SubscriptionRegistry};
use crate::models::cancellation::{
    ApprovalStamp, ApprovedCancellation, Cancellation, CancellationStatus, DateAmendment,
    NewCancellation, PendingCancellation, SubscriptionSnapshot,
};
use crate::models::document::DocumentName;
use crate::models::subscription::{
    find_plate_conflict, NewSubscription, PlanType, PlateSet, Subscription,
    SubscriptionHistoryEntry, SubscriptionStatus,
};

/// Advisory lock class serializing plate-uniqueness check-and-write per plan type
const PLATE_LOCK_CLASS: i32 = 0x5041_524b;

const PENDING_PER_SUBSCRIPTION_INDEX: &str = "cancellations_one_pending_per_subscription";

#[derive(Debug, FromRow)]
struct PlanTypeRow {
    id: i64,
    name: String,
    price_cents: i64,
    parking_code: String,
}

impl From<PlanTypeRow> for PlanType {
    fn from(row: PlanTypeRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            price_cents: row.price_cents,
            parking_code: row.parking_code,
        }
    }
}

#[derive(Debug, FromRow)]
struct SubscriptionRow {
    id: Uuid,
    owner_id: String,
    plan_type_id: i64,
    plate1: String,
    plate2: Option<String>,
    plate3: Option<String>,
    access_card: Option<String>,
    ticket_code: Option<String>,
    remote_control_number: Option<String>,
    parking_lot: Option<String>,
    observations: Option<String>,
    documents: Vec<String>,
    effective_date: Option<DateTime<Utc>>,
    large_family_expiration: Option<DateTime<Utc>>,
    effective_cancellation_date: Option<DateTime<Utc>>,
    status: String,
    registered_at: DateTime<Utc>,
    created_by: String,
    modified_by: Option<String>,
    modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct CancellationRow {
    id: Uuid,
    subscription_id: Uuid,
    owner_id: String,
    plan_type_id: i64,
    plate1: String,
    plate2: Option<String>,
    plate3: Option<String>,
    access_card: Option<String>,
    ticket_code: Option<String>,
    remote_control_number: Option<String>,
    parking_lot: Option<String>,
    effective_date: Option<DateTime<Utc>>,
    registered_at: DateTime<Utc>,
    effective_cancellation_date: DateTime<Utc>,
    large_family_expiration: Option<DateTime<Utc>>,
    observations: Option<String>,
    documents: Vec<String>,
    status: String,
    opened_by: String,
    opened_at: DateTime<Utc>,
    modified_by: Option<String>,
    modified_at: Option<DateTime<Utc>>,
    approved_by: Option<String>,
    approved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    history_id: Uuid,
    subscription_id: Uuid,
    cancellation_id: Option<Uuid>,
    owner_id: String,
    plan_type_id: i64,
    plate1: String,
    plate2: Option<String>,
    plate3: Option<String>,
    access_card: Option<String>,
    documents: Vec<String>,
    observations: Option<String>,
    effective_date: Option<DateTime<Utc>>,
    effective_cancellation_date: Option<DateTime<Utc>>,
    recorded_by: String,
    recorded_at: DateTime<Utc>,
}

fn plates_from_row(
    plate1: String,
    plate2: Option<String>,
    plate3: Option<String>,
) -> Result<PlateSet, RegistryError> {
    PlateSet::new(plate1, plate2, plate3).map_err(|e| RegistryError::Corrupt(e.to_string()))
}

fn documents_from_row(documents: Vec<String>) -> Result<Vec<DocumentName>, RegistryError> {
    documents
        .iter()
        .map(|raw| DocumentName::parse(raw).map_err(|e| RegistryError::Corrupt(e.to_string())))
        .collect()
}

fn documents_to_row(documents: &[DocumentName]) -> Vec<String> {
    documents.iter().map(|d| d.as_str().to_string()).collect()
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = RegistryError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status = match row.status.as_str() {
            "active" => SubscriptionStatus::Active,
            "cancelled" => SubscriptionStatus::Cancelled,
            other => {
                return Err(RegistryError::Corrupt(format!(
                    "subscription {} has unknown status '{}'",
                    row.id, other
                )))
            }
        };

        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            plan_type_id: row.plan_type_id,
            plates: plates_from_row(row.plate1, row.plate2, row.plate3)?,
            access_card: row.access_card,
            ticket_code: row.ticket_code,
            remote_control_number: row.remote_control_number,
            parking_lot: row.parking_lot,
            observations: row.observations,
            documents: documents_from_row(row.documents)?,
            effective_date: row.effective_date,
            large_family_expiration: row.large_family_expiration,
            effective_cancellation_date: row.effective_cancellation_date,
            status,
            registered_at: row.registered_at,
            created_by: row.created_by,
            modified_by: row.modified_by,
            modified_at: row.modified_at,
        })
    }
}

impl TryFrom<CancellationRow> for Cancellation {
    type Error = RegistryError;

    fn try_from(row: CancellationRow) -> Result<Self, Self::Error> {
        let snapshot = SubscriptionSnapshot {
            subscription_id: row.subscription_id,
            owner_id: row.owner_id,
            plan_type_id: row.plan_type_id,
            plates: plates_from_row(row.plate1, row.plate2, row.plate3)?,
            access_card: row.access_card,
            ticket_code: row.ticket_code,
            remote_control_number: row.remote_control_number,
            parking_lot: row.parking_lot,
            effective_date: row.effective_date,
            registered_at: row.registered_at,
        };
        let documents = documents_from_row(row.documents)?;

        match (row.status.as_str(), row.approved_by, row.approved_at) {
            ("pending", None, None) => Ok(Cancellation::Pending(PendingCancellation {
                id: row.id,
                snapshot,
                effective_cancellation_date: row.effective_cancellation_date,
                large_family_expiration: row.large_family_expiration,
                observations: row.observations,
                documents,
                opened_by: row.opened_by,
                opened_at: row.opened_at,
                modified_by: row.modified_by,
                modified_at: row.modified_at,
            })),
            ("approved", Some(approved_by), Some(approved_at)) => {
                Ok(Cancellation::Approved(ApprovedCancellation {
                    id: row.id,
                    snapshot,
                    effective_cancellation_date: row.effective_cancellation_date,
                    large_family_expiration: row.large_family_expiration,
                    observations: row.observations,
                    documents,
                    opened_by: row.opened_by,
                    opened_at: row.opened_at,
                    approved_by,
                    approved_at,
                }))
            }
            (status, _, _) => Err(RegistryError::Corrupt(format!(
                "cancellation {} has status '{}' with a mismatched approval stamp",
                row.id, status
            ))),
        }
    }
}

impl TryFrom<HistoryRow> for SubscriptionHistoryEntry {
    type Error = RegistryError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            history_id: row.history_id,
            subscription_id: row.subscription_id,
            cancellation_id: row.cancellation_id,
            owner_id: row.owner_id,
            plan_type_id: row.plan_type_id,
            plates: plates_from_row(row.plate1, row.plate2, row.plate3)?,
            access_card: row.access_card,
            documents: documents_from_row(row.documents)?,
            observations: row.observations,
            effective_date: row.effective_date,
            effective_cancellation_date: row.effective_cancellation_date,
            recorded_by: row.recorded_by,
            recorded_at: row.recorded_at,
        })
    }
}

fn pending_from_row(row: CancellationRow) -> Result<PendingCancellation, RegistryError> {
    let id = row.id;
    Cancellation::try_from(row)?
        .into_pending()
        .ok_or(RegistryError::NotPending(id))
}

fn plate_list(plates: &PlateSet) -> Vec<String> {
    plates.iter().map(str::to_string).collect()
}

/// PostgreSQL-backed registry
#[derive(Debug, Clone)]
pub struct PgRegistry {
    pool: PgPool,
}

impl PgRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Takes the per-plan-type lock held until the transaction ends
    async fn lock_plan_type(
        tx: &mut Transaction<'_, Postgres>,
        plan_type_id: i64,
    ) -> Result<(), RegistryError> {
        sqlx::query("SELECT pg_advisory_xact_lock($1, hashtext($2))")
            .bind(PLATE_LOCK_CLASS)
            .bind(plan_type_id.to_string())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn check_plates_free(
        tx: &mut Transaction<'_, Postgres>,
        plan_type_id: i64,
        plates: &PlateSet,
        exclude: Option<Uuid>,
    ) -> Result<(), RegistryError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT * FROM subscriptions
            WHERE status = 'active'
              AND plan_type_id = $1
              AND ($2::uuid IS NULL OR id <> $2)
              AND (plate1 = ANY($3) OR plate2 = ANY($3) OR plate3 = ANY($3))
            "#,
        )
        .bind(plan_type_id)
        .bind(exclude)
        .bind(plate_list(plates))
        .fetch_all(&mut **tx)
        .await?;

        let holders = rows
            .into_iter()
            .map(Subscription::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        match find_plate_conflict(&holders, plan_type_id, plates, exclude) {
            Some(conflict) => Err(RegistryError::PlateTaken(conflict)),
            None => Ok(()),
        }
    }

    /// Works out why a conditional update on a cancellation matched no row
    async fn explain_missed_update(
        &self,
        id: Uuid,
        name: Option<&DocumentName>,
    ) -> RegistryError {
        match self.find_cancellation(id).await {
            Err(e) => e,
            Ok(None) => RegistryError::CancellationNotFound(id),
            Ok(Some(Cancellation::Approved(_))) => RegistryError::NotPending(id),
            Ok(Some(Cancellation::Pending(pending))) => match name {
                Some(name) if pending.has_document(name) => {
                    RegistryError::DocumentAlreadyAttached {
                        cancellation_id: id,
                        name: name.clone(),
                    }
                }
                Some(name) => RegistryError::DocumentNotAttached {
                    cancellation_id: id,
                    name: name.clone(),
                },
                None if !pending.can_approve() => RegistryError::NoDocuments(id),
                None => RegistryError::Unavailable(format!(
                    "cancellation {} changed concurrently, retry",
                    id
                )),
            },
        }
    }
}

#[async_trait]
impl SubscriptionRegistry for PgRegistry {
    async fn health_check(&self) -> Result<(), RegistryError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    async fn find_plan_type(&self, id: i64) -> Result<Option<PlanType>, RegistryError> {
        let row = sqlx::query_as::<_, PlanTypeRow>(
            r#"
            SELECT id, name, price_cents, parking_code FROM plan_types WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PlanType::from))
    }

    async fn find_subscription(&self, id: Uuid) -> Result<Option<Subscription>, RegistryError> {
        sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT * FROM subscriptions WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Subscription::try_from)
        .transpose()
    }

    async fn list_active_subscriptions(&self) -> Result<Vec<Subscription>, RegistryError> {
        sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT * FROM subscriptions
            WHERE status = 'active'
            ORDER BY registered_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Subscription::try_from)
        .collect()
    }

    async fn insert_subscription(
        &self,
        new: NewSubscription,
        created_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Subscription, RegistryError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_plan_type(&mut tx, new.plan_type_id).await?;
        Self::check_plates_free(&mut tx, new.plan_type_id, &new.plates, None).await?;

        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            INSERT INTO subscriptions (
                id, owner_id, plan_type_id, plate1, plate2, plate3,
                access_card, ticket_code, remote_control_number, parking_lot, observations,
                documents, effective_date, large_family_expiration,
                status, registered_at, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, 'active', $15, $16)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.owner_id)
        .bind(new.plan_type_id)
        .bind(new.plates.primary())
        .bind(new.plates.secondary())
        .bind(new.plates.tertiary())
        .bind(&new.access_card)
        .bind(&new.ticket_code)
        .bind(&new.remote_control_number)
        .bind(&new.parking_lot)
        .bind(&new.observations)
        .bind(documents_to_row(&new.documents))
        .bind(new.effective_date)
        .bind(new.large_family_expiration)
        .bind(at)
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Subscription::try_from(row)
    }

    async fn update_plates(
        &self,
        id: Uuid,
        plates: PlateSet,
        modified_by: &str,
        at: DateTime<Utc>,
    ) -> Result<Subscription, RegistryError> {
        let mut tx = self.pool.begin().await?;

        let plan_type_id = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT plan_type_id FROM subscriptions WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RegistryError::SubscriptionNotFound(id))?;

        Self::lock_plan_type(&mut tx, plan_type_id).await?;
        Self::check_plates_free(&mut tx, plan_type_id, &plates, Some(id)).await?;

        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            UPDATE subscriptions
            SET plate1 = $2, plate2 = $3, plate3 = $4, modified_by = $5, modified_at = $6
            WHERE id = $1 AND status = 'active'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(plates.primary())
        .bind(plates.secondary())
        .bind(plates.tertiary())
        .bind(modified_by)
        .bind(at)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RegistryError::SubscriptionInactive(id))?;

        tx.commit().await?;
        Subscription::try_from(row)
    }

    async fn subscription_history(
        &self,
        subscription_id: Uuid,
    ) -> Result<Vec<SubscriptionHistoryEntry>, RegistryError> {
        sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT * FROM subscription_history
            WHERE subscription_id = $1
            ORDER BY recorded_at
            "#,
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(SubscriptionHistoryEntry::try_from)
        .collect()
    }

    async fn insert_cancellation(
        &self,
        new: NewCancellation,
    ) -> Result<PendingCancellation, RegistryError> {
        let subscription_id = new.snapshot.subscription_id;
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent opens and approvals on the same subscription
        let status = sqlx::query_scalar::<_, String>(
            r#"
            SELECT status FROM subscriptions WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RegistryError::SubscriptionNotFound(subscription_id))?;

        if status != SubscriptionStatus::Active.as_str() {
            return Err(RegistryError::SubscriptionInactive(subscription_id));
        }

        let plates = &new.snapshot.plates;
        let inserted = sqlx::query_as::<_, CancellationRow>(
            r#"
            INSERT INTO cancellations (
                id, subscription_id, owner_id, plan_type_id, plate1, plate2, plate3,
                access_card, ticket_code, remote_control_number, parking_lot,
                effective_date, registered_at, effective_cancellation_date,
                large_family_expiration, observations, documents,
                status, opened_by, opened_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(subscription_id)
        .bind(&new.snapshot.owner_id)
        .bind(new.snapshot.plan_type_id)
        .bind(plates.primary())
        .bind(plates.secondary())
        .bind(plates.tertiary())
        .bind(&new.snapshot.access_card)
        .bind(&new.snapshot.ticket_code)
        .bind(&new.snapshot.remote_control_number)
        .bind(&new.snapshot.parking_lot)
        .bind(new.snapshot.effective_date)
        .bind(new.snapshot.registered_at)
        .bind(new.effective_cancellation_date)
        .bind(new.large_family_expiration)
        .bind(&new.observations)
        .bind(documents_to_row(&new.documents))
        .bind(CancellationStatus::Pending.as_str())
        .bind(&new.opened_by)
        .bind(new.opened_at)
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(sqlx::Error::Database(db))
                if db.constraint() == Some(PENDING_PER_SUBSCRIPTION_INDEX) =>
            {
                return Err(RegistryError::AlreadyPending(subscription_id));
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;
        pending_from_row(row)
    }

    async fn find_cancellation(&self, id: Uuid) -> Result<Option<Cancellation>, RegistryError> {
        sqlx::query_as::<_, CancellationRow>(
            r#"
            SELECT * FROM cancellations WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Cancellation::try_from)
        .transpose()
    }

    async fn list_pending_cancellations(&self) -> Result<Vec<PendingCancellation>, RegistryError> {
        sqlx::query_as::<_, CancellationRow>(
            r#"
            SELECT * FROM cancellations
            WHERE status = 'pending'
            ORDER BY opened_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(pending_from_row)
        .collect()
    }

    async fn list_approved_cancellations(
        &self,
    ) -> Result<Vec<ApprovedCancellation>, RegistryError> {
        let rows = sqlx::query_as::<_, CancellationRow>(
            r#"
            SELECT * FROM cancellations
            WHERE status = 'approved'
            ORDER BY approved_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| match Cancellation::try_from(row)? {
                Cancellation::Approved(approved) => Ok(approved),
                Cancellation::Pending(pending) => Err(RegistryError::Corrupt(format!(
                    "cancellation {} listed as approved but decoded as pending",
                    pending.id
                ))),
            })
            .collect()
    }

    async fn append_document(
        &self,
        id: Uuid,
        name: &DocumentName,
        modified_by: &str,
        at: DateTime<Utc>,
    ) -> Result<PendingCancellation, RegistryError> {
        let row = sqlx::query_as::<_, CancellationRow>(
            r#"
            UPDATE cancellations
            SET documents = array_append(documents, $2), modified_by = $3, modified_at = $4
            WHERE id = $1 AND status = 'pending' AND NOT ($2 = ANY(documents))
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(name.as_str())
        .bind(modified_by)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => pending_from_row(row),
            None => Err(self.explain_missed_update(id, Some(name)).await),
        }
    }

    async fn remove_document(
        &self,
        id: Uuid,
        name: &DocumentName,
        modified_by: &str,
        at: DateTime<Utc>,
    ) -> Result<PendingCancellation, RegistryError> {
        let row = sqlx::query_as::<_, CancellationRow>(
            r#"
            UPDATE cancellations
            SET documents = array_remove(documents, $2), modified_by = $3, modified_at = $4
            WHERE id = $1 AND status = 'pending' AND $2 = ANY(documents)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(name.as_str())
        .bind(modified_by)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => pending_from_row(row),
            None => Err(self.explain_missed_update(id, Some(name)).await),
        }
    }

    async fn amend_dates(
        &self,
        id: Uuid,
        amendment: &DateAmendment,
        modified_by: &str,
        at: DateTime<Utc>,
    ) -> Result<PendingCancellation, RegistryError> {
        let row = sqlx::query_as::<_, CancellationRow>(
            r#"
            UPDATE cancellations
            SET
                effective_cancellation_date = COALESCE($2, effective_cancellation_date),
                large_family_expiration = COALESCE($3, large_family_expiration),
                modified_by = $4,
                modified_at = $5
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(amendment.effective_cancellation_date)
        .bind(amendment.large_family_expiration)
        .bind(modified_by)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => pending_from_row(row),
            None => Err(self.explain_missed_update(id, None).await),
        }
    }

    async fn approve_cancellation(
        &self,
        id: Uuid,
        stamp: ApprovalStamp,
    ) -> Result<ApprovedCancellation, RegistryError> {
        let mut tx = self.pool.begin().await?;

        // Subscription row first, in the same order as insert_cancellation
        let locked = sqlx::query_scalar::<_, String>(
            r#"
            SELECT s.status FROM subscriptions s
            JOIN cancellations c ON c.subscription_id = s.id
            WHERE c.id = $1
            FOR UPDATE OF s
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if locked.is_none() {
            tx.rollback().await?;
            return Err(RegistryError::CancellationNotFound(id));
        }

        let row = sqlx::query_as::<_, CancellationRow>(
            r#"
            UPDATE cancellations
            SET status = 'approved', approved_by = $2, approved_at = $3
            WHERE id = $1 AND status = 'pending' AND cardinality(documents) > 0
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&stamp.approved_by)
        .bind(stamp.approved_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(self.explain_missed_update(id, None).await);
        };

        let approved = match Cancellation::try_from(row)? {
            Cancellation::Approved(approved) => approved,
            Cancellation::Pending(_) => {
                return Err(RegistryError::Corrupt(format!(
                    "cancellation {} still pending after approval write",
                    id
                )))
            }
        };

        let deactivated = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'cancelled', effective_cancellation_date = $2, modified_by = $3, modified_at = $4
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(approved.snapshot.subscription_id)
        .bind(approved.effective_cancellation_date)
        .bind(&approved.approved_by)
        .bind(approved.approved_at)
        .execute(&mut *tx)
        .await?;

        if deactivated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RegistryError::SubscriptionInactive(
                approved.snapshot.subscription_id,
            ));
        }

        let history = approved.history_entry();
        sqlx::query(
            r#"
            INSERT INTO subscription_history (
                history_id, subscription_id, cancellation_id, owner_id, plan_type_id,
                plate1, plate2, plate3, access_card, documents, observations,
                effective_date, effective_cancellation_date, recorded_by, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(history.history_id)
        .bind(history.subscription_id)
        .bind(history.cancellation_id)
        .bind(&history.owner_id)
        .bind(history.plan_type_id)
        .bind(history.plates.primary())
        .bind(history.plates.secondary())
        .bind(history.plates.tertiary())
        .bind(&history.access_card)
        .bind(documents_to_row(&history.documents))
        .bind(&history.observations)
        .bind(history.effective_date)
        .bind(history.effective_cancellation_date)
        .bind(&history.recorded_by)
        .bind(history.recorded_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(approved)
    }
}
