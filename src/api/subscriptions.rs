use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::middleware::actor::AuthenticatedActor;
use crate::api::{AppJson, AppState, DocumentList};
use crate::error::Result;
use crate::models::cancellation::PendingCancellation;
use crate::models::subscription::{
    NewSubscription, PlateError, PlateSet, Subscription, SubscriptionHistoryEntry,
};
use crate::services::{OpenCancellation, RegistrationError};

/// Plates as typed by the clerk; validated into a [`PlateSet`]
#[derive(Debug, Deserialize)]
pub struct PlatesRequest {
    pub plate1: String,
    #[serde(default)]
    pub plate2: Option<String>,
    #[serde(default)]
    pub plate3: Option<String>,
}

impl TryFrom<PlatesRequest> for PlateSet {
    type Error = PlateError;

    fn try_from(request: PlatesRequest) -> std::result::Result<Self, Self::Error> {
        PlateSet::new(request.plate1, request.plate2, request.plate3)
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterSubscriptionRequest {
    pub owner_id: String,
    pub plan_type_id: i64,
    pub plates: PlatesRequest,
    #[serde(default)]
    pub access_card: Option<String>,
    #[serde(default)]
    pub ticket_code: Option<String>,
    #[serde(default)]
    pub remote_control_number: Option<String>,
    #[serde(default)]
    pub parking_lot: Option<String>,
    #[serde(default)]
    pub observations: Option<String>,
    #[serde(default)]
    pub documents: DocumentList,
    #[serde(default)]
    pub effective_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub large_family_expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct OpenCancellationRequest {
    pub effective_cancellation_date: DateTime<Utc>,
    #[serde(default)]
    pub large_family_expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub observations: Option<String>,
    #[serde(default)]
    pub documents: DocumentList,
}

async fn list_subscriptions(State(state): State<AppState>) -> Result<Json<Vec<Subscription>>> {
    Ok(Json(state.registration.list_active().await?))
}

async fn register_subscription(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    AppJson(request): AppJson<RegisterSubscriptionRequest>,
) -> Result<(StatusCode, Json<Subscription>)> {
    let plates = PlateSet::try_from(request.plates).map_err(RegistrationError::from)?;

    let new = NewSubscription {
        owner_id: request.owner_id,
        plan_type_id: request.plan_type_id,
        plates,
        access_card: request.access_card,
        ticket_code: request.ticket_code,
        remote_control_number: request.remote_control_number,
        parking_lot: request.parking_lot,
        observations: request.observations,
        documents: request.documents.into(),
        effective_date: request.effective_date,
        large_family_expiration: request.large_family_expiration,
    };

    let subscription = state.registration.register(new, &actor, Utc::now()).await?;

    Ok((StatusCode::CREATED, Json(subscription)))
}

async fn get_subscription(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Subscription>> {
    Ok(Json(state.registration.get(id).await?))
}

async fn update_plates(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AuthenticatedActor(actor): AuthenticatedActor,
    AppJson(request): AppJson<PlatesRequest>,
) -> Result<Json<Subscription>> {
    let plates = PlateSet::try_from(request).map_err(RegistrationError::from)?;

    let updated = state
        .registration
        .update_plates(id, plates, &actor, Utc::now())
        .await?;

    Ok(Json(updated))
}

async fn subscription_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<SubscriptionHistoryEntry>>> {
    Ok(Json(state.registration.history(id).await?))
}

async fn open_cancellation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AuthenticatedActor(actor): AuthenticatedActor,
    AppJson(request): AppJson<OpenCancellationRequest>,
) -> Result<(StatusCode, Json<PendingCancellation>)> {
    let pending = state
        .workflow
        .open(
            OpenCancellation {
                subscription_id: id,
                effective_cancellation_date: request.effective_cancellation_date,
                large_family_expiration: request.large_family_expiration,
                observations: request.observations,
                documents: request.documents.into(),
            },
            &actor,
            Utc::now(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(pending)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/subscriptions",
            get(list_subscriptions).post(register_subscription),
        )
        .route("/subscriptions/:id", get(get_subscription))
        .route("/subscriptions/:id/plates", put(update_plates))
        .route("/subscriptions/:id/history", get(subscription_history))
        .route("/subscriptions/:id/cancellation", post(open_cancellation))
}
