use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::middleware::actor::AuthenticatedActor;
use crate::api::{AppJson, AppState};
use crate::error::{AppError, Result};
use crate::models::cancellation::{
    ApprovedCancellation, Cancellation, DateAmendment, PendingCancellation,
};
use crate::models::document::{DocumentName, DocumentReference, ResolvedDocument};
use crate::services::CancellationWorkflow;

/// A lifecycle record together with where each of its documents can be opened
#[derive(Debug, Serialize)]
pub struct CancellationDetail<T> {
    #[serde(flatten)]
    pub record: T,
    pub resolved_documents: Vec<ResolvedDocument>,
}

#[derive(Debug, Serialize)]
pub struct ApprovableResponse {
    pub cancellation_id: Uuid,
    pub can_approve: bool,
    pub document_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct AttachDocumentRequest {
    pub name: DocumentName,
}

fn document_name(raw: &str) -> Result<DocumentName> {
    DocumentName::parse(raw).map_err(|e| AppError::Validation(e.to_string()))
}

async fn list_pending(State(state): State<AppState>) -> Result<Json<Vec<PendingCancellation>>> {
    Ok(Json(state.workflow.list_pending().await?))
}

async fn get_cancellation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancellationDetail<Cancellation>>> {
    let record = state.workflow.get(id).await?;
    let resolved_documents = state.resolver.resolve_all(record.documents()).await;

    Ok(Json(CancellationDetail {
        record,
        resolved_documents,
    }))
}

async fn amend_dates(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AuthenticatedActor(actor): AuthenticatedActor,
    AppJson(amendment): AppJson<DateAmendment>,
) -> Result<Json<PendingCancellation>> {
    let updated = state
        .workflow
        .amend_dates(id, &amendment, &actor, Utc::now())
        .await?;

    Ok(Json(updated))
}

async fn approvable(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApprovableResponse>> {
    let pending = state.workflow.get_pending(id).await?;

    Ok(Json(ApprovableResponse {
        cancellation_id: pending.id,
        can_approve: CancellationWorkflow::can_approve(&pending),
        document_count: pending.documents.len(),
    }))
}

async fn attach_existing_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AuthenticatedActor(actor): AuthenticatedActor,
    AppJson(request): AppJson<AttachDocumentRequest>,
) -> Result<Json<PendingCancellation>> {
    let updated = state
        .workflow
        .attach_document(
            id,
            DocumentReference::Existing { name: request.name },
            &actor,
            Utc::now(),
        )
        .await?;

    Ok(Json(updated))
}

/// Uploads the raw request body as a new supporting document
async fn upload_document(
    State(state): State<AppState>,
    Path((id, name)): Path<(Uuid, String)>,
    AuthenticatedActor(actor): AuthenticatedActor,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<PendingCancellation>)> {
    let name = document_name(&name)?;
    if body.is_empty() {
        return Err(AppError::Validation(format!(
            "Document {} has no content",
            name
        )));
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let updated = state
        .workflow
        .attach_document(
            id,
            DocumentReference::New {
                name,
                content: body.to_vec(),
                content_type,
            },
            &actor,
            Utc::now(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(updated)))
}

async fn remove_document(
    State(state): State<AppState>,
    Path((id, name)): Path<(Uuid, String)>,
    AuthenticatedActor(actor): AuthenticatedActor,
) -> Result<Json<PendingCancellation>> {
    let name = document_name(&name)?;

    let updated = state
        .workflow
        .remove_document(id, &name, &actor, Utc::now())
        .await?;

    Ok(Json(updated))
}

async fn approve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    AuthenticatedActor(actor): AuthenticatedActor,
) -> Result<Json<ApprovedCancellation>> {
    Ok(Json(state.workflow.approve(id, &actor, Utc::now()).await?))
}

async fn list_approved(
    State(state): State<AppState>,
) -> Result<Json<Vec<ApprovedCancellation>>> {
    Ok(Json(state.workflow.list_approved().await?))
}

async fn get_approved(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancellationDetail<ApprovedCancellation>>> {
    let record = state.workflow.get_approved(id).await?;
    let resolved_documents = state.resolver.resolve_all(&record.documents).await;

    Ok(Json(CancellationDetail {
        record,
        resolved_documents,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cancellations", get(list_pending))
        .route(
            "/cancellations/:id",
            get(get_cancellation).patch(amend_dates),
        )
        .route("/cancellations/:id/approvable", get(approvable))
        .route(
            "/cancellations/:id/documents",
            post(attach_existing_document),
        )
        .route(
            "/cancellations/:id/documents/:name",
            put(upload_document).delete(remove_document),
        )
        .route("/cancellations/:id/approve", post(approve))
        .route("/approved-cancellations", get(list_approved))
        .route("/approved-cancellations/:id", get(get_approved))
}
