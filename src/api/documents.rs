use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::models::document::{DocumentName, ResolvedDocument};

/// Current address of a single document, archived namespace first
async fn resolve_address(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ResolvedDocument>> {
    let name = DocumentName::parse(&name).map_err(|e| AppError::Validation(e.to_string()))?;
    let address = state.resolver.resolve(&name).await;

    Ok(Json(ResolvedDocument { name, address }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/documents/:name/address", get(resolve_address))
}
