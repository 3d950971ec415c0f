// API module - HTTP endpoints

use axum::{extract::FromRequest, routing::get, Router};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::AppError;
use crate::models::document::{parse_document_list, DocumentName};

pub mod cancellations;
pub mod documents;
pub mod health;
pub mod middleware;
pub mod state;
pub mod subscriptions;

pub use state::AppState;

/// JSON body extractor whose rejections use the service error format
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Document names given either as a JSON array or as a legacy comma-separated string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DocumentList {
    Names(Vec<DocumentName>),
    Legacy(String),
}

impl Default for DocumentList {
    fn default() -> Self {
        DocumentList::Names(Vec::new())
    }
}

impl From<DocumentList> for Vec<DocumentName> {
    fn from(list: DocumentList) -> Self {
        match list {
            DocumentList::Names(names) => names,
            DocumentList::Legacy(raw) => parse_document_list(&raw),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .merge(subscriptions::router())
        .merge(cancellations::router())
        .merge(documents::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
