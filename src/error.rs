use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::registry::RegistryError;
use crate::services::{
    DocumentStoreError, RegistrationError, UniquenessError, WorkflowError,
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Temporarily unavailable: {0}")]
    Transient(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::Conflict(_) => "conflict",
            AppError::NotFound(_) => "not_found",
            AppError::Transient(_) => "transient",
            AppError::Unauthorized => "unauthorized",
            AppError::Database(_) => "database",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, retryable) = match &self {
            AppError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone(), false),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone(), false),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), false),
            AppError::Transient(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone(), true),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "An authenticated actor is required".to_string(),
                false,
            ),
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Database error".to_string(),
                    true,
                )
            }
            AppError::Internal(e) => {
                tracing::error!(error = ?e, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    false,
                )
            }
        };

        let body = Json(json!({
            "error": self.code(),
            "message": message,
            "retryable": retryable,
        }));

        (status, body).into_response()
    }
}

impl From<RegistryError> for AppError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Database(e) => AppError::Database(e),
            RegistryError::Unavailable(_) => AppError::Transient(e.to_string()),
            RegistryError::Corrupt(_) => AppError::Internal(anyhow::anyhow!(e)),
            RegistryError::SubscriptionNotFound(_)
            | RegistryError::CancellationNotFound(_)
            | RegistryError::DocumentNotAttached { .. } => AppError::NotFound(e.to_string()),
            RegistryError::NoDocuments(_) => AppError::Validation(e.to_string()),
            RegistryError::PlateTaken(_)
            | RegistryError::SubscriptionInactive(_)
            | RegistryError::AlreadyPending(_)
            | RegistryError::NotPending(_)
            | RegistryError::DocumentAlreadyAttached { .. } => AppError::Conflict(e.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<UniquenessError> for AppError {
    fn from(e: UniquenessError) -> Self {
        AppError::Transient(e.to_string())
    }
}

impl From<DocumentStoreError> for AppError {
    fn from(e: DocumentStoreError) -> Self {
        if e.is_transient() {
            AppError::Transient(e.to_string())
        } else {
            AppError::Internal(anyhow::anyhow!(e))
        }
    }
}

impl From<RegistrationError> for AppError {
    fn from(e: RegistrationError) -> Self {
        match e {
            RegistrationError::InvalidPlates(_) => AppError::Validation(e.to_string()),
            RegistrationError::PlanTypeNotFound(_) | RegistrationError::SubscriptionNotFound(_) => {
                AppError::NotFound(e.to_string())
            }
            RegistrationError::SubscriptionInactive(_) | RegistrationError::DuplicatePlate(_) => {
                AppError::Conflict(e.to_string())
            }
            RegistrationError::Uniqueness(e) => e.into(),
            RegistrationError::Registry(e) => e.into(),
        }
    }
}

impl From<WorkflowError> for AppError {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::SubscriptionNotFound(_)
            | WorkflowError::CancellationNotFound(_)
            | WorkflowError::DocumentNotAttached { .. } => AppError::NotFound(e.to_string()),
            WorkflowError::SubscriptionInactive(_)
            | WorkflowError::AlreadyPending(_)
            | WorkflowError::NotPending(_)
            | WorkflowError::DocumentAlreadyAttached { .. } => AppError::Conflict(e.to_string()),
            WorkflowError::MissingDocuments(_) | WorkflowError::EmptyAmendment => {
                AppError::Validation(e.to_string())
            }
            WorkflowError::Upload(e) => e.into(),
            WorkflowError::Registry(e) => e.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::Validation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Transient("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_workflow_errors_map_to_taxonomy() {
        let id = Uuid::new_v4();

        assert!(matches!(
            AppError::from(WorkflowError::MissingDocuments(id)),
            AppError::Validation(_)
        ));
        assert!(matches!(
            AppError::from(WorkflowError::AlreadyPending(id)),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            AppError::from(WorkflowError::CancellationNotFound(id)),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(WorkflowError::Registry(RegistryError::Unavailable("down".into()))),
            AppError::Transient(_)
        ));
    }

    #[test]
    fn test_failed_uniqueness_lookup_is_transient() {
        let error = RegistrationError::Uniqueness(UniquenessError::LookupFailed(
            RegistryError::Unavailable("down".into()),
        ));
        assert!(matches!(AppError::from(error), AppError::Transient(_)));
    }
}
