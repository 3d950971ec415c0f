use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::models::actor::Actor;

/// Header set by the upstream authentication gateway
pub const ACTOR_HEADER: &str = "x-actor-email";

/// Actor attributed to the current request.
///
/// Handlers that mutate state take this extractor, so a request without an
/// identity is rejected before any work is done.
#[derive(Debug, Clone)]
pub struct AuthenticatedActor(pub Actor);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let actor = parts
            .headers
            .get(ACTOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(Actor::new)
            .ok_or_else(|| {
                tracing::debug!(path = %parts.uri.path(), "Request without actor identity");
                AppError::Unauthorized
            })?;

        Ok(AuthenticatedActor(actor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(header: Option<&str>) -> Result<AuthenticatedActor, AppError> {
        let mut builder = Request::builder().uri("/cancellations");
        if let Some(value) = header {
            builder = builder.header(ACTOR_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthenticatedActor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_actor_is_read_from_header() {
        let AuthenticatedActor(actor) = extract(Some(" clerk@example.com ")).await.unwrap();
        assert_eq!(actor.as_str(), "clerk@example.com");
    }

    #[tokio::test]
    async fn test_missing_or_blank_actor_is_unauthorized() {
        assert!(matches!(extract(None).await, Err(AppError::Unauthorized)));
        assert!(matches!(extract(Some("  ")).await, Err(AppError::Unauthorized)));
    }
}
