use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use parksub::api::{build_router, AppState};
use parksub::models::document::{DocumentName, Namespace};
use parksub::models::subscription::PlanType;
use parksub::registry::{FaultPoint, MemoryRegistry};
use parksub::services::{DocumentStore, MemoryDocumentStore};
use serde_json::{json, Value};
use tower::ServiceExt;

const CLERK: &str = "clerk@example.com";

struct TestApp {
    router: Router,
    registry: Arc<MemoryRegistry>,
    store: Arc<MemoryDocumentStore>,
}

async fn spawn_app() -> TestApp {
    let registry = Arc::new(MemoryRegistry::new());
    registry
        .add_plan_type(PlanType {
            id: 1,
            name: "Residentes".to_string(),
            price_cents: 4500,
            parking_code: "P1".to_string(),
        })
        .await;
    let store = Arc::new(MemoryDocumentStore::new("http://documents.test/").unwrap());

    let state = AppState::new(registry.clone(), store.clone(), 0);

    TestApp {
        router: build_router(state),
        registry,
        store,
    }
}

impl TestApp {
    async fn send(
        &self,
        method: &str,
        uri: &str,
        actor: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            request = request.header("x-actor-email", actor);
        }
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn register(&self, plates: Value) -> (StatusCode, Value) {
        self.send(
            "POST",
            "/subscriptions",
            Some(CLERK),
            Some(json!({
                "owner_id": "12345678Z",
                "plan_type_id": 1,
                "plates": plates,
                "parking_lot": "North",
            })),
        )
        .await
    }

    async fn open(&self, subscription_id: &str) -> (StatusCode, Value) {
        self.send(
            "POST",
            &format!("/subscriptions/{}/cancellation", subscription_id),
            Some(CLERK),
            Some(json!({ "effective_cancellation_date": "2025-06-30T00:00:00Z" })),
        )
        .await
    }
}

#[tokio::test]
async fn test_duplicate_plate_in_any_slot_is_rejected() {
    let app = spawn_app().await;

    let (status, _) = app.register(json!({ "plate1": "ABC123" })).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .register(json!({ "plate1": "XYZ789", "plate3": "ABC123" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
    assert_eq!(body["retryable"], false);

    let (_, list) = app.send("GET", "/subscriptions", None, None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_repeated_plate_within_request_is_a_validation_error() {
    let app = spawn_app().await;

    let (status, body) = app
        .register(json!({ "plate1": "ABC123", "plate2": "ABC123" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation");
}

#[tokio::test]
async fn test_registry_failure_blocks_registration() {
    let app = spawn_app().await;
    app.registry.fail_next(FaultPoint::ListActive);

    let (status, body) = app.register(json!({ "plate1": "ABC123" })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["retryable"], true);

    let (_, list) = app.send("GET", "/subscriptions", None, None).await;
    assert!(list.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_mutations_require_an_actor() {
    let app = spawn_app().await;

    let (status, body) = app
        .send(
            "POST",
            "/subscriptions",
            None,
            Some(json!({ "owner_id": "1", "plan_type_id": 1, "plates": { "plate1": "A" } })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = app
        .send(
            "POST",
            &format!("/cancellations/{}/approve", uuid::Uuid::new_v4()),
            Some("   "),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_second_pending_cancellation_conflicts() {
    let app = spawn_app().await;
    let (_, subscription) = app.register(json!({ "plate1": "ABC123" })).await;
    let id = subscription["id"].as_str().unwrap();

    let (status, _) = app.open(id).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.open(id).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    let (_, pending) = app.send("GET", "/cancellations", None, None).await;
    assert_eq!(pending.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_full_cancellation_lifecycle() {
    let app = spawn_app().await;
    let (_, subscription) = app.register(json!({ "plate1": "ABC123" })).await;
    let subscription_id = subscription["id"].as_str().unwrap().to_string();

    let (_, pending) = app.open(&subscription_id).await;
    let cancellation_id = pending["id"].as_str().unwrap().to_string();
    assert_eq!(pending["documents"], json!([]));

    let (_, approvable) = app
        .send(
            "GET",
            &format!("/cancellations/{}/approvable", cancellation_id),
            None,
            None,
        )
        .await;
    assert_eq!(approvable["can_approve"], false);

    // Approving without documents is refused and changes nothing
    let approve_uri = format!("/cancellations/{}/approve", cancellation_id);
    let (status, body) = app.send("POST", &approve_uri, Some(CLERK), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation");

    let doc1 = DocumentName::parse("doc1.pdf").unwrap();
    app.store.insert(Namespace::Active, &doc1);
    let (status, updated) = app
        .send(
            "POST",
            &format!("/cancellations/{}/documents", cancellation_id),
            Some(CLERK),
            Some(json!({ "name": "doc1.pdf" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["documents"], json!(["doc1.pdf"]));
    assert_eq!(updated["modified_by"], CLERK);

    let (status, approved) = app.send("POST", &approve_uri, Some(CLERK), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["approved_by"], CLERK);
    assert_eq!(approved["documents"], json!(["doc1.pdf"]));

    // The subscription left the active set and its plate is free again
    let (_, active) = app.send("GET", "/subscriptions", None, None).await;
    assert!(active.as_array().unwrap().is_empty());
    let (status, _) = app.register(json!({ "plate1": "ABC123" })).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, history) = app
        .send(
            "GET",
            &format!("/subscriptions/{}/history", subscription_id),
            None,
            None,
        )
        .await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["cancellation_id"], cancellation_id.as_str());

    // Documents move to the archive after approval
    app.store.archive(&doc1);
    let (status, detail) = app
        .send(
            "GET",
            &format!("/approved-cancellations/{}", cancellation_id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        detail["resolved_documents"][0]["address"],
        app.store.address(Namespace::Archived, &doc1).as_str()
    );

    let (_, record) = app
        .send("GET", &format!("/cancellations/{}", cancellation_id), None, None)
        .await;
    assert_eq!(record["status"], "approved");

    let (status, _) = app.send("POST", &approve_uri, Some(CLERK), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_interrupted_approval_can_be_retried() {
    let app = spawn_app().await;
    let (_, subscription) = app.register(json!({ "plate1": "ABC123" })).await;
    let subscription_id = subscription["id"].as_str().unwrap().to_string();
    let (_, pending) = app.open(&subscription_id).await;
    let cancellation_id = pending["id"].as_str().unwrap().to_string();
    app.send(
        "POST",
        &format!("/cancellations/{}/documents", cancellation_id),
        Some(CLERK),
        Some(json!({ "name": "doc1.pdf" })),
    )
    .await;

    app.registry.fail_next(FaultPoint::SubscriptionWrite);
    let approve_uri = format!("/cancellations/{}/approve", cancellation_id);
    let (status, body) = app.send("POST", &approve_uri, Some(CLERK), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["retryable"], true);

    let (_, record) = app
        .send("GET", &format!("/cancellations/{}", cancellation_id), None, None)
        .await;
    assert_eq!(record["status"], "pending");
    let (_, current) = app
        .send("GET", &format!("/subscriptions/{}", subscription_id), None, None)
        .await;
    assert_eq!(current["status"], "active");

    let (status, _) = app.send("POST", &approve_uri, Some(CLERK), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_uploaded_document_is_stored_under_unique_name() {
    let app = spawn_app().await;
    let (_, subscription) = app.register(json!({ "plate1": "ABC123" })).await;
    let (_, pending) = app.open(subscription["id"].as_str().unwrap()).await;
    let cancellation_id = pending["id"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method("PUT")
        .uri(format!(
            "/cancellations/{}/documents/signed%20form.pdf",
            cancellation_id
        ))
        .header("x-actor-email", CLERK)
        .header("content-type", "application/pdf")
        .body(Body::from("%PDF-1.4"))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let updated: Value = serde_json::from_slice(&bytes).unwrap();
    let stored = updated["documents"][0].as_str().unwrap();
    assert!(stored.starts_with(&cancellation_id.replace('-', "")));
    assert!(stored.ends_with("_signed form.pdf"));
    assert!(app
        .store
        .contains(Namespace::Active, &DocumentName::parse(stored).unwrap()));

    let (status, removed) = app
        .send(
            "DELETE",
            &format!(
                "/cancellations/{}/documents/{}",
                cancellation_id,
                stored.replace(' ', "%20")
            ),
            Some(CLERK),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["documents"], json!([]));
}

#[tokio::test]
async fn test_amending_dates_only_while_pending() {
    let app = spawn_app().await;
    let (_, subscription) = app.register(json!({ "plate1": "ABC123" })).await;
    let (_, pending) = app.open(subscription["id"].as_str().unwrap()).await;
    let cancellation_id = pending["id"].as_str().unwrap().to_string();
    let uri = format!("/cancellations/{}", cancellation_id);

    let (status, amended) = app
        .send(
            "PATCH",
            &uri,
            Some(CLERK),
            Some(json!({ "effective_cancellation_date": "2025-07-31T00:00:00Z" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(amended["effective_cancellation_date"], "2025-07-31T00:00:00Z");

    app.send(
        "POST",
        &format!("{}/documents", uri),
        Some(CLERK),
        Some(json!({ "name": "doc1.pdf" })),
    )
    .await;
    app.send("POST", &format!("{}/approve", uri), Some(CLERK), None)
        .await;

    let (status, _) = app
        .send(
            "PATCH",
            &uri,
            Some(CLERK),
            Some(json!({ "effective_cancellation_date": "2025-08-31T00:00:00Z" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_document_address_lookup() {
    let app = spawn_app().await;
    let doc2 = DocumentName::parse("doc2.pdf").unwrap();

    let (status, body) = app
        .send("GET", "/documents/doc2.pdf/address", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["address"],
        app.store.address(Namespace::Archived, &doc2).as_str()
    );
}

#[tokio::test]
async fn test_health_reports_dependencies() {
    let app = spawn_app().await;

    let (status, body) = app.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dependencies"]["registry"]["status"], "healthy");
    assert_eq!(body["dependencies"]["document_store"]["status"], "healthy");
}

#[tokio::test]
async fn test_unknown_cancellation_is_not_found() {
    let app = spawn_app().await;

    let (status, body) = app
        .send(
            "GET",
            &format!("/cancellations/{}", uuid::Uuid::new_v4()),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}
