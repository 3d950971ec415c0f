//! Runs against a live PostgreSQL instance named by `DATABASE_URL`:
//! `cargo test --test pg_registry -- --ignored`

use std::sync::Arc;

use chrono::Utc;
use parksub::db;
use parksub::models::cancellation::{ApprovalStamp, NewCancellation, SubscriptionSnapshot};
use parksub::models::document::DocumentName;
use parksub::models::subscription::{NewSubscription, PlateSet};
use parksub::registry::{PgRegistry, RegistryError, SubscriptionRegistry};

async fn registry() -> (PgRegistry, i64) {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = db::create_pool(&url, 5).await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let plan_type_id: i64 = sqlx::query_scalar(
        "INSERT INTO plan_types (name, price_cents, parking_code) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind("Test plan")
    .bind(1000_i64)
    .bind("T1")
    .fetch_one(&pool)
    .await
    .unwrap();

    (PgRegistry::new(pool), plan_type_id)
}

fn new_subscription(plan_type_id: i64, plate: &str) -> NewSubscription {
    NewSubscription {
        owner_id: "12345678Z".to_string(),
        plan_type_id,
        plates: PlateSet::new(plate, None, None).unwrap(),
        access_card: None,
        ticket_code: None,
        remote_control_number: None,
        parking_lot: None,
        observations: None,
        documents: vec![DocumentName::parse("contract.pdf").unwrap()],
        effective_date: None,
        large_family_expiration: None,
    }
}

#[tokio::test]
#[ignore]
async fn test_concurrent_registrations_of_same_plate() {
    let (registry, plan_type_id) = registry().await;
    let registry = Arc::new(registry);
    let plate = format!("PG{}", uuid::Uuid::new_v4().simple());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let registry = registry.clone();
            let new = new_subscription(plan_type_id, &plate);
            tokio::spawn(async move {
                registry
                    .insert_subscription(new, "pg@example.com", Utc::now())
                    .await
            })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(RegistryError::PlateTaken(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(created, 1);
}

#[tokio::test]
#[ignore]
async fn test_concurrent_approvals_commit_once() {
    let (registry, plan_type_id) = registry().await;
    let plate = format!("PG{}", uuid::Uuid::new_v4().simple());
    let subscription = registry
        .insert_subscription(new_subscription(plan_type_id, &plate), "pg@example.com", Utc::now())
        .await
        .unwrap();

    let pending = registry
        .insert_cancellation(NewCancellation {
            snapshot: SubscriptionSnapshot::from(&subscription),
            effective_cancellation_date: Utc::now(),
            large_family_expiration: None,
            observations: None,
            documents: subscription.documents.clone(),
            opened_by: "pg@example.com".to_string(),
            opened_at: Utc::now(),
        })
        .await
        .unwrap();

    let id = pending.id;
    let registry = Arc::new(registry);
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .approve_cancellation(
                        id,
                        ApprovalStamp {
                            approved_by: "pg@example.com".to_string(),
                            approved_at: Utc::now(),
                        },
                    )
                    .await
            })
        })
        .collect();

    let mut approved = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            approved += 1;
        }
    }
    assert_eq!(approved, 1);

    let history = registry.subscription_history(subscription.id).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
#[ignore]
async fn test_approval_racing_open_never_deadlocks() {
    let (registry, plan_type_id) = registry().await;
    let registry = Arc::new(registry);

    for _ in 0..50 {
        let plate = format!("PG{}", uuid::Uuid::new_v4().simple());
        let subscription = registry
            .insert_subscription(new_subscription(plan_type_id, &plate), "pg@example.com", Utc::now())
            .await
            .unwrap();

        let new_cancellation = || NewCancellation {
            snapshot: SubscriptionSnapshot::from(&subscription),
            effective_cancellation_date: Utc::now(),
            large_family_expiration: None,
            observations: None,
            documents: subscription.documents.clone(),
            opened_by: "pg@example.com".to_string(),
            opened_at: Utc::now(),
        };

        let pending = registry.insert_cancellation(new_cancellation()).await.unwrap();
        let id = pending.id;

        let approver = registry.clone();
        let approve = tokio::spawn(async move {
            approver
                .approve_cancellation(
                    id,
                    ApprovalStamp {
                        approved_by: "pg@example.com".to_string(),
                        approved_at: Utc::now(),
                    },
                )
                .await
        });
        let opener = registry.clone();
        let second = new_cancellation();
        let open = tokio::spawn(async move { opener.insert_cancellation(second).await });

        assert!(approve.await.unwrap().is_ok());
        match open.await.unwrap() {
            Err(RegistryError::AlreadyPending(_)) | Err(RegistryError::SubscriptionInactive(_)) => {}
            other => panic!("unexpected open outcome: {:?}", other.map(|p| p.id)),
        }
    }
}
