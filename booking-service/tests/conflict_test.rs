//! Optimistic-concurrency tests: a lost aggregate save surfaces as a
//! conflict instead of silently overwriting a concurrent change.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use booking_service::error::BookingError;
use booking_service::services::{RescheduleCommand, ScheduleStore};
use common::*;
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

#[tokio::test]
async fn stale_aggregate_save_is_rejected() {
    let app = TestApp::spawn().await;
    let schedule_id = seed_schedule(&app, 10);
    seed_slot(&app, schedule_id, at(9), 10, vec![]);

    // Two operators read the same version of the aggregate.
    let mut first = app.store.binding(schedule_id);
    let mut second = app.store.binding(schedule_id);
    assert_eq!(first.version, second.version);

    app.store.save_binding(&mut first).await.unwrap();
    assert_eq!(first.version, 2);

    let err = app.store.save_binding(&mut second).await.unwrap_err();
    assert!(matches!(err, BookingError::Conflict));

    // The winner's write is untouched.
    assert_eq!(app.store.binding(schedule_id).version, 2);
}

#[tokio::test]
async fn contended_reschedule_surfaces_conflict_without_processor_calls() {
    let app = TestApp::spawn().await;
    let schedule_id = seed_schedule(&app, 10);
    let txn_id = Uuid::new_v4();
    seed_slot(
        &app,
        schedule_id,
        at(9),
        10,
        vec![
            participant(txn_id, "Ada", 2500),
            participant(txn_id, "Grace", 2500),
        ],
    );
    seed_transaction(
        &app,
        transaction_fixture(txn_id, None, 50.0, 50.0, Some(at(9))),
    );

    let schedules = ContendedScheduleStore::new(app.store.clone(), 0);
    let orchestrator = app.orchestrator_with_schedules(schedules, true);
    let err = orchestrator
        .reschedule(
            TEST_ORG,
            TEST_LOCATION,
            "ops@test",
            RescheduleCommand {
                schedule_id,
                old_start: at(9),
                new_start: at(11),
                duration_minutes: None,
                new_quantity: None,
                price_per_participant_minor: None,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::Conflict));

    // Nothing was persisted and the processor was never touched.
    let binding = app.store.binding(schedule_id);
    assert_eq!(binding.version, 1);
    assert_eq!(binding.slot_at(at(9)).unwrap().participants.len(), 2);
    assert!(binding.slot_at(at(11)).is_none());
    let requests = app.stripe.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn contended_reschedule_maps_to_http_409() {
    let app = TestApp::spawn().await;
    let schedule_id = seed_schedule(&app, 10);
    let txn_id = Uuid::new_v4();
    seed_slot(
        &app,
        schedule_id,
        at(9),
        10,
        vec![participant(txn_id, "Ada", 2500)],
    );
    seed_transaction(
        &app,
        transaction_fixture(txn_id, None, 25.0, 25.0, Some(at(9))),
    );

    let schedules = ContendedScheduleStore::new(app.store.clone(), 0);
    let router = app.router_for(app.orchestrator_with_schedules(schedules, true));

    let payload = json!({
        "schedule_id": schedule_id,
        "old_start": at_rfc3339(9),
        "new_start": at_rfc3339(11)
    });

    let response = router
        .oneshot(
            Request::put("/booking")
                .header("X-Org-ID", TEST_ORG)
                .header("X-Location-ID", TEST_LOCATION)
                .header("X-Actor", "ops@test")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}
