//! Booking lifecycle handlers.
//!
//! All operations are scoped to the operator's (org, location) context
//! from the request headers.

use axum::{
    extract::{Query, State},
    Json,
};
use mongodb::bson::DateTime;
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{
        BookingQuery, BookingView, CancelRequest, CancelResponse, RescheduleRequest,
        RescheduleResponse,
    },
    middleware::OperatorContext,
    services::RescheduleCommand,
    AppState,
};

/// Aggregate view of one booked slot: metadata, participants, totals,
/// invoice state, and per-transaction audit history.
pub async fn get_booking(
    State(state): State<AppState>,
    operator: OperatorContext,
    Query(query): Query<BookingQuery>,
) -> Result<Json<BookingView>, AppError> {
    let snapshot = state
        .orchestrator
        .view(
            &operator.org_id,
            &operator.location_id,
            query.schedule_id,
            DateTime::from_chrono(query.start),
        )
        .await?;

    Ok(Json(BookingView::from(snapshot)))
}

/// Reschedule, resize, or both, for the booking at `old_start`.
pub async fn reschedule_booking(
    State(state): State<AppState>,
    operator: OperatorContext,
    Json(payload): Json<RescheduleRequest>,
) -> Result<Json<RescheduleResponse>, AppError> {
    payload.validate()?;

    tracing::info!(
        schedule_id = %payload.schedule_id,
        org_id = %operator.org_id,
        location_id = %operator.location_id,
        old_start = %payload.old_start,
        new_start = %payload.new_start,
        new_quantity = ?payload.new_quantity,
        "Rescheduling booking"
    );

    let command = RescheduleCommand {
        schedule_id: payload.schedule_id,
        old_start: DateTime::from_chrono(payload.old_start),
        new_start: DateTime::from_chrono(payload.new_start),
        duration_minutes: payload.duration_minutes,
        new_quantity: payload.new_quantity,
        price_per_participant_minor: payload.price_per_participant_minor(),
    };

    let outcome = state
        .orchestrator
        .reschedule(
            &operator.org_id,
            &operator.location_id,
            &operator.actor,
            command,
        )
        .await?;

    Ok(Json(RescheduleResponse {
        success: true,
        new_start: outcome.new_start.to_chrono(),
        quantity_changed: outcome.quantity_changed,
    }))
}

/// Cancel every booking in the slot: void invoices, cancel downstream
/// fulfillment orders, and free the slot.
pub async fn cancel_booking(
    State(state): State<AppState>,
    operator: OperatorContext,
    Json(payload): Json<CancelRequest>,
) -> Result<Json<CancelResponse>, AppError> {
    payload.validate()?;

    tracing::info!(
        schedule_id = %payload.schedule_id,
        org_id = %operator.org_id,
        location_id = %operator.location_id,
        start = %payload.start,
        "Cancelling booking"
    );

    let outcome = state
        .orchestrator
        .cancel(
            &operator.org_id,
            &operator.location_id,
            &operator.actor,
            payload.schedule_id,
            DateTime::from_chrono(payload.start),
        )
        .await?;

    Ok(Json(CancelResponse {
        success: true,
        cancelled_transactions: outcome.cancelled_transactions,
        cancelled_orders: outcome.cancelled_orders,
    }))
}
