//! Request/response shapes for the booking HTTP surface.
//!
//! Requests carry RFC 3339 datetimes and major-unit prices; handlers
//! convert to the bson datetimes and minor units the engine works in.

use crate::models::{
    to_major_units, to_minor_units, BookingAdjustment, ParticipantEntry, Transaction,
};
use crate::services::BookingSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct BookingQuery {
    pub schedule_id: Uuid,
    pub start: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RescheduleRequest {
    pub schedule_id: Uuid,
    pub old_start: DateTime<Utc>,
    pub new_start: DateTime<Utc>,
    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: Option<i64>,
    #[validate(range(min = 1))]
    pub new_quantity: Option<u32>,
    /// Major units; converted once at this boundary.
    #[validate(range(min = 0.0))]
    pub price_per_participant: Option<f64>,
}

impl RescheduleRequest {
    pub fn price_per_participant_minor(&self) -> Option<i64> {
        self.price_per_participant.map(to_minor_units)
    }
}

#[derive(Debug, Serialize)]
pub struct RescheduleResponse {
    pub success: bool,
    pub new_start: DateTime<Utc>,
    pub quantity_changed: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelRequest {
    pub schedule_id: Uuid,
    pub start: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub cancelled_transactions: u64,
    pub cancelled_orders: u64,
}

#[derive(Debug, Serialize)]
pub struct ParticipantView {
    pub id: Uuid,
    pub display_name: String,
    pub customer_id: Option<String>,
    pub company_id: Option<String>,
    pub transaction_id: Uuid,
    pub price: f64,
    pub status: String,
}

impl From<&ParticipantEntry> for ParticipantView {
    fn from(entry: &ParticipantEntry) -> Self {
        Self {
            id: entry.id,
            display_name: entry.display_name.clone(),
            customer_id: entry.customer_id.clone(),
            company_id: entry.company_id.clone(),
            transaction_id: entry.transaction_id,
            price: to_major_units(entry.price_minor),
            status: entry.status.as_str().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AdjustmentView {
    pub at: DateTime<Utc>,
    pub kind: String,
    pub previous_quantity: u32,
    pub new_quantity: u32,
    pub amount_delta: f64,
    pub previous_total: f64,
    pub new_total: f64,
    pub actor: String,
    pub invoice_id: Option<String>,
    pub previous_invoice_id: Option<String>,
}

impl From<&BookingAdjustment> for AdjustmentView {
    fn from(adjustment: &BookingAdjustment) -> Self {
        Self {
            at: adjustment.at.to_chrono(),
            kind: adjustment.kind.as_str().to_string(),
            previous_quantity: adjustment.previous_quantity,
            new_quantity: adjustment.new_quantity,
            amount_delta: to_major_units(adjustment.amount_delta_minor),
            previous_total: to_major_units(adjustment.previous_total_minor),
            new_total: to_major_units(adjustment.new_total_minor),
            actor: adjustment.actor.clone(),
            invoice_id: adjustment.invoice_id.clone(),
            previous_invoice_id: adjustment.previous_invoice_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionView {
    pub id: Uuid,
    pub status: String,
    pub currency: String,
    pub total: f64,
    pub amount_due: f64,
    pub invoice_id: Option<String>,
    pub invoice_status: Option<String>,
    pub invoice_url: Option<String>,
    pub adjustments: Vec<AdjustmentView>,
}

impl From<&Transaction> for TransactionView {
    fn from(transaction: &Transaction) -> Self {
        Self {
            id: transaction.id,
            status: transaction.status.as_str().to_string(),
            currency: transaction.currency.clone(),
            total: transaction.total,
            amount_due: transaction.amount_due,
            invoice_id: transaction.invoice_id.clone(),
            invoice_status: transaction.invoice_status.map(|s| s.as_str().to_string()),
            invoice_url: transaction.invoice_url.clone(),
            adjustments: transaction
                .booking_adjustments
                .iter()
                .map(AdjustmentView::from)
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookingView {
    pub schedule_id: Uuid,
    pub schedule_name: String,
    pub location_id: String,
    pub start: DateTime<Utc>,
    pub duration_minutes: i64,
    pub label: Option<String>,
    pub capacity: u32,
    pub available: u32,
    pub participants: Vec<ParticipantView>,
    pub total_amount: f64,
    pub total_amount_due: f64,
    pub transactions: Vec<TransactionView>,
}

impl From<BookingSnapshot> for BookingView {
    fn from(snapshot: BookingSnapshot) -> Self {
        let total_amount = snapshot.transactions.iter().map(|t| t.total).sum();
        let total_amount_due = snapshot.transactions.iter().map(|t| t.amount_due).sum();
        Self {
            schedule_id: snapshot.schedule.id,
            schedule_name: snapshot.schedule.name.clone(),
            location_id: snapshot.location_id,
            start: snapshot.slot.start.to_chrono(),
            duration_minutes: snapshot.slot.duration_minutes,
            label: snapshot.slot.label.clone(),
            capacity: snapshot.schedule.capacity,
            available: snapshot.slot.available,
            participants: snapshot
                .slot
                .participants
                .iter()
                .map(ParticipantView::from)
                .collect(),
            total_amount,
            total_amount_due,
            transactions: snapshot
                .transactions
                .iter()
                .map(TransactionView::from)
                .collect(),
        }
    }
}
