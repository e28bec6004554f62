//! Transaction model: the financial record created at purchase time.
//!
//! Transactions are never deleted. Booking changes only transition the
//! status, rewrite line-item datetimes, refresh the invoice mirrors, and
//! append to the `booking_adjustments` audit log. The audit log is the
//! system of record for reconstructing what happened when the capacity
//! side and the processor side disagree.

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Completed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Completed => "completed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

/// Mirror of the processor-side invoice lifecycle. `paid`, `void`, and
/// `uncollectible` are terminal from this subsystem's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Open,
    Paid,
    Void,
    Uncollectible,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Open => "open",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
            InvoiceStatus::Uncollectible => "uncollectible",
        }
    }

    /// Statuses the processor reports that we do not recognize are
    /// treated as terminal so we never mutate an invoice we do not
    /// understand.
    pub fn from_string(s: &str) -> Self {
        match s {
            "draft" => InvoiceStatus::Draft,
            "open" => InvoiceStatus::Open,
            "paid" => InvoiceStatus::Paid,
            "void" => InvoiceStatus::Void,
            _ => InvoiceStatus::Uncollectible,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Paid | InvoiceStatus::Void | InvoiceStatus::Uncollectible
        )
    }
}

/// One purchased product line. `slot_start` links the line to a booked
/// slot; lines without one (retail items in the same basket) are ignored
/// by reschedules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub description: String,
    pub quantity: u32,
    /// Unit price in major units, for display alongside the totals.
    pub unit_price: f64,
    pub slot_start: Option<DateTime>,
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    QuantityIncrease,
    QuantityDecrease,
    Cancellation,
}

impl AdjustmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentKind::QuantityIncrease => "quantity_increase",
            AdjustmentKind::QuantityDecrease => "quantity_decrease",
            AdjustmentKind::Cancellation => "cancellation",
        }
    }

    pub fn for_delta(delta_qty: i64) -> Self {
        if delta_qty >= 0 {
            AdjustmentKind::QuantityIncrease
        } else {
            AdjustmentKind::QuantityDecrease
        }
    }
}

/// One entry of the append-only booking audit log. Amounts are in minor
/// units; `invoice_id` is the invoice resulting from the adjustment and
/// `previous_invoice_id` is set when a void-and-replace swapped it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingAdjustment {
    pub at: DateTime,
    pub kind: AdjustmentKind,
    pub previous_quantity: u32,
    pub new_quantity: u32,
    pub amount_delta_minor: i64,
    pub previous_total_minor: i64,
    pub new_total_minor: i64,
    pub actor: String,
    pub invoice_id: Option<String>,
    pub previous_invoice_id: Option<String>,
}

/// Invoice fields mirrored onto the transaction after a reconciliation,
/// in minor units. The store converts totals to major units for the
/// display mirrors.
#[derive(Debug, Clone)]
pub struct InvoiceMirror {
    pub invoice_id: String,
    pub status: InvoiceStatus,
    pub url: Option<String>,
    pub total_minor: i64,
    pub amount_due_minor: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub org_id: String,
    pub location_id: String,
    pub customer_id: Option<String>,
    pub company_id: Option<String>,
    pub status: TransactionStatus,
    pub currency: String,
    /// Total and outstanding amount in major units, mirroring the
    /// processor-side invoice for display.
    pub total: f64,
    pub amount_due: f64,
    /// Processor sub-account the invoice lives under, captured at
    /// purchase time from the organization's settings.
    pub processor_account: String,
    pub invoice_id: Option<String>,
    pub invoice_status: Option<InvoiceStatus>,
    pub invoice_url: Option<String>,
    pub items: Vec<LineItem>,
    pub booking_adjustments: Vec<BookingAdjustment>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Transaction {
    pub fn total_minor(&self) -> i64 {
        to_minor_units(self.total)
    }

    pub fn amount_due_minor(&self) -> i64 {
        to_minor_units(self.amount_due)
    }
}

/// Major-unit amount to minor units, assuming a two-decimal currency.
pub fn to_minor_units(major: f64) -> i64 {
    (major * 100.0).round() as i64
}

/// Minor-unit amount to major units for the display mirrors.
pub fn to_major_units(minor: i64) -> f64 {
    minor as f64 / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_unit_conversion_round_trips_typical_prices() {
        assert_eq!(to_minor_units(230.0), 23000);
        assert_eq!(to_minor_units(19.99), 1999);
        assert_eq!(to_minor_units(0.0), 0);
        assert_eq!(to_minor_units(-45.50), -4550);
        assert_eq!(to_major_units(23000), 230.0);
        assert_eq!(to_major_units(-4550), -45.5);
    }

    #[test]
    fn unknown_processor_status_is_treated_as_terminal() {
        assert_eq!(
            InvoiceStatus::from_string("deleted"),
            InvoiceStatus::Uncollectible
        );
        assert!(InvoiceStatus::from_string("deleted").is_terminal());
        assert!(!InvoiceStatus::from_string("open").is_terminal());
        assert!(!InvoiceStatus::from_string("draft").is_terminal());
    }

    #[test]
    fn adjustment_kind_follows_delta_sign() {
        assert_eq!(AdjustmentKind::for_delta(3), AdjustmentKind::QuantityIncrease);
        assert_eq!(AdjustmentKind::for_delta(-2), AdjustmentKind::QuantityDecrease);
    }
}
