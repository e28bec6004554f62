use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    Active,
    Completed,
    Cancelled,
}

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Active => "active",
            FulfillmentStatus::Completed => "completed",
            FulfillmentStatus::Cancelled => "cancelled",
        }
    }
}

/// Downstream fulfillment record (kitchen ticket, bump order) keyed by
/// transaction. Owned by another service; this one only bulk-cancels
/// them when a booking is cancelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentOrder {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub org_id: String,
    pub location_id: String,
    pub transaction_id: Uuid,
    pub status: FulfillmentStatus,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}
