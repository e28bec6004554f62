//! Persistence layer for the booking engine.
//!
//! The store traits are the seams the orchestrator works against; the
//! Mongo-backed `BookingRepository` implements all of them. The slot
//! aggregate is saved through a version-guarded replace so concurrent
//! mutations of the same (schedule, location) serialize instead of
//! losing updates.

use crate::error::BookingError;
use crate::models::{
    to_major_units, BookingAdjustment, FulfillmentOrder, FulfillmentStatus, InvoiceMirror,
    InvoiceStatus, LocationBinding, Schedule, Transaction, TransactionStatus,
};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, DateTime};
use mongodb::options::{IndexOptions, UpdateOptions};
use mongodb::{bson, Collection, Database, IndexModel};
use uuid::Uuid;

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn get_schedule(
        &self,
        org_id: &str,
        schedule_id: Uuid,
    ) -> Result<Option<Schedule>, BookingError>;

    async fn get_binding(
        &self,
        org_id: &str,
        schedule_id: Uuid,
        location_id: &str,
    ) -> Result<Option<LocationBinding>, BookingError>;

    /// Persists the aggregate if and only if its stored version still
    /// matches the one read. On success the in-memory version is bumped
    /// so a follow-up save in the same operation stays consistent; a
    /// mismatch surfaces as `Conflict` and is never retried here.
    async fn save_binding(&self, binding: &mut LocationBinding) -> Result<(), BookingError>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn get(&self, org_id: &str, id: Uuid) -> Result<Option<Transaction>, BookingError>;

    async fn find_by_ids(
        &self,
        org_id: &str,
        ids: &[Uuid],
    ) -> Result<Vec<Transaction>, BookingError>;

    /// Rewrites the slot start (and duration, when given) of every line
    /// item matching `old_start`. Transactions without a matching item
    /// are left untouched. Returns whether anything was rewritten.
    async fn rewrite_slot_items(
        &self,
        org_id: &str,
        id: Uuid,
        old_start: DateTime,
        new_start: DateTime,
        duration_minutes: Option<i64>,
    ) -> Result<bool, BookingError>;

    /// Applies a reconciliation outcome: invoice mirrors and the audit
    /// entry land in one atomic update so the append never races the
    /// mirror writes.
    async fn apply_reconciliation(
        &self,
        org_id: &str,
        id: Uuid,
        mirror: &InvoiceMirror,
        adjustment: &BookingAdjustment,
    ) -> Result<(), BookingError>;

    /// Cancels the transaction: status `cancelled`, amount due zeroed,
    /// audit entry appended, atomically. The invoice mirror flips to
    /// `void` only when `invoice_voided` says the invoice was actually
    /// voidable; terminal invoices keep their real status.
    async fn mark_cancelled(
        &self,
        org_id: &str,
        id: Uuid,
        adjustment: &BookingAdjustment,
        invoice_voided: bool,
    ) -> Result<(), BookingError>;
}

#[async_trait]
pub trait FulfillmentStore: Send + Sync {
    /// Bulk-cancels every active order referencing one of the given
    /// transactions. Returns the number of orders cancelled.
    async fn cancel_for_transactions(
        &self,
        org_id: &str,
        location_id: &str,
        transaction_ids: &[Uuid],
    ) -> Result<u64, BookingError>;
}

#[derive(Clone)]
pub struct BookingRepository {
    schedules: Collection<Schedule>,
    bindings: Collection<LocationBinding>,
    transactions: Collection<Transaction>,
    fulfillments: Collection<FulfillmentOrder>,
}

impl BookingRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            schedules: db.collection("schedules"),
            bindings: db.collection("location_bindings"),
            transactions: db.collection("transactions"),
            fulfillments: db.collection("fulfillment_orders"),
        }
    }

    /// Initialize database indexes for tenant-scoped queries.
    pub async fn init_indexes(&self) -> anyhow::Result<()> {
        let binding_index = IndexModel::builder()
            .keys(doc! { "org_id": 1, "schedule_id": 1, "location_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("org_schedule_location_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.bindings.create_indexes([binding_index], None).await?;

        let txn_org_index = IndexModel::builder()
            .keys(doc! { "org_id": 1, "_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("org_transaction_idx".to_string())
                    .build(),
            )
            .build();

        let txn_items_index = IndexModel::builder()
            .keys(doc! { "org_id": 1, "items.slot_start": 1 })
            .options(
                IndexOptions::builder()
                    .name("org_slot_item_idx".to_string())
                    .build(),
            )
            .build();

        self.transactions
            .create_indexes([txn_org_index, txn_items_index], None)
            .await?;

        let fulfillment_index = IndexModel::builder()
            .keys(doc! { "org_id": 1, "location_id": 1, "transaction_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("org_location_transaction_idx".to_string())
                    .build(),
            )
            .build();

        self.fulfillments
            .create_indexes([fulfillment_index], None)
            .await?;

        tracing::info!("Booking service indexes initialized");
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for BookingRepository {
    #[tracing::instrument(skip(self))]
    async fn get_schedule(
        &self,
        org_id: &str,
        schedule_id: Uuid,
    ) -> Result<Option<Schedule>, BookingError> {
        let filter = doc! { "_id": schedule_id.to_string(), "org_id": org_id };
        Ok(self.schedules.find_one(filter, None).await?)
    }

    #[tracing::instrument(skip(self))]
    async fn get_binding(
        &self,
        org_id: &str,
        schedule_id: Uuid,
        location_id: &str,
    ) -> Result<Option<LocationBinding>, BookingError> {
        let filter = doc! {
            "org_id": org_id,
            "schedule_id": schedule_id.to_string(),
            "location_id": location_id
        };
        Ok(self.bindings.find_one(filter, None).await?)
    }

    #[tracing::instrument(skip(self, binding), fields(binding_id = %binding.id, version = binding.version))]
    async fn save_binding(&self, binding: &mut LocationBinding) -> Result<(), BookingError> {
        let filter = doc! {
            "_id": binding.id.to_string(),
            "version": binding.version
        };

        let mut next = binding.clone();
        next.version += 1;
        next.updated_at = DateTime::now();

        let result = self.bindings.replace_one(filter, &next, None).await?;
        if result.matched_count == 0 {
            tracing::warn!(
                binding_id = %binding.id,
                version = binding.version,
                "Aggregate version mismatch, rejecting save"
            );
            return Err(BookingError::Conflict);
        }

        *binding = next;
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for BookingRepository {
    #[tracing::instrument(skip(self))]
    async fn get(&self, org_id: &str, id: Uuid) -> Result<Option<Transaction>, BookingError> {
        let filter = doc! { "_id": id.to_string(), "org_id": org_id };
        Ok(self.transactions.find_one(filter, None).await?)
    }

    async fn find_by_ids(
        &self,
        org_id: &str,
        ids: &[Uuid],
    ) -> Result<Vec<Transaction>, BookingError> {
        let id_strings: Vec<String> = ids.iter().map(Uuid::to_string).collect();
        let filter = doc! { "org_id": org_id, "_id": { "$in": id_strings } };
        let cursor = self.transactions.find(filter, None).await?;
        Ok(cursor.try_collect().await?)
    }

    #[tracing::instrument(skip(self))]
    async fn rewrite_slot_items(
        &self,
        org_id: &str,
        id: Uuid,
        old_start: DateTime,
        new_start: DateTime,
        duration_minutes: Option<i64>,
    ) -> Result<bool, BookingError> {
        // Matching the original start in the filter keeps transactions
        // without a rewritable schedule reference untouched.
        let filter = doc! {
            "_id": id.to_string(),
            "org_id": org_id,
            "items.slot_start": old_start
        };

        let mut set = doc! {
            "items.$[item].slot_start": new_start,
            "updated_at": DateTime::now()
        };
        if let Some(duration) = duration_minutes {
            set.insert("items.$[item].duration_minutes", duration);
        }

        let options = UpdateOptions::builder()
            .array_filters(vec![doc! { "item.slot_start": old_start }])
            .build();

        let result = self
            .transactions
            .update_one(filter, doc! { "$set": set }, options)
            .await?;
        Ok(result.modified_count > 0)
    }

    #[tracing::instrument(skip(self, mirror, adjustment))]
    async fn apply_reconciliation(
        &self,
        org_id: &str,
        id: Uuid,
        mirror: &InvoiceMirror,
        adjustment: &BookingAdjustment,
    ) -> Result<(), BookingError> {
        let filter = doc! { "_id": id.to_string(), "org_id": org_id };
        let update = doc! {
            "$set": {
                "invoice_id": mirror.invoice_id.clone(),
                "invoice_status": bson::to_bson(&mirror.status)?,
                "invoice_url": mirror.url.clone(),
                "total": to_major_units(mirror.total_minor),
                "amount_due": to_major_units(mirror.amount_due_minor),
                "updated_at": DateTime::now()
            },
            "$push": { "booking_adjustments": bson::to_bson(adjustment)? }
        };
        self.transactions.update_one(filter, update, None).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, adjustment))]
    async fn mark_cancelled(
        &self,
        org_id: &str,
        id: Uuid,
        adjustment: &BookingAdjustment,
        invoice_voided: bool,
    ) -> Result<(), BookingError> {
        let filter = doc! { "_id": id.to_string(), "org_id": org_id };
        let mut set = doc! {
            "status": bson::to_bson(&TransactionStatus::Cancelled)?,
            "amount_due": 0.0,
            "updated_at": DateTime::now()
        };
        if invoice_voided {
            set.insert("invoice_status", bson::to_bson(&InvoiceStatus::Void)?);
        }
        let update = doc! {
            "$set": set,
            "$push": { "booking_adjustments": bson::to_bson(adjustment)? }
        };
        self.transactions.update_one(filter, update, None).await?;
        Ok(())
    }
}

#[async_trait]
impl FulfillmentStore for BookingRepository {
    #[tracing::instrument(skip(self, transaction_ids), fields(transactions = transaction_ids.len()))]
    async fn cancel_for_transactions(
        &self,
        org_id: &str,
        location_id: &str,
        transaction_ids: &[Uuid],
    ) -> Result<u64, BookingError> {
        if transaction_ids.is_empty() {
            return Ok(0);
        }

        let id_strings: Vec<String> = transaction_ids.iter().map(Uuid::to_string).collect();
        let filter = doc! {
            "org_id": org_id,
            "location_id": location_id,
            "transaction_id": { "$in": id_strings },
            "status": { "$ne": bson::to_bson(&FulfillmentStatus::Cancelled)? }
        };
        let update = doc! {
            "$set": {
                "status": bson::to_bson(&FulfillmentStatus::Cancelled)?,
                "updated_at": DateTime::now()
            }
        };

        let result = self.fulfillments.update_many(filter, update, None).await?;
        Ok(result.modified_count)
    }
}
