//! Booking orchestrator: the entry point sequencing the capacity
//! mutator and the invoice reconciler.
//!
//! Ordering is deliberate. The capacity move commits first; only then
//! does the financial leg run. A capacity failure therefore never leaves
//! invoice changes behind, while a financial failure after a committed
//! move is surfaced to the operator and recorded in the audit log rather
//! than rolled back. The two sides are independent failure domains.

use crate::error::BookingError;
use crate::models::{
    AdjustmentKind, BookingAdjustment, InvoiceStatus, LocationBinding, Schedule, ScheduleMode,
    Slot, Transaction,
};
use crate::services::catalog::Catalog;
use crate::services::metrics;
use crate::services::reconciler::InvoiceReconciler;
use crate::services::repository::{FulfillmentStore, ScheduleStore, TransactionStore};
use mongodb::bson::DateTime;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RescheduleCommand {
    pub schedule_id: Uuid,
    pub old_start: DateTime,
    pub new_start: DateTime,
    pub duration_minutes: Option<i64>,
    pub new_quantity: Option<u32>,
    /// Per-seat price in minor units; required for the financial leg of
    /// a quantity change.
    pub price_per_participant_minor: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
pub struct RescheduleOutcome {
    pub new_start: DateTime,
    pub quantity_changed: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct CancelOutcome {
    pub cancelled_transactions: u64,
    pub cancelled_orders: u64,
}

/// Aggregate view of one booked slot, resolved for the GET endpoint.
#[derive(Debug, Clone)]
pub struct BookingSnapshot {
    pub schedule: Schedule,
    pub location_id: String,
    pub slot: Slot,
    pub transactions: Vec<Transaction>,
}

pub struct BookingOrchestrator {
    schedules: Arc<dyn ScheduleStore>,
    transactions: Arc<dyn TransactionStore>,
    fulfillments: Arc<dyn FulfillmentStore>,
    catalog: Arc<dyn Catalog>,
    reconciler: InvoiceReconciler,
}

impl BookingOrchestrator {
    pub fn new(
        schedules: Arc<dyn ScheduleStore>,
        transactions: Arc<dyn TransactionStore>,
        fulfillments: Arc<dyn FulfillmentStore>,
        catalog: Arc<dyn Catalog>,
        reconciler: InvoiceReconciler,
    ) -> Self {
        Self {
            schedules,
            transactions,
            fulfillments,
            catalog,
            reconciler,
        }
    }

    #[tracing::instrument(skip(self, command), fields(schedule_id = %command.schedule_id))]
    pub async fn reschedule(
        &self,
        org_id: &str,
        location_id: &str,
        actor: &str,
        command: RescheduleCommand,
    ) -> Result<RescheduleOutcome, BookingError> {
        let result = self
            .reschedule_inner(org_id, location_id, actor, command)
            .await;
        match &result {
            Ok(_) => metrics::record_operation("reschedule", "success"),
            Err(err) => metrics::record_operation("reschedule", err.metric_label()),
        }
        result
    }

    async fn reschedule_inner(
        &self,
        org_id: &str,
        location_id: &str,
        actor: &str,
        command: RescheduleCommand,
    ) -> Result<RescheduleOutcome, BookingError> {
        let (schedule, mut binding) = self
            .load_aggregate(org_id, location_id, command.schedule_id)
            .await?;

        let slot = binding
            .slot_at(command.old_start)
            .ok_or_else(|| BookingError::NotFound(format!("slot at {}", command.old_start)))?;
        if slot.participants.is_empty() {
            return Err(BookingError::NothingToReschedule);
        }

        let participant_ids: Vec<Uuid> = slot.participants.iter().map(|p| p.id).collect();
        let old_qty = participant_ids.len() as u32;
        let primary_transaction_id = slot.participants[0].transaction_id;
        let transaction_ids = distinct_transactions(&slot.participants);

        let mode = self.schedule_mode(org_id, &schedule).await?;

        binding.move_participants(
            command.old_start,
            command.new_start,
            &participant_ids,
            schedule.capacity,
            command.duration_minutes,
            mode,
        )?;

        // Commit the capacity side before touching money. A conflict or
        // store failure here aborts with no invoice mutation at all.
        self.schedules.save_binding(&mut binding).await?;
        metrics::record_move_size("reschedule", old_qty);

        if command.new_start != command.old_start || command.duration_minutes.is_some() {
            for transaction_id in &transaction_ids {
                let rewritten = self
                    .transactions
                    .rewrite_slot_items(
                        org_id,
                        *transaction_id,
                        command.old_start,
                        command.new_start,
                        command.duration_minutes,
                    )
                    .await?;
                if !rewritten {
                    tracing::debug!(
                        transaction_id = %transaction_id,
                        "Transaction has no line item for the original slot, leaving as is"
                    );
                }
            }
        }

        let mut quantity_changed = false;
        if let (Some(new_qty), Some(price_minor)) =
            (command.new_quantity, command.price_per_participant_minor)
        {
            if new_qty != old_qty {
                self.apply_quantity_change(
                    org_id,
                    actor,
                    &schedule,
                    &mut binding,
                    mode,
                    command.new_start,
                    primary_transaction_id,
                    old_qty,
                    new_qty,
                    price_minor,
                )
                .await?;
                quantity_changed = true;
            }
        }

        tracing::info!(
            schedule_id = %command.schedule_id,
            old_start = %command.old_start,
            new_start = %command.new_start,
            participants = old_qty,
            quantity_changed,
            "Booking rescheduled"
        );

        Ok(RescheduleOutcome {
            new_start: command.new_start,
            quantity_changed,
        })
    }

    /// The financial leg of a reschedule. The invoice adjustment runs
    /// before the seats materialize, but only after a local availability
    /// pre-check so a predictable capacity failure cannot land after an
    /// irreversible invoice change.
    #[allow(clippy::too_many_arguments)]
    async fn apply_quantity_change(
        &self,
        org_id: &str,
        actor: &str,
        schedule: &Schedule,
        binding: &mut LocationBinding,
        mode: ScheduleMode,
        at: DateTime,
        transaction_id: Uuid,
        old_qty: u32,
        new_qty: u32,
        price_minor: i64,
    ) -> Result<(), BookingError> {
        let delta_qty = new_qty as i64 - old_qty as i64;

        if delta_qty > 0 {
            let available = binding.slot_at(at).map(|s| s.available).unwrap_or(0);
            if (available as i64) < delta_qty {
                return Err(BookingError::CapacityExceeded {
                    available,
                    requested: delta_qty as u32,
                });
            }
        }

        let transaction = self
            .transactions
            .get(org_id, transaction_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("transaction {}", transaction_id)))?;

        let delta_minor = delta_qty * price_minor;
        let outcome = self
            .reconciler
            .reconcile_quantity_change(&transaction, old_qty, new_qty, delta_minor, actor)
            .await?;

        // The processor-side swap is irreversible; record it on the
        // transaction before the seats materialize, so a lost aggregate
        // save still leaves the mirrors and audit log pointing at the
        // live invoice.
        self.transactions
            .apply_reconciliation(org_id, transaction.id, &outcome.mirror, &outcome.adjustment)
            .await?;

        binding.resize(
            at,
            delta_qty,
            transaction_id,
            price_minor,
            schedule.capacity,
            mode,
        )?;
        self.schedules.save_binding(binding).await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel(
        &self,
        org_id: &str,
        location_id: &str,
        actor: &str,
        schedule_id: Uuid,
        start: DateTime,
    ) -> Result<CancelOutcome, BookingError> {
        let result = self
            .cancel_inner(org_id, location_id, actor, schedule_id, start)
            .await;
        match &result {
            Ok(_) => metrics::record_operation("cancel", "success"),
            Err(err) => metrics::record_operation("cancel", err.metric_label()),
        }
        result
    }

    async fn cancel_inner(
        &self,
        org_id: &str,
        location_id: &str,
        actor: &str,
        schedule_id: Uuid,
        start: DateTime,
    ) -> Result<CancelOutcome, BookingError> {
        let (schedule, mut binding) = self
            .load_aggregate(org_id, location_id, schedule_id)
            .await?;
        let mode = self.schedule_mode(org_id, &schedule).await?;

        let freed = binding.free_slot(start, schedule.capacity, mode)?;
        let transaction_ids = distinct_transactions(&freed.participants);

        let mut cancelled_transactions = 0u64;
        for transaction_id in &transaction_ids {
            let Some(transaction) = self.transactions.get(org_id, *transaction_id).await? else {
                tracing::warn!(
                    transaction_id = %transaction_id,
                    "Participant references a missing transaction, skipping"
                );
                continue;
            };

            // Void decisions come off the invoice-status mirror; a stale
            // mirror at worst produces a failed void, which is logged
            // per transaction and never aborts the rest of the cleanup.
            let voidable = matches!(
                transaction.invoice_status,
                Some(InvoiceStatus::Open) | Some(InvoiceStatus::Draft)
            );
            if voidable {
                if let Err(err) = self.reconciler.void_invoice(&transaction).await {
                    tracing::warn!(
                        transaction_id = %transaction.id,
                        invoice_id = %transaction.invoice_id.as_deref().unwrap_or("-"),
                        error = %err,
                        "Failed to void invoice, continuing cancellation"
                    );
                }
            }

            let booked_qty = freed
                .participants
                .iter()
                .filter(|p| p.transaction_id == *transaction_id)
                .count() as u32;
            let adjustment = BookingAdjustment {
                at: DateTime::now(),
                kind: AdjustmentKind::Cancellation,
                previous_quantity: booked_qty,
                new_quantity: 0,
                amount_delta_minor: -transaction.amount_due_minor(),
                previous_total_minor: transaction.total_minor(),
                new_total_minor: transaction.total_minor(),
                actor: actor.to_string(),
                invoice_id: transaction.invoice_id.clone(),
                previous_invoice_id: None,
            };

            self.transactions
                .mark_cancelled(org_id, transaction.id, &adjustment, voidable)
                .await?;
            cancelled_transactions += 1;
        }

        let cancelled_orders = self
            .fulfillments
            .cancel_for_transactions(org_id, location_id, &transaction_ids)
            .await?;

        self.schedules.save_binding(&mut binding).await?;

        tracing::info!(
            schedule_id = %schedule_id,
            start = %start,
            cancelled_transactions,
            cancelled_orders,
            slot_deleted = freed.deleted,
            "Booking cancelled"
        );

        Ok(CancelOutcome {
            cancelled_transactions,
            cancelled_orders,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn view(
        &self,
        org_id: &str,
        location_id: &str,
        schedule_id: Uuid,
        start: DateTime,
    ) -> Result<BookingSnapshot, BookingError> {
        let (schedule, binding) = self
            .load_aggregate(org_id, location_id, schedule_id)
            .await?;
        let slot = binding
            .slot_at(start)
            .cloned()
            .ok_or_else(|| BookingError::NotFound(format!("slot at {}", start)))?;

        let transaction_ids = distinct_transactions(&slot.participants);
        let mut transactions = self
            .transactions
            .find_by_ids(org_id, &transaction_ids)
            .await?;
        // The store returns documents in arbitrary order; present them
        // in booking order.
        transactions.sort_by_key(|t| {
            transaction_ids
                .iter()
                .position(|id| *id == t.id)
                .unwrap_or(usize::MAX)
        });

        Ok(BookingSnapshot {
            schedule,
            location_id: location_id.to_string(),
            slot,
            transactions,
        })
    }

    async fn load_aggregate(
        &self,
        org_id: &str,
        location_id: &str,
        schedule_id: Uuid,
    ) -> Result<(Schedule, LocationBinding), BookingError> {
        let schedule = self
            .schedules
            .get_schedule(org_id, schedule_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("schedule {}", schedule_id)))?;
        let binding = self
            .schedules
            .get_binding(org_id, schedule_id, location_id)
            .await?
            .ok_or_else(|| {
                BookingError::NotFound(format!(
                    "schedule {} at location {}",
                    schedule_id, location_id
                ))
            })?;
        Ok((schedule, binding))
    }

    async fn schedule_mode(
        &self,
        org_id: &str,
        schedule: &Schedule,
    ) -> Result<ScheduleMode, BookingError> {
        let open = self
            .catalog
            .is_open_schedule(org_id, schedule.product_id)
            .await?;
        Ok(ScheduleMode::from_open_flag(open))
    }
}

fn distinct_transactions(participants: &[crate::models::ParticipantEntry]) -> Vec<Uuid> {
    let mut ids = Vec::new();
    for participant in participants {
        if !ids.contains(&participant.transaction_id) {
            ids.push(participant.transaction_id);
        }
    }
    ids
}
