//! Invoice reconciler: translates a participant-count change into a
//! financial adjustment against the transaction's Stripe invoice.
//!
//! Strategy depends on the invoice state read from the processor:
//! - `draft`: append a line item for the delta and finalize.
//! - `open`: finalized invoices cannot take new line items, so void the
//!   invoice and replace it with a fresh one for the adjusted total,
//!   crediting any amount already paid back to the customer.
//! - `paid` / `void` / `uncollectible`: immutable; the caller's
//!   non-financial changes stand and the operator is told to handle
//!   billing manually.
//!
//! All processor math runs in minor currency units. The caller persists
//! the returned mirror and audit entry in one atomic transaction update.

use crate::error::BookingError;
use crate::models::{
    AdjustmentKind, BookingAdjustment, InvoiceMirror, InvoiceStatus, Transaction,
};
use crate::services::stripe::{InvoiceObject, StripeClient};
use mongodb::bson::DateTime;

/// What a successful reconciliation produced: the fields to mirror onto
/// the transaction and the audit entry to append.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub mirror: InvoiceMirror,
    pub adjustment: BookingAdjustment,
}

#[derive(Clone)]
pub struct InvoiceReconciler {
    stripe: StripeClient,
    send_invoices: bool,
}

impl InvoiceReconciler {
    pub fn new(stripe: StripeClient, send_invoices: bool) -> Self {
        Self {
            stripe,
            send_invoices,
        }
    }

    /// Reconciles a quantity change of `delta_qty` participants and
    /// `delta_minor` minor units against the transaction's invoice.
    #[tracing::instrument(
        skip(self, transaction),
        fields(transaction_id = %transaction.id, invoice_id = ?transaction.invoice_id)
    )]
    pub async fn reconcile_quantity_change(
        &self,
        transaction: &Transaction,
        previous_qty: u32,
        new_qty: u32,
        delta_minor: i64,
        actor: &str,
    ) -> Result<ReconcileOutcome, BookingError> {
        let invoice_id = transaction.invoice_id.as_deref().ok_or_else(|| {
            // No invoice reference means no financial adjustment is
            // possible; same partial-success shape as a terminal state.
            BookingError::InvoiceImmutable {
                invoice_id: "none".to_string(),
                status: "missing".to_string(),
            }
        })?;

        let account = &transaction.processor_account;
        let invoice = self.stripe.get_invoice(account, invoice_id).await?;
        let status = InvoiceStatus::from_string(&invoice.status);

        if status.is_terminal() {
            return Err(BookingError::InvoiceImmutable {
                invoice_id: invoice.id,
                status: invoice.status,
            });
        }

        let delta_qty = new_qty as i64 - previous_qty as i64;
        let outcome = match status {
            InvoiceStatus::Draft => {
                self.adjust_draft(transaction, &invoice, delta_qty, delta_minor)
                    .await?
            }
            InvoiceStatus::Open => {
                self.void_and_replace(transaction, &invoice, delta_qty, delta_minor)
                    .await?
            }
            // Terminal states returned above.
            _ => unreachable!("terminal invoice states are rejected earlier"),
        };

        let adjustment = BookingAdjustment {
            at: DateTime::now(),
            kind: AdjustmentKind::for_delta(delta_qty),
            previous_quantity: previous_qty,
            new_quantity: new_qty,
            amount_delta_minor: delta_minor,
            previous_total_minor: invoice.total,
            new_total_minor: outcome.mirror.total_minor,
            actor: actor.to_string(),
            invoice_id: Some(outcome.mirror.invoice_id.clone()),
            previous_invoice_id: outcome.previous_invoice_id,
        };

        tracing::info!(
            transaction_id = %transaction.id,
            invoice_id = %adjustment.invoice_id.as_deref().unwrap_or("-"),
            previous_invoice_id = ?adjustment.previous_invoice_id,
            delta_qty,
            delta_minor,
            "Invoice reconciled for quantity change"
        );

        Ok(ReconcileOutcome {
            mirror: outcome.mirror,
            adjustment,
        })
    }

    /// Draft path: the invoice is still editable, so the delta lands as
    /// one more line item before finalization.
    async fn adjust_draft(
        &self,
        transaction: &Transaction,
        invoice: &InvoiceObject,
        delta_qty: i64,
        delta_minor: i64,
    ) -> Result<StrategyOutcome, BookingError> {
        let account = &transaction.processor_account;

        self.stripe
            .create_invoice_item(
                account,
                &invoice.customer,
                &invoice.id,
                delta_minor,
                &invoice.currency,
                &adjustment_label(delta_qty),
            )
            .await?;

        let finalized = self.stripe.finalize_invoice(account, &invoice.id).await?;
        self.send_if_configured(account, &finalized.id).await;

        Ok(StrategyOutcome {
            mirror: mirror_of(&finalized),
            previous_invoice_id: None,
        })
    }

    /// Open path: void the finalized invoice and issue a replacement for
    /// the adjusted total. A partial payment on the original becomes a
    /// credit note so the customer keeps what they already paid.
    async fn void_and_replace(
        &self,
        transaction: &Transaction,
        invoice: &InvoiceObject,
        delta_qty: i64,
        delta_minor: i64,
    ) -> Result<StrategyOutcome, BookingError> {
        let account = &transaction.processor_account;
        let amount_paid = invoice.amount_paid;
        let new_total = invoice.total + delta_minor;

        self.stripe.void_invoice(account, &invoice.id).await?;

        let replacement = self
            .stripe
            .create_invoice(
                account,
                &invoice.customer,
                &invoice.currency,
                Some("Booking quantity adjustment"),
                &[
                    ("replaces_invoice", invoice.id.clone()),
                    ("transaction_id", transaction.id.to_string()),
                ],
            )
            .await?;

        self.stripe
            .create_invoice_item(
                account,
                &invoice.customer,
                &replacement.id,
                new_total,
                &invoice.currency,
                &adjustment_label(delta_qty),
            )
            .await?;

        if amount_paid > 0 {
            self.stripe
                .create_credit_note(
                    account,
                    &invoice.id,
                    amount_paid,
                    Some("Payment carried over to replacement invoice"),
                )
                .await?;
        }

        let finalized = self
            .stripe
            .finalize_invoice(account, &replacement.id)
            .await?;
        self.send_if_configured(account, &finalized.id).await;

        Ok(StrategyOutcome {
            mirror: mirror_of(&finalized),
            previous_invoice_id: Some(invoice.id.clone()),
        })
    }

    /// Voids the transaction's invoice during a cancellation. The caller
    /// decides what a failure means; cancellation treats it as
    /// best-effort and keeps going.
    pub async fn void_invoice(&self, transaction: &Transaction) -> Result<(), BookingError> {
        let invoice_id = transaction
            .invoice_id
            .as_deref()
            .ok_or_else(|| BookingError::Processor("transaction has no invoice".to_string()))?;
        self.stripe
            .void_invoice(&transaction.processor_account, invoice_id)
            .await?;
        Ok(())
    }

    /// Delivery failures are logged, not propagated: the invoice itself
    /// is already correct, only the email did not go out.
    async fn send_if_configured(&self, account: &str, invoice_id: &str) {
        if !self.send_invoices {
            return;
        }
        if let Err(err) = self.stripe.send_invoice(account, invoice_id).await {
            tracing::warn!(
                invoice_id = %invoice_id,
                error = %err,
                "Failed to send finalized invoice"
            );
        }
    }
}

struct StrategyOutcome {
    mirror: InvoiceMirror,
    previous_invoice_id: Option<String>,
}

fn mirror_of(invoice: &InvoiceObject) -> InvoiceMirror {
    InvoiceMirror {
        invoice_id: invoice.id.clone(),
        status: InvoiceStatus::from_string(&invoice.status),
        url: invoice.hosted_invoice_url.clone(),
        total_minor: invoice.total,
        amount_due_minor: invoice.amount_due,
    }
}

fn adjustment_label(delta_qty: i64) -> String {
    if delta_qty >= 0 {
        format!("Booking adjustment: {} participant(s) added", delta_qty)
    } else {
        format!(
            "Booking adjustment: {} participant(s) removed",
            delta_qty.unsigned_abs()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjustment_label_names_the_direction() {
        assert_eq!(
            adjustment_label(2),
            "Booking adjustment: 2 participant(s) added"
        );
        assert_eq!(
            adjustment_label(-3),
            "Booking adjustment: 3 participant(s) removed"
        );
    }
}
