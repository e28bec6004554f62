//! Test helper module for booking-service integration tests.
//!
//! Tests run fully in process: in-memory implementations of the store
//! traits stand in for MongoDB, and a wiremock server plays the payment
//! processor. No external infrastructure is required.

#![allow(dead_code)]

use async_trait::async_trait;
use booking_service::config::{BookingConfig, DatabaseConfig, StripeConfig};
use booking_service::error::BookingError;
use booking_service::models::{
    BookingAdjustment, FulfillmentOrder, FulfillmentStatus, InvoiceMirror, InvoiceStatus,
    LineItem, LocationBinding, ParticipantEntry, ParticipantStatus, Schedule, Transaction,
    TransactionStatus, to_major_units,
};
use booking_service::services::{
    init_metrics, BookingOrchestrator, Catalog, FulfillmentStore, InvoiceReconciler,
    ScheduleStore, StripeClient, TransactionStore,
};
use booking_service::{build_router, AppState};
use chrono::{TimeZone, Utc};
use mongodb::bson::DateTime;
use secrecy::Secret;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use wiremock::MockServer;

pub const TEST_ORG: &str = "org_test";
pub const TEST_LOCATION: &str = "loc_main";
pub const TEST_ACCOUNT: &str = "acct_test";

/// Slot start at the given hour on a fixed test day.
pub fn at(hour: u32) -> DateTime {
    DateTime::from_chrono(Utc.with_ymd_and_hms(2026, 4, 1, hour, 0, 0).unwrap())
}

/// The same instant as `at`, formatted the way request bodies carry it.
pub fn at_rfc3339(hour: u32) -> String {
    format!("2026-04-01T{:02}:00:00Z", hour)
}

// =============================================================================
// In-memory stores
// =============================================================================

/// In-memory stand-in for `BookingRepository`, including the version
/// guard on aggregate saves.
#[derive(Default)]
pub struct InMemoryStore {
    pub schedules: Mutex<Vec<Schedule>>,
    pub bindings: Mutex<Vec<LocationBinding>>,
    pub transactions: Mutex<HashMap<Uuid, Transaction>>,
    pub fulfillments: Mutex<Vec<FulfillmentOrder>>,
}

impl InMemoryStore {
    pub fn binding(&self, schedule_id: Uuid) -> LocationBinding {
        self.bindings
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.schedule_id == schedule_id)
            .cloned()
            .expect("binding seeded")
    }

    pub fn transaction(&self, id: Uuid) -> Transaction {
        self.transactions
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .expect("transaction seeded")
    }
}

#[async_trait]
impl ScheduleStore for InMemoryStore {
    async fn get_schedule(
        &self,
        org_id: &str,
        schedule_id: Uuid,
    ) -> Result<Option<Schedule>, BookingError> {
        Ok(self
            .schedules
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.org_id == org_id && s.id == schedule_id)
            .cloned())
    }

    async fn get_binding(
        &self,
        org_id: &str,
        schedule_id: Uuid,
        location_id: &str,
    ) -> Result<Option<LocationBinding>, BookingError> {
        Ok(self
            .bindings
            .lock()
            .unwrap()
            .iter()
            .find(|b| {
                b.org_id == org_id && b.schedule_id == schedule_id && b.location_id == location_id
            })
            .cloned())
    }

    async fn save_binding(&self, binding: &mut LocationBinding) -> Result<(), BookingError> {
        let mut bindings = self.bindings.lock().unwrap();
        let stored = bindings
            .iter_mut()
            .find(|b| b.id == binding.id && b.version == binding.version)
            .ok_or(BookingError::Conflict)?;
        binding.version += 1;
        binding.updated_at = DateTime::now();
        *stored = binding.clone();
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn get(&self, org_id: &str, id: Uuid) -> Result<Option<Transaction>, BookingError> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .get(&id)
            .filter(|t| t.org_id == org_id)
            .cloned())
    }

    async fn find_by_ids(
        &self,
        org_id: &str,
        ids: &[Uuid],
    ) -> Result<Vec<Transaction>, BookingError> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.org_id == org_id && ids.contains(&t.id))
            .cloned()
            .collect())
    }

    async fn rewrite_slot_items(
        &self,
        org_id: &str,
        id: Uuid,
        old_start: DateTime,
        new_start: DateTime,
        duration_minutes: Option<i64>,
    ) -> Result<bool, BookingError> {
        let mut transactions = self.transactions.lock().unwrap();
        let Some(transaction) = transactions.get_mut(&id).filter(|t| t.org_id == org_id) else {
            return Ok(false);
        };
        let mut rewritten = false;
        for item in &mut transaction.items {
            if item.slot_start == Some(old_start) {
                item.slot_start = Some(new_start);
                if let Some(duration) = duration_minutes {
                    item.duration_minutes = Some(duration);
                }
                rewritten = true;
            }
        }
        Ok(rewritten)
    }

    async fn apply_reconciliation(
        &self,
        org_id: &str,
        id: Uuid,
        mirror: &InvoiceMirror,
        adjustment: &BookingAdjustment,
    ) -> Result<(), BookingError> {
        let mut transactions = self.transactions.lock().unwrap();
        let transaction = transactions
            .get_mut(&id)
            .filter(|t| t.org_id == org_id)
            .ok_or_else(|| BookingError::NotFound(format!("transaction {}", id)))?;
        transaction.invoice_id = Some(mirror.invoice_id.clone());
        transaction.invoice_status = Some(mirror.status);
        transaction.invoice_url = mirror.url.clone();
        transaction.total = to_major_units(mirror.total_minor);
        transaction.amount_due = to_major_units(mirror.amount_due_minor);
        transaction.booking_adjustments.push(adjustment.clone());
        Ok(())
    }

    async fn mark_cancelled(
        &self,
        org_id: &str,
        id: Uuid,
        adjustment: &BookingAdjustment,
        invoice_voided: bool,
    ) -> Result<(), BookingError> {
        let mut transactions = self.transactions.lock().unwrap();
        let transaction = transactions
            .get_mut(&id)
            .filter(|t| t.org_id == org_id)
            .ok_or_else(|| BookingError::NotFound(format!("transaction {}", id)))?;
        transaction.status = TransactionStatus::Cancelled;
        if invoice_voided {
            transaction.invoice_status = Some(InvoiceStatus::Void);
        }
        transaction.amount_due = 0.0;
        transaction.booking_adjustments.push(adjustment.clone());
        Ok(())
    }
}

#[async_trait]
impl FulfillmentStore for InMemoryStore {
    async fn cancel_for_transactions(
        &self,
        org_id: &str,
        location_id: &str,
        transaction_ids: &[Uuid],
    ) -> Result<u64, BookingError> {
        let mut fulfillments = self.fulfillments.lock().unwrap();
        let mut cancelled = 0u64;
        for order in fulfillments.iter_mut() {
            if order.org_id == org_id
                && order.location_id == location_id
                && transaction_ids.contains(&order.transaction_id)
                && order.status != FulfillmentStatus::Cancelled
            {
                order.status = FulfillmentStatus::Cancelled;
                order.updated_at = DateTime::now();
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }
}

/// Schedule store standing in for a concurrent writer bumping the
/// aggregate version between this operation's read and its save: reads
/// pass through, and only the first `saves_allowed` saves succeed.
pub struct ContendedScheduleStore {
    inner: Arc<InMemoryStore>,
    saves_allowed: Mutex<u32>,
}

impl ContendedScheduleStore {
    pub fn new(inner: Arc<InMemoryStore>, saves_allowed: u32) -> Arc<Self> {
        Arc::new(Self {
            inner,
            saves_allowed: Mutex::new(saves_allowed),
        })
    }
}

#[async_trait]
impl ScheduleStore for ContendedScheduleStore {
    async fn get_schedule(
        &self,
        org_id: &str,
        schedule_id: Uuid,
    ) -> Result<Option<Schedule>, BookingError> {
        self.inner.get_schedule(org_id, schedule_id).await
    }

    async fn get_binding(
        &self,
        org_id: &str,
        schedule_id: Uuid,
        location_id: &str,
    ) -> Result<Option<LocationBinding>, BookingError> {
        self.inner.get_binding(org_id, schedule_id, location_id).await
    }

    async fn save_binding(&self, binding: &mut LocationBinding) -> Result<(), BookingError> {
        {
            let mut remaining = self.saves_allowed.lock().unwrap();
            if *remaining == 0 {
                return Err(BookingError::Conflict);
            }
            *remaining -= 1;
        }
        self.inner.save_binding(binding).await
    }
}

/// Catalog answering the same scheduling mode for every product.
pub struct StaticCatalog {
    pub open: bool,
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn is_open_schedule(
        &self,
        _org_id: &str,
        _product_id: Uuid,
    ) -> Result<bool, BookingError> {
        Ok(self.open)
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub stripe: MockServer,
}

impl TestApp {
    pub async fn spawn() -> Self {
        init_metrics();
        let stripe = MockServer::start().await;
        let store = Arc::new(InMemoryStore::default());
        Self { store, stripe }
    }

    pub fn stripe_config(&self) -> StripeConfig {
        StripeConfig {
            secret_key: Secret::new("sk_test_123".to_string()),
            api_base_url: format!("{}/v1", self.stripe.uri()),
            timeout_seconds: 5,
            send_invoices: false,
        }
    }

    pub fn orchestrator_with(&self, open_schedule: bool, send_invoices: bool) -> BookingOrchestrator {
        let client = StripeClient::new(self.stripe_config()).expect("stripe client");
        let reconciler = InvoiceReconciler::new(client, send_invoices);
        BookingOrchestrator::new(
            self.store.clone(),
            self.store.clone(),
            self.store.clone(),
            Arc::new(StaticCatalog {
                open: open_schedule,
            }),
            reconciler,
        )
    }

    /// Orchestrator with a substitute schedule store, for tests that
    /// inject contention on aggregate saves.
    pub fn orchestrator_with_schedules(
        &self,
        schedules: Arc<dyn ScheduleStore>,
        open_schedule: bool,
    ) -> BookingOrchestrator {
        let client = StripeClient::new(self.stripe_config()).expect("stripe client");
        let reconciler = InvoiceReconciler::new(client, false);
        BookingOrchestrator::new(
            schedules,
            self.store.clone(),
            self.store.clone(),
            Arc::new(StaticCatalog {
                open: open_schedule,
            }),
            reconciler,
        )
    }

    pub fn router(&self, open_schedule: bool) -> axum::Router {
        self.router_for(self.orchestrator_with(open_schedule, false))
    }

    pub fn router_for(&self, orchestrator: BookingOrchestrator) -> axum::Router {
        let state = AppState {
            config: self.booking_config(),
            orchestrator: Arc::new(orchestrator),
        };
        build_router(state)
    }

    fn booking_config(&self) -> BookingConfig {
        BookingConfig {
            common: service_core::config::Config {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            service_name: "booking-service".to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            database: DatabaseConfig {
                url: Secret::new("mongodb://localhost:27017".to_string()),
                db_name: "booking_test".to_string(),
            },
            stripe: self.stripe_config(),
        }
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn participant(transaction_id: Uuid, name: &str, price_minor: i64) -> ParticipantEntry {
    ParticipantEntry {
        id: Uuid::new_v4(),
        display_name: name.to_string(),
        customer_id: Some(format!("cus_{}", name.to_lowercase())),
        company_id: None,
        transaction_id,
        price_minor,
        status: ParticipantStatus::Confirmed,
    }
}

/// Seeds a schedule plus an empty binding; returns the schedule id.
pub fn seed_schedule(app: &TestApp, capacity: u32) -> Uuid {
    let schedule_id = Uuid::new_v4();
    let now = DateTime::now();
    app.store.schedules.lock().unwrap().push(Schedule {
        id: schedule_id,
        org_id: TEST_ORG.to_string(),
        product_id: Uuid::new_v4(),
        name: "Morning yoga".to_string(),
        capacity,
        created_at: now,
        updated_at: now,
    });
    app.store.bindings.lock().unwrap().push(LocationBinding {
        id: Uuid::new_v4(),
        org_id: TEST_ORG.to_string(),
        schedule_id,
        location_id: TEST_LOCATION.to_string(),
        version: 1,
        slots: vec![],
        updated_at: now,
    });
    schedule_id
}

pub fn seed_slot(
    app: &TestApp,
    schedule_id: Uuid,
    start: DateTime,
    capacity: u32,
    participants: Vec<ParticipantEntry>,
) {
    let mut bindings = app.store.bindings.lock().unwrap();
    let binding = bindings
        .iter_mut()
        .find(|b| b.schedule_id == schedule_id)
        .expect("binding seeded");
    let available = capacity - participants.len() as u32;
    binding.slots.push(booking_service::models::Slot {
        start,
        duration_minutes: 60,
        available,
        label: Some("Morning class".to_string()),
        participants,
    });
    binding.slots.sort_by_key(|s| s.start);
}

pub fn transaction_fixture(
    id: Uuid,
    invoice: Option<(&str, InvoiceStatus)>,
    total: f64,
    amount_due: f64,
    slot_start: Option<DateTime>,
) -> Transaction {
    let now = DateTime::now();
    Transaction {
        id,
        org_id: TEST_ORG.to_string(),
        location_id: TEST_LOCATION.to_string(),
        customer_id: Some("cus_ada".to_string()),
        company_id: None,
        status: TransactionStatus::Completed,
        currency: "usd".to_string(),
        total,
        amount_due,
        processor_account: TEST_ACCOUNT.to_string(),
        invoice_id: invoice.map(|(id, _)| id.to_string()),
        invoice_status: invoice.map(|(_, status)| status),
        invoice_url: None,
        items: vec![LineItem {
            product_id: Uuid::new_v4(),
            description: "Morning yoga".to_string(),
            quantity: 1,
            unit_price: total,
            slot_start,
            duration_minutes: Some(60),
        }],
        booking_adjustments: vec![],
        created_at: now,
        updated_at: now,
    }
}

pub fn seed_transaction(app: &TestApp, transaction: Transaction) {
    app.store
        .transactions
        .lock()
        .unwrap()
        .insert(transaction.id, transaction);
}

pub fn seed_fulfillment(app: &TestApp, transaction_id: Uuid, status: FulfillmentStatus) {
    let now = DateTime::now();
    app.store.fulfillments.lock().unwrap().push(FulfillmentOrder {
        id: Uuid::new_v4(),
        org_id: TEST_ORG.to_string(),
        location_id: TEST_LOCATION.to_string(),
        transaction_id,
        status,
        created_at: now,
        updated_at: now,
    });
}

/// Stripe invoice JSON body in the shape the client reads.
pub fn invoice_json(
    id: &str,
    status: &str,
    total: i64,
    amount_paid: i64,
    amount_due: i64,
) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "status": status,
        "customer": "cus_ada",
        "currency": "usd",
        "total": total,
        "amount_paid": amount_paid,
        "amount_due": amount_due,
        "hosted_invoice_url": format!("https://invoice.stripe.com/{}", id)
    })
}
