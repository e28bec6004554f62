pub mod catalog;
pub mod metrics;
pub mod orchestrator;
pub mod reconciler;
pub mod repository;
pub mod stripe;

pub use catalog::{Catalog, MongoCatalog};
pub use metrics::{get_metrics, init_metrics};
pub use orchestrator::{
    BookingOrchestrator, BookingSnapshot, CancelOutcome, RescheduleCommand, RescheduleOutcome,
};
pub use reconciler::{InvoiceReconciler, ReconcileOutcome};
pub use repository::{BookingRepository, FulfillmentStore, ScheduleStore, TransactionStore};
pub use stripe::{StripeClient, StripeError};
