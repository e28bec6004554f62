pub mod fulfillment;
pub mod schedule;
pub mod transaction;

pub use fulfillment::{FulfillmentOrder, FulfillmentStatus};
pub use schedule::{
    FreedSlot, LocationBinding, ParticipantEntry, ParticipantStatus, Product, Schedule,
    ScheduleMode, Slot, SlotMove, SlotResize,
};
pub use transaction::{
    AdjustmentKind, BookingAdjustment, InvoiceMirror, InvoiceStatus, LineItem, Transaction,
    TransactionStatus, to_major_units, to_minor_units,
};
