use service_core::error::AppError;
use thiserror::Error;

/// Domain errors of the booking lifecycle engine. Handlers convert these
/// into HTTP responses through the `AppError` mapping below.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("capacity exceeded: requested {requested}, available {available}")]
    CapacityExceeded { available: u32, requested: u32 },

    #[error("the requested slot has no participants to reschedule")]
    NothingToReschedule,

    #[error("the requested slot has nothing to cancel")]
    NothingToCancel,

    #[error("invoice {invoice_id} is {status} and cannot be adjusted")]
    InvoiceImmutable { invoice_id: String, status: String },

    #[error("payment processor request failed: {0}")]
    Processor(String),

    #[error("the booking was modified concurrently, retry the operation")]
    Conflict,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl BookingError {
    /// Stable label for the operation outcome metric.
    pub fn metric_label(&self) -> &'static str {
        match self {
            BookingError::NotFound(_) => "not_found",
            BookingError::CapacityExceeded { .. } => "capacity_exceeded",
            BookingError::NothingToReschedule => "nothing_to_reschedule",
            BookingError::NothingToCancel => "nothing_to_cancel",
            BookingError::InvoiceImmutable { .. } => "invoice_immutable",
            BookingError::Processor(_) => "processor_error",
            BookingError::Conflict => "conflict",
            BookingError::Storage(_) => "storage_error",
        }
    }
}

impl From<crate::services::stripe::StripeError> for BookingError {
    fn from(err: crate::services::stripe::StripeError) -> Self {
        BookingError::Processor(err.to_string())
    }
}

impl From<mongodb::error::Error> for BookingError {
    fn from(err: mongodb::error::Error) -> Self {
        BookingError::Storage(anyhow::Error::new(err))
    }
}

impl From<mongodb::bson::ser::Error> for BookingError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        BookingError::Storage(anyhow::Error::new(err))
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let message = err.to_string();
        match err {
            BookingError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(message)),
            BookingError::CapacityExceeded { .. }
            | BookingError::NothingToReschedule
            | BookingError::NothingToCancel => AppError::BadRequest(anyhow::anyhow!(message)),
            BookingError::InvoiceImmutable { .. } => AppError::Conflict(anyhow::anyhow!(
                "{}; the booking change was kept, billing must be adjusted manually",
                message
            )),
            BookingError::Processor(_) => AppError::BadGateway(message),
            BookingError::Conflict => AppError::Conflict(anyhow::anyhow!(message)),
            BookingError::Storage(inner) => AppError::DatabaseError(inner),
        }
    }
}
