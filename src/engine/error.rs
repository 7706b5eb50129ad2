use thiserror::Error;
use uuid::Uuid;

/// Failures raised by the pure scheduling and pricing functions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("end time must be after start time")]
    InvalidInterval,

    #[error("booking conflicts with an existing booking: {0}")]
    SchedulingConflict(Uuid),

    #[error("at least one line item is required")]
    NoLineItems,

    #[error("line item {index}: {reason}")]
    InvalidLineItem { index: usize, reason: &'static str },

    #[error("line item {index}: total {total} does not equal quantity x unit price")]
    LineItemTotalMismatch { index: usize, total: i64 },

    #[error("discount amount must not be negative")]
    NegativeDiscount,

    #[error("discount {discount} exceeds line item subtotal {subtotal}")]
    DiscountExceedsSubtotal { discount: i64, subtotal: i64 },

    #[error("{0} must be between 0 and 100")]
    PercentOutOfRange(&'static str),

    #[error("amount overflow")]
    Overflow,
}
