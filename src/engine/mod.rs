//! Pure scheduling and pricing logic. No I/O; handlers fetch the inputs and
//! translate the outcome into an HTTP response.

pub mod conflict;
pub mod error;
pub mod totals;

pub use conflict::{check_no_conflict, find_conflict, has_conflict, BookingSlot, Interval};
pub use error::EngineError;
pub use totals::{compute_totals, QuoteTotals};
