use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::models::booking::BookingStatus;

use super::EngineError;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    start: OffsetDateTime,
    end: OffsetDateTime,
}

impl Interval {
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Result<Self, EngineError> {
        if end <= start {
            return Err(EngineError::InvalidInterval);
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> OffsetDateTime {
        self.start
    }

    pub fn end(&self) -> OffsetDateTime {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// An existing booking as seen by the conflict checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingSlot {
    pub id: Uuid,
    pub interval: Interval,
    pub status: BookingStatus,
}

impl BookingSlot {
    pub fn new(
        id: Uuid,
        start: OffsetDateTime,
        end: OffsetDateTime,
        status: BookingStatus,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            id,
            interval: Interval::new(start, end)?,
            status,
        })
    }

    fn blocks_time(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }
}

/// First non-cancelled booking overlapping `candidate`, skipping `exclude_id`.
pub fn find_conflict<'a>(
    existing: &'a [BookingSlot],
    candidate: &Interval,
    exclude_id: Option<Uuid>,
) -> Option<&'a BookingSlot> {
    existing.iter().find(|slot| {
        slot.blocks_time()
            && Some(slot.id) != exclude_id
            && slot.interval.overlaps(candidate)
    })
}

pub fn has_conflict(existing: &[BookingSlot], candidate: &Interval, exclude_id: Option<Uuid>) -> bool {
    find_conflict(existing, candidate, exclude_id).is_some()
}

/// Same rule as [`has_conflict`], as a `Result` carrying the clashing booking id.
pub fn check_no_conflict(
    existing: &[BookingSlot],
    candidate: &Interval,
    exclude_id: Option<Uuid>,
) -> Result<(), EngineError> {
    match find_conflict(existing, candidate, exclude_id) {
        Some(slot) => Err(EngineError::SchedulingConflict(slot.id)),
        None => Ok(()),
    }
}
