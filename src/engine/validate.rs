use chrono::NaiveDate;

use crate::limits::*;
use crate::model::{DateRange, Ms, ProviderState, ReservationId};

use super::availability::is_range_fully_available;
use super::overlap::max_overlapping;
use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// Today as a UTC calendar day. Replace-availability filters against this.
pub(crate) fn today_utc() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

/// Build a validated inclusive range.
pub fn range_of(start: NaiveDate, end: NaiveDate) -> Result<DateRange, EngineError> {
    DateRange::new(start, end).ok_or(EngineError::InvalidRange)
}

/// The single admission decision: can this range be booked or accepted
/// against this provider right now?
///
/// Runs on every create AND every acceptance — capacity may have changed
/// between the two because other reservations were accepted in the interim.
/// `exclude` names the reservation being re-validated, if any.
pub fn can_book(
    state: &ProviderState,
    range: &DateRange,
    exclude: Option<ReservationId>,
    capacity: u32,
) -> Result<(), EngineError> {
    if range.days() > MAX_RANGE_DAYS {
        return Err(EngineError::LimitExceeded("date range too wide"));
    }
    if !is_range_fully_available(&state.days, range) {
        return Err(EngineError::NotAvailable);
    }
    let overlapping = max_overlapping(state, range, exclude);
    if overlapping >= capacity {
        return Err(EngineError::CapacityFull { capacity, overlapping });
    }
    Ok(())
}
