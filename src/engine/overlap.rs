use chrono::NaiveDate;

use crate::model::{DateRange, ProviderState, ReservationId};

// ── Overlap counting ─────────────────────────────────────────────

/// Maximum number of blocking reservations covering any single day of the
/// candidate range. The max across days, never the sum: a multi-day
/// candidate is blocked as soon as one day would exceed capacity.
///
/// `exclude` skips one reservation id — used when re-validating a
/// reservation being accepted, since it already sits in the list as
/// `Pending`.
///
/// Sweep line over day boundaries: +1 on the first covered day, -1 on the
/// day after the last covered day (ranges are inclusive).
pub fn max_overlapping(
    state: &ProviderState,
    range: &DateRange,
    exclude: Option<ReservationId>,
) -> u32 {
    let mut events: Vec<(NaiveDate, i32)> = Vec::new();
    for r in state.overlapping(range) {
        if !r.status.is_blocking() {
            continue;
        }
        if exclude == Some(r.id) {
            continue;
        }
        let start = r.range.start.max(range.start);
        let end = r.range.end.min(range.end);
        events.push((start, 1));
        if let Some(after) = end.succ_opt() {
            events.push((after, -1));
        }
    }

    // −1 before +1 on the same day, so back-to-back ranges don't produce a
    // phantom double count.
    events.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut count: i32 = 0;
    let mut max: i32 = 0;
    for (_, delta) in events {
        count += delta;
        max = max.max(count);
    }
    max as u32
}
