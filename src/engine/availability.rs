use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::model::DateRange;

// ── Availability calendar algorithms ─────────────────────────────

/// A range is bookable only when every inclusive day is present with
/// `true`. A missing day or an explicit `false` fails the whole range.
pub fn is_range_fully_available(days: &BTreeMap<NaiveDate, bool>, range: &DateRange) -> bool {
    range
        .iter_days()
        .all(|day| days.get(&day).copied().unwrap_or(false))
}

/// Available day keys, ascending, optionally restricted to a range.
/// BTreeMap iteration order gives the sort for free.
pub fn available_days(
    days: &BTreeMap<NaiveDate, bool>,
    filter: Option<&DateRange>,
) -> Vec<NaiveDate> {
    match filter {
        Some(r) => days
            .range(r.start..=r.end)
            .filter(|(_, available)| **available)
            .map(|(day, _)| *day)
            .collect(),
        None => days
            .iter()
            .filter(|(_, available)| **available)
            .map(|(day, _)| *day)
            .collect(),
    }
}

/// Normalize keys for a full calendar replace: dedup, sort ascending and
/// silently drop keys before `today` — past days can never be booked.
pub fn normalize_replace_keys(keys: &[NaiveDate], today: NaiveDate) -> Vec<NaiveDate> {
    let mut out: Vec<NaiveDate> = keys.iter().copied().filter(|k| *k >= today).collect();
    out.sort_unstable();
    out.dedup();
    out
}
