use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only wall-clock type.
pub type Ms = i64;

/// Reservation ids are engine-assigned, monotonically increasing integers.
pub type ReservationId = u64;

/// Inclusive calendar date range `[start, end]`, no time-of-day component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Returns `None` when `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        if start <= end { Some(Self { start, end }) } else { None }
    }

    /// Inclusive day count: a one-day range has `days() == 1`.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Inclusive-inclusive overlap: ranges sharing a single day overlap.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Iterate every day in the range, ascending.
    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        self.start.iter_days().take(self.days() as usize)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Accepted,
    Rejected,
    Canceled,
    Completed,
}

impl ReservationStatus {
    /// A blocking reservation consumes calendar-day capacity.
    /// Pending does not block; neither do the terminal-negative statuses.
    pub fn is_blocking(&self) -> bool {
        matches!(self, ReservationStatus::Accepted | ReservationStatus::Completed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Rejected | ReservationStatus::Canceled | ReservationStatus::Completed
        )
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReservationStatus::Pending => "Pending",
            ReservationStatus::Accepted => "Accepted",
            ReservationStatus::Rejected => "Rejected",
            ReservationStatus::Canceled => "Canceled",
            ReservationStatus::Completed => "Completed",
        };
        f.write_str(s)
    }
}

/// Who triggered a cancellation. Stored as terminal metadata on the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CanceledBy {
    Requester,
    Admin,
}

/// The central entity. Mutated only through the state machine; never
/// physically deleted outside the admin override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub requester_id: Ulid,
    pub provider_id: Ulid,
    pub range: DateRange,
    pub price_per_day: f64,
    pub total: f64,
    /// Arbitrary items snapshot captured at creation, never re-resolved.
    pub items: serde_json::Value,
    pub status: ReservationStatus,
    pub reject_reason: Option<String>,
    pub cancel_reason: Option<String>,
    pub canceled_by: Option<CanceledBy>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

/// Caller-supplied fields for a create. The requester comes from the actor,
/// the id and timestamps from the engine.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub provider_id: Ulid,
    pub range: DateRange,
    pub price_per_day: f64,
    /// Caller-supplied total override; computed from the range when `None`.
    pub total: Option<f64>,
    pub items: serde_json::Value,
}

/// Per-provider state: the availability calendar, the capacity setting and
/// every reservation booked against this provider.
#[derive(Debug, Clone)]
pub struct ProviderState {
    pub id: Ulid,
    /// Max concurrently blocking reservations per day; `None` falls back to
    /// the configured default.
    pub capacity: Option<u32>,
    /// Per-day availability. Absence of a key means unavailable.
    pub days: BTreeMap<NaiveDate, bool>,
    /// All reservations for this provider, sorted by `range.start`.
    pub reservations: Vec<Reservation>,
}

impl ProviderState {
    pub fn new(id: Ulid) -> Self {
        Self {
            id,
            capacity: None,
            days: BTreeMap::new(),
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order by `range.start`.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.range.start, |r| r.range.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn reservation(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn reservation_mut(&mut self, id: ReservationId) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    pub fn remove_reservation(&mut self, id: ReservationId) -> Option<Reservation> {
        if let Some(pos) = self.reservations.iter().position(|r| r.id == id) {
            Some(self.reservations.remove(pos))
        } else {
            None
        }
    }

    /// Only reservations whose range overlaps the query window.
    /// Binary search skips everything starting after `query.end`.
    pub fn overlapping(&self, query: &DateRange) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.range.start <= query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.range.end >= query.start)
    }
}

/// The caller's relationship to one specific reservation. Never a global
/// account role: the same account can be requester on one reservation and
/// provider on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Requester,
    Provider,
    Admin,
    None,
}

/// A caller identity as resolved by the embedding authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Ulid,
    pub admin: bool,
}

impl Actor {
    pub fn user(user_id: Ulid) -> Self {
        Self { user_id, admin: false }
    }

    pub fn admin(user_id: Ulid) -> Self {
        Self { user_id, admin: true }
    }

    /// Effective role, re-derived from the reservation's stored party ids.
    pub fn role_for(&self, reservation: &Reservation) -> Role {
        if self.admin {
            Role::Admin
        } else if self.user_id == reservation.requester_id {
            Role::Requester
        } else if self.user_id == reservation.provider_id {
            Role::Provider
        } else {
            Role::None
        }
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    AvailabilitySet {
        provider_id: Ulid,
        day: NaiveDate,
        available: bool,
    },
    AvailabilityRangeSet {
        provider_id: Ulid,
        start: NaiveDate,
        end: NaiveDate,
        available: bool,
    },
    /// Full replace: the provider's calendar becomes exactly `days`, all
    /// marked available. Keys are filtered and sorted at command time, so
    /// replay never re-filters.
    AvailabilityReplaced {
        provider_id: Ulid,
        days: Vec<NaiveDate>,
    },
    CapacitySet {
        provider_id: Ulid,
        capacity: u32,
    },
    ReservationCreated {
        id: ReservationId,
        requester_id: Ulid,
        provider_id: Ulid,
        start: NaiveDate,
        end: NaiveDate,
        price_per_day: f64,
        total: f64,
        /// JSON-encoded items snapshot. Kept as a string because bincode is
        /// not self-describing and cannot decode `serde_json::Value`.
        items: String,
        created_at: Ms,
    },
    ReservationAccepted {
        id: ReservationId,
        at: Ms,
    },
    ReservationRejected {
        id: ReservationId,
        reason: String,
        at: Ms,
    },
    ReservationCanceled {
        id: ReservationId,
        reason: String,
        canceled_by: CanceledBy,
        at: Ms,
    },
    ReservationCompleted {
        id: ReservationId,
        at: Ms,
    },
    ReservationDeleted {
        id: ReservationId,
    },
}

impl Event {
    /// Which provider's state this event touches, when the event carries it.
    pub fn provider_id(&self) -> Option<Ulid> {
        match self {
            Event::AvailabilitySet { provider_id, .. }
            | Event::AvailabilityRangeSet { provider_id, .. }
            | Event::AvailabilityReplaced { provider_id, .. }
            | Event::CapacitySet { provider_id, .. }
            | Event::ReservationCreated { provider_id, .. } => Some(*provider_id),
            _ => None,
        }
    }

    /// The reservation id for create/status/delete events.
    pub fn reservation_id(&self) -> Option<ReservationId> {
        match self {
            Event::ReservationCreated { id, .. }
            | Event::ReservationAccepted { id, .. }
            | Event::ReservationRejected { id, .. }
            | Event::ReservationCanceled { id, .. }
            | Event::ReservationCompleted { id, .. }
            | Event::ReservationDeleted { id } => Some(*id),
            _ => None,
        }
    }
}
