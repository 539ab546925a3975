use crate::model::{ReservationId, ReservationStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Start after end, or a range wider than the configured maximum.
    InvalidRange,
    /// At least one day in the candidate range is not marked available.
    NotAvailable,
    /// Some day in the range already carries `capacity` blocking
    /// reservations. `overlapping` is the max single-day count found.
    CapacityFull { capacity: u32, overlapping: u32 },
    /// The requested transition is not in the state machine table.
    InvalidStatusTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },
    /// Cancellation/rejection without a usable reason string.
    MissingReason,
    ReservationNotFound(ReservationId),
    /// Caller is neither requester, provider nor admin for this reservation,
    /// or holds the wrong role for the attempted operation.
    Forbidden,
    /// The availability state could not be read. Fail closed: never assume
    /// a range is bookable when this fires.
    AvailabilityCheckFailed(String),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// Stable machine-readable code for client display, alongside the
    /// human message from `Display`.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidRange => "INVALID_RANGE",
            EngineError::NotAvailable => "NOT_AVAILABLE",
            EngineError::CapacityFull { .. } => "CAPACITY_FULL",
            EngineError::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            EngineError::MissingReason => "MISSING_REASON",
            EngineError::ReservationNotFound(_) => "RESERVATION_NOT_FOUND",
            EngineError::Forbidden => "FORBIDDEN",
            EngineError::AvailabilityCheckFailed(_) => "AVAIL_CHECK_FAILED",
            EngineError::LimitExceeded(_) => "LIMIT_EXCEEDED",
            EngineError::WalError(_) => "WAL_ERROR",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidRange => write!(f, "invalid date range"),
            EngineError::NotAvailable => {
                write!(f, "provider is not available for the whole range")
            }
            EngineError::CapacityFull { capacity, overlapping } => {
                write!(
                    f,
                    "daily capacity full: {overlapping} overlapping of {capacity} allowed"
                )
            }
            EngineError::InvalidStatusTransition { from, to } => {
                write!(f, "invalid status transition: {from} -> {to}")
            }
            EngineError::MissingReason => write!(f, "a non-empty reason is required"),
            EngineError::ReservationNotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::Forbidden => write!(f, "caller has no role on this reservation"),
            EngineError::AvailabilityCheckFailed(e) => {
                write!(f, "could not confirm availability: {e}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
