use crate::limits::*;
use crate::model::{ReservationStatus, Role};

use super::EngineError;

// ── Reservation state machine ────────────────────────────────────
//
// Pending  → Accepted | Rejected | Canceled
// Accepted → Canceled | Completed
// Rejected / Canceled / Completed are terminal.
//
// Accept, Reject and Complete belong to the provider; Cancel belongs to
// the requester; admin may perform any row under the same preconditions.

/// A requested transition, with its required metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationAction {
    Accept,
    Reject { reason: String },
    Cancel { reason: String },
    Complete,
}

impl ReservationAction {
    pub fn target(&self) -> ReservationStatus {
        match self {
            ReservationAction::Accept => ReservationStatus::Accepted,
            ReservationAction::Reject { .. } => ReservationStatus::Rejected,
            ReservationAction::Cancel { .. } => ReservationStatus::Canceled,
            ReservationAction::Complete => ReservationStatus::Completed,
        }
    }

    /// Short label for metrics/audit.
    pub fn label(&self) -> &'static str {
        match self {
            ReservationAction::Accept => "accept",
            ReservationAction::Reject { .. } => "reject",
            ReservationAction::Cancel { .. } => "cancel",
            ReservationAction::Complete => "complete",
        }
    }
}

/// Trim and validate a reason string. Required for every cancellation and
/// rejection, admin included — no role gets a blank reason.
pub(crate) fn clean_reason(raw: &str) -> Result<String, EngineError> {
    let trimmed = raw.trim();
    if trimmed.len() < MIN_REASON_LEN {
        return Err(EngineError::MissingReason);
    }
    if trimmed.len() > MAX_REASON_LEN {
        return Err(EngineError::LimitExceeded("reason too long"));
    }
    Ok(trimmed.to_string())
}

/// Gate a transition: role first, then the table, then required metadata.
/// Returns the target status on success.
///
/// Re-submitting a transition against a reservation already in a terminal
/// state fails with `InvalidStatusTransition` — never a silent success.
pub fn check_transition(
    current: ReservationStatus,
    action: &ReservationAction,
    role: Role,
) -> Result<ReservationStatus, EngineError> {
    if role == Role::None {
        return Err(EngineError::Forbidden);
    }

    let role_ok = match action {
        ReservationAction::Accept
        | ReservationAction::Reject { .. }
        | ReservationAction::Complete => matches!(role, Role::Provider | Role::Admin),
        ReservationAction::Cancel { .. } => matches!(role, Role::Requester | Role::Admin),
    };
    if !role_ok {
        return Err(EngineError::Forbidden);
    }

    let target = action.target();
    let state_ok = match action {
        ReservationAction::Accept | ReservationAction::Reject { .. } => {
            current == ReservationStatus::Pending
        }
        ReservationAction::Cancel { .. } => {
            matches!(current, ReservationStatus::Pending | ReservationStatus::Accepted)
        }
        ReservationAction::Complete => current == ReservationStatus::Accepted,
    };
    if !state_ok {
        return Err(EngineError::InvalidStatusTransition { from: current, to: target });
    }

    match action {
        ReservationAction::Reject { reason } | ReservationAction::Cancel { reason } => {
            clean_reason(reason)?;
        }
        _ => {}
    }

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ReservationStatus::*;

    fn cancel(reason: &str) -> ReservationAction {
        ReservationAction::Cancel { reason: reason.into() }
    }

    fn reject(reason: &str) -> ReservationAction {
        ReservationAction::Reject { reason: reason.into() }
    }

    #[test]
    fn provider_accepts_pending() {
        assert_eq!(
            check_transition(Pending, &ReservationAction::Accept, Role::Provider),
            Ok(Accepted)
        );
    }

    #[test]
    fn requester_cannot_accept() {
        assert_eq!(
            check_transition(Pending, &ReservationAction::Accept, Role::Requester),
            Err(EngineError::Forbidden)
        );
    }

    #[test]
    fn provider_cannot_cancel() {
        assert_eq!(
            check_transition(Pending, &cancel("travel plans changed"), Role::Provider),
            Err(EngineError::Forbidden)
        );
    }

    #[test]
    fn requester_cancels_pending_and_accepted() {
        assert_eq!(check_transition(Pending, &cancel("changed plans"), Role::Requester), Ok(Canceled));
        assert_eq!(check_transition(Accepted, &cancel("changed plans"), Role::Requester), Ok(Canceled));
    }

    #[test]
    fn cancel_requires_reason_in_both_source_states() {
        assert_eq!(
            check_transition(Pending, &cancel(""), Role::Requester),
            Err(EngineError::MissingReason)
        );
        assert_eq!(
            check_transition(Accepted, &cancel("  "), Role::Requester),
            Err(EngineError::MissingReason)
        );
        // Below the minimum length after trimming.
        assert_eq!(
            check_transition(Pending, &cancel(" a "), Role::Requester),
            Err(EngineError::MissingReason)
        );
    }

    #[test]
    fn reject_requires_reason_even_for_admin() {
        assert_eq!(
            check_transition(Pending, &reject(""), Role::Admin),
            Err(EngineError::MissingReason)
        );
        assert_eq!(check_transition(Pending, &reject("fully booked that week"), Role::Admin), Ok(Rejected));
    }

    #[test]
    fn complete_only_from_accepted() {
        assert_eq!(check_transition(Accepted, &ReservationAction::Complete, Role::Provider), Ok(Completed));
        assert_eq!(
            check_transition(Pending, &ReservationAction::Complete, Role::Provider),
            Err(EngineError::InvalidStatusTransition { from: Pending, to: Completed })
        );
    }

    #[test]
    fn terminal_states_frozen() {
        for from in [Rejected, Canceled, Completed] {
            assert_eq!(
                check_transition(from, &ReservationAction::Accept, Role::Admin),
                Err(EngineError::InvalidStatusTransition { from, to: Accepted })
            );
            assert_eq!(
                check_transition(from, &cancel("no longer needed"), Role::Admin),
                Err(EngineError::InvalidStatusTransition { from, to: Canceled })
            );
        }
    }

    #[test]
    fn repeat_transition_to_same_terminal_state_fails() {
        // Double-accept protection: the second accept sees Accepted, not Pending.
        assert_eq!(
            check_transition(Accepted, &ReservationAction::Accept, Role::Provider),
            Err(EngineError::InvalidStatusTransition { from: Accepted, to: Accepted })
        );
        assert_eq!(
            check_transition(Canceled, &cancel("already canceled"), Role::Requester),
            Err(EngineError::InvalidStatusTransition { from: Canceled, to: Canceled })
        );
    }

    #[test]
    fn admin_mirrors_each_role() {
        assert_eq!(check_transition(Pending, &ReservationAction::Accept, Role::Admin), Ok(Accepted));
        assert_eq!(check_transition(Pending, &cancel("spam request"), Role::Admin), Ok(Canceled));
        assert_eq!(check_transition(Accepted, &ReservationAction::Complete, Role::Admin), Ok(Completed));
    }

    #[test]
    fn no_role_is_forbidden_before_state_check() {
        // Even a nonsensical transition reports Forbidden for strangers.
        assert_eq!(
            check_transition(Completed, &ReservationAction::Accept, Role::None),
            Err(EngineError::Forbidden)
        );
    }

    #[test]
    fn reason_trimmed_and_bounded() {
        assert_eq!(clean_reason("  needs at least three  ").unwrap(), "needs at least three");
        assert!(matches!(
            clean_reason(&"x".repeat(MAX_REASON_LEN + 1)),
            Err(EngineError::LimitExceeded(_))
        ));
    }
}
