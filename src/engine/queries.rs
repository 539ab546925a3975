use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::available_days;
use super::{Engine, EngineError, SharedProviderState};

impl Engine {
    /// Fetch one reservation. Only the parties on the row (or an admin)
    /// may read it.
    pub async fn get_reservation(
        &self,
        actor: &Actor,
        id: ReservationId,
    ) -> Result<Reservation, EngineError> {
        let provider_id = self
            .provider_of(id)
            .ok_or(EngineError::ReservationNotFound(id))?;
        let rs = self
            .get_provider(&provider_id)
            .ok_or(EngineError::ReservationNotFound(id))?;
        let guard = rs.read().await;
        let reservation = guard
            .reservation(id)
            .ok_or(EngineError::ReservationNotFound(id))?;
        if actor.role_for(reservation) == Role::None {
            return Err(EngineError::Forbidden);
        }
        Ok(reservation.clone())
    }

    /// All reservations the given user requested, newest activity first.
    pub async fn list_requester_reservations(&self, requester_id: Ulid) -> Vec<Reservation> {
        // Collect the Arcs first so no DashMap shard lock is held across await.
        let providers: Vec<SharedProviderState> =
            self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for rs in providers {
            let guard = rs.read().await;
            out.extend(
                guard
                    .reservations
                    .iter()
                    .filter(|r| r.requester_id == requester_id)
                    .cloned(),
            );
        }
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        out
    }

    /// All reservations booked against the given provider, newest activity first.
    pub async fn list_provider_reservations(&self, provider_id: Ulid) -> Vec<Reservation> {
        let Some(rs) = self.get_provider(&provider_id) else {
            return Vec::new();
        };
        let guard = rs.read().await;
        let mut out = guard.reservations.clone();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        out
    }

    /// Admin-only global listing, newest activity first, capped at `limit`.
    pub async fn list_all_reservations(
        &self,
        actor: &Actor,
        limit: Option<usize>,
    ) -> Result<Vec<Reservation>, EngineError> {
        if !actor.admin {
            return Err(EngineError::Forbidden);
        }
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);

        let providers: Vec<SharedProviderState> =
            self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for rs in providers {
            let guard = rs.read().await;
            out.extend(guard.reservations.iter().cloned());
        }
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        out.truncate(limit);
        Ok(out)
    }

    /// Available days for a provider, ascending. `window` of `None` returns
    /// the whole calendar; a bounded window returns only days inside it.
    pub async fn list_availability(
        &self,
        provider_id: Ulid,
        window: Option<DateRange>,
    ) -> Vec<NaiveDate> {
        let Some(rs) = self.get_provider(&provider_id) else {
            return Vec::new();
        };
        let guard = rs.read().await;
        available_days(&guard.days, window.as_ref())
    }

    /// Effective daily capacity, falling back to the configured default for
    /// providers that never set one (or have no state yet).
    pub async fn capacity_of(&self, provider_id: Ulid) -> u32 {
        match self.get_provider(&provider_id) {
            Some(rs) => {
                let guard = rs.read().await;
                self.effective_capacity(&guard)
            }
            None => self.config.default_daily_capacity,
        }
    }
}
