use chrono::NaiveDate;
use tokio::sync::oneshot;
use ulid::Ulid;

use crate::audit::AuditEntry;
use crate::limits::*;
use crate::model::*;
use crate::notify::{Notification, NotificationKind};

use super::availability::normalize_replace_keys;
use super::transition::{clean_reason, ReservationAction};
use super::validate::{can_book, now_ms, today_utc};
use super::{Engine, EngineError, WalCommand};

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

impl Engine {
    fn authorize_provider(&self, actor: &Actor, provider_id: Ulid) -> Result<(), EngineError> {
        if actor.admin || actor.user_id == provider_id {
            Ok(())
        } else {
            Err(EngineError::Forbidden)
        }
    }

    async fn send_notice(
        &self,
        user_id: Ulid,
        reservation_id: ReservationId,
        kind: NotificationKind,
        payload: serde_json::Value,
    ) {
        let notice = Notification { user_id, reservation_id, kind, payload };
        if let Err(e) = self.notify.notify(notice).await {
            tracing::warn!("notification delivery failed for reservation {reservation_id}: {e}");
        }
    }

    // ── Availability calendar ────────────────────────────────────

    pub async fn set_availability(
        &self,
        actor: &Actor,
        provider_id: Ulid,
        day: NaiveDate,
        available: bool,
    ) -> Result<(), EngineError> {
        self.authorize_provider(actor, provider_id)?;
        let rs = self.get_or_create_provider(provider_id);
        let mut guard = rs.write().await;
        let event = Event::AvailabilitySet { provider_id, day, available };
        self.persist_and_apply(&mut guard, &event).await?;
        self.audit.record(AuditEntry::new(actor, "availability.set", provider_id.to_string())
            .meta(serde_json::json!({ "day": day, "available": available })));
        Ok(())
    }

    pub async fn set_availability_range(
        &self,
        actor: &Actor,
        provider_id: Ulid,
        start: NaiveDate,
        end: NaiveDate,
        available: bool,
    ) -> Result<(), EngineError> {
        self.authorize_provider(actor, provider_id)?;
        let range = DateRange::new(start, end).ok_or(EngineError::InvalidRange)?;
        if range.days() > MAX_RANGE_DAYS {
            return Err(EngineError::LimitExceeded("date range too wide"));
        }
        let rs = self.get_or_create_provider(provider_id);
        let mut guard = rs.write().await;
        let event = Event::AvailabilityRangeSet { provider_id, start, end, available };
        self.persist_and_apply(&mut guard, &event).await?;
        self.audit.record(AuditEntry::new(actor, "availability.set_range", provider_id.to_string())
            .meta(serde_json::json!({ "start": start, "end": end, "available": available })));
        Ok(())
    }

    /// Replace the provider's whole calendar. Keys before today (UTC) are
    /// silently dropped; duplicates collapse. Returns the stored keys.
    pub async fn replace_availability(
        &self,
        actor: &Actor,
        provider_id: Ulid,
        keys: &[NaiveDate],
    ) -> Result<Vec<NaiveDate>, EngineError> {
        self.authorize_provider(actor, provider_id)?;
        if keys.len() > MAX_REPLACE_KEYS {
            return Err(EngineError::LimitExceeded("too many availability keys"));
        }
        let days = normalize_replace_keys(keys, today_utc());
        let rs = self.get_or_create_provider(provider_id);
        let mut guard = rs.write().await;
        let event = Event::AvailabilityReplaced { provider_id, days: days.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        self.audit.record(AuditEntry::new(actor, "availability.replace", provider_id.to_string())
            .meta(serde_json::json!({ "stored": days.len() })));
        Ok(days)
    }

    /// Set the per-day capacity. Out-of-bounds values are clamped, not
    /// rejected. Returns the stored value.
    pub async fn set_capacity(
        &self,
        actor: &Actor,
        provider_id: Ulid,
        capacity: u32,
    ) -> Result<u32, EngineError> {
        self.authorize_provider(actor, provider_id)?;
        let clamped = crate::config::clamp_capacity(capacity);
        let rs = self.get_or_create_provider(provider_id);
        let mut guard = rs.write().await;
        let event = Event::CapacitySet { provider_id, capacity: clamped };
        self.persist_and_apply(&mut guard, &event).await?;
        self.audit.record(AuditEntry::new(actor, "capacity.set", provider_id.to_string())
            .meta(serde_json::json!({ "capacity": clamped })));
        Ok(clamped)
    }

    // ── Reservations ─────────────────────────────────────────────

    /// Create a Pending reservation. The requester is the acting user; the
    /// id and timestamps come from the engine. Validation, WAL append and
    /// state application all happen under the provider's write lock, so a
    /// concurrent create cannot sneak past the capacity check.
    pub async fn create_reservation(
        &self,
        actor: &Actor,
        req: NewReservation,
    ) -> Result<Reservation, EngineError> {
        if !req.price_per_day.is_finite() || req.price_per_day <= 0.0 {
            return Err(EngineError::LimitExceeded("price_per_day must be positive"));
        }
        let items_json = req.items.to_string();
        if items_json.len() > MAX_ITEMS_BYTES {
            return Err(EngineError::LimitExceeded("items snapshot too large"));
        }

        let total = match req.total {
            Some(t) if t.is_finite() => round2(t),
            Some(_) => return Err(EngineError::LimitExceeded("total must be positive")),
            None => round2(req.price_per_day * req.range.days() as f64),
        };
        if total <= 0.0 {
            return Err(EngineError::LimitExceeded("total must be positive"));
        }

        let rs = self.get_or_create_provider(req.provider_id);
        let mut guard = rs.write().await;
        let capacity = self.effective_capacity(&guard);
        can_book(&guard, &req.range, None, capacity)?;

        let id = self.next_id();
        let now = now_ms();
        let event = Event::ReservationCreated {
            id,
            requester_id: actor.user_id,
            provider_id: req.provider_id,
            start: req.range.start,
            end: req.range.end,
            price_per_day: req.price_per_day,
            total,
            items: items_json,
            created_at: now,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::RESERVATIONS_CREATED_TOTAL).increment(1);

        let reservation = guard
            .reservation(id)
            .cloned()
            .ok_or_else(|| EngineError::AvailabilityCheckFailed("created reservation missing".into()))?;
        drop(guard);

        self.send_notice(
            req.provider_id,
            id,
            NotificationKind::ReservationCreated,
            serde_json::json!({
                "requester_id": actor.user_id.to_string(),
                "start": req.range.start,
                "end": req.range.end,
                "total": total,
            }),
        )
        .await;
        self.audit.record(AuditEntry::new(actor, "reservation.create", id.to_string())
            .meta(serde_json::json!({ "provider_id": req.provider_id.to_string() })));
        Ok(reservation)
    }

    /// Drive a reservation through the state machine. Role is re-derived from
    /// the stored row; accepting re-validates availability and capacity with
    /// the reservation itself excluded from the overlap count.
    pub async fn transition(
        &self,
        actor: &Actor,
        id: ReservationId,
        action: ReservationAction,
    ) -> Result<Reservation, EngineError> {
        let (_provider_id, mut guard) = self.resolve_reservation_write(id).await?;
        let current = guard
            .reservation(id)
            .ok_or(EngineError::ReservationNotFound(id))?;
        let requester_id = current.requester_id;
        let provider_id = current.provider_id;
        let range = current.range;
        let role = actor.role_for(current);

        let target = super::transition::check_transition(current.status, &action, role)?;

        if matches!(action, ReservationAction::Accept) {
            let capacity = self.effective_capacity(&guard);
            can_book(&guard, &range, Some(id), capacity)?;
        }

        let now = now_ms();
        let event = match &action {
            ReservationAction::Accept => Event::ReservationAccepted { id, at: now },
            ReservationAction::Reject { reason } => Event::ReservationRejected {
                id,
                reason: clean_reason(reason)?,
                at: now,
            },
            ReservationAction::Cancel { reason } => Event::ReservationCanceled {
                id,
                reason: clean_reason(reason)?,
                canceled_by: if actor.admin { CanceledBy::Admin } else { CanceledBy::Requester },
                at: now,
            },
            ReservationAction::Complete => Event::ReservationCompleted { id, at: now },
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(
            crate::observability::RESERVATION_TRANSITIONS_TOTAL,
            "action" => action.label(),
        )
        .increment(1);

        let updated = guard
            .reservation(id)
            .cloned()
            .ok_or(EngineError::ReservationNotFound(id))?;
        drop(guard);

        // Notify the other party (both, when an admin acted).
        let payload = serde_json::json!({ "status": target.to_string() });
        match role {
            Role::Requester => {
                self.send_notice(provider_id, id, NotificationKind::StatusChanged, payload).await;
            }
            Role::Provider => {
                self.send_notice(requester_id, id, NotificationKind::StatusChanged, payload).await;
            }
            Role::Admin => {
                self.send_notice(requester_id, id, NotificationKind::StatusChanged, payload.clone())
                    .await;
                self.send_notice(provider_id, id, NotificationKind::StatusChanged, payload).await;
            }
            Role::None => unreachable!("gated by check_transition"),
        }
        if target == ReservationStatus::Completed {
            for party in [requester_id, provider_id] {
                self.send_notice(party, id, NotificationKind::RatingRequested, serde_json::Value::Null)
                    .await;
            }
        }

        let mut entry = AuditEntry::new(actor, action.label(), id.to_string());
        if let ReservationAction::Reject { reason } | ReservationAction::Cancel { reason } = &action {
            entry = entry.reason(reason.trim());
        }
        self.audit.record(entry);
        Ok(updated)
    }

    /// Admin-only hard delete. Normal lifecycles end in a terminal status;
    /// this removes the row entirely.
    pub async fn delete_reservation(
        &self,
        actor: &Actor,
        id: ReservationId,
    ) -> Result<(), EngineError> {
        if !actor.admin {
            return Err(EngineError::Forbidden);
        }
        let (_provider_id, mut guard) = self.resolve_reservation_write(id).await?;
        let event = Event::ReservationDeleted { id };
        self.persist_and_apply(&mut guard, &event).await?;
        self.audit.record(AuditEntry::new(actor, "reservation.delete", id.to_string()));
        Ok(())
    }

    // ── WAL maintenance ──────────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state. Days flagged unavailable canonicalize
    /// away: absence of a key already means unavailable.
    ///
    /// Waits for each provider's read lock in turn — a booking in flight
    /// holds its provider's write lock across the WAL append, and
    /// compaction runs concurrently with that traffic.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let provider_ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();
        for provider_id in provider_ids {
            let Some(rs) = self.get_provider(&provider_id) else {
                continue;
            };
            let guard = rs.read().await;

            let days: Vec<NaiveDate> = guard
                .days
                .iter()
                .filter(|(_, available)| **available)
                .map(|(day, _)| *day)
                .collect();
            events.push(Event::AvailabilityReplaced { provider_id, days });
            if let Some(capacity) = guard.capacity {
                events.push(Event::CapacitySet { provider_id, capacity });
            }

            for r in &guard.reservations {
                events.push(Event::ReservationCreated {
                    id: r.id,
                    requester_id: r.requester_id,
                    provider_id: r.provider_id,
                    start: r.range.start,
                    end: r.range.end,
                    price_per_day: r.price_per_day,
                    total: r.total,
                    items: r.items.to_string(),
                    created_at: r.created_at,
                });
                match r.status {
                    ReservationStatus::Pending => {}
                    ReservationStatus::Accepted => {
                        events.push(Event::ReservationAccepted { id: r.id, at: r.updated_at });
                    }
                    ReservationStatus::Rejected => {
                        events.push(Event::ReservationRejected {
                            id: r.id,
                            reason: r.reject_reason.clone().unwrap_or_default(),
                            at: r.updated_at,
                        });
                    }
                    ReservationStatus::Canceled => {
                        events.push(Event::ReservationCanceled {
                            id: r.id,
                            reason: r.cancel_reason.clone().unwrap_or_default(),
                            canceled_by: r.canceled_by.unwrap_or(CanceledBy::Requester),
                            at: r.updated_at,
                        });
                    }
                    ReservationStatus::Completed => {
                        events.push(Event::ReservationCompleted { id: r.id, at: r.updated_at });
                    }
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
