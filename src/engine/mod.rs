mod availability;
mod error;
mod mutations;
mod overlap;
mod queries;
mod transition;
mod validate;

pub use availability::{available_days, is_range_fully_available, normalize_replace_keys};
pub use error::EngineError;
pub use overlap::max_overlapping;
pub use transition::ReservationAction;
pub use validate::{can_book, range_of};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::audit::AuditSink;
use crate::config::EngineConfig;
use crate::model::*;
use crate::notify::NotificationSink;
use crate::wal::Wal;

pub type SharedProviderState = Arc<RwLock<ProviderState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task owning the WAL. Mutations send `Append` and wait on
/// their oneshot; the task folds in whatever else is already queued and
/// commits the whole run with one fsync, so ten concurrent bookings cost
/// one disk sync instead of ten.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                // Widen the batch with every append already waiting.
                while let Ok(next) = rx.try_recv() {
                    match next {
                        WalCommand::Append { event, response } => batch.push((event, response)),
                        other => {
                            // Compaction rewrites the file; the batch must land first.
                            deferred = Some(other);
                            break;
                        }
                    }
                }

                commit_batch(&mut wal, batch);
                if let Some(cmd) = deferred {
                    handle_non_append(&mut wal, cmd);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

/// Buffer the whole batch, fsync once, answer every waiter with the
/// shared outcome.
fn commit_batch(wal: &mut Wal, mut batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let mut result = Ok(());
    for (event, _) in &batch {
        if let Err(e) = wal.append_buffered(event) {
            result = Err(e);
            break;
        }
    }
    // Flush even after an append error, so half-buffered frames don't ride
    // along with the next batch after callers were told this one failed.
    let flushed = wal.flush_sync();
    if result.is_ok() {
        result = flushed;
    }
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let _ = response.send(wal.compact(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

pub struct Engine {
    pub state: DashMap<Ulid, SharedProviderState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<dyn NotificationSink>,
    pub audit: Arc<dyn AuditSink>,
    pub config: EngineConfig,
    /// Reverse lookup: reservation id → provider id
    pub(super) reservation_to_provider: DashMap<ReservationId, Ulid>,
    pub(super) next_reservation_id: AtomicU64,
}

/// Apply an event directly to a ProviderState (no locking — caller holds the lock).
fn apply_to_provider(rs: &mut ProviderState, event: &Event, index: &DashMap<ReservationId, Ulid>) {
    match event {
        Event::AvailabilitySet { day, available, .. } => {
            rs.days.insert(*day, *available);
        }
        Event::AvailabilityRangeSet { start, end, available, .. } => {
            if let Some(range) = DateRange::new(*start, *end) {
                for day in range.iter_days() {
                    rs.days.insert(day, *available);
                }
            }
        }
        Event::AvailabilityReplaced { days, .. } => {
            rs.days = days.iter().map(|d| (*d, true)).collect();
        }
        Event::CapacitySet { capacity, .. } => {
            rs.capacity = Some(*capacity);
        }
        Event::ReservationCreated {
            id,
            requester_id,
            provider_id,
            start,
            end,
            price_per_day,
            total,
            items,
            created_at,
        } => {
            if let Some(range) = DateRange::new(*start, *end) {
                rs.insert_reservation(Reservation {
                    id: *id,
                    requester_id: *requester_id,
                    provider_id: *provider_id,
                    range,
                    price_per_day: *price_per_day,
                    total: *total,
                    items: serde_json::from_str(items).unwrap_or(serde_json::Value::Null),
                    status: ReservationStatus::Pending,
                    reject_reason: None,
                    cancel_reason: None,
                    canceled_by: None,
                    created_at: *created_at,
                    updated_at: *created_at,
                });
                index.insert(*id, *provider_id);
            }
        }
        Event::ReservationAccepted { id, at } => {
            if let Some(r) = rs.reservation_mut(*id) {
                r.status = ReservationStatus::Accepted;
                r.updated_at = *at;
            }
        }
        Event::ReservationRejected { id, reason, at } => {
            if let Some(r) = rs.reservation_mut(*id) {
                r.status = ReservationStatus::Rejected;
                r.reject_reason = Some(reason.clone());
                r.updated_at = *at;
            }
        }
        Event::ReservationCanceled { id, reason, canceled_by, at } => {
            if let Some(r) = rs.reservation_mut(*id) {
                r.status = ReservationStatus::Canceled;
                r.cancel_reason = Some(reason.clone());
                r.canceled_by = Some(*canceled_by);
                r.updated_at = *at;
            }
        }
        Event::ReservationCompleted { id, at } => {
            if let Some(r) = rs.reservation_mut(*id) {
                r.status = ReservationStatus::Completed;
                r.updated_at = *at;
            }
        }
        Event::ReservationDeleted { id } => {
            rs.remove_reservation(*id);
            index.remove(id);
        }
    }
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        wal_path: PathBuf,
        notify: Arc<dyn NotificationSink>,
        audit: Arc<dyn AuditSink>,
    ) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            audit,
            config,
            reservation_to_provider: DashMap::new(),
            next_reservation_id: AtomicU64::new(1),
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this runs inside an async context.
        let mut max_id: ReservationId = 0;
        for event in &events {
            let provider_id = match event.provider_id() {
                Some(pid) => Some(pid),
                // Status/delete events carry only the reservation id.
                None => event
                    .reservation_id()
                    .and_then(|rid| engine.reservation_to_provider.get(&rid).map(|e| *e.value())),
            };
            let Some(provider_id) = provider_id else { continue };
            let rs_arc = engine.get_or_create_provider(provider_id);
            let mut guard = rs_arc.try_write().expect("replay: uncontended write");
            apply_to_provider(&mut guard, event, &engine.reservation_to_provider);
            if let Event::ReservationCreated { id, .. } = event
                && *id > max_id {
                    max_id = *id;
                }
        }
        engine.next_reservation_id.store(max_id + 1, Ordering::Relaxed);

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub(super) fn next_id(&self) -> ReservationId {
        self.next_reservation_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Effective daily capacity for a provider: the stored setting, or the
    /// configured default when none was ever set.
    pub(super) fn effective_capacity(&self, rs: &ProviderState) -> u32 {
        rs.capacity.unwrap_or(self.config.default_daily_capacity)
    }

    pub fn get_provider(&self, id: &Ulid) -> Option<SharedProviderState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    /// Provider states materialize lazily on first write.
    pub(super) fn get_or_create_provider(&self, id: Ulid) -> SharedProviderState {
        self.state
            .entry(id)
            .or_insert_with(|| Arc::new(RwLock::new(ProviderState::new(id))))
            .value()
            .clone()
    }

    pub fn provider_of(&self, reservation_id: ReservationId) -> Option<Ulid> {
        self.reservation_to_provider
            .get(&reservation_id)
            .map(|e| *e.value())
    }

    /// WAL-append + apply in one call. Targeted notifications are richer than
    /// a per-provider fan-out, so callers send those themselves.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut ProviderState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_provider(rs, event, &self.reservation_to_provider);
        Ok(())
    }

    /// Lookup reservation → provider, get provider state, acquire write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: ReservationId,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<ProviderState>), EngineError> {
        let provider_id = self
            .provider_of(reservation_id)
            .ok_or(EngineError::ReservationNotFound(reservation_id))?;
        // Index pointing at a missing provider means the state maps diverged.
        // Fail closed rather than guess.
        let rs = self.get_provider(&provider_id).ok_or_else(|| {
            EngineError::AvailabilityCheckFailed(format!(
                "provider state missing for reservation {reservation_id}"
            ))
        })?;
        let guard = rs.write_owned().await;
        Ok((provider_id, guard))
    }
}
