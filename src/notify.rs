use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::ReservationId;

#[allow(dead_code)]
const CHANNEL_CAPACITY: usize = 256;

pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotificationKind {
    ReservationCreated,
    StatusChanged,
    RatingRequested,
}

/// A targeted notification for one user about one reservation.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub user_id: Ulid,
    pub reservation_id: ReservationId,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
}

/// Delivery seam. The engine never cares whether notices land on a socket,
/// an outbox table or a test buffer.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), SinkError>;
}

/// In-process broadcast hub: one channel per user, lazily created.
pub struct BroadcastNotifier {
    channels: DashMap<Ulid, broadcast::Sender<Notification>>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notifications for a user. Creates the channel if needed.
    pub fn subscribe(&self, user_id: Ulid) -> broadcast::Receiver<Notification> {
        let sender = self
            .channels
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Remove a channel (e.g. when a session ends).
    #[allow(dead_code)]
    pub fn remove(&self, user_id: &Ulid) {
        self.channels.remove(user_id);
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for BroadcastNotifier {
    /// No-op if nobody is listening.
    async fn notify(&self, notification: Notification) -> Result<(), SinkError> {
        if let Some(sender) = self.channels.get(&notification.user_id) {
            let _ = sender.send(notification);
        }
        Ok(())
    }
}
