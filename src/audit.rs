use ulid::Ulid;

use crate::model::{Actor, Ms};

/// One line in the audit trail: who did what to which entity, when.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub actor_id: Ulid,
    pub actor_is_admin: bool,
    pub action: &'static str,
    pub target: String,
    pub reason: Option<String>,
    pub meta: serde_json::Value,
    pub at: Ms,
}

impl AuditEntry {
    pub fn new(actor: &Actor, action: &'static str, target: String) -> Self {
        let at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as Ms)
            .unwrap_or(0);
        Self {
            actor_id: actor.user_id,
            actor_is_admin: actor.admin,
            action,
            target,
            reason: None,
            meta: serde_json::Value::Null,
            at,
        }
    }

    pub fn reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    pub fn meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = meta;
        self
    }
}

/// Recording seam for the audit trail. Synchronous on purpose: entries are
/// emitted while holding provider locks and must not block on I/O.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Default sink: structured log lines via tracing.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) {
        tracing::info!(
            actor = %entry.actor_id,
            admin = entry.actor_is_admin,
            action = entry.action,
            target = %entry.target,
            reason = entry.reason.as_deref().unwrap_or(""),
            meta = %entry.meta,
            "audit"
        );
    }
}

/// Test sink: buffers entries in memory for assertions.
pub struct MemoryAuditSink {
    entries: std::sync::Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self {
            entries: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: AuditEntry) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }
}
