use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

/// Background task that compacts the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>) {
    let threshold = engine.config.compact_threshold;
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => tracing::warn!("WAL compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::config::EngineConfig;
    use crate::model::*;
    use crate::notify::BroadcastNotifier;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("daybook_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compaction_resets_append_counter() {
        let path = test_wal_path("counter_reset.wal");
        let engine = Arc::new(
            Engine::new(
                EngineConfig::default(),
                path,
                Arc::new(BroadcastNotifier::new()),
                Arc::new(MemoryAuditSink::new()),
            )
            .unwrap(),
        );

        let provider = Ulid::new();
        let actor = Actor::user(provider);
        for i in 1..=5 {
            let day = chrono::NaiveDate::from_ymd_opt(2030, 5, i).unwrap();
            engine
                .set_availability(&actor, provider, day, true)
                .await
                .unwrap();
        }
        assert_eq!(engine.wal_appends_since_compact().await, 5);

        engine.compact_wal().await.unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }
}
