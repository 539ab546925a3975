use crate::limits::*;

/// Clamp a capacity setting into the allowed band. Out-of-bounds values are
/// stored clamped, never rejected.
pub fn clamp_capacity(raw: u32) -> u32 {
    raw.clamp(MIN_DAILY_CAPACITY, MAX_DAILY_CAPACITY)
}

/// Engine-level tunables. Everything per-provider lives in provider state;
/// these are the fallbacks and operational knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity used for providers that never set their own.
    pub default_daily_capacity: u32,
    /// Compact the WAL once this many appends have accumulated.
    pub compact_threshold: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_daily_capacity: DEFAULT_DAILY_CAPACITY,
            compact_threshold: 1000,
        }
    }
}

impl EngineConfig {
    /// Read overrides from `DAYBOOK_*` environment variables; anything unset
    /// or unparsable falls back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let default_daily_capacity = std::env::var("DAYBOOK_DEFAULT_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(clamp_capacity)
            .unwrap_or(defaults.default_daily_capacity);
        let compact_threshold = std::env::var("DAYBOOK_COMPACT_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.compact_threshold);
        Self {
            default_daily_capacity,
            compact_threshold,
        }
    }
}
