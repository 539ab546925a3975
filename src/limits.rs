//! Hard bounds on inputs. Everything here exists to keep a single request
//! from ballooning memory or the WAL.

/// Longest bookable/queryable date range, inclusive days.
pub const MAX_RANGE_DAYS: i64 = 366;

/// Most calendar keys accepted by a full availability replace.
pub const MAX_REPLACE_KEYS: usize = 1_000;

/// Shortest acceptable cancellation/rejection reason, after trimming.
pub const MIN_REASON_LEN: usize = 3;

/// Longest stored reason string.
pub const MAX_REASON_LEN: usize = 1_000;

pub const MIN_DAILY_CAPACITY: u32 = 1;
pub const MAX_DAILY_CAPACITY: u32 = 100;

/// Capacity substituted when a provider never set one.
pub const DEFAULT_DAILY_CAPACITY: u32 = 15;

/// Admin listing limit clamp.
pub const DEFAULT_LIST_LIMIT: usize = 500;
pub const MAX_LIST_LIMIT: usize = 2_000;

/// Serialized size cap for the items snapshot captured at creation.
pub const MAX_ITEMS_BYTES: usize = 64 * 1024;
