//! Structured logging field name constants for notisync.
//!
//! All crates use these constants for structured logging fields so that log
//! aggregation can query by the same names across every component.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, the store may stay stale until the next cycle |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (session start, shutdown, connectivity changes) |
//! | DEBUG | Decision points (dedup hits, no-op mutations, cursor moves) |
//! | TRACE | Per-record iteration |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Sync session identifier. Format: UUIDv7.
pub const SESSION_ID: &str = "session_id";

/// Component within the engine.
/// Values: "store", "reconciler", "mutator", "poller", "supervisor", "http", "websocket"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "mark_read", "mark_all_read", "delete", "clear_all", "poll"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Notification id being operated on.
pub const NOTIFICATION_ID: &str = "notification_id";

/// Signal dedup key (`id:timestamp`).
pub const SIGNAL_KEY: &str = "signal_key";

/// Signal action (`new`, `read`, `update`, `delete`).
pub const SIGNAL_ACTION: &str = "action";

/// Subscriber id the signal channel is keyed by.
pub const SUBSCRIBER_ID: &str = "subscriber_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of records returned by a fetch or poll.
pub const RECORD_COUNT: &str = "record_count";

/// Authoritative unread count applied to the store.
pub const UNREAD_COUNT: &str = "unread_count";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
