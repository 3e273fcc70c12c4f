//! Centralized default constants for notisync.
//!
//! **This module is the single source of truth** for shared default values.
//! Config types in the client and engine crates reference these constants
//! instead of defining their own magic numbers.

// =============================================================================
// LOCAL STORE
// =============================================================================

/// Maximum number of records kept in the local store (oldest evicted first).
pub const STORE_CAPACITY: usize = 100;

/// Default page size for the initial list fetch and compensating refreshes.
pub const PAGE_SIZE: u32 = 20;

// =============================================================================
// RECONCILER
// =============================================================================

/// Number of recently processed signal keys remembered for dedup.
pub const DEDUP_CAPACITY: usize = 1000;

// =============================================================================
// POLLING FALLBACK
// =============================================================================

/// Interval between poll requests while the poller is active (30 seconds).
pub const POLL_INTERVAL_MS: u64 = 30_000;

// =============================================================================
// SIGNAL CHANNEL
// =============================================================================

/// First reconnect delay after the signal channel drops.
pub const RECONNECT_BASE_MS: u64 = 1_000;

/// Upper bound for the exponential reconnect delay.
pub const RECONNECT_MAX_MS: u64 = 30_000;

/// Per-subscriber buffer for the in-process broadcast channel.
pub const SIGNAL_BUFFER: usize = 256;

// =============================================================================
// EVENT BUS
// =============================================================================

/// Buffer capacity for the sync event bus.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// REMOTE SOURCE
// =============================================================================

/// Default REST base URL for the notification service.
pub const API_URL: &str = "http://localhost:3000/api/v1";

/// Default WebSocket base URL for the signal channel.
pub const WS_URL: &str = "ws://localhost:3000/api/v1/ws";

/// Timeout for a single remote request (seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 15;
