//! Sync session configuration.

use std::time::Duration;

use notisync_core::defaults;
use notisync_core::{Error, Result};

/// Configuration for a [`SyncSession`](crate::SyncSession).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Identity whose signal stream is subscribed.
    pub subscriber_id: String,
    /// Polling fallback interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Keep polling even while the signal channel is live.
    pub poll_while_live: bool,
    /// Page size for initial load and refresh.
    pub page_size: u32,
    /// Maximum records held by the local store.
    pub store_capacity: usize,
    /// Maximum signal keys remembered for dedup.
    pub dedup_capacity: usize,
    /// First reconnect delay in milliseconds.
    pub reconnect_base_ms: u64,
    /// Reconnect delay ceiling in milliseconds.
    pub reconnect_max_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            subscriber_id: String::new(),
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            poll_while_live: false,
            page_size: defaults::PAGE_SIZE,
            store_capacity: defaults::STORE_CAPACITY,
            dedup_capacity: defaults::DEDUP_CAPACITY,
            reconnect_base_ms: defaults::RECONNECT_BASE_MS,
            reconnect_max_ms: defaults::RECONNECT_MAX_MS,
        }
    }
}

impl SyncConfig {
    /// Default config for one subscriber.
    pub fn for_subscriber(subscriber_id: impl Into<String>) -> Self {
        Self {
            subscriber_id: subscriber_id.into(),
            ..Self::default()
        }
    }

    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `NOTISYNC_SUBSCRIBER_ID` | empty | Signal stream identity |
    /// | `NOTISYNC_POLL_INTERVAL_MS` | `30000` | Polling fallback interval |
    /// | `NOTISYNC_POLL_WHILE_LIVE` | `false` | Poll even while signals flow |
    /// | `NOTISYNC_PAGE_SIZE` | `20` | Initial load / refresh page size |
    /// | `NOTISYNC_STORE_CAPACITY` | `100` | Records kept locally |
    /// | `NOTISYNC_DEDUP_CAPACITY` | `1000` | Signal keys remembered |
    /// | `NOTISYNC_RECONNECT_BASE_MS` | `1000` | First reconnect delay |
    /// | `NOTISYNC_RECONNECT_MAX_MS` | `30000` | Reconnect delay ceiling |
    pub fn from_env() -> Self {
        let subscriber_id = std::env::var("NOTISYNC_SUBSCRIBER_ID").unwrap_or_default();
        let poll_while_live = std::env::var("NOTISYNC_POLL_WHILE_LIVE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self {
            subscriber_id,
            poll_interval_ms: env_parse("NOTISYNC_POLL_INTERVAL_MS", defaults::POLL_INTERVAL_MS),
            poll_while_live,
            page_size: env_parse("NOTISYNC_PAGE_SIZE", defaults::PAGE_SIZE).max(1),
            store_capacity: env_parse("NOTISYNC_STORE_CAPACITY", defaults::STORE_CAPACITY).max(1),
            dedup_capacity: env_parse("NOTISYNC_DEDUP_CAPACITY", defaults::DEDUP_CAPACITY).max(1),
            reconnect_base_ms: env_parse("NOTISYNC_RECONNECT_BASE_MS", defaults::RECONNECT_BASE_MS),
            reconnect_max_ms: env_parse("NOTISYNC_RECONNECT_MAX_MS", defaults::RECONNECT_MAX_MS),
        }
    }

    pub fn with_subscriber_id(mut self, id: impl Into<String>) -> Self {
        self.subscriber_id = id.into();
        self
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_poll_while_live(mut self, enabled: bool) -> Self {
        self.poll_while_live = enabled;
        self
    }

    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    pub fn with_store_capacity(mut self, capacity: usize) -> Self {
        self.store_capacity = capacity;
        self
    }

    pub fn with_dedup_capacity(mut self, capacity: usize) -> Self {
        self.dedup_capacity = capacity;
        self
    }

    /// Set reconnect backoff base and ceiling.
    pub fn with_reconnect_backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.reconnect_base_ms = base_ms;
        self.reconnect_max_ms = max_ms;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.subscriber_id.trim().is_empty() {
            return Err(Error::Config("subscriber_id is required".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be positive".to_string()));
        }
        if self.page_size == 0 || self.store_capacity == 0 || self.dedup_capacity == 0 {
            return Err(Error::Config(
                "page_size, store_capacity and dedup_capacity must be positive".to_string(),
            ));
        }
        if self.reconnect_base_ms == 0 || self.reconnect_base_ms > self.reconnect_max_ms {
            return Err(Error::Config(format!(
                "invalid reconnect backoff: base {}ms, max {}ms",
                self.reconnect_base_ms, self.reconnect_max_ms
            )));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
