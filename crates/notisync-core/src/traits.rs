//! Collaborator traits for the sync engine.
//!
//! The remote source and the signal channel are external systems; these
//! traits are the seams the engine talks through, so bindings (HTTP,
//! WebSocket, in-process) and test doubles are interchangeable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::error::Result;
use crate::models::*;

/// Stream of signals from one subscription. Ends when the channel closes.
pub type SignalStream = BoxStream<'static, Result<Signal>>;

/// Authoritative pull-based store of notifications.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetch one page of notifications along with the unread count.
    async fn fetch_list(&self, query: &ListQuery) -> Result<NotificationPage>;

    /// Combined fetch: one record plus the current unread count in one round trip.
    async fn fetch_one(&self, id: &str) -> Result<FetchedNotification>;

    /// Fetch only the unread count.
    async fn fetch_unread_count(&self) -> Result<u64>;

    /// Fetch everything that changed since `last_check`.
    async fn poll(&self, last_check: DateTime<Utc>) -> Result<PollResponse>;

    async fn mark_read(&self, id: &str) -> Result<()>;

    async fn mark_all_read(&self) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn create(&self, payload: &NewNotification) -> Result<NotificationRecord>;
}

/// Per-subscriber push channel of change notices.
///
/// Delivery is at-least-once; a reconnect may redeliver signals already seen.
#[async_trait]
pub trait SignalChannel: Send + Sync {
    async fn subscribe(&self, subscriber_id: &str) -> Result<SignalStream>;
}
