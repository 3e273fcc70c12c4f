//! Signal reconciliation.
//!
//! Turns "something changed" signals into store mutations. Signals carry no
//! payload, so `new`, `read` and `update` are resolved with a combined fetch
//! of the record and the unread count; `delete` is applied directly.
//!
//! Redelivered signals are recognized by their `id:timestamp` key, held in a
//! bounded LRU so memory stays flat over long sessions.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use notisync_core::{
    EventBus, NotificationStore, RemoteSource, Signal, SignalAction, SyncEvent, UpsertOutcome,
};

/// What handling a signal did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// Key already processed; nothing happened.
    Duplicate,
    /// Resolved record was new to the store.
    Inserted,
    /// Resolved record overwrote an existing entry.
    Replaced,
    /// Record removed (delete signal, or 404 on resolution).
    Removed,
    /// Resolution failed; the signal was dropped.
    Dropped,
}

pub struct Reconciler {
    remote: Arc<dyn RemoteSource>,
    store: NotificationStore,
    events: Arc<EventBus>,
    processed: Mutex<LruCache<String, ()>>,
}

impl Reconciler {
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        store: NotificationStore,
        events: Arc<EventBus>,
        dedup_capacity: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(dedup_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            remote,
            store,
            events,
            processed: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Apply one signal.
    ///
    /// The key is claimed before resolving, so a concurrent redelivery is a
    /// duplicate. A failed resolution releases the key so a later redelivery
    /// can retry.
    pub async fn handle(&self, signal: Signal) -> SignalOutcome {
        let key = signal.dedup_key();
        {
            let mut processed = self.processed.lock().await;
            if processed.contains(&key) {
                trace!(signal_key = %key, "Duplicate signal discarded");
                processed.promote(&key);
                return SignalOutcome::Duplicate;
            }
            processed.put(key.clone(), ());
        }

        let start = Instant::now();
        let outcome = match signal.action {
            SignalAction::Delete => {
                self.store.remove(&signal.id).await;
                SignalOutcome::Removed
            }
            SignalAction::New | SignalAction::Read | SignalAction::Update => {
                self.resolve(&signal).await
            }
        };

        if outcome == SignalOutcome::Dropped {
            self.processed.lock().await.pop(&key);
        }

        debug!(
            notification_id = %signal.id,
            action = signal.action.as_str(),
            signal_key = %key,
            outcome = ?outcome,
            duration_ms = start.elapsed().as_millis() as u64,
            "Signal reconciled"
        );
        outcome
    }

    async fn resolve(&self, signal: &Signal) -> SignalOutcome {
        match self.remote.fetch_one(&signal.id).await {
            Ok(fetched) => {
                let record = fetched.record;
                let cue = (signal.action == SignalAction::New).then(|| record.clone());
                let outcome = self.store.apply_fetched(record, fetched.unread_count).await;
                if let Some(record) = cue {
                    self.events.emit(SyncEvent::NewNotification { record });
                }
                match outcome {
                    UpsertOutcome::Inserted => SignalOutcome::Inserted,
                    UpsertOutcome::Replaced => SignalOutcome::Replaced,
                }
            }
            Err(e) if e.is_not_found() && signal.action != SignalAction::New => {
                debug!(
                    notification_id = %signal.id,
                    action = signal.action.as_str(),
                    "Record gone on remote, removing locally"
                );
                self.store.remove(&signal.id).await;
                SignalOutcome::Removed
            }
            Err(e) => {
                warn!(
                    notification_id = %signal.id,
                    action = signal.action.as_str(),
                    error = %e,
                    "Failed to resolve signal, dropping"
                );
                SignalOutcome::Dropped
            }
        }
    }

    /// Whether a signal key is currently remembered.
    pub async fn is_processed(&self, key: &str) -> bool {
        self.processed.lock().await.contains(key)
    }

    pub async fn processed_len(&self) -> usize {
        self.processed.lock().await.len()
    }

    /// Forget every remembered key (session teardown).
    pub async fn reset(&self) {
        self.processed.lock().await.clear();
    }
}
