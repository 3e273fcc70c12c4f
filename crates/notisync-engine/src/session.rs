//! Sync session: lifecycle and rendering surface.
//!
//! A session owns one local store and wires the reconciler, mutator and
//! poller around it. On start it spawns:
//!
//! - an initial-load task (first page + count, retried with backoff, applied
//!   only while the store is still empty)
//! - a supervisor that keeps the signal subscription alive, fans signals out
//!   to reconciliation tasks, and falls back to polling while the channel is
//!   down
//!
//! [`SyncSession::shutdown`] stops everything and clears the store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use notisync_core::{
    Connectivity, DisplayCategory, Error, EventBus, ListQuery, NewNotification,
    NotificationRecord, NotificationStore, Priority, ReadFilter, RemoteSource, Result,
    SignalChannel, SyncEnvelope, SyncEvent,
};

use crate::config::SyncConfig;
use crate::mutator::{MutationOutcome, OptimisticMutator};
use crate::poller::{PollReport, Poller, PollerHandle};
use crate::reconciler::Reconciler;

/// Exponential backoff: `base * 2^attempt`, capped at `max`.
pub fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
}

struct SessionInner {
    session_id: Uuid,
    config: SyncConfig,
    remote: Arc<dyn RemoteSource>,
    channel: Arc<dyn SignalChannel>,
    store: NotificationStore,
    events: Arc<EventBus>,
    reconciler: Arc<Reconciler>,
    mutator: OptimisticMutator,
    poller: Arc<Poller>,
    connectivity: watch::Sender<Connectivity>,
}

impl SessionInner {
    fn set_connectivity(&self, state: Connectivity) {
        let changed = self.connectivity.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
        if changed {
            info!(state = state.as_str(), "Connectivity changed");
            self.events.emit(SyncEvent::ConnectivityChanged { state });
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        backoff_delay(
            attempt,
            self.config.reconnect_base_ms,
            self.config.reconnect_max_ms,
        )
    }

    /// Seed the store once, retrying until it succeeds or the session ends.
    async fn load_initial(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let query = ListQuery::first_page(self.config.page_size);
        let mut attempt = 0u32;
        loop {
            let fetched = tokio::select! {
                biased;
                _ = shutdown.changed() => return,
                fetched = self.remote.fetch_list(&query) => fetched,
            };
            match fetched {
                Ok(page) => {
                    let record_count = page.records.len();
                    let applied = self
                        .store
                        .initialize(page.records, page.unread_count, Some(page.pagination))
                        .await;
                    info!(record_count, applied, "Initial load finished");
                    return;
                }
                Err(e) => {
                    let delay = self.backoff(attempt);
                    warn!(
                        error = %e,
                        attempt,
                        retry_ms = delay.as_millis() as u64,
                        "Initial load failed, retrying"
                    );
                    attempt = attempt.saturating_add(1);
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Keep the signal subscription alive until shutdown.
    async fn supervise(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let subscriber_id = self.config.subscriber_id.clone();
        let mut poller: Option<PollerHandle> =
            self.config.poll_while_live.then(|| self.poller.start());
        let mut inflight: JoinSet<()> = JoinSet::new();
        let mut attempt = 0u32;

        'session: loop {
            if *shutdown.borrow() {
                break;
            }

            match self.channel.subscribe(&subscriber_id).await {
                Ok(mut stream) => {
                    attempt = 0;
                    self.set_connectivity(Connectivity::Live);
                    if !self.config.poll_while_live {
                        if let Some(handle) = poller.take() {
                            handle.stop().await;
                        }
                    }

                    loop {
                        tokio::select! {
                            biased;
                            _ = shutdown.changed() => break 'session,
                            Some(joined) = inflight.join_next(), if !inflight.is_empty() => {
                                if let Err(e) = joined {
                                    if e.is_panic() {
                                        error!(error = ?e, "Reconciliation task panicked");
                                    }
                                }
                            }
                            item = stream.next() => match item {
                                Some(Ok(signal)) => {
                                    let reconciler = Arc::clone(&self.reconciler);
                                    inflight.spawn(async move {
                                        reconciler.handle(signal).await;
                                    });
                                }
                                Some(Err(e)) => {
                                    warn!(error = %e, "Signal stream failed");
                                    break;
                                }
                                None => {
                                    warn!("Signal stream ended");
                                    break;
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(subscriber_id = %subscriber_id, error = %e, "Signal subscription failed");
                }
            }

            self.set_connectivity(Connectivity::Degraded);
            if poller.is_none() {
                poller = Some(self.poller.start());
            }

            let delay = self.backoff(attempt);
            attempt = attempt.saturating_add(1);
            debug!(attempt, retry_ms = delay.as_millis() as u64, "Resubscribing after backoff");
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        inflight.shutdown().await;
        if let Some(handle) = poller {
            handle.stop().await;
        }
        debug!("Signal supervisor stopped");
    }
}

/// A running synchronization session for one subscriber.
pub struct SyncSession {
    inner: Arc<SessionInner>,
    shutdown_tx: watch::Sender<bool>,
    connectivity_rx: watch::Receiver<Connectivity>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl SyncSession {
    /// Validate config, build the components and spawn the background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: SyncConfig,
        remote: Arc<dyn RemoteSource>,
        channel: Arc<dyn SignalChannel>,
    ) -> Result<Self> {
        config.validate()?;

        let session_id = Uuid::now_v7();
        let store = NotificationStore::new(config.store_capacity);
        let events = Arc::new(EventBus::default());
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&remote),
            store.clone(),
            Arc::clone(&events),
            config.dedup_capacity,
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mutator = OptimisticMutator::new(
            Arc::clone(&remote),
            store.clone(),
            Arc::clone(&events),
            config.page_size,
        )
        .with_shutdown(shutdown_rx.clone());
        let poller = Arc::new(Poller::new(
            Arc::clone(&remote),
            store.clone(),
            Arc::clone(&events),
            config.poll_interval(),
            Utc::now(),
        ));
        let (connectivity, connectivity_rx) = watch::channel(Connectivity::Connecting);

        info!(
            session_id = %session_id,
            subscriber_id = %config.subscriber_id,
            poll_interval_ms = config.poll_interval_ms,
            poll_while_live = config.poll_while_live,
            "Starting sync session"
        );

        let inner = Arc::new(SessionInner {
            session_id,
            config,
            remote,
            channel,
            store,
            events,
            reconciler,
            mutator,
            poller,
            connectivity,
        });

        let span = info_span!("sync_session", session_id = %session_id);
        let tasks = vec![
            tokio::spawn(
                Arc::clone(&inner)
                    .load_initial(shutdown_rx.clone())
                    .instrument(span.clone()),
            ),
            tokio::spawn(Arc::clone(&inner).supervise(shutdown_rx).instrument(span)),
        ];

        Ok(Self {
            inner,
            shutdown_tx,
            connectivity_rx,
            tasks: Mutex::new(tasks),
            closed: AtomicBool::new(false),
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // ─── Selectors ─────────────────────────────────────────────────────────

    /// Records passing the current filters, newest first.
    pub async fn filtered(&self) -> Vec<NotificationRecord> {
        self.inner.store.filtered().await
    }

    pub async fn unread_count(&self) -> u64 {
        self.inner.store.unread_count().await
    }

    pub async fn panel_open(&self) -> bool {
        self.inner.store.panel_open().await
    }

    pub fn connectivity(&self) -> Connectivity {
        *self.connectivity_rx.borrow()
    }

    pub fn watch_connectivity(&self) -> watch::Receiver<Connectivity> {
        self.connectivity_rx.clone()
    }

    /// Revision feed; changes whenever the store does.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.inner.store.subscribe()
    }

    /// Side-effect events (new-notification cue, connectivity, failures).
    pub fn events(&self) -> broadcast::Receiver<SyncEnvelope> {
        self.inner.events.subscribe()
    }

    /// The underlying store, for selectors not mirrored here.
    pub fn store(&self) -> &NotificationStore {
        &self.inner.store
    }

    // ─── Commands ──────────────────────────────────────────────────────────

    pub async fn mark_as_read(&self, id: &str) -> MutationOutcome {
        if self.is_closed() {
            return MutationOutcome::NoOp;
        }
        self.inner.mutator.mark_as_read(id).await
    }

    pub async fn mark_all_as_read(&self) -> MutationOutcome {
        if self.is_closed() {
            return MutationOutcome::NoOp;
        }
        self.inner.mutator.mark_all_as_read().await
    }

    pub async fn delete(&self, id: &str) -> MutationOutcome {
        if self.is_closed() {
            return MutationOutcome::NoOp;
        }
        self.inner.mutator.delete(id).await
    }

    pub async fn clear_all(&self) -> MutationOutcome {
        if self.is_closed() {
            return MutationOutcome::NoOp;
        }
        self.inner.mutator.clear_all().await
    }

    pub async fn refresh(&self) -> MutationOutcome {
        if self.is_closed() {
            return MutationOutcome::NoOp;
        }
        self.inner.mutator.refresh().await
    }

    pub async fn create(&self, payload: &NewNotification) -> Result<NotificationRecord> {
        if self.is_closed() {
            return Err(Error::Internal("sync session is closed".to_string()));
        }
        self.inner.mutator.create(payload).await
    }

    /// Run one poll cycle now, outside the fallback schedule.
    pub async fn poll_now(&self) -> Result<PollReport> {
        if self.is_closed() {
            return Err(Error::Internal("sync session is closed".to_string()));
        }
        self.inner.poller.poll_once().await
    }

    pub async fn set_filter(&self, filter: ReadFilter) {
        self.inner.store.set_filter(filter).await;
    }

    pub async fn set_category_filter(&self, category: Option<DisplayCategory>) {
        self.inner.store.set_category_filter(category).await;
    }

    pub async fn set_priority_filter(&self, priority: Option<Priority>) {
        self.inner.store.set_priority_filter(priority).await;
    }

    pub async fn set_panel_open(&self, open: bool) {
        self.inner.store.set_panel_open(open).await;
    }

    /// Flip the panel state; returns the new state.
    pub async fn toggle_panel(&self) -> bool {
        self.inner.store.toggle_panel().await
    }

    /// Stop background work and clear the store. Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(session_id = %self.inner.session_id, "Shutting down sync session");
        self.shutdown_tx.send_replace(true);

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(error = ?e, "Session task panicked");
                }
            }
        }

        self.inner.reconciler.reset().await;
        self.inner.store.clear().await;
        self.inner.set_connectivity(Connectivity::Closed);
        info!(session_id = %self.inner.session_id, "Sync session closed");
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}
