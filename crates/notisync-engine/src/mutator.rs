//! Optimistic user actions.
//!
//! Every action mutates the local store before the remote call resolves. On
//! remote failure the store is brought back to remote truth: mark-all-read
//! restores a read-state snapshot, everything else re-fetches the first page
//! and count (compensating refresh). Failures are reported on the event bus
//! as [`SyncEvent::MutationFailed`] and never returned as errors.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use notisync_core::{
    Error, EventBus, ListQuery, NewNotification, NotificationRecord, NotificationStore, Recovery,
    RemoteSource, Result, SyncEvent,
};

/// How an optimistic action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Remote confirmed the local change.
    Confirmed,
    /// Nothing to do; no remote call was made.
    NoOp,
    /// Remote rejected; prior read state restored from a snapshot.
    RolledBack,
    /// Remote rejected; store replaced from an authoritative fetch.
    Resynced,
    /// Remote rejected and recovery failed too; the next poll or refresh converges.
    Failed,
    /// The owning session shut down while the remote call was in flight; the
    /// store was left as teardown cleared it.
    Abandoned,
}

impl MutationOutcome {
    /// Whether the remote accepted the action (or there was nothing to do).
    pub fn is_success(self) -> bool {
        matches!(self, MutationOutcome::Confirmed | MutationOutcome::NoOp)
    }
}

pub struct OptimisticMutator {
    remote: Arc<dyn RemoteSource>,
    store: NotificationStore,
    events: Arc<EventBus>,
    page_size: u32,
    shutdown: Option<watch::Receiver<bool>>,
}

impl OptimisticMutator {
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        store: NotificationStore,
        events: Arc<EventBus>,
        page_size: u32,
    ) -> Self {
        Self {
            remote,
            store,
            events,
            page_size: page_size.max(1),
            shutdown: None,
        }
    }

    /// Stop touching the store once `shutdown` reads `true`.
    ///
    /// Remote calls already in flight still complete, but their recovery
    /// (rollback, refresh, insert) is skipped.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    fn is_shut_down(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Mark one record read. No-op if absent or already read.
    #[instrument(skip(self))]
    pub async fn mark_as_read(&self, id: &str) -> MutationOutcome {
        if !self.store.mark_read(id, Utc::now()).await {
            debug!(notification_id = id, "Already read or not loaded, skipping");
            return MutationOutcome::NoOp;
        }

        match self.remote.mark_read(id).await {
            Ok(()) => MutationOutcome::Confirmed,
            Err(e) => self.compensate("mark_as_read", Some(id), e).await,
        }
    }

    /// Mark every record read; restores the exact prior read state on failure.
    #[instrument(skip(self))]
    pub async fn mark_all_as_read(&self) -> MutationOutcome {
        let patch = self.store.read_state_patch().await;
        let has_unread = patch.unread_count > 0 || patch.entries.iter().any(|e| !e.is_read);
        if !has_unread {
            return MutationOutcome::NoOp;
        }

        let marked_at = Utc::now();
        let changed = self.store.mark_all_read(marked_at).await;
        debug!(record_count = changed, "Marked all read locally");

        match self.remote.mark_all_read().await {
            Ok(()) => MutationOutcome::Confirmed,
            Err(_) if self.is_shut_down() => MutationOutcome::Abandoned,
            Err(e) => {
                let restored = self.store.apply_patch(&patch, marked_at).await;
                warn!(
                    op = "mark_all_as_read",
                    error = %e,
                    record_count = restored,
                    "Remote rejected mark-all-read, rolled back"
                );
                self.report("mark_all_as_read", None, &e, Recovery::Rollback);
                MutationOutcome::RolledBack
            }
        }
    }

    /// Delete one record. A record already gone on the remote counts as confirmed.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> MutationOutcome {
        if self.store.remove(id).await.is_none() {
            debug!(notification_id = id, "Not loaded, skipping delete");
            return MutationOutcome::NoOp;
        }

        match self.remote.delete(id).await {
            Ok(()) => MutationOutcome::Confirmed,
            Err(e) if e.is_not_found() => MutationOutcome::Confirmed,
            Err(e) => self.compensate("delete", Some(id), e).await,
        }
    }

    /// Delete every record visible through the current filters.
    ///
    /// Remote deletes run concurrently; any failure triggers one refresh.
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> MutationOutcome {
        let visible = self.store.filtered().await;
        if visible.is_empty() {
            return MutationOutcome::NoOp;
        }

        let mut ids = Vec::with_capacity(visible.len());
        for record in visible {
            if self.store.remove(&record.id).await.is_some() {
                ids.push(record.id);
            }
        }

        let results = join_all(ids.iter().map(|id| self.remote.delete(id))).await;
        let failure = ids
            .iter()
            .zip(results)
            .filter_map(|(id, result)| match result {
                Err(e) if !e.is_not_found() => Some((id, e)),
                _ => None,
            })
            .inspect(|(id, e)| {
                warn!(notification_id = %id, error = %e, "Remote delete failed during clear-all")
            })
            .last();

        match failure {
            None => {
                info!(record_count = ids.len(), "Cleared notifications");
                MutationOutcome::Confirmed
            }
            Some((_, e)) => self.compensate("clear_all", None, e).await,
        }
    }

    /// Create a record remotely and insert what the remote returns.
    ///
    /// Not optimistic: the remote assigns the id.
    #[instrument(skip(self, payload), fields(title = %payload.title))]
    pub async fn create(&self, payload: &NewNotification) -> Result<NotificationRecord> {
        let record = self.remote.create(payload).await.map_err(|e| {
            warn!(op = "create", error = %e, "Remote rejected create");
            e
        })?;
        if self.is_shut_down() {
            return Err(Error::Internal("session shut down".to_string()));
        }
        self.store.upsert(record.clone()).await;
        Ok(record)
    }

    /// Replace the store with the first page and count from the remote.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> MutationOutcome {
        match self.resync().await {
            Ok(()) => MutationOutcome::Resynced,
            Err(_) if self.is_shut_down() => MutationOutcome::Abandoned,
            Err(e) => {
                warn!(op = "refresh", error = %e, "Refresh failed");
                self.report("refresh", None, &e, Recovery::Pending);
                MutationOutcome::Failed
            }
        }
    }

    /// Fails with `Internal` if the session shut down during the fetch.
    async fn resync(&self) -> Result<()> {
        let page = self
            .remote
            .fetch_list(&ListQuery::first_page(self.page_size))
            .await?;
        if self.is_shut_down() {
            return Err(Error::Internal("session shut down".to_string()));
        }
        let record_count = page.records.len();
        let unread_count = page.unread_count;
        self.store
            .resync(page.records, page.unread_count, Some(page.pagination))
            .await;
        self.events.emit(SyncEvent::Resynced {
            record_count,
            unread_count,
        });
        Ok(())
    }

    /// Compensating refresh after a rejected optimistic change.
    async fn compensate(&self, operation: &str, id: Option<&str>, error: Error) -> MutationOutcome {
        if self.is_shut_down() {
            debug!(op = operation, error = %error, "Session shut down, skipping refresh");
            return MutationOutcome::Abandoned;
        }
        warn!(
            op = operation,
            notification_id = id.unwrap_or_default(),
            error = %error,
            "Remote rejected change, refreshing"
        );
        match self.resync().await {
            Ok(()) => {
                self.report(operation, id, &error, Recovery::Refresh);
                MutationOutcome::Resynced
            }
            Err(_) if self.is_shut_down() => MutationOutcome::Abandoned,
            Err(refresh_error) => {
                warn!(
                    op = operation,
                    error = %refresh_error,
                    "Compensating refresh failed, store may lag until next poll"
                );
                self.report(operation, id, &error, Recovery::Pending);
                MutationOutcome::Failed
            }
        }
    }

    fn report(&self, operation: &str, id: Option<&str>, error: &Error, recovery: Recovery) {
        self.events.emit(SyncEvent::MutationFailed {
            operation: operation.to_string(),
            notification_id: id.map(str::to_string),
            error: error.to_string(),
            recovery,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockFailure, MockOp, MockRemoteSource};
    use crate::reconciler::{Reconciler, SignalOutcome};
    use notisync_core::{Signal, SignalAction};
    use chrono::{Duration, TimeZone};
    use notisync_core::{ReadFilter, SyncEnvelope};
    use tokio::sync::broadcast;

    fn record(id: &str, minutes: i64) -> NotificationRecord {
        let base = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        NotificationRecord::new(id, format!("Title {id}"), "body", base + Duration::minutes(minutes))
    }

    fn read_record(id: &str, minutes: i64) -> NotificationRecord {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 7, 0, 0).unwrap();
        record(id, minutes).with_read_at(at)
    }

    struct Harness {
        mutator: OptimisticMutator,
        store: NotificationStore,
        remote: MockRemoteSource,
        rx: broadcast::Receiver<SyncEnvelope>,
    }

    /// Seed both the remote and the local store with the same records.
    async fn harness(records: Vec<NotificationRecord>) -> Harness {
        let remote = MockRemoteSource::new();
        for r in &records {
            remote.put_record(r.clone());
        }
        let unread = records.iter().filter(|r| !r.is_read).count() as u64;
        let store = NotificationStore::new(100);
        store.initialize(records, unread, None).await;
        let events = Arc::new(EventBus::default());
        let rx = events.subscribe();
        let mutator = OptimisticMutator::new(Arc::new(remote.clone()), store.clone(), events, 20);
        Harness {
            mutator,
            store,
            remote,
            rx,
        }
    }

    fn next_failure(rx: &mut broadcast::Receiver<SyncEnvelope>) -> (String, Recovery) {
        loop {
            let envelope = rx.try_recv().expect("expected an event");
            if let SyncEvent::MutationFailed {
                operation,
                recovery,
                ..
            } = envelope.payload
            {
                return (operation, recovery);
            }
        }
    }

    #[tokio::test]
    async fn test_mark_as_read_confirmed() {
        let h = harness(vec![record("a", 1)]).await;

        assert_eq!(h.mutator.mark_as_read("a").await, MutationOutcome::Confirmed);
        assert!(h.store.get("a").await.unwrap().is_read);
        assert_eq!(h.store.unread_count().await, 0);
        assert!(h.remote.server_records()[0].is_read);
    }

    #[tokio::test]
    async fn test_mark_as_read_already_read_is_noop() {
        let h = harness(vec![read_record("a", 1)]).await;
        let before = h.store.snapshot().await;

        assert_eq!(h.mutator.mark_as_read("a").await, MutationOutcome::NoOp);
        assert_eq!(h.remote.call_count(MockOp::MarkRead), 0);
        assert_eq!(h.store.records().await, before.records().to_vec());
        assert_eq!(h.store.unread_count().await, before.unread_count());
    }

    #[tokio::test]
    async fn test_mark_as_read_absent_is_noop() {
        let h = harness(vec![]).await;
        assert_eq!(h.mutator.mark_as_read("ghost").await, MutationOutcome::NoOp);
        assert_eq!(h.remote.call_count(MockOp::MarkRead), 0);
    }

    #[tokio::test]
    async fn test_mark_as_read_failure_refreshes_from_remote() {
        let mut h = harness(vec![record("a", 1), record("b", 2)]).await;
        h.remote.fail(MockOp::MarkRead);

        assert_eq!(h.mutator.mark_as_read("a").await, MutationOutcome::Resynced);

        // remote never applied it, so the refresh brings back the unread state
        assert!(!h.store.get("a").await.unwrap().is_read);
        assert_eq!(h.store.unread_count().await, 2);
        assert_eq!(h.remote.call_count(MockOp::FetchList), 1);
        assert_eq!(
            next_failure(&mut h.rx),
            ("mark_as_read".to_string(), Recovery::Refresh)
        );
    }

    #[tokio::test]
    async fn test_mark_as_read_failure_with_failed_refresh() {
        let mut h = harness(vec![record("a", 1)]).await;
        h.remote.fail(MockOp::MarkRead);
        h.remote.fail(MockOp::FetchList);

        assert_eq!(h.mutator.mark_as_read("a").await, MutationOutcome::Failed);
        assert_eq!(
            next_failure(&mut h.rx),
            ("mark_as_read".to_string(), Recovery::Pending)
        );
    }

    #[tokio::test]
    async fn test_mark_all_as_read_rollback_restores_exact_state() {
        let mut h = harness(vec![record("a", 2), read_record("b", 1)]).await;
        let before = h.store.snapshot().await;
        h.remote.fail(MockOp::MarkAllRead);

        assert_eq!(h.mutator.mark_all_as_read().await, MutationOutcome::RolledBack);

        let after = h.store.snapshot().await;
        assert_eq!(after.records(), before.records());
        assert_eq!(after.unread_count(), 1);
        assert!(!after.get("a").unwrap().is_read);
        assert!(after.get("b").unwrap().is_read);
        assert_eq!(after.get("b").unwrap().read_at, before.get("b").unwrap().read_at);
        assert_eq!(
            next_failure(&mut h.rx),
            ("mark_all_as_read".to_string(), Recovery::Rollback)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_all_rollback_keeps_count_from_signal_landed_meanwhile() {
        let remote = MockRemoteSource::new()
            .with_record(record("a", 2))
            .with_latency(std::time::Duration::from_millis(50));
        remote.fail(MockOp::MarkAllRead);
        let store = NotificationStore::new(100);
        store.initialize(vec![record("a", 2)], 1, None).await;
        let events = Arc::new(EventBus::default());
        let mutator =
            OptimisticMutator::new(Arc::new(remote.clone()), store.clone(), Arc::clone(&events), 20);

        // the remote as the signal path sees it: "a" still unread, "n2" new
        let signal_remote = MockRemoteSource::new()
            .with_record(record("a", 2))
            .with_record(record("n2", 3));
        let reconciler =
            Reconciler::new(Arc::new(signal_remote), store.clone(), Arc::clone(&events), 100);

        let (outcome, signal) = tokio::join!(mutator.mark_all_as_read(), async {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            reconciler
                .handle(Signal::new("n2", SignalAction::New, "t1"))
                .await
        });

        assert_eq!(signal, SignalOutcome::Inserted);
        assert_eq!(outcome, MutationOutcome::RolledBack);
        assert!(!store.get("a").await.unwrap().is_read);
        assert!(!store.get("n2").await.unwrap().is_read);
        assert_eq!(store.unread_count().await, 2);
    }

    #[tokio::test]
    async fn test_failure_after_shutdown_skips_recovery() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let remote = MockRemoteSource::new().with_record(record("a", 1));
        remote.fail(MockOp::MarkRead);
        remote.fail(MockOp::MarkAllRead);
        let store = NotificationStore::new(100);
        store.initialize(vec![record("a", 1), record("b", 2)], 2, None).await;
        let mutator = OptimisticMutator::new(
            Arc::new(remote.clone()),
            store.clone(),
            Arc::new(EventBus::default()),
            20,
        )
        .with_shutdown(shutdown_rx);

        shutdown_tx.send_replace(true);

        assert_eq!(mutator.mark_as_read("a").await, MutationOutcome::Abandoned);
        assert_eq!(mutator.mark_all_as_read().await, MutationOutcome::Abandoned);
        assert_eq!(remote.call_count(MockOp::FetchList), 0);
        // nothing restored from the snapshot either
        assert_eq!(store.unread_count().await, 0);
    }

    #[tokio::test]
    async fn test_mark_all_as_read_confirmed() {
        let h = harness(vec![record("a", 2), record("b", 1)]).await;

        assert_eq!(h.mutator.mark_all_as_read().await, MutationOutcome::Confirmed);
        assert_eq!(h.store.unread_count().await, 0);
        assert!(h.store.records().await.iter().all(|r| r.is_read));
    }

    #[tokio::test]
    async fn test_mark_all_as_read_nothing_unread_is_noop() {
        let h = harness(vec![read_record("a", 1)]).await;
        assert_eq!(h.mutator.mark_all_as_read().await, MutationOutcome::NoOp);
        assert_eq!(h.remote.call_count(MockOp::MarkAllRead), 0);
    }

    #[tokio::test]
    async fn test_delete_confirmed_decrements_count() {
        let h = harness(vec![record("a", 1), record("b", 2)]).await;

        assert_eq!(h.mutator.delete("a").await, MutationOutcome::Confirmed);
        assert!(!h.store.contains("a").await);
        assert_eq!(h.store.unread_count().await, 1);
    }

    #[tokio::test]
    async fn test_delete_failure_restores_via_refresh() {
        let mut h = harness(vec![record("a", 1), record("b", 2)]).await;
        h.remote.fail(MockOp::Delete);

        assert_eq!(h.mutator.delete("a").await, MutationOutcome::Resynced);
        assert!(h.store.contains("a").await);
        assert_eq!(h.store.unread_count().await, 2);
        assert_eq!(
            next_failure(&mut h.rx),
            ("delete".to_string(), Recovery::Refresh)
        );
    }

    #[tokio::test]
    async fn test_delete_already_gone_remotely_is_confirmed() {
        let h = harness(vec![record("a", 1)]).await;
        h.remote.fail_with(MockOp::Delete, MockFailure::NotFound);

        assert_eq!(h.mutator.delete("a").await, MutationOutcome::Confirmed);
        assert_eq!(h.remote.call_count(MockOp::FetchList), 0);
    }

    #[tokio::test]
    async fn test_clear_all_removes_only_visible() {
        let h = harness(vec![record("a", 3), read_record("b", 2), record("c", 1)]).await;
        h.store.set_filter(ReadFilter::Unread).await;

        assert_eq!(h.mutator.clear_all().await, MutationOutcome::Confirmed);

        let remaining: Vec<_> = h.store.records().await.into_iter().map(|r| r.id).collect();
        assert_eq!(remaining, vec!["b"]);
        assert_eq!(h.remote.call_count(MockOp::Delete), 2);
        assert_eq!(h.store.unread_count().await, 0);
    }

    #[tokio::test]
    async fn test_clear_all_failure_triggers_refresh() {
        let mut h = harness(vec![record("a", 2), record("b", 1)]).await;
        h.remote.fail(MockOp::Delete);

        assert_eq!(h.mutator.clear_all().await, MutationOutcome::Resynced);
        assert_eq!(h.store.len().await, 2);
        assert_eq!(h.remote.call_count(MockOp::FetchList), 1);
        assert_eq!(
            next_failure(&mut h.rx),
            ("clear_all".to_string(), Recovery::Refresh)
        );
    }

    #[tokio::test]
    async fn test_clear_all_empty_is_noop() {
        let h = harness(vec![]).await;
        assert_eq!(h.mutator.clear_all().await, MutationOutcome::NoOp);
        assert_eq!(h.remote.call_count(MockOp::Delete), 0);
    }

    #[tokio::test]
    async fn test_create_inserts_returned_record() {
        let h = harness(vec![record("a", 1)]).await;

        let created = h
            .mutator
            .create(&NewNotification::new("Hello", "World"))
            .await
            .unwrap();

        assert_eq!(h.store.records().await[0].id, created.id);
        assert_eq!(h.store.len().await, 2);
    }

    #[tokio::test]
    async fn test_create_failure_leaves_store_untouched() {
        let h = harness(vec![record("a", 1)]).await;
        h.remote.fail(MockOp::Create);

        let result = h.mutator.create(&NewNotification::new("Hello", "World")).await;
        assert!(matches!(result, Err(Error::Request(_))));
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_refresh_replaces_store_and_emits() {
        let mut h = harness(vec![record("a", 1)]).await;
        h.remote.put_record(record("z", 9));
        h.remote.remove_record("a");

        assert_eq!(h.mutator.refresh().await, MutationOutcome::Resynced);

        let ids: Vec<_> = h.store.records().await.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["z"]);
        assert!(h.store.page_cursor().await.is_some());
        let envelope = h.rx.try_recv().unwrap();
        assert_eq!(envelope.event_type, "store.resynced");
    }

    #[tokio::test]
    async fn test_refresh_failure_reports_pending() {
        let mut h = harness(vec![record("a", 1)]).await;
        h.remote.fail(MockOp::FetchList);

        assert_eq!(h.mutator.refresh().await, MutationOutcome::Failed);
        assert_eq!(h.store.len().await, 1);
        assert_eq!(
            next_failure(&mut h.rx),
            ("refresh".to_string(), Recovery::Pending)
        );
    }
}
