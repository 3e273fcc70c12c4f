//! Polling fallback.
//!
//! Closes gaps the signal channel may leave (disconnects, dropped
//! resolutions) by asking the remote for everything since a cursor. The
//! cursor only ever moves to the server's own timestamp, so client clock
//! skew cannot open a hole.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use notisync_core::{EventBus, NotificationStore, RemoteSource, Result, SyncEvent, UpsertOutcome};

/// Summary of one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub inserted: usize,
    pub replaced: usize,
    /// Cursor after this cycle (the server timestamp).
    pub cursor: DateTime<Utc>,
}

pub struct Poller {
    remote: Arc<dyn RemoteSource>,
    store: NotificationStore,
    events: Arc<EventBus>,
    interval: Duration,
    last_check: Mutex<DateTime<Utc>>,
}

/// Handle for a running poll loop.
///
/// Dropping the handle also stops the loop at its next wakeup.
pub struct PollerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop the loop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            if e.is_panic() {
                error!(error = ?e, "Poller task panicked");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Poller {
    /// `since` is the initial cursor, normally the session start.
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        store: NotificationStore,
        events: Arc<EventBus>,
        interval: Duration,
        since: DateTime<Utc>,
    ) -> Self {
        Self {
            remote,
            store,
            events,
            interval,
            last_check: Mutex::new(since),
        }
    }

    pub async fn last_check(&self) -> DateTime<Utc> {
        *self.last_check.lock().await
    }

    /// Run one poll cycle. On error the cursor stays put.
    pub async fn poll_once(&self) -> Result<PollReport> {
        let mut last_check = self.last_check.lock().await;
        let start = Instant::now();

        let response = match self.remote.poll(*last_check).await {
            Ok(response) => response,
            Err(e) => {
                warn!(op = "poll", error = %e, since = %*last_check, "Poll failed, cursor kept");
                return Err(e);
            }
        };

        let mut records = response.records;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let mut inserted = 0;
        let mut replaced = 0;
        for record in records {
            let cue = (!record.is_read).then(|| record.clone());
            match self.store.upsert(record).await {
                UpsertOutcome::Inserted => {
                    inserted += 1;
                    if let Some(record) = cue {
                        self.events.emit(SyncEvent::NewNotification { record });
                    }
                }
                UpsertOutcome::Replaced => replaced += 1,
            }
        }

        if let Some(count) = response.unread_count {
            self.store.set_unread_count(count).await;
        }
        *last_check = response.server_timestamp;

        debug!(
            op = "poll",
            inserted,
            replaced,
            cursor = %response.server_timestamp,
            duration_ms = start.elapsed().as_millis() as u64,
            "Poll cycle complete"
        );

        Ok(PollReport {
            inserted,
            replaced,
            cursor: response.server_timestamp,
        })
    }

    /// Spawn the poll loop. The first cycle runs immediately.
    pub fn start(self: &Arc<Self>) -> PollerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let poller = Arc::clone(self);

        let task = tokio::spawn(async move {
            info!(interval_ms = poller.interval.as_millis() as u64, "Poller started");
            let mut ticker = tokio::time::interval(poller.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        // failures are logged inside; the next tick retries
                        let _ = poller.poll_once().await;
                    }
                }
            }
            info!("Poller stopped");
        });

        PollerHandle { shutdown_tx, task }
    }
}
