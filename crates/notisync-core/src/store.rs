//! Local notification store.
//!
//! [`LocalStore`] is the plain state container: an ordered record list
//! (newest first), an independently tracked unread count, filter selections,
//! the page cursor and panel state. Its fields are private; the methods below
//! are the only way to change them, so the unread-count bookkeeping cannot be
//! bypassed.
//!
//! [`NotificationStore`] is the shared handle the engine components hold. Each
//! operation takes the lock once, mutates, bumps the revision on the change
//! feed, and releases. The lock is never held across a remote call.
//!
//! ## Unread count
//!
//! The count is not derived from the records. The remote source is
//! authoritative and [`LocalStore::set_unread_count`] always overwrites; local
//! decrements from `mark_read`/`remove` are floored at zero and are simply
//! replaced when the next authoritative value lands.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock};
use tracing::{debug, trace, warn};

use crate::models::{DisplayCategory, NotificationRecord, Pagination, Priority, ReadFilter};

/// What an upsert did to the record list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The id was new and the record went to the head of the list.
    Inserted,
    /// A record with the same id was overwritten in place.
    Replaced,
}

/// Prior read state of one record.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadStateEntry {
    pub id: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

/// Reversible snapshot of per-record read state and the unread count.
///
/// `count_epoch` identifies the last authoritative count write the snapshot
/// saw; [`LocalStore::apply_patch`] only restores `unread_count` if no newer
/// authoritative value has landed since.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadStatePatch {
    pub entries: Vec<ReadStateEntry>,
    pub unread_count: u64,
    pub count_epoch: u64,
}

/// Plain notification state. See the module docs for the invariants.
#[derive(Debug, Clone)]
pub struct LocalStore {
    records: Vec<NotificationRecord>,
    unread_count: u64,
    filter: ReadFilter,
    category_filter: Option<DisplayCategory>,
    priority_filter: Option<Priority>,
    page_cursor: Option<Pagination>,
    panel_open: bool,
    capacity: usize,
    /// Bumped on every authoritative count write.
    count_epoch: u64,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new(crate::defaults::STORE_CAPACITY)
    }
}

impl LocalStore {
    /// Create an empty store holding at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::new(),
            unread_count: 0,
            filter: ReadFilter::All,
            category_filter: None,
            priority_filter: None,
            page_cursor: None,
            panel_open: false,
            capacity: capacity.max(1),
            count_epoch: 0,
        }
    }

    // ─── Mutations ─────────────────────────────────────────────────────────

    /// Seed the store from the initial list fetch.
    ///
    /// Applies only while the store is empty. A slow initial fetch must not
    /// clobber records already delivered by signals, so a non-empty store is
    /// left untouched (count and cursor included). Returns whether it applied.
    pub fn initialize(
        &mut self,
        records: Vec<NotificationRecord>,
        unread_count: u64,
        page_cursor: Option<Pagination>,
    ) -> bool {
        if !self.records.is_empty() {
            warn!(
                existing = self.records.len(),
                incoming = records.len(),
                "Store already populated, ignoring initial load"
            );
            return false;
        }
        self.records = newest_first_unique(records, self.capacity);
        self.write_count(unread_count);
        self.page_cursor = page_cursor;
        debug!(
            record_count = self.records.len(),
            unread_count, "Store initialized"
        );
        true
    }

    /// Insert or overwrite a record by id.
    ///
    /// An existing id is replaced at its current position. A new id goes to the
    /// head, then the list is truncated to capacity (oldest evicted).
    pub fn upsert(&mut self, record: NotificationRecord) -> UpsertOutcome {
        if let Some(slot) = self.records.iter_mut().find(|r| r.id == record.id) {
            trace!(notification_id = %record.id, "Replacing record in place");
            *slot = record;
            return UpsertOutcome::Replaced;
        }

        trace!(notification_id = %record.id, "Inserting record at head");
        self.records.insert(0, record);
        if self.records.len() > self.capacity {
            let evicted = self.records.len() - self.capacity;
            self.records.truncate(self.capacity);
            debug!(evicted, capacity = self.capacity, "Evicted oldest records");
        }
        UpsertOutcome::Inserted
    }

    /// Remove a record by id; an unread removal decrements the count.
    pub fn remove(&mut self, id: &str) -> Option<NotificationRecord> {
        let index = self.records.iter().position(|r| r.id == id)?;
        let removed = self.records.remove(index);
        if !removed.is_read {
            self.unread_count = self.unread_count.saturating_sub(1);
        }
        Some(removed)
    }

    /// Mark one record read. No-op (returns false) if absent or already read.
    pub fn mark_read(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        let Some(record) = self.records.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        if record.is_read {
            return false;
        }
        record.is_read = true;
        record.read_at = Some(now);
        self.unread_count = self.unread_count.saturating_sub(1);
        true
    }

    /// Mark every unread record read and zero the count. Returns how many changed.
    pub fn mark_all_read(&mut self, now: DateTime<Utc>) -> usize {
        let mut changed = 0;
        for record in self.records.iter_mut().filter(|r| !r.is_read) {
            record.is_read = true;
            record.read_at = Some(now);
            changed += 1;
        }
        self.unread_count = 0;
        changed
    }

    /// Authoritative overwrite of the unread count.
    pub fn set_unread_count(&mut self, count: u64) {
        self.write_count(count);
    }

    /// Upsert a record and apply the count from the same combined fetch.
    pub fn apply_fetched(&mut self, record: NotificationRecord, unread_count: u64) -> UpsertOutcome {
        let outcome = self.upsert(record);
        self.write_count(unread_count);
        outcome
    }

    /// Snapshot the read state of every record plus the unread count.
    pub fn read_state_patch(&self) -> ReadStatePatch {
        ReadStatePatch {
            entries: self
                .records
                .iter()
                .map(|r| ReadStateEntry {
                    id: r.id.clone(),
                    is_read: r.is_read,
                    read_at: r.read_at,
                })
                .collect(),
            unread_count: self.unread_count,
            count_epoch: self.count_epoch,
        }
    }

    /// Undo a `mark_all_read(marked_at)` using the patch taken just before it.
    ///
    /// Only records still in the state the mark left them in (read, stamped
    /// `marked_at`) flip back to unread; anything rewritten or removed since is
    /// left alone. The patch's count is restored, less the records that could
    /// not be restored, unless an authoritative count was written after the
    /// snapshot, in which case that count stands. Returns how many records
    /// were restored.
    pub fn apply_patch(&mut self, patch: &ReadStatePatch, marked_at: DateTime<Utc>) -> usize {
        let mut restored = 0;
        let mut lost = 0u64;
        for entry in patch.entries.iter().filter(|e| !e.is_read) {
            match self.records.iter_mut().find(|r| r.id == entry.id) {
                Some(record) if record.is_read && record.read_at == Some(marked_at) => {
                    record.is_read = false;
                    record.read_at = entry.read_at;
                    restored += 1;
                }
                _ => lost += 1,
            }
        }
        if self.count_epoch == patch.count_epoch {
            self.unread_count = patch.unread_count.saturating_sub(lost);
        } else {
            debug!(
                unread_count = self.unread_count,
                "Authoritative count landed since snapshot, keeping it"
            );
        }
        restored
    }

    /// Replace everything from an authoritative list fetch.
    ///
    /// Only the compensating refresh uses this; it is how a failed optimistic
    /// mutation converges back to remote truth.
    pub fn resync(
        &mut self,
        records: Vec<NotificationRecord>,
        unread_count: u64,
        page_cursor: Option<Pagination>,
    ) {
        self.records = newest_first_unique(records, self.capacity);
        self.write_count(unread_count);
        self.page_cursor = page_cursor;
    }

    /// Drop all session state (logout / teardown).
    pub fn clear(&mut self) {
        self.records.clear();
        self.write_count(0);
        self.filter = ReadFilter::All;
        self.category_filter = None;
        self.priority_filter = None;
        self.page_cursor = None;
        self.panel_open = false;
    }

    pub fn set_filter(&mut self, filter: ReadFilter) {
        self.filter = filter;
    }

    pub fn set_category_filter(&mut self, category: Option<DisplayCategory>) {
        self.category_filter = category;
    }

    pub fn set_priority_filter(&mut self, priority: Option<Priority>) {
        self.priority_filter = priority;
    }

    pub fn set_panel_open(&mut self, open: bool) {
        self.panel_open = open;
    }

    /// Flip the panel state and return the new value.
    pub fn toggle_panel(&mut self) -> bool {
        self.panel_open = !self.panel_open;
        self.panel_open
    }

    fn write_count(&mut self, count: u64) {
        self.unread_count = count;
        self.count_epoch += 1;
    }

    // ─── Selectors ─────────────────────────────────────────────────────────

    /// Records passing the read, category and priority filters, newest first.
    pub fn filtered(&self) -> Vec<NotificationRecord> {
        self.records
            .iter()
            .filter(|r| self.filter.matches(r))
            .filter(|r| {
                self.category_filter
                    .map_or(true, |category| r.display_category() == category)
            })
            .filter(|r| self.priority_filter.map_or(true, |p| r.priority == p))
            .cloned()
            .collect()
    }

    pub fn records(&self) -> &[NotificationRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&NotificationRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn unread_count(&self) -> u64 {
        self.unread_count
    }

    pub fn filter(&self) -> ReadFilter {
        self.filter
    }

    pub fn category_filter(&self) -> Option<DisplayCategory> {
        self.category_filter
    }

    pub fn priority_filter(&self) -> Option<Priority> {
        self.priority_filter
    }

    pub fn page_cursor(&self) -> Option<Pagination> {
        self.page_cursor
    }

    pub fn panel_open(&self) -> bool {
        self.panel_open
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of cached records per display category.
    pub fn counts_by_category(&self) -> BTreeMap<DisplayCategory, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.display_category()).or_insert(0) += 1;
        }
        counts
    }
}

/// Order newest first, keep the first occurrence of each id, bound to capacity.
fn newest_first_unique(
    mut records: Vec<NotificationRecord>,
    capacity: usize,
) -> Vec<NotificationRecord> {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let mut seen = HashSet::new();
    records.retain(|r| seen.insert(r.id.clone()));
    records.truncate(capacity);
    records
}

// =============================================================================
// SHARED HANDLE
// =============================================================================

/// Shared, single-owner handle over a [`LocalStore`].
///
/// Cloning the handle shares the same state. Every mutation publishes a new
/// revision on the change feed so the rendering layer knows to re-read.
#[derive(Clone)]
pub struct NotificationStore {
    inner: Arc<RwLock<LocalStore>>,
    changes: Arc<watch::Sender<u64>>,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new(crate::defaults::STORE_CAPACITY)
    }
}

impl NotificationStore {
    pub fn new(capacity: usize) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(LocalStore::new(capacity))),
            changes: Arc::new(changes),
        }
    }

    /// Receiver that observes a new revision after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Current revision number.
    pub fn revision(&self) -> u64 {
        *self.changes.borrow()
    }

    async fn mutate<T>(&self, op: impl FnOnce(&mut LocalStore) -> T) -> T {
        let result = {
            let mut store = self.inner.write().await;
            op(&mut *store)
        };
        self.changes.send_modify(|revision| *revision += 1);
        result
    }

    async fn read<T>(&self, op: impl FnOnce(&LocalStore) -> T) -> T {
        let store = self.inner.read().await;
        op(&*store)
    }

    // ─── Mutations ─────────────────────────────────────────────────────────

    pub async fn initialize(
        &self,
        records: Vec<NotificationRecord>,
        unread_count: u64,
        page_cursor: Option<Pagination>,
    ) -> bool {
        self.mutate(|s| s.initialize(records, unread_count, page_cursor))
            .await
    }

    pub async fn upsert(&self, record: NotificationRecord) -> UpsertOutcome {
        self.mutate(|s| s.upsert(record)).await
    }

    pub async fn apply_fetched(&self, record: NotificationRecord, unread_count: u64) -> UpsertOutcome {
        self.mutate(|s| s.apply_fetched(record, unread_count)).await
    }

    pub async fn remove(&self, id: &str) -> Option<NotificationRecord> {
        self.mutate(|s| s.remove(id)).await
    }

    pub async fn mark_read(&self, id: &str, now: DateTime<Utc>) -> bool {
        self.mutate(|s| s.mark_read(id, now)).await
    }

    pub async fn mark_all_read(&self, now: DateTime<Utc>) -> usize {
        self.mutate(|s| s.mark_all_read(now)).await
    }

    pub async fn set_unread_count(&self, count: u64) {
        self.mutate(|s| s.set_unread_count(count)).await
    }

    pub async fn read_state_patch(&self) -> ReadStatePatch {
        self.read(|s| s.read_state_patch()).await
    }

    pub async fn apply_patch(&self, patch: &ReadStatePatch, marked_at: DateTime<Utc>) -> usize {
        self.mutate(|s| s.apply_patch(patch, marked_at)).await
    }

    pub async fn resync(
        &self,
        records: Vec<NotificationRecord>,
        unread_count: u64,
        page_cursor: Option<Pagination>,
    ) {
        self.mutate(|s| s.resync(records, unread_count, page_cursor))
            .await
    }

    pub async fn clear(&self) {
        self.mutate(|s| s.clear()).await
    }

    pub async fn set_filter(&self, filter: ReadFilter) {
        self.mutate(|s| s.set_filter(filter)).await
    }

    pub async fn set_category_filter(&self, category: Option<DisplayCategory>) {
        self.mutate(|s| s.set_category_filter(category)).await
    }

    pub async fn set_priority_filter(&self, priority: Option<Priority>) {
        self.mutate(|s| s.set_priority_filter(priority)).await
    }

    pub async fn set_panel_open(&self, open: bool) {
        self.mutate(|s| s.set_panel_open(open)).await
    }

    pub async fn toggle_panel(&self) -> bool {
        self.mutate(|s| s.toggle_panel()).await
    }

    // ─── Selectors ─────────────────────────────────────────────────────────

    pub async fn filtered(&self) -> Vec<NotificationRecord> {
        self.read(|s| s.filtered()).await
    }

    pub async fn records(&self) -> Vec<NotificationRecord> {
        self.read(|s| s.records().to_vec()).await
    }

    pub async fn get(&self, id: &str) -> Option<NotificationRecord> {
        self.read(|s| s.get(id).cloned()).await
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.read(|s| s.get(id).is_some()).await
    }

    pub async fn len(&self) -> usize {
        self.read(|s| s.len()).await
    }

    pub async fn is_empty(&self) -> bool {
        self.read(|s| s.is_empty()).await
    }

    pub async fn unread_count(&self) -> u64 {
        self.read(|s| s.unread_count()).await
    }

    pub async fn panel_open(&self) -> bool {
        self.read(|s| s.panel_open()).await
    }

    pub async fn page_cursor(&self) -> Option<Pagination> {
        self.read(|s| s.page_cursor()).await
    }

    pub async fn counts_by_category(&self) -> BTreeMap<DisplayCategory, usize> {
        self.read(|s| s.counts_by_category()).await
    }

    /// Point-in-time copy of the whole state.
    pub async fn snapshot(&self) -> LocalStore {
        self.read(|s| s.clone()).await
    }
}
