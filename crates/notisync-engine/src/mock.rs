//! Mock remote source for deterministic testing.
//!
//! Holds an in-memory "server side" list of records and answers every
//! [`RemoteSource`] call from it. Failures can be injected per operation and
//! every call is logged for assertions.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use notisync_engine::mock::{MockOp, MockRemoteSource};
//!
//! let remote = MockRemoteSource::new().with_record(record);
//! remote.fail(MockOp::MarkRead);
//! assert_eq!(remote.call_count(MockOp::MarkRead), 0);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use notisync_core::{
    Error, FetchedNotification, ListQuery, NewNotification, NotificationPage, NotificationRecord,
    Pagination, PollResponse, RemoteSource, Result,
};

/// Remote operations, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    FetchList,
    FetchOne,
    FetchUnreadCount,
    Poll,
    MarkRead,
    MarkAllRead,
    Delete,
    Create,
}

/// How an injected failure surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Request,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub op: MockOp,
    pub arg: Option<String>,
}

#[derive(Default)]
struct MockState {
    records: Vec<NotificationRecord>,
    unread_override: Option<u64>,
    failures: HashMap<MockOp, MockFailure>,
    polls: VecDeque<PollResponse>,
    calls: Vec<MockCall>,
    next_id: u64,
    latency: Option<Duration>,
}

impl MockState {
    fn unread_count(&self) -> u64 {
        self.unread_override
            .unwrap_or_else(|| self.records.iter().filter(|r| !r.is_read).count() as u64)
    }
}

/// In-memory [`RemoteSource`] with failure injection.
#[derive(Clone, Default)]
pub struct MockRemoteSource {
    state: Arc<Mutex<MockState>>,
}

impl MockRemoteSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a server-side record.
    pub fn with_record(self, record: NotificationRecord) -> Self {
        self.put_record(record);
        self
    }

    /// Report a fixed unread count instead of deriving it from records.
    pub fn with_unread_count(self, count: u64) -> Self {
        self.state.lock().unwrap().unread_override = Some(count);
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.lock().unwrap().latency = Some(latency);
        self
    }

    /// Insert or replace a server-side record.
    pub fn put_record(&self, record: NotificationRecord) {
        let mut state = self.state.lock().unwrap();
        match state.records.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => *slot = record,
            None => state.records.push(record),
        }
    }

    pub fn remove_record(&self, id: &str) {
        self.state.lock().unwrap().records.retain(|r| r.id != id);
    }

    pub fn set_unread_count(&self, count: Option<u64>) {
        self.state.lock().unwrap().unread_override = count;
    }

    /// Queue the next poll response; polls with an empty queue return nothing.
    pub fn push_poll(&self, response: PollResponse) {
        self.state.lock().unwrap().polls.push_back(response);
    }

    /// Make `op` fail with a request error until [`recover`](Self::recover).
    pub fn fail(&self, op: MockOp) {
        self.fail_with(op, MockFailure::Request);
    }

    pub fn fail_with(&self, op: MockOp, failure: MockFailure) {
        self.state.lock().unwrap().failures.insert(op, failure);
    }

    pub fn recover(&self, op: MockOp) {
        self.state.lock().unwrap().failures.remove(&op);
    }

    /// Get all logged calls for assertion.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, op: MockOp) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.op == op)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn server_records(&self) -> Vec<NotificationRecord> {
        self.state.lock().unwrap().records.clone()
    }

    /// Log the call, apply latency, and surface any injected failure.
    async fn enter(&self, op: MockOp, arg: Option<&str>) -> Result<()> {
        let (latency, failure) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(MockCall {
                op,
                arg: arg.map(str::to_string),
            });
            (state.latency, state.failures.get(&op).copied())
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(MockFailure::Request) => Err(Error::Request(format!("injected failure: {op:?}"))),
            Some(MockFailure::NotFound) => Err(Error::NotFound(format!("{op:?}"))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteSource for MockRemoteSource {
    async fn fetch_list(&self, query: &ListQuery) -> Result<NotificationPage> {
        self.enter(MockOp::FetchList, None).await?;
        let state = self.state.lock().unwrap();

        let mut matching: Vec<NotificationRecord> = state
            .records
            .iter()
            .filter(|r| query.filter.matches(r))
            .filter(|r| query.category.map_or(true, |c| r.display_category() == c))
            .filter(|r| query.priority.map_or(true, |p| r.priority == p))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let skip = (query.page.saturating_sub(1) as usize) * query.limit as usize;
        let records: Vec<_> = matching
            .into_iter()
            .skip(skip)
            .take(query.limit as usize)
            .collect();
        let has_more = (skip + records.len()) < total as usize;

        Ok(NotificationPage {
            records,
            unread_count: state.unread_count(),
            pagination: Pagination {
                page: query.page,
                limit: query.limit,
                total,
                has_more,
            },
        })
    }

    async fn fetch_one(&self, id: &str) -> Result<FetchedNotification> {
        self.enter(MockOp::FetchOne, Some(id)).await?;
        let state = self.state.lock().unwrap();
        let record = state
            .records
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("notification {id}")))?;
        Ok(FetchedNotification {
            record,
            unread_count: state.unread_count(),
        })
    }

    async fn fetch_unread_count(&self) -> Result<u64> {
        self.enter(MockOp::FetchUnreadCount, None).await?;
        Ok(self.state.lock().unwrap().unread_count())
    }

    async fn poll(&self, last_check: DateTime<Utc>) -> Result<PollResponse> {
        self.enter(MockOp::Poll, Some(&last_check.to_rfc3339()))
            .await?;
        let queued = self.state.lock().unwrap().polls.pop_front();
        Ok(queued.unwrap_or(PollResponse {
            records: Vec::new(),
            server_timestamp: last_check,
            unread_count: None,
        }))
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        self.enter(MockOp::MarkRead, Some(id)).await?;
        let mut state = self.state.lock().unwrap();
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(format!("notification {id}")))?;
        if !record.is_read {
            record.is_read = true;
            record.read_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<()> {
        self.enter(MockOp::MarkAllRead, None).await?;
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();
        for record in state.records.iter_mut().filter(|r| !r.is_read) {
            record.is_read = true;
            record.read_at = Some(now);
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.enter(MockOp::Delete, Some(id)).await?;
        let mut state = self.state.lock().unwrap();
        let before = state.records.len();
        state.records.retain(|r| r.id != id);
        if state.records.len() == before {
            return Err(Error::NotFound(format!("notification {id}")));
        }
        Ok(())
    }

    async fn create(&self, payload: &NewNotification) -> Result<NotificationRecord> {
        self.enter(MockOp::Create, Some(&payload.title)).await?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let mut record = NotificationRecord::new(
            format!("created-{}", state.next_id),
            payload.title.clone(),
            payload.message.clone(),
            Utc::now(),
        )
        .with_type(payload.notification_type)
        .with_priority(payload.priority);
        record.category = payload.category.clone();
        record.action_url = payload.action_url.clone();
        record.action_type = payload.action_type.clone();
        state.records.push(record.clone());
        Ok(record)
    }
}
