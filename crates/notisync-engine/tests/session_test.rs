//! End-to-end session tests: HTTP remote source against a mock server, with
//! the in-process signal channel standing in for the push transport.

use std::sync::Arc;
use std::time::Duration;

use notisync_client::{ClientConfig, HttpRemoteSource};
use notisync_core::{BroadcastSignalChannel, Connectivity, Recovery, Signal, SignalAction, SyncEvent};
use notisync_engine::{MutationOutcome, SyncConfig, SyncSession};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

macro_rules! eventually {
    ($cond:expr) => {{
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !$cond {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not met within 5s: {}",
                stringify!($cond)
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }};
}

fn record_json(id: &str, created_at: &str, is_read: bool) -> serde_json::Value {
    json!({
        "id": id,
        "title": format!("Title {id}"),
        "message": "body",
        "type": "task",
        "priority": "medium",
        "isRead": is_read,
        "readAt": if is_read { Some("2026-10-19T07:00:00Z") } else { None },
        "createdAt": created_at
    })
}

async fn mount_list(server: &MockServer, records: Vec<serde_json::Value>, unread: u64) {
    Mock::given(method("GET"))
        .and(path("/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "notifications": records,
            "unreadCount": unread,
            "pagination": {"page": 1, "limit": 20, "total": 2, "hasMore": false}
        })))
        .mount(server)
        .await;
}

fn start_session(server: &MockServer, channel: &Arc<BroadcastSignalChannel>) -> SyncSession {
    let remote = HttpRemoteSource::new(ClientConfig::default().with_api_url(server.uri()))
        .expect("Failed to create remote source");
    let config = SyncConfig::for_subscriber("user-1")
        .with_poll_interval(50)
        .with_reconnect_backoff(10, 50);
    SyncSession::start(config, Arc::new(remote), channel.clone()).expect("Failed to start session")
}

#[tokio::test]
async fn test_new_signal_resolves_through_http() {
    let server = MockServer::start().await;
    mount_list(&server, vec![], 0).await;
    Mock::given(method("GET"))
        .and(path("/notifications/n1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "notification": record_json("n1", "2026-10-19T08:00:00Z", false),
            "unreadCount": 5
        })))
        .expect(1)
        .mount(&server)
        .await;

    let channel = Arc::new(BroadcastSignalChannel::default());
    let session = start_session(&server, &channel);
    let mut events = session.events();
    eventually!(session.connectivity() == Connectivity::Live);

    // delivered twice, resolved once
    for _ in 0..2 {
        channel
            .publish("user-1", Signal::new("n1", SignalAction::New, "2026-10-19T08:00:00.000Z"))
            .await;
    }

    eventually!(session.store().contains("n1").await);
    assert_eq!(session.filtered().await[0].id, "n1");
    assert_eq!(session.unread_count().await, 5);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut cues = 0;
    while let Ok(envelope) = events.try_recv() {
        if matches!(envelope.payload, SyncEvent::NewNotification { .. }) {
            cues += 1;
        }
    }
    assert_eq!(cues, 1);

    session.shutdown().await;
}

#[tokio::test]
async fn test_update_signal_for_deleted_record_removes_it() {
    let server = MockServer::start().await;
    mount_list(
        &server,
        vec![record_json("n1", "2026-10-19T08:00:00Z", false)],
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/notifications/n1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let channel = Arc::new(BroadcastSignalChannel::default());
    let session = start_session(&server, &channel);
    eventually!(session.store().len().await == 1);
    eventually!(session.connectivity() == Connectivity::Live);

    channel
        .publish("user-1", Signal::new("n1", SignalAction::Update, "t2"))
        .await;

    eventually!(session.store().is_empty().await);
    assert_eq!(session.unread_count().await, 0);

    session.shutdown().await;
}

#[tokio::test]
async fn test_mark_all_read_rejected_rolls_back() {
    let server = MockServer::start().await;
    mount_list(
        &server,
        vec![
            record_json("a", "2026-10-19T09:00:00Z", false),
            record_json("b", "2026-10-19T08:00:00Z", true),
        ],
        1,
    )
    .await;
    Mock::given(method("PATCH"))
        .and(path("/notifications/read-all"))
        .respond_with(ResponseTemplate::new(500).set_body_string("db down"))
        .expect(1)
        .mount(&server)
        .await;

    let channel = Arc::new(BroadcastSignalChannel::default());
    let session = start_session(&server, &channel);
    eventually!(session.store().len().await == 2);
    let before = session.store().records().await;
    let mut events = session.events();

    assert_eq!(session.mark_all_as_read().await, MutationOutcome::RolledBack);

    assert_eq!(session.store().records().await, before);
    assert_eq!(session.unread_count().await, 1);

    let mut recovery = None;
    while let Ok(envelope) = events.try_recv() {
        if let SyncEvent::MutationFailed { recovery: r, .. } = envelope.payload {
            recovery = Some(r);
        }
    }
    assert_eq!(recovery, Some(Recovery::Rollback));

    session.shutdown().await;
}

#[tokio::test]
async fn test_mark_read_rejected_refreshes_from_server() {
    let server = MockServer::start().await;
    mount_list(
        &server,
        vec![record_json("a", "2026-10-19T09:00:00Z", false)],
        1,
    )
    .await;
    Mock::given(method("PATCH"))
        .and(path("/notifications/a/read"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let channel = Arc::new(BroadcastSignalChannel::default());
    let session = start_session(&server, &channel);
    eventually!(session.store().len().await == 1);

    assert_eq!(session.mark_as_read("a").await, MutationOutcome::Resynced);
    assert!(!session.store().get("a").await.unwrap().is_read);
    assert_eq!(session.unread_count().await, 1);

    session.shutdown().await;
}

#[tokio::test]
async fn test_degraded_session_polls_with_server_cursor() {
    let server = MockServer::start().await;
    mount_list(&server, vec![], 0).await;
    Mock::given(method("GET"))
        .and(path("/notifications/poll"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "notifications": [record_json("p1", "2026-10-19T08:30:00Z", false)],
            "serverTimestamp": "2026-10-19T08:31:00.000Z",
            "unreadCount": 1
        })))
        .mount(&server)
        .await;

    let channel = Arc::new(BroadcastSignalChannel::default());
    channel.set_available(false);
    let session = start_session(&server, &channel);

    eventually!(session.connectivity() == Connectivity::Degraded);
    eventually!(session.store().contains("p1").await);
    assert_eq!(session.unread_count().await, 1);

    // repeated polls return the same record; it is never duplicated
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(session.store().len().await, 1);

    let requests = server.received_requests().await.unwrap_or_default();
    let cursors: Vec<String> = requests
        .iter()
        .filter(|r| r.url.path() == "/notifications/poll")
        .filter_map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "lastCheck")
                .map(|(_, v)| v.into_owned())
        })
        .collect();
    assert!(cursors.len() >= 2);
    // after the first poll, the cursor is the server's timestamp
    assert!(cursors[1..]
        .iter()
        .all(|c| c == "2026-10-19T08:31:00.000Z"));

    session.shutdown().await;
}
