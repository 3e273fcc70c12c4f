//! REST binding of the [`RemoteSource`] trait.
//!
//! | Operation | Request | Response body |
//! |-----------|---------|---------------|
//! | `fetch_list` | `GET /notifications?page&limit[&filter][&category][&priority]` | `{notifications, unreadCount, pagination}` |
//! | `fetch_one` | `GET /notifications/{id}` | `{notification, unreadCount}` |
//! | `fetch_unread_count` | `GET /notifications/unread-count` | `{count}` |
//! | `poll` | `GET /notifications/poll?lastCheck=<rfc3339>` | `{notifications, serverTimestamp, unreadCount?}` |
//! | `mark_read` | `PATCH /notifications/{id}/read` | ignored |
//! | `mark_all_read` | `PATCH /notifications/read-all` | ignored |
//! | `delete` | `DELETE /notifications/{id}` | ignored |
//! | `create` | `POST /notifications` | `{notification}` |

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use notisync_core::{
    Error, FetchedNotification, ListQuery, NewNotification, NotificationPage, NotificationRecord,
    Pagination, PollResponse, RemoteSource, Result,
};

use crate::config::ClientConfig;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListBody {
    #[serde(default)]
    notifications: Vec<NotificationRecord>,
    unread_count: u64,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OneBody {
    notification: NotificationRecord,
    unread_count: u64,
}

#[derive(Deserialize)]
struct CountBody {
    count: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PollBody {
    #[serde(default)]
    notifications: Vec<NotificationRecord>,
    server_timestamp: DateTime<Utc>,
    #[serde(default)]
    unread_count: Option<u64>,
}

#[derive(Deserialize)]
struct CreatedBody {
    notification: NotificationRecord,
}

/// HTTP client for the notification service.
#[derive(Clone)]
pub struct HttpRemoteSource {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpRemoteSource {
    /// Create a remote source from a validated config.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        debug!(api_url = %config.api_url, "Initializing HTTP remote source");

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_token: config.api_token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn record_url(&self, id: &str, suffix: &str) -> String {
        format!(
            "{}/notifications/{}{}",
            self.base_url,
            urlencoding::encode(id),
            suffix
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send, check status, and decode a JSON body.
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = self.send(request, what).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Send and check status, discarding the body.
    async fn send_unit(&self, request: RequestBuilder, what: &str) -> Result<()> {
        self.send(request, what).await.map(|_| ())
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let start = Instant::now();
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| Error::Request(format!("{what}: {e}")))?;
        let status = response.status();
        debug!(
            op = what,
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Remote call finished"
        );

        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(op = what, status = status.as_u16(), "Remote call rejected");
            return Err(Error::Request(format!(
                "{what} failed: HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }
        Ok(response)
    }
}

/// Query pairs for a list fetch; filters are only sent when narrowing.
fn list_params(query: &ListQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("page", query.page.to_string()),
        ("limit", query.limit.to_string()),
    ];
    if query.filter != notisync_core::ReadFilter::All {
        params.push(("filter", query.filter.as_str().to_string()));
    }
    if let Some(category) = query.category {
        params.push(("category", category.as_str().to_string()));
    }
    if let Some(priority) = query.priority {
        params.push(("priority", priority.as_str().to_string()));
    }
    params
}

#[async_trait]
impl RemoteSource for HttpRemoteSource {
    #[instrument(skip(self), fields(page = query.page, limit = query.limit))]
    async fn fetch_list(&self, query: &ListQuery) -> Result<NotificationPage> {
        let request = self
            .client
            .get(self.url("/notifications"))
            .query(&list_params(query));
        let body: ListBody = self.send_json(request, "fetch_list").await?;

        let pagination = body.pagination.unwrap_or(Pagination {
            page: query.page,
            limit: query.limit,
            total: body.notifications.len() as u64,
            has_more: false,
        });
        Ok(NotificationPage {
            records: body.notifications,
            unread_count: body.unread_count,
            pagination,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_one(&self, id: &str) -> Result<FetchedNotification> {
        let request = self.client.get(self.record_url(id, ""));
        let body: OneBody = self.send_json(request, "fetch_one").await?;
        Ok(FetchedNotification {
            record: body.notification,
            unread_count: body.unread_count,
        })
    }

    async fn fetch_unread_count(&self) -> Result<u64> {
        let request = self.client.get(self.url("/notifications/unread-count"));
        let body: CountBody = self.send_json(request, "fetch_unread_count").await?;
        Ok(body.count)
    }

    #[instrument(skip(self))]
    async fn poll(&self, last_check: DateTime<Utc>) -> Result<PollResponse> {
        let since = last_check.to_rfc3339_opts(SecondsFormat::Millis, true);
        let request = self
            .client
            .get(self.url("/notifications/poll"))
            .query(&[("lastCheck", since)]);
        let body: PollBody = self.send_json(request, "poll").await?;
        Ok(PollResponse {
            records: body.notifications,
            server_timestamp: body.server_timestamp,
            unread_count: body.unread_count,
        })
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        let request = self.client.patch(self.record_url(id, "/read"));
        self.send_unit(request, "mark_read").await
    }

    async fn mark_all_read(&self) -> Result<()> {
        let request = self.client.patch(self.url("/notifications/read-all"));
        self.send_unit(request, "mark_all_read").await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let request = self.client.delete(self.record_url(id, ""));
        self.send_unit(request, "delete").await
    }

    async fn create(&self, payload: &NewNotification) -> Result<NotificationRecord> {
        let request = self.client.post(self.url("/notifications")).json(payload);
        let body: CreatedBody = self.send_json(request, "create").await?;
        Ok(body.notification)
    }
}
