//! Notification data model, signal notices, and remote transfer types.
//!
//! Records arrive from the remote source as camelCase JSON. The record id may
//! be carried by either `id` or `_id` (string or number); deserialization
//! normalizes both to [`NotificationRecord::id`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

// =============================================================================
// ENUMS
// =============================================================================

/// Source-level notification type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Task,
    Client,
    #[default]
    System,
    Reminder,
    Announcement,
    Assignment,
    Alert,
    Update,
    Document,
    Payment,
}

impl NotificationType {
    /// Collapse the source type into the smaller set the UI groups by.
    pub fn display_category(self) -> DisplayCategory {
        match self {
            NotificationType::Task | NotificationType::Assignment | NotificationType::Reminder => {
                DisplayCategory::Task
            }
            NotificationType::Client => DisplayCategory::Client,
            NotificationType::Document => DisplayCategory::Document,
            NotificationType::Payment => DisplayCategory::Billing,
            NotificationType::System
            | NotificationType::Announcement
            | NotificationType::Alert
            | NotificationType::Update => DisplayCategory::System,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::Task => "task",
            NotificationType::Client => "client",
            NotificationType::System => "system",
            NotificationType::Reminder => "reminder",
            NotificationType::Announcement => "announcement",
            NotificationType::Assignment => "assignment",
            NotificationType::Alert => "alert",
            NotificationType::Update => "update",
            NotificationType::Document => "document",
            NotificationType::Payment => "payment",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display grouping derived from [`NotificationType`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DisplayCategory {
    Task,
    Client,
    Document,
    Billing,
    System,
}

impl DisplayCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            DisplayCategory::Task => "task",
            DisplayCategory::Client => "client",
            DisplayCategory::Document => "document",
            DisplayCategory::Billing => "billing",
            DisplayCategory::System => "system",
        }
    }
}

impl FromStr for DisplayCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "task" => Ok(Self::Task),
            "client" => Ok(Self::Client),
            "document" => Ok(Self::Document),
            "billing" => Ok(Self::Billing),
            "system" => Ok(Self::System),
            other => Err(Error::InvalidInput(format!(
                "unknown display category: {other}"
            ))),
        }
    }
}

/// Notification priority, ordered from least to most pressing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(Error::InvalidInput(format!("unknown priority: {other}"))),
        }
    }
}

/// Read-state filter selected in the notification panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReadFilter {
    #[default]
    All,
    Unread,
    Read,
}

impl ReadFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            ReadFilter::All => "all",
            ReadFilter::Unread => "unread",
            ReadFilter::Read => "read",
        }
    }

    /// Whether a record passes this filter.
    pub fn matches(self, record: &NotificationRecord) -> bool {
        match self {
            ReadFilter::All => true,
            ReadFilter::Unread => !record.is_read,
            ReadFilter::Read => record.is_read,
        }
    }
}

impl FromStr for ReadFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" | "" => Ok(Self::All),
            "unread" => Ok(Self::Unread),
            "read" => Ok(Self::Read),
            other => Err(Error::InvalidInput(format!("unknown filter: {other}"))),
        }
    }
}

// =============================================================================
// NOTIFICATION RECORD
// =============================================================================

/// A single notification as held by the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawNotification")]
pub struct NotificationRecord {
    pub id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub priority: Priority,
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
}

impl NotificationRecord {
    /// Build an unread record with default type and priority.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            message: message.into(),
            notification_type: NotificationType::default(),
            priority: Priority::default(),
            is_read: false,
            read_at: None,
            created_at,
            category: None,
            action_url: None,
            action_type: None,
            sender_name: None,
        }
    }

    pub fn with_type(mut self, notification_type: NotificationType) -> Self {
        self.notification_type = notification_type;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Mark the record read at the given instant.
    pub fn with_read_at(mut self, read_at: DateTime<Utc>) -> Self {
        self.is_read = true;
        self.read_at = Some(read_at);
        self
    }

    pub fn display_category(&self) -> DisplayCategory {
        self.notification_type.display_category()
    }
}

/// Numeric or string id as sent by the remote source.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

/// Wire shape accepted before id normalization.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNotification {
    #[serde(default)]
    id: Option<RawId>,
    #[serde(default, rename = "_id")]
    alt_id: Option<RawId>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    notification_type: NotificationType,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    is_read: bool,
    #[serde(default)]
    read_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    action_url: Option<String>,
    #[serde(default)]
    action_type: Option<String>,
    #[serde(default)]
    sender_name: Option<String>,
}

impl TryFrom<RawNotification> for NotificationRecord {
    type Error = Error;

    fn try_from(raw: RawNotification) -> Result<Self, Self::Error> {
        let id = raw
            .id
            .or(raw.alt_id)
            .map(RawId::into_string)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| Error::Serialization("notification record has no id".to_string()))?;

        Ok(Self {
            id,
            title: raw.title,
            message: raw.message,
            notification_type: raw.notification_type,
            priority: raw.priority,
            is_read: raw.is_read,
            // readAt is only meaningful on read records
            read_at: if raw.is_read { raw.read_at } else { None },
            created_at: raw.created_at,
            category: raw.category,
            action_url: raw.action_url,
            action_type: raw.action_type,
            sender_name: raw.sender_name,
        })
    }
}

// =============================================================================
// SIGNALS
// =============================================================================

/// Change kind carried by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalAction {
    New,
    Read,
    Update,
    Delete,
}

impl SignalAction {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalAction::New => "new",
            SignalAction::Read => "read",
            SignalAction::Update => "update",
            SignalAction::Delete => "delete",
        }
    }
}

/// A pointer to a change: the reconciler must resolve the record itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub id: String,
    pub action: SignalAction,
    /// Opaque timestamp as sent by the channel (ISO string or epoch number).
    #[serde(deserialize_with = "timestamp_as_string")]
    pub timestamp: String,
}

impl Signal {
    pub fn new(id: impl Into<String>, action: SignalAction, timestamp: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action,
            timestamp: timestamp.into(),
        }
    }

    /// Key used to recognize redelivered signals.
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.id, self.timestamp)
    }
}

fn timestamp_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Text(s) => s,
        RawTimestamp::Integer(n) => n.to_string(),
        RawTimestamp::Float(f) => f.to_string(),
    })
}

// =============================================================================
// REMOTE TRANSFER TYPES
// =============================================================================

/// Pagination metadata reported by a list fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub has_more: bool,
}

/// Query for a list fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
    pub filter: ReadFilter,
    pub category: Option<DisplayCategory>,
    pub priority: Option<Priority>,
}

impl ListQuery {
    /// Unfiltered first page, used for initial loads and refreshes.
    pub fn first_page(limit: u32) -> Self {
        Self {
            page: 1,
            limit,
            filter: ReadFilter::All,
            category: None,
            priority: None,
        }
    }
}

/// Result of a list fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPage {
    pub records: Vec<NotificationRecord>,
    pub unread_count: u64,
    pub pagination: Pagination,
}

/// Result of the combined single-record fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedNotification {
    pub record: NotificationRecord,
    pub unread_count: u64,
}

/// Result of a poll since a cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct PollResponse {
    pub records: Vec<NotificationRecord>,
    /// Server clock at the time of the poll; becomes the next cursor.
    pub server_timestamp: DateTime<Utc>,
    pub unread_count: Option<u64>,
}

/// Payload for creating a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
}

impl NewNotification {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            recipient_id: None,
            title: title.into(),
            message: message.into(),
            notification_type: NotificationType::default(),
            priority: Priority::default(),
            category: None,
            action_url: None,
            action_type: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_accepts_id_field() {
        let record: NotificationRecord = serde_json::from_value(json!({
            "id": "n1",
            "title": "X",
            "message": "hello",
            "type": "task",
            "priority": "high",
            "isRead": false,
            "createdAt": "2026-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(record.id, "n1");
        assert_eq!(record.notification_type, NotificationType::Task);
        assert_eq!(record.priority, Priority::High);
        assert!(!record.is_read);
    }

    #[test]
    fn test_record_normalizes_alias_id() {
        let record: NotificationRecord = serde_json::from_value(json!({
            "_id": "64ab",
            "title": "X",
            "createdAt": "2026-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(record.id, "64ab");

        // Serialization only ever emits the normalized field
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], "64ab");
        assert!(value.get("_id").is_none());
    }

    #[test]
    fn test_record_prefers_id_over_alias() {
        let record: NotificationRecord = serde_json::from_value(json!({
            "id": "primary",
            "_id": "secondary",
            "createdAt": "2026-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(record.id, "primary");
    }

    #[test]
    fn test_record_numeric_id_is_stringified() {
        let record: NotificationRecord = serde_json::from_value(json!({
            "id": 42,
            "createdAt": "2026-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(record.id, "42");
    }

    #[test]
    fn test_record_without_id_is_rejected() {
        let result = serde_json::from_value::<NotificationRecord>(json!({
            "title": "orphan",
            "createdAt": "2026-01-01T00:00:00Z"
        }));
        assert!(result.is_err());

        let result = serde_json::from_value::<NotificationRecord>(json!({
            "id": "  ",
            "createdAt": "2026-01-01T00:00:00Z"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_record_defaults() {
        let record: NotificationRecord = serde_json::from_value(json!({
            "id": "n1",
            "createdAt": "2026-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(record.notification_type, NotificationType::System);
        assert_eq!(record.priority, Priority::Medium);
        assert_eq!(record.title, "");
        assert!(!record.is_read);
    }

    #[test]
    fn test_read_at_dropped_on_unread_record() {
        let record: NotificationRecord = serde_json::from_value(json!({
            "id": "n1",
            "isRead": false,
            "readAt": "2026-01-02T00:00:00Z",
            "createdAt": "2026-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(record.read_at.is_none());
    }

    #[test]
    fn test_metadata_passes_through() {
        let record: NotificationRecord = serde_json::from_value(json!({
            "id": "n1",
            "createdAt": "2026-01-01T00:00:00Z",
            "category": "onboarding",
            "actionUrl": "/clients/7",
            "actionType": "navigate",
            "senderName": "Dana"
        }))
        .unwrap();
        assert_eq!(record.category.as_deref(), Some("onboarding"));
        assert_eq!(record.action_url.as_deref(), Some("/clients/7"));
        assert_eq!(record.action_type.as_deref(), Some("navigate"));
        assert_eq!(record.sender_name.as_deref(), Some("Dana"));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["actionUrl"], "/clients/7");
        assert_eq!(value["type"], "system");
    }

    #[test]
    fn test_display_category_mapping() {
        use NotificationType::*;
        assert_eq!(Task.display_category(), DisplayCategory::Task);
        assert_eq!(Assignment.display_category(), DisplayCategory::Task);
        assert_eq!(Reminder.display_category(), DisplayCategory::Task);
        assert_eq!(Client.display_category(), DisplayCategory::Client);
        assert_eq!(Document.display_category(), DisplayCategory::Document);
        assert_eq!(Payment.display_category(), DisplayCategory::Billing);
        assert_eq!(System.display_category(), DisplayCategory::System);
        assert_eq!(Announcement.display_category(), DisplayCategory::System);
        assert_eq!(Alert.display_category(), DisplayCategory::System);
        assert_eq!(Update.display_category(), DisplayCategory::System);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::High < Priority::Urgent);
    }

    #[test]
    fn test_read_filter_from_str() {
        assert_eq!("unread".parse::<ReadFilter>().unwrap(), ReadFilter::Unread);
        assert_eq!("READ".parse::<ReadFilter>().unwrap(), ReadFilter::Read);
        assert_eq!("".parse::<ReadFilter>().unwrap(), ReadFilter::All);
        assert!("starred".parse::<ReadFilter>().is_err());
    }

    #[test]
    fn test_signal_parses_string_and_numeric_timestamps() {
        let signal: Signal = serde_json::from_value(json!({
            "id": "n1",
            "action": "new",
            "timestamp": "2026-01-01T00:00:00.000Z"
        }))
        .unwrap();
        assert_eq!(signal.action, SignalAction::New);
        assert_eq!(signal.dedup_key(), "n1:2026-01-01T00:00:00.000Z");

        let signal: Signal = serde_json::from_value(json!({
            "id": "n2",
            "action": "delete",
            "timestamp": 1767225600000i64
        }))
        .unwrap();
        assert_eq!(signal.dedup_key(), "n2:1767225600000");
    }

    #[test]
    fn test_signal_rejects_unknown_action() {
        let result = serde_json::from_value::<Signal>(json!({
            "id": "n1",
            "action": "archive",
            "timestamp": "t"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_new_notification_serializes_camel_case() {
        let mut payload = NewNotification::new("Invoice ready", "March invoice");
        payload.notification_type = NotificationType::Payment;
        payload.action_url = Some("/billing".to_string());

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], "payment");
        assert_eq!(value["actionUrl"], "/billing");
        assert!(value.get("recipientId").is_none());
    }
}
