//! # Change Feed
//!
//! The backend's realtime change-notification service: registrations,
//! the events they deliver, and the trait a transport implements.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use super::errors::BackendResult;
use super::filter::FilterExpr;

/// Type of row change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    /// New row inserted
    Insert,
    /// Existing row updated
    Update,
    /// Row deleted
    Delete,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Insert => write!(f, "INSERT"),
            EventType::Update => write!(f, "UPDATE"),
            EventType::Delete => write!(f, "DELETE"),
        }
    }
}

/// A row change delivered by the feed.
///
/// Consumers in this crate treat it as an opaque trigger; the fields are
/// carried for callers that want to inspect them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Backend-assigned, monotonically increasing
    pub sequence: u64,

    pub event_type: EventType,

    #[serde(default = "default_schema")]
    pub schema: String,

    pub table: String,

    /// Row after the change (INSERT/UPDATE)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,

    /// Row before the change (UPDATE/DELETE)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_record: Option<Value>,

    pub commit_timestamp: DateTime<Utc>,
}

fn default_schema() -> String {
    "public".to_string()
}

impl ChangeEvent {
    /// Create a change event stamped now
    pub fn new(
        sequence: u64,
        event_type: EventType,
        schema: impl Into<String>,
        table: impl Into<String>,
        record: Option<Value>,
        old_record: Option<Value>,
    ) -> Self {
        Self {
            sequence,
            event_type,
            schema: schema.into(),
            table: table.into(),
            record,
            old_record,
            commit_timestamp: Utc::now(),
        }
    }

    /// Topic string for this event
    pub fn topic(&self) -> String {
        format!("realtime:{}:{}", self.schema, self.table)
    }

    /// The row image filters are evaluated against
    pub fn row(&self) -> Option<&Value> {
        self.record.as_ref().or(self.old_record.as_ref())
    }
}

/// Which row changes a registration wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventFilter {
    /// Every change (`*`)
    #[serde(rename = "*")]
    All,
    #[serde(rename = "INSERT")]
    Insert,
    #[serde(rename = "UPDATE")]
    Update,
    #[serde(rename = "DELETE")]
    Delete,
}

impl EventFilter {
    /// Whether an event type passes this filter
    pub fn accepts(&self, event_type: EventType) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Insert => event_type == EventType::Insert,
            EventFilter::Update => event_type == EventType::Update,
            EventFilter::Delete => event_type == EventType::Delete,
        }
    }
}

/// A registration request sent to the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedRequest {
    /// Caller-chosen channel name, unique per logical subscription
    pub channel: String,
    pub event: EventFilter,
    pub schema: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterExpr>,
}

impl FeedRequest {
    /// Topic string the registration listens on
    pub fn topic(&self) -> String {
        format!("realtime:{}:{}", self.schema, self.table)
    }

    /// Whether an event belongs to this registration
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.schema != self.schema || event.table != self.table {
            return false;
        }
        if !self.event.accepts(event.event_type) {
            return false;
        }
        match (&self.filter, event.row()) {
            (None, _) => true,
            (Some(filter), Some(row)) => filter.matches(row),
            (Some(_), None) => false,
        }
    }
}

/// Registration lifecycle reported by the feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    /// The backend acknowledged the registration
    Subscribed,
    /// The registration failed or was dropped by the backend
    Failed(String),
    /// The backend closed the registration
    Closed,
}

/// Message pushed into a registration's sink
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    Event(ChangeEvent),
    Status(FeedStatus),
}

/// Sink a feed delivers into. Delivery order is sink order.
pub type FeedSink = mpsc::UnboundedSender<FeedMessage>;

/// Receiving end of a [`FeedSink`]
pub type FeedStream = mpsc::UnboundedReceiver<FeedMessage>;

/// Handle to a live registration, owned by whoever subscribed
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct FeedHandle {
    id: u64,
    channel: String,
}

impl FeedHandle {
    pub fn new(id: u64, channel: impl Into<String>) -> Self {
        Self {
            id,
            channel: channel.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

/// Backend change-feed service
pub trait ChangeFeed: Send + Sync {
    /// Register for changes. Registration completes asynchronously; the
    /// feed reports the outcome as [`FeedMessage::Status`] on the sink.
    fn subscribe(&self, request: FeedRequest, sink: FeedSink) -> BackendResult<FeedHandle>;

    /// Drop a registration. Unknown handles are ignored.
    fn unsubscribe(&self, handle: &FeedHandle);
}
