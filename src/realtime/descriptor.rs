//! # Subscription Descriptor
//!
//! Identifies exactly one change-feed registration.

use serde::{Deserialize, Serialize};

use super::errors::{RealtimeError, RealtimeResult};
use crate::backend::{EventFilter, FeedRequest, FilterExpr};

/// Schema used when the caller does not name one
pub const PRIMARY_SCHEMA: &str = "public";

/// What to listen to, and whether to listen at all
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDescriptor {
    /// Unique per logical subscription
    pub channel_name: String,

    #[serde(default = "default_schema")]
    pub schema_name: String,

    pub table_name: String,

    /// Backend filter syntax, e.g. `recipient_id=eq.<uuid>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_filter: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_schema() -> String {
    PRIMARY_SCHEMA.to_string()
}

fn default_enabled() -> bool {
    true
}

impl SubscriptionDescriptor {
    /// Enabled descriptor on the primary schema
    pub fn new(channel_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            channel_name: channel_name.into(),
            schema_name: default_schema(),
            table_name: table_name.into(),
            row_filter: None,
            enabled: true,
        }
    }

    pub fn in_schema(mut self, schema_name: impl Into<String>) -> Self {
        self.schema_name = schema_name.into();
        self
    }

    pub fn with_filter(mut self, row_filter: impl Into<String>) -> Self {
        self.row_filter = Some(row_filter.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Validate and translate into a feed registration request
    pub fn to_request(&self) -> RealtimeResult<FeedRequest> {
        if self.channel_name.trim().is_empty() {
            return Err(RealtimeError::EmptyChannel);
        }
        if self.table_name.trim().is_empty() {
            return Err(RealtimeError::EmptyTable);
        }

        let filter = match &self.row_filter {
            Some(expr) => Some(FilterExpr::parse(expr)?),
            None => None,
        };

        let schema = if self.schema_name.trim().is_empty() {
            default_schema()
        } else {
            self.schema_name.clone()
        };

        Ok(FeedRequest {
            channel: self.channel_name.clone(),
            event: EventFilter::All,
            schema,
            table: self.table_name.clone(),
            filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let descriptor = SubscriptionDescriptor::new("unread-s1", "messages");
        assert_eq!(descriptor.schema_name, "public");
        assert!(descriptor.enabled);
        assert!(descriptor.row_filter.is_none());
    }

    #[test]
    fn test_to_request() {
        let request = SubscriptionDescriptor::new("unread-s1", "messages")
            .in_schema("school")
            .with_filter("recipient_id=eq.u1")
            .to_request()
            .unwrap();

        assert_eq!(request.channel, "unread-s1");
        assert_eq!(request.event, EventFilter::All);
        assert_eq!(request.topic(), "realtime:school:messages");
        assert_eq!(request.filter.unwrap().to_string(), "recipient_id=eq.u1");
    }

    #[test]
    fn test_validation() {
        assert_eq!(
            SubscriptionDescriptor::new("", "messages").to_request(),
            Err(RealtimeError::EmptyChannel)
        );
        assert_eq!(
            SubscriptionDescriptor::new("c", " ").to_request(),
            Err(RealtimeError::EmptyTable)
        );
        assert!(matches!(
            SubscriptionDescriptor::new("c", "messages")
                .with_filter("recipient_id")
                .to_request(),
            Err(RealtimeError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_deserialize_defaults() {
        let descriptor: SubscriptionDescriptor =
            serde_json::from_str(r#"{"channel_name": "c", "table_name": "notices"}"#).unwrap();
        assert_eq!(descriptor.schema_name, "public");
        assert!(descriptor.enabled);
    }
}
