//! Client Configuration
//!
//! JSON configuration loaded once at process start and carried inside the
//! [`BackendClient`](crate::backend::BackendClient) context.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::Severity;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Unread-messages counter settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadConfig {
    /// Table holding messages (default: "messages")
    #[serde(default = "default_unread_table")]
    pub table: String,

    /// Tenant column (default: "school_id")
    #[serde(default = "default_scope_column")]
    pub scope_column: String,

    /// Column naming the receiving user (default: "recipient_id")
    #[serde(default = "default_recipient_column")]
    pub recipient_column: String,

    /// Boolean read flag (default: "is_read")
    #[serde(default = "default_read_column")]
    pub read_column: String,
}

/// Tables consulted for permission lookups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Role assignments per school (default: "user_roles")
    #[serde(default = "default_roles_table")]
    pub roles_table: String,

    /// Administrator grants (default: "admins")
    #[serde(default = "default_admins_table")]
    pub admins_table: String,

    /// Profiles linked to auth users (default: "profiles")
    #[serde(default = "default_profiles_table")]
    pub profiles_table: String,
}

/// Top-level client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Primary application schema (default: "public")
    #[serde(default = "default_schema")]
    pub default_schema: String,

    /// Websocket endpoint of the change feed
    #[serde(default)]
    pub realtime_url: Option<String>,

    /// Bearer token presented to the change feed
    #[serde(default)]
    pub access_token: Option<String>,

    /// Minimum log severity (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How long the replay command waits for a counter to settle
    #[serde(default = "default_settle_timeout_ms")]
    pub settle_timeout_ms: u64,

    #[serde(default)]
    pub unread: UnreadConfig,

    #[serde(default)]
    pub access: AccessConfig,
}

fn default_schema() -> String {
    "public".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_settle_timeout_ms() -> u64 {
    500
}
fn default_unread_table() -> String {
    "messages".to_string()
}
fn default_scope_column() -> String {
    "school_id".to_string()
}
fn default_recipient_column() -> String {
    "recipient_id".to_string()
}
fn default_read_column() -> String {
    "is_read".to_string()
}
fn default_roles_table() -> String {
    "user_roles".to_string()
}
fn default_admins_table() -> String {
    "admins".to_string()
}
fn default_profiles_table() -> String {
    "profiles".to_string()
}

impl Default for UnreadConfig {
    fn default() -> Self {
        Self {
            table: default_unread_table(),
            scope_column: default_scope_column(),
            recipient_column: default_recipient_column(),
            read_column: default_read_column(),
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            roles_table: default_roles_table(),
            admins_table: default_admins_table(),
            profiles_table: default_profiles_table(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_schema: default_schema(),
            realtime_url: None,
            access_token: None,
            log_level: default_log_level(),
            settle_timeout_ms: default_settle_timeout_ms(),
            unread: UnreadConfig::default(),
            access: AccessConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration JSON
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let names = [
            ("default_schema", &self.default_schema),
            ("unread.table", &self.unread.table),
            ("unread.scope_column", &self.unread.scope_column),
            ("unread.recipient_column", &self.unread.recipient_column),
            ("unread.read_column", &self.unread.read_column),
            ("access.roles_table", &self.access.roles_table),
            ("access.admins_table", &self.access.admins_table),
            ("access.profiles_table", &self.access.profiles_table),
        ];
        for (key, value) in names {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", key)));
            }
        }

        self.severity()?;

        if let Some(url) = &self.realtime_url {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(ConfigError::Invalid(format!(
                    "realtime_url must be a ws:// or wss:// URL, got '{}'",
                    url
                )));
            }
        }

        Ok(())
    }

    /// Parsed `log_level`
    pub fn severity(&self) -> Result<Severity, ConfigError> {
        self.log_level.parse().map_err(ConfigError::Invalid)
    }
}
