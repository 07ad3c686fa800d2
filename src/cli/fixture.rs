//! Replay fixtures
//!
//! A fixture seeds the in-memory backend and lists the steps the `replay`
//! command drives an unread counter through:
//!
//! ```json
//! {
//!   "user": "6f1c...",
//!   "scope": "school-123",
//!   "policies": {"messages": {"type": "ownership", "owner_field": "recipient_id"}},
//!   "tables": {"messages": [{"id": "m1", "school_id": "school-123", ...}]},
//!   "steps": [
//!     {"op": "insert", "table": "messages", "row": {...}},
//!     {"op": "update", "table": "messages", "id": "m1", "patch": {"is_read": true}},
//!     {"op": "delete", "table": "messages", "id": "m1"},
//!     {"op": "scope", "scope": null},
//!     {"op": "refresh"}
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::errors::{CliError, CliResult};
use crate::backend::{BackendResult, MemoryBackend, RlsPolicy, UserIdentity};

/// One replay step
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FixtureStep {
    Insert {
        table: String,
        row: Value,
    },
    Update {
        table: String,
        id: String,
        patch: Value,
    },
    Delete {
        table: String,
        id: String,
    },
    /// Switch the counter's scope (`null` clears it)
    Scope {
        scope: Option<String>,
    },
    /// Force a recount
    Refresh,
}

impl FixtureStep {
    pub fn op(&self) -> &'static str {
        match self {
            FixtureStep::Insert { .. } => "insert",
            FixtureStep::Update { .. } => "update",
            FixtureStep::Delete { .. } => "delete",
            FixtureStep::Scope { .. } => "scope",
            FixtureStep::Refresh => "refresh",
        }
    }

    /// Whether the step is a row mutation (its effect arrives through the feed)
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            FixtureStep::Insert { .. } | FixtureStep::Update { .. } | FixtureStep::Delete { .. }
        )
    }

    /// Apply a row mutation to the backend. Non-mutations are ignored.
    pub fn apply(&self, backend: &MemoryBackend) -> BackendResult<()> {
        match self {
            FixtureStep::Insert { table, row } => backend.insert(table, row.clone()).map(|_| ()),
            FixtureStep::Update { table, id, patch } => {
                backend.update(table, id, patch.clone()).map(|_| ())
            }
            FixtureStep::Delete { table, id } => backend.delete(table, id).map(|_| ()),
            FixtureStep::Scope { .. } | FixtureStep::Refresh => Ok(()),
        }
    }
}

/// Parsed fixture file
#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    /// Signed-in user; absent means signed out
    #[serde(default)]
    pub user: Option<Uuid>,

    /// Scope set before the first step
    #[serde(default)]
    pub scope: Option<String>,

    #[serde(default)]
    pub policies: BTreeMap<String, RlsPolicy>,

    #[serde(default)]
    pub tables: BTreeMap<String, Vec<Value>>,

    #[serde(default)]
    pub steps: Vec<FixtureStep>,
}

impl Fixture {
    /// Load a fixture from a JSON file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::fixture_error(format!("Failed to read fixture {:?}: {}", path, e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> CliResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| CliError::fixture_error(format!("Invalid fixture JSON: {}", e)))
    }

    /// Build an in-memory backend holding the fixture's session, policies and rows
    pub fn backend(&self) -> CliResult<MemoryBackend> {
        let backend = MemoryBackend::new();
        if let Some(user) = self.user {
            backend.sign_in(UserIdentity::new(user));
        }
        for (table, policy) in &self.policies {
            backend.set_policy(table, policy.clone());
        }
        for (table, rows) in &self.tables {
            backend.create_table(table);
            backend.seed(table, rows.clone())?;
        }
        Ok(backend)
    }
}
