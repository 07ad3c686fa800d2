//! # Row-Level Security
//!
//! Per-row access control evaluated against the requesting identity.
//! Used by [`MemoryBackend`](super::memory::MemoryBackend) to behave like
//! the hosted database: queries and change events only ever expose rows
//! the caller may see.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Identity a request is evaluated under
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RlsContext {
    /// The authenticated user's ID (None if anonymous)
    pub user_id: Option<Uuid>,

    /// Service role bypasses every policy
    pub is_service_role: bool,
}

impl RlsContext {
    /// Context for an authenticated user
    pub fn authenticated(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            is_service_role: false,
        }
    }

    /// Context for anonymous access
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Context for the service role
    pub fn service_role() -> Self {
        Self {
            user_id: None,
            is_service_role: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some() || self.is_service_role
    }
}

/// RLS policy types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RlsPolicy {
    /// No RLS - every row visible
    None,

    /// Row visible only to the user named in `owner_field`
    Ownership { owner_field: String },

    /// Row visible to any authenticated user
    Authenticated,
}

impl RlsPolicy {
    /// Whether `row` is visible under `ctx`
    pub fn allows(&self, row: &Value, ctx: &RlsContext) -> bool {
        if ctx.is_service_role {
            return true;
        }

        match self {
            RlsPolicy::None => true,
            RlsPolicy::Authenticated => ctx.user_id.is_some(),
            RlsPolicy::Ownership { owner_field } => {
                let (Some(user_id), Some(owner)) = (
                    ctx.user_id,
                    row.get(owner_field).and_then(|v| v.as_str()),
                ) else {
                    return false;
                };
                owner == user_id.to_string()
            }
        }
    }
}

/// Policies per table; tables without a policy are open
#[derive(Debug, Clone, Default)]
pub struct RlsPolicies {
    policies: HashMap<String, RlsPolicy>,
}

impl RlsPolicies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, table: impl Into<String>, policy: RlsPolicy) {
        self.policies.insert(table.into(), policy);
    }

    pub fn allows(&self, table: &str, row: &Value, ctx: &RlsContext) -> bool {
        self.policies
            .get(table)
            .map_or(true, |policy| policy.allows(row, ctx))
    }
}
