//! What a live counter counts.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backend::{FilterExpr, TableQuery};
use crate::config::UnreadConfig;
use crate::realtime::SubscriptionDescriptor;

/// Count of rows in one table, per scope, addressed to the caller, that
/// satisfy every condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterSpec {
    /// Prefix of the realtime channel name
    pub name: String,
    pub schema: String,
    pub table: String,
    /// Tenant column compared against the scope
    pub scope_column: String,
    /// Column compared against the caller's id
    pub recipient_column: String,
    #[serde(default)]
    pub conditions: Vec<FilterExpr>,
}

impl CounterSpec {
    /// Unread messages: `read_column = false`
    pub fn unread(config: &UnreadConfig, schema: impl Into<String>) -> Self {
        Self {
            name: "unread".to_string(),
            schema: schema.into(),
            table: config.table.clone(),
            scope_column: config.scope_column.clone(),
            recipient_column: config.recipient_column.clone(),
            conditions: vec![FilterExpr::eq(config.read_column.clone(), false)],
        }
    }

    /// Add a condition
    pub fn with_condition(mut self, condition: FilterExpr) -> Self {
        self.conditions.push(condition);
        self
    }

    /// One channel per scope and user
    pub fn channel_name(&self, scope: &str, user_id: Uuid) -> String {
        format!("{}-{}-{}", self.name, scope, user_id)
    }

    /// Registration for changes to the caller's rows
    pub fn descriptor(&self, scope: &str, user_id: Uuid) -> SubscriptionDescriptor {
        SubscriptionDescriptor::new(self.channel_name(scope, user_id), self.table.clone())
            .in_schema(self.schema.clone())
            .with_filter(format!("{}=eq.{}", self.recipient_column, user_id))
    }

    /// Exact count query for one scope and user
    pub fn count_query(&self, scope: &str, user_id: Uuid) -> TableQuery {
        let query = TableQuery::new(self.schema.clone(), self.table.clone())
            .filter(FilterExpr::eq(self.scope_column.clone(), scope))
            .filter(FilterExpr::eq(
                self.recipient_column.clone(),
                user_id.to_string(),
            ));

        self.conditions
            .iter()
            .cloned()
            .fold(query, |query, condition| query.filter(condition))
    }
}
