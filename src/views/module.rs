//! Module list definitions.

use serde::{Deserialize, Serialize};

use crate::access::Role;
use crate::backend::{FilterExpr, OrderBy, TableQuery};

/// A role-scoped list backing one dashboard module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleView {
    pub name: String,
    pub table: String,
    /// Columns to fetch (empty = all)
    #[serde(default)]
    pub select: Vec<String>,
    #[serde(default)]
    pub order: Option<OrderBy>,
    /// Tenant column compared against the scope
    pub scope_column: String,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Roles allowed to open the module (empty = anyone in the school)
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl ModuleView {
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        scope_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            select: Vec::new(),
            order: None,
            scope_column: scope_column.into(),
            limit: None,
            roles: Vec::new(),
        }
    }

    pub fn select(mut self, columns: &[&str]) -> Self {
        self.select = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn order(mut self, order: OrderBy) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn for_roles(mut self, roles: &[Role]) -> Self {
        self.roles = roles.to_vec();
        self
    }

    /// Accountant module: latest fee payments
    pub fn fee_payments() -> Self {
        Self::new("fee_payments", "fee_payments", "school_id")
            .select(&["id", "student_id", "amount", "status", "paid_at"])
            .order(OrderBy::desc("paid_at"))
            .limit(50)
            .for_roles(&[Role::Accountant, Role::Owner])
    }

    /// Owner module: staff directory
    pub fn staff_directory() -> Self {
        Self::new("staff", "staff", "school_id")
            .select(&["id", "full_name", "position", "email"])
            .order(OrderBy::asc("full_name"))
            .for_roles(&[Role::Owner, Role::Principal])
    }

    /// Shared module: school announcements
    pub fn announcements() -> Self {
        Self::new("announcements", "announcements", "school_id")
            .order(OrderBy::desc("created_at"))
            .limit(20)
    }

    /// Whether `role` may open this module
    pub fn permits(&self, role: Role) -> bool {
        self.roles.is_empty() || self.roles.contains(&role)
    }

    /// List query for one scope
    pub fn query(&self, schema: &str, scope: &str) -> TableQuery {
        let mut query = TableQuery::new(schema, self.table.clone())
            .filter(FilterExpr::eq(self.scope_column.clone(), scope));
        if !self.select.is_empty() {
            query.select = Some(self.select.clone());
        }
        if let Some(order) = &self.order {
            query = query.order(order.clone());
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        query
    }
}
