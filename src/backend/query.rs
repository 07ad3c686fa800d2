//! # Table Queries
//!
//! Row-filtered SELECT / COUNT requests sent to the query service.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::filter::FilterExpr;

/// Order by clause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub ascending: bool,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }
}

/// A row-filtered query against one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableQuery {
    /// Schema the table lives in
    pub schema: String,

    /// Table name
    pub table: String,

    /// Columns to return (None = all)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,

    /// Filters combined with AND
    #[serde(default)]
    pub filters: Vec<FilterExpr>,

    /// Order by clauses
    #[serde(default)]
    pub order: Vec<OrderBy>,

    /// Maximum rows to return
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl TableQuery {
    /// Query every row of `schema.table`
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            select: None,
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    /// Add a filter
    pub fn filter(mut self, filter: FilterExpr) -> Self {
        self.filters.push(filter);
        self
    }

    /// Restrict returned columns
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.select = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Add an order clause
    pub fn order(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    /// Cap the number of rows
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// `schema.table`
    pub fn qualified_table(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    /// Keep only the selected columns of a row
    pub fn project(&self, row: &Value) -> Value {
        let Some(columns) = &self.select else {
            return row.clone();
        };
        if columns.iter().any(|c| c == "*") {
            return row.clone();
        }

        let mut projected = serde_json::Map::new();
        if let Some(obj) = row.as_object() {
            for column in columns {
                if let Some(value) = obj.get(column) {
                    projected.insert(column.clone(), value.clone());
                }
            }
        }
        Value::Object(projected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let query = TableQuery::new("public", "fee_payments")
            .filter(FilterExpr::eq("school_id", "s1"))
            .order(OrderBy::desc("paid_at"))
            .limit(50);

        assert_eq!(query.qualified_table(), "public.fee_payments");
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.limit, Some(50));
        assert!(!query.order[0].ascending);
    }

    #[test]
    fn test_project() {
        let row = json!({"id": "1", "name": "Ada", "salary": 10});
        let query = TableQuery::new("public", "staff").select(&["id", "name"]);
        assert_eq!(query.project(&row), json!({"id": "1", "name": "Ada"}));

        let all = TableQuery::new("public", "staff");
        assert_eq!(all.project(&row), row);
    }
}
