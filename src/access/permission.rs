//! Permission lookups.
//!
//! Row-level security does the real filtering: a lookup that returns a row
//! grants, an empty result denies.

use serde_json::Value;
use uuid::Uuid;

use super::errors::{AccessError, AccessResult};
use super::roles::Role;
use crate::backend::{BackendClient, FilterExpr, TableQuery};
use crate::observability::{log_event_with_fields, Event};

const USER_COLUMN: &str = "user_id";
const SCHOOL_COLUMN: &str = "school_id";
const ROLE_COLUMN: &str = "role";

/// First row matching `query`, or `NotAuthorized(denial)` when none does
pub async fn require_row(
    client: &BackendClient,
    query: &TableQuery,
    denial: &str,
) -> AccessResult<Value> {
    let rows = client.query().select(query).await?;

    match rows.into_iter().next() {
        Some(row) => Ok(row),
        None => {
            let table = query.qualified_table();
            log_event_with_fields(
                Event::AccessDenied,
                &[("reason", denial), ("table", table.as_str())],
            );
            Err(AccessError::NotAuthorized(denial.to_string()))
        }
    }
}

/// Id of the signed-in user
pub async fn current_user_id(client: &BackendClient) -> AccessResult<Uuid> {
    match client.auth().current_user().await? {
        Some(user) => Ok(user.id),
        None => Err(AccessError::AuthenticationRequired),
    }
}

/// The caller's role in a school
pub async fn resolve_role(client: &BackendClient, school_id: &str) -> AccessResult<Role> {
    let user_id = current_user_id(client).await?;
    let query = client
        .table(client.config().access.roles_table.clone())
        .filter(FilterExpr::eq(USER_COLUMN, user_id.to_string()))
        .filter(FilterExpr::eq(SCHOOL_COLUMN, school_id))
        .limit(1);

    let row = require_row(client, &query, "You have no role in this school").await?;
    let role = row
        .get(ROLE_COLUMN)
        .and_then(Value::as_str)
        .ok_or_else(|| AccessError::UnknownRole("<missing>".to_string()))?;
    role.parse()
}

/// Succeeds only for users holding an administrator grant
pub async fn require_admin(client: &BackendClient) -> AccessResult<()> {
    let user_id = current_user_id(client).await?;
    let query = client
        .table(client.config().access.admins_table.clone())
        .filter(FilterExpr::eq(USER_COLUMN, user_id.to_string()))
        .limit(1);

    require_row(client, &query, "Administrator access required").await?;
    Ok(())
}

/// Profile row linked to the signed-in user
pub async fn linked_profile(client: &BackendClient) -> AccessResult<Value> {
    let user_id = current_user_id(client).await?;
    let query = client
        .table(client.config().access.profiles_table.clone())
        .filter(FilterExpr::eq(USER_COLUMN, user_id.to_string()))
        .limit(1);

    require_row(client, &query, "No profile is linked to this account").await
}
