//! # In-Memory Backend
//!
//! An in-process stand-in for the hosted database: JSON rows per table,
//! ownership row-level security, exact counts, and a change feed that
//! fans mutations out to matching registrations in commit order.
//!
//! Backs the `replay` command and the integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use serde_json::Value;
use uuid::Uuid;

use super::client::{AuthService, BackendFuture, QueryService, UserIdentity};
use super::errors::{BackendError, BackendResult};
use super::feed::{
    ChangeEvent, ChangeFeed, EventType, FeedHandle, FeedMessage, FeedRequest, FeedSink,
    FeedStatus,
};
use super::filter::{compare_json_values, matches_all};
use super::query::TableQuery;
use super::rls::{RlsContext, RlsPolicies, RlsPolicy};

/// Schema assumed when a table name is not qualified
pub const DEFAULT_SCHEMA: &str = "public";

/// Row identity column
const ID_FIELD: &str = "id";

/// `messages` -> `public.messages`; qualified names pass through
fn qualify(table: &str) -> String {
    if table.contains('.') {
        table.to_string()
    } else {
        format!("{}.{}", DEFAULT_SCHEMA, table)
    }
}

fn split_qualified(qualified: &str) -> (&str, &str) {
    qualified.split_once('.').unwrap_or((DEFAULT_SCHEMA, qualified))
}

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<String, Vec<Value>>,
    policies: RlsPolicies,
    session: Option<UserIdentity>,
}

impl Tables {
    fn context(&self) -> RlsContext {
        match &self.session {
            Some(user) => RlsContext::authenticated(user.id),
            None => RlsContext::anonymous(),
        }
    }

    fn visible<'a>(
        &'a self,
        query: &'a TableQuery,
        ctx: &'a RlsContext,
    ) -> BackendResult<impl Iterator<Item = &'a Value> + 'a> {
        let qualified = query.qualified_table();
        let rows = self
            .rows
            .get(&qualified)
            .ok_or_else(|| BackendError::UnknownTable(qualified.clone()))?;

        Ok(rows.iter().filter(move |row| {
            self.policies.allows(&qualified, row, ctx) && matches_all(&query.filters, row)
        }))
    }
}

#[derive(Debug)]
struct Registration {
    id: u64,
    request: FeedRequest,
    sink: FeedSink,
    context: RlsContext,
}

/// In-process backend implementing every backend service
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<Tables>,
    registrations: Mutex<Vec<Registration>>,
    sequence: AtomicU64,
    next_registration: AtomicU64,
    feed_failure: Mutex<Option<String>>,
    query_failure: Mutex<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================
    // Session
    // ==================

    /// Sign a user in; later queries and registrations run as them
    pub fn sign_in(&self, user: UserIdentity) {
        if let Ok(mut tables) = self.tables.write() {
            tables.session = Some(user);
        }
    }

    pub fn sign_out(&self) {
        if let Ok(mut tables) = self.tables.write() {
            tables.session = None;
        }
    }

    // ==================
    // Schema & policies
    // ==================

    /// Create an empty table if it does not exist
    pub fn create_table(&self, table: &str) {
        if let Ok(mut tables) = self.tables.write() {
            tables.rows.entry(qualify(table)).or_default();
        }
    }

    pub fn set_policy(&self, table: &str, policy: RlsPolicy) {
        if let Ok(mut tables) = self.tables.write() {
            tables.policies.set(qualify(table), policy);
        }
    }

    /// Load rows without emitting change events
    pub fn seed(&self, table: &str, rows: Vec<Value>) -> BackendResult<()> {
        let mut tables = self.write_tables()?;
        let entry = tables.rows.entry(qualify(table)).or_default();
        for row in rows {
            entry.push(with_id(row)?);
        }
        Ok(())
    }

    // ==================
    // Fault injection
    // ==================

    /// Make every new registration fail with `reason` (None restores)
    pub fn fail_subscriptions(&self, reason: Option<String>) {
        if let Ok(mut failure) = self.feed_failure.lock() {
            *failure = reason;
        }
    }

    /// Make every query fail with `reason` (None restores)
    pub fn fail_queries(&self, reason: Option<String>) {
        if let Ok(mut failure) = self.query_failure.lock() {
            *failure = reason;
        }
    }

    // ==================
    // Mutations
    // ==================

    /// Insert a row, assigning an `id` when missing
    pub fn insert(&self, table: &str, row: Value) -> BackendResult<Value> {
        let qualified = qualify(table);
        let row = with_id(row)?;
        {
            let mut tables = self.write_tables()?;
            tables.rows.entry(qualified.clone()).or_default().push(row.clone());
        }
        self.publish(&qualified, EventType::Insert, Some(row.clone()), None);
        Ok(row)
    }

    /// Merge `patch` into the row with the given id
    pub fn update(&self, table: &str, id: &str, patch: Value) -> BackendResult<Value> {
        let qualified = qualify(table);
        let (old, new) = {
            let mut tables = self.write_tables()?;
            let rows = tables
                .rows
                .get_mut(&qualified)
                .ok_or_else(|| BackendError::UnknownTable(qualified.clone()))?;
            let row = rows
                .iter_mut()
                .find(|row| row_id(row) == Some(id))
                .ok_or_else(|| BackendError::Query(format!("no row with id '{}'", id)))?;

            let old = row.clone();
            if let (Some(target), Some(changes)) = (row.as_object_mut(), patch.as_object()) {
                for (key, value) in changes {
                    if key != ID_FIELD {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
            (old, row.clone())
        };
        self.publish(&qualified, EventType::Update, Some(new.clone()), Some(old));
        Ok(new)
    }

    /// Delete the row with the given id
    pub fn delete(&self, table: &str, id: &str) -> BackendResult<Value> {
        let qualified = qualify(table);
        let removed = {
            let mut tables = self.write_tables()?;
            let rows = tables
                .rows
                .get_mut(&qualified)
                .ok_or_else(|| BackendError::UnknownTable(qualified.clone()))?;
            let index = rows
                .iter()
                .position(|row| row_id(row) == Some(id))
                .ok_or_else(|| BackendError::Query(format!("no row with id '{}'", id)))?;
            rows.remove(index)
        };
        self.publish(&qualified, EventType::Delete, None, Some(removed.clone()));
        Ok(removed)
    }

    /// Number of live change-feed registrations
    pub fn registration_count(&self) -> usize {
        self.registrations.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn write_tables(&self) -> BackendResult<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| BackendError::Query("table lock poisoned".into()))
    }

    /// Fan an event out to every matching registration allowed to see it
    fn publish(
        &self,
        qualified: &str,
        event_type: EventType,
        record: Option<Value>,
        old_record: Option<Value>,
    ) {
        let (schema, table) = split_qualified(qualified);
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let event = ChangeEvent::new(sequence, event_type, schema, table, record, old_record);

        let Ok(tables) = self.tables.read() else {
            return;
        };
        let Ok(mut registrations) = self.registrations.lock() else {
            return;
        };

        registrations.retain(|registration| {
            if !registration.request.matches(&event) {
                return true;
            }
            let visible = event
                .row()
                .map_or(false, |row| tables.policies.allows(qualified, row, &registration.context));
            if !visible {
                return true;
            }
            // A closed sink means the subscriber is gone
            registration
                .sink
                .send(FeedMessage::Event(event.clone()))
                .is_ok()
        });
    }

    fn check_query_failure(&self) -> BackendResult<()> {
        match self.query_failure.lock() {
            Ok(failure) => match failure.as_ref() {
                Some(reason) => Err(BackendError::Network(reason.clone())),
                None => Ok(()),
            },
            Err(_) => Err(BackendError::Query("failure lock poisoned".into())),
        }
    }

    fn run_select(&self, query: &TableQuery) -> BackendResult<Vec<Value>> {
        self.check_query_failure()?;
        let tables = self
            .tables
            .read()
            .map_err(|_| BackendError::Query("table lock poisoned".into()))?;
        let ctx = tables.context();

        let mut rows: Vec<&Value> = tables.visible(query, &ctx)?.collect();
        for order in query.order.iter().rev() {
            rows.sort_by(|a, b| {
                let left = a.get(&order.field).unwrap_or(&Value::Null);
                let right = b.get(&order.field).unwrap_or(&Value::Null);
                let ordering = compare_json_values(left, right).cmp(&0);
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|row| query.project(row))
            .collect())
    }

    fn run_count(&self, query: &TableQuery) -> BackendResult<u64> {
        self.check_query_failure()?;
        let tables = self
            .tables
            .read()
            .map_err(|_| BackendError::Query("table lock poisoned".into()))?;
        let ctx = tables.context();
        let count = tables.visible(query, &ctx)?.count();
        Ok(count as u64)
    }
}

fn row_id(row: &Value) -> Option<&str> {
    row.get(ID_FIELD).and_then(|v| v.as_str())
}

fn with_id(mut row: Value) -> BackendResult<Value> {
    let obj = row
        .as_object_mut()
        .ok_or_else(|| BackendError::Query("rows must be JSON objects".into()))?;
    if !obj.contains_key(ID_FIELD) {
        obj.insert(ID_FIELD.to_string(), Value::String(Uuid::new_v4().to_string()));
    }
    Ok(row)
}

impl ChangeFeed for MemoryBackend {
    fn subscribe(&self, request: FeedRequest, sink: FeedSink) -> BackendResult<FeedHandle> {
        if let Ok(failure) = self.feed_failure.lock() {
            if let Some(reason) = failure.as_ref() {
                return Err(BackendError::SubscriptionRejected(reason.clone()));
            }
        }

        let context = self
            .tables
            .read()
            .map(|tables| tables.context())
            .unwrap_or_default();

        let id = self.next_registration.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = FeedHandle::new(id, request.channel.clone());

        let _ = sink.send(FeedMessage::Status(FeedStatus::Subscribed));

        let mut registrations = self
            .registrations
            .lock()
            .map_err(|_| BackendError::SubscriptionRejected("registry lock poisoned".into()))?;
        registrations.push(Registration {
            id,
            request,
            sink,
            context,
        });

        Ok(handle)
    }

    fn unsubscribe(&self, handle: &FeedHandle) {
        if let Ok(mut registrations) = self.registrations.lock() {
            registrations.retain(|registration| registration.id != handle.id());
        }
    }
}

impl QueryService for MemoryBackend {
    fn select<'a>(&'a self, query: &'a TableQuery) -> BackendFuture<'a, Vec<Value>> {
        let result = self.run_select(query);
        Box::pin(async move { result })
    }

    fn count<'a>(&'a self, query: &'a TableQuery) -> BackendFuture<'a, u64> {
        let result = self.run_count(query);
        Box::pin(async move { result })
    }
}

impl AuthService for MemoryBackend {
    fn current_user(&self) -> BackendFuture<'_, Option<UserIdentity>> {
        let user = self
            .tables
            .read()
            .map(|tables| tables.session.clone())
            .map_err(|_| BackendError::Query("session lock poisoned".into()));
        Box::pin(async move { user })
    }
}
