//! Backend Client Context
//!
//! The hosted backend is reached through three services. They are bundled
//! into one [`BackendClient`], built once at process start and passed to
//! every component that needs it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::errors::BackendResult;
use super::feed::ChangeFeed;
use super::query::TableQuery;
use crate::config::ClientConfig;

/// Boxed future returned by backend services
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = BackendResult<T>> + Send + 'a>>;

/// The signed-in user as reported by the auth service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserIdentity {
    pub fn new(id: Uuid) -> Self {
        Self { id, email: None }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Row-filtered SELECT / exact COUNT service
pub trait QueryService: Send + Sync {
    /// Rows visible to the caller that match the query
    fn select<'a>(&'a self, query: &'a TableQuery) -> BackendFuture<'a, Vec<Value>>;

    /// Exact number of visible rows matching the query (limit ignored)
    fn count<'a>(&'a self, query: &'a TableQuery) -> BackendFuture<'a, u64>;
}

/// Authentication service
pub trait AuthService: Send + Sync {
    /// The current user, or `None` when signed out
    fn current_user(&self) -> BackendFuture<'_, Option<UserIdentity>>;
}

/// Explicitly passed backend context
#[derive(Clone)]
pub struct BackendClient {
    feed: Arc<dyn ChangeFeed>,
    query: Arc<dyn QueryService>,
    auth: Arc<dyn AuthService>,
    config: Arc<ClientConfig>,
}

impl BackendClient {
    /// Assemble a client from independent services
    pub fn new(
        feed: Arc<dyn ChangeFeed>,
        query: Arc<dyn QueryService>,
        auth: Arc<dyn AuthService>,
        config: ClientConfig,
    ) -> Self {
        Self {
            feed,
            query,
            auth,
            config: Arc::new(config),
        }
    }

    /// Assemble a client from one backend implementing every service
    pub fn from_backend<B>(backend: Arc<B>, config: ClientConfig) -> Self
    where
        B: ChangeFeed + QueryService + AuthService + 'static,
    {
        Self {
            feed: backend.clone(),
            query: backend.clone(),
            auth: backend,
            config: Arc::new(config),
        }
    }

    pub fn feed(&self) -> &Arc<dyn ChangeFeed> {
        &self.feed
    }

    pub fn query(&self) -> &dyn QueryService {
        self.query.as_ref()
    }

    pub fn auth(&self) -> &dyn AuthService {
        self.auth.as_ref()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start a query in the configured primary schema
    pub fn table(&self, table: impl Into<String>) -> TableQuery {
        TableQuery::new(self.config.default_schema.clone(), table)
    }
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("default_schema", &self.config.default_schema)
            .finish_non_exhaustive()
    }
}
