//! # Module List Loader
//!
//! Fetches one module's rows for a scope and turns every outcome into a
//! [`ViewState`]. Failures never escape as errors: they become a message
//! the module renders instead of its rows.
//!
//! Each `load` supersedes the previous one; a superseded load returns
//! `None` and leaves the published state alone.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use super::module::ModuleView;
use crate::access::{resolve_role, AccessError};
use crate::backend::{BackendClient, BackendError};
use crate::generation::Generation;
use crate::observability::{log_event_with_fields, Event};

/// Why a module shows a message instead of rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ViewError {
    /// The backend could not answer
    Backend(String),
    /// The caller may not see this module
    NotAuthorized(String),
}

impl ViewError {
    pub fn message(&self) -> &str {
        match self {
            ViewError::Backend(message) | ViewError::NotAuthorized(message) => message,
        }
    }
}

impl From<BackendError> for ViewError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::AuthenticationRequired | BackendError::Unauthorized => {
                ViewError::NotAuthorized(e.to_string())
            }
            other => ViewError::Backend(other.to_string()),
        }
    }
}

impl From<AccessError> for ViewError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::Backend(inner) => ViewError::from(inner),
            denial => ViewError::NotAuthorized(denial.to_string()),
        }
    }
}

/// What a module renders
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewState {
    pub rows: Vec<Value>,
    pub loading: bool,
    pub error: Option<ViewError>,
}

impl ViewState {
    fn loading() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    fn loaded(rows: Vec<Value>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    fn failed(error: ViewError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

/// Loads one module view
pub struct ViewLoader {
    client: BackendClient,
    view: ModuleView,
    generation: Generation,
    state: watch::Sender<ViewState>,
}

impl ViewLoader {
    pub fn new(client: BackendClient, view: ModuleView) -> Self {
        let (state, _) = watch::channel(ViewState::default());
        Self {
            client,
            view,
            generation: Generation::new(),
            state,
        }
    }

    pub fn view(&self) -> &ModuleView {
        &self.view
    }

    /// Load the module for `scope`; `None` if a newer load superseded this one
    pub async fn load(&self, scope: &str) -> Option<ViewState> {
        let token = self.generation.advance();
        self.state.send_replace(ViewState::loading());

        let result = self.fetch(scope).await;

        if !token.is_current() {
            log_event_with_fields(
                Event::ViewSuperseded,
                &[("scope", scope), ("view", self.view.name.as_str())],
            );
            return None;
        }

        let state = match result {
            Ok(rows) => {
                let count = rows.len().to_string();
                log_event_with_fields(
                    Event::ViewLoaded,
                    &[
                        ("rows", count.as_str()),
                        ("scope", scope),
                        ("view", self.view.name.as_str()),
                    ],
                );
                ViewState::loaded(rows)
            }
            Err(error) => {
                log_event_with_fields(
                    Event::ViewFailed,
                    &[
                        ("error", error.message()),
                        ("scope", scope),
                        ("view", self.view.name.as_str()),
                    ],
                );
                ViewState::failed(error)
            }
        };

        self.state.send_replace(state.clone());
        Some(state)
    }

    /// Supersede any in-flight load
    pub fn cancel(&self) {
        self.generation.advance();
    }

    pub fn state(&self) -> ViewState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ViewState> {
        self.state.subscribe()
    }

    async fn fetch(&self, scope: &str) -> Result<Vec<Value>, ViewError> {
        if !self.view.roles.is_empty() {
            let role = resolve_role(&self.client, scope).await?;
            if !self.view.permits(role) {
                return Err(ViewError::NotAuthorized(format!(
                    "The {} module is not available to the {} role",
                    self.view.name, role
                )));
            }
        }

        let query = self
            .view
            .query(&self.client.config().default_schema, scope);
        Ok(self.client.query().select(&query).await?)
    }
}

impl std::fmt::Debug for ViewLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewLoader")
            .field("view", &self.view.name)
            .field("generation", &self.generation.value())
            .finish()
    }
}
