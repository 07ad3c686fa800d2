//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use campusdesk::backend::{
    AuthService, BackendClient, BackendError, BackendFuture, BackendResult, ChangeEvent,
    ChangeFeed, EventType, FeedHandle, FeedMessage, FeedRequest, FeedSink, MemoryBackend,
    QueryService, TableQuery, UserIdentity,
};
use campusdesk::config::ClientConfig;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Change feed that records every call and keeps sinks after unsubscribe,
/// so tests can push "late" events into released registrations.
#[derive(Default)]
pub struct RecordingFeed {
    calls: Mutex<Vec<String>>,
    sinks: Mutex<Vec<FeedSink>>,
}

impl RecordingFeed {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn subscribes(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("subscribe")).count()
    }

    pub fn unsubscribes(&self) -> usize {
        self.calls().iter().filter(|c| c.starts_with("unsubscribe")).count()
    }

    /// Push an event into the n-th registration ever made
    pub fn deliver(&self, registration: usize, sequence: u64) {
        let event = ChangeEvent::new(sequence, EventType::Insert, "public", "messages", None, None);
        let _ = self.sinks.lock().unwrap()[registration].send(FeedMessage::Event(event));
    }
}

impl ChangeFeed for RecordingFeed {
    fn subscribe(&self, request: FeedRequest, sink: FeedSink) -> BackendResult<FeedHandle> {
        let mut sinks = self.sinks.lock().unwrap();
        sinks.push(sink);
        let id = sinks.len() as u64;
        self.calls
            .lock()
            .unwrap()
            .push(format!("subscribe {} {}", id, request.channel));
        Ok(FeedHandle::new(id, request.channel))
    }

    fn unsubscribe(&self, handle: &FeedHandle) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("unsubscribe {}", handle.id()));
    }
}

/// Query service whose queries can be held until the test releases them
pub struct GatedQuery {
    inner: Arc<MemoryBackend>,
    gate: Semaphore,
    gated: AtomicBool,
    counts: AtomicUsize,
}

impl GatedQuery {
    pub fn new(inner: Arc<MemoryBackend>) -> Self {
        Self {
            inner,
            gate: Semaphore::new(0),
            gated: AtomicBool::new(false),
            counts: AtomicUsize::new(0),
        }
    }

    /// Hold every count started from now on
    pub fn close(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    /// Let `n` held counts through
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Count queries started so far
    pub fn counts(&self) -> usize {
        self.counts.load(Ordering::SeqCst)
    }

    async fn pass_gate(&self) -> BackendResult<()> {
        if self.gated.load(Ordering::SeqCst) {
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| BackendError::ConnectionClosed)?;
            permit.forget();
        }
        Ok(())
    }
}

impl QueryService for GatedQuery {
    fn select<'a>(&'a self, query: &'a TableQuery) -> BackendFuture<'a, Vec<Value>> {
        Box::pin(async move {
            self.pass_gate().await?;
            self.inner.select(query).await
        })
    }

    fn count<'a>(&'a self, query: &'a TableQuery) -> BackendFuture<'a, u64> {
        Box::pin(async move {
            self.counts.fetch_add(1, Ordering::SeqCst);
            self.pass_gate().await?;
            self.inner.count(query).await
        })
    }
}

/// Auth service whose lookups never complete while held
pub struct HeldAuth {
    inner: Arc<MemoryBackend>,
    held: AtomicBool,
}

impl HeldAuth {
    pub fn new(inner: Arc<MemoryBackend>) -> Self {
        Self {
            inner,
            held: AtomicBool::new(false),
        }
    }

    /// Lookups started from now on hang
    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Lookups started from now on go through
    pub fn resume(&self) {
        self.held.store(false, Ordering::SeqCst);
    }
}

impl AuthService for HeldAuth {
    fn current_user(&self) -> BackendFuture<'_, Option<UserIdentity>> {
        Box::pin(async move {
            if self.held.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            self.inner.current_user().await
        })
    }
}

/// Auth service that always fails
pub struct FailingAuth;

impl AuthService for FailingAuth {
    fn current_user(&self) -> BackendFuture<'_, Option<UserIdentity>> {
        Box::pin(async { Err(BackendError::Network("auth endpoint unreachable".into())) })
    }
}

/// Backend with one signed-in user and an empty messages table
pub fn signed_in_backend() -> (Arc<MemoryBackend>, Uuid) {
    let backend = Arc::new(MemoryBackend::new());
    let user = Uuid::new_v4();
    backend.sign_in(UserIdentity::new(user));
    backend.create_table("messages");
    (backend, user)
}

pub fn memory_client(backend: &Arc<MemoryBackend>) -> BackendClient {
    BackendClient::from_backend(Arc::clone(backend), ClientConfig::default())
}

/// Client whose counts go through `query` and everything else through `backend`
pub fn gated_client(backend: &Arc<MemoryBackend>, query: &Arc<GatedQuery>) -> BackendClient {
    BackendClient::new(
        Arc::clone(backend) as Arc<dyn ChangeFeed>,
        Arc::clone(query) as Arc<dyn QueryService>,
        Arc::clone(backend) as Arc<dyn AuthService>,
        ClientConfig::default(),
    )
}

pub fn message(school: &str, recipient: Uuid, read: bool) -> Value {
    json!({"school_id": school, "recipient_id": recipient.to_string(), "is_read": read})
}

/// Give spawned tasks a chance to run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
