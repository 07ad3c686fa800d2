//! # Live Counter
//!
//! A count kept fresh by the change feed: one exact count when the scope
//! is set, then a full recount for every change the feed forwards.
//!
//! ## State machine
//!
//! ```text
//! Idle --set_scope(Some)--> Loading --count ok--> Ready
//!  ^                           |                    |
//!  +---no identity, no count---+                    |
//!  +------------------set_scope(None)---------------+
//! ```
//!
//! `Ready` is only reached through a successful count for the current
//! scope; failures before the first count fall back to `Idle`. Event-driven
//! recounts run concurrently and do not flip `loading`; whichever finishes
//! last wins. Every fetch carries the [`GenerationToken`] of the scope it
//! was armed for and is discarded once the scope has moved on.
//!
//! A scope whose identity never resolved (or whose `set_scope` was
//! cancelled) is not armed, so setting the same scope again retries it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use uuid::Uuid;

use super::definition::CounterSpec;
use super::state::CounterState;
use crate::backend::{BackendClient, ChangeEvent};
use crate::generation::{Generation, GenerationToken};
use crate::observability::{log_event_with_fields, Event};
use crate::realtime::{RealtimeSubscription, SubscriptionStatus};

/// Scope and identity a count is computed for
#[derive(Debug, Clone, PartialEq, Eq)]
struct CountTarget {
    scope: String,
    user_id: Uuid,
}

/// Target of an armed counter together with the generation it belongs to
#[derive(Debug, Clone)]
struct Armed {
    target: CountTarget,
    token: GenerationToken,
}

struct CounterShared {
    client: BackendClient,
    spec: CounterSpec,
    state: watch::Sender<CounterState>,
    generation: Generation,
    armed: Mutex<Option<Armed>>,
    /// Generation of the last successful count
    counted: AtomicU64,
}

impl CounterShared {
    fn armed(&self) -> Option<Armed> {
        self.armed.lock().ok().and_then(|armed| armed.clone())
    }

    fn arm(&self, target: CountTarget, token: GenerationToken) {
        if let Ok(mut armed) = self.armed.lock() {
            *armed = Some(Armed { target, token });
        }
    }

    fn disarm(&self) {
        if let Ok(mut armed) = self.armed.lock() {
            *armed = None;
        }
    }

    fn mark_counted(&self, token: &GenerationToken) {
        self.counted.store(token.value(), Ordering::SeqCst);
    }

    fn has_count(&self, token: &GenerationToken) -> bool {
        self.counted.load(Ordering::SeqCst) == token.value()
    }
}

/// Returns a `set_scope` dropped before it finished to `Idle`, unarmed
struct PendingScope {
    shared: Arc<CounterShared>,
    token: GenerationToken,
    finished: bool,
}

impl PendingScope {
    fn new(shared: &Arc<CounterShared>, token: &GenerationToken) -> Self {
        Self {
            shared: Arc::clone(shared),
            token: token.clone(),
            finished: false,
        }
    }

    fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for PendingScope {
    fn drop(&mut self) {
        if self.finished || !self.token.is_current() {
            return;
        }
        self.shared.disarm();
        self.shared.state.send_replace(CounterState::idle());
        log_event_with_fields(
            Event::CounterSuperseded,
            &[("counter", self.shared.spec.name.as_str()), ("reason", "cancelled")],
        );
    }
}

/// Count of rows addressed to the signed-in user within one scope
pub struct LiveCounter {
    shared: Arc<CounterShared>,
    subscription: RealtimeSubscription,
    scope: Option<String>,
    shut_down: bool,
}

impl LiveCounter {
    /// Create an idle counter. Must be called inside a Tokio runtime.
    pub fn new(client: BackendClient, spec: CounterSpec) -> Self {
        let (state, _) = watch::channel(CounterState::idle());
        let shared = Arc::new(CounterShared {
            client,
            spec,
            state,
            generation: Generation::new(),
            armed: Mutex::new(None),
            counted: AtomicU64::new(0),
        });

        let handler_shared = Arc::clone(&shared);
        let subscription = RealtimeSubscription::new(
            Arc::clone(shared.client.feed()),
            move |event: &ChangeEvent| on_change(&handler_shared, event),
        );

        Self {
            shared,
            subscription,
            scope: None,
            shut_down: false,
        }
    }

    /// Switch scope.
    ///
    /// Releases the current registration before anything else. With a new
    /// scope, resolves the caller, arms the feed, and waits for the first
    /// count. Setting the scope already in place is a no-op once it is
    /// armed; an unarmed scope is retried.
    pub async fn set_scope(&mut self, scope: Option<String>) {
        if self.shut_down || self.is_settled_on(&scope) {
            return;
        }

        let token = self.shared.generation.advance();
        self.subscription.release();
        self.shared.disarm();
        self.scope = scope.clone();

        log_event_with_fields(
            Event::CounterScopeChanged,
            &[
                ("counter", self.shared.spec.name.as_str()),
                ("scope", scope.as_deref().unwrap_or("null")),
            ],
        );

        let Some(scope) = scope else {
            self.shared.state.send_replace(CounterState::idle());
            return;
        };

        self.shared.state.send_replace(CounterState::loading(0));
        let pending = PendingScope::new(&self.shared, &token);

        let user = match self.shared.client.auth().current_user().await {
            Ok(Some(user)) => user,
            Ok(None) => {
                self.identity_unresolved(&token, &scope, "no signed-in user");
                pending.finish();
                return;
            }
            Err(e) => {
                let reason = e.to_string();
                self.identity_unresolved(&token, &scope, &reason);
                pending.finish();
                return;
            }
        };

        if !token.is_current() {
            log_event_with_fields(Event::CounterSuperseded, &[("scope", scope.as_str())]);
            pending.finish();
            return;
        }

        let target = CountTarget {
            scope,
            user_id: user.id,
        };
        self.shared.arm(target.clone(), token.clone());

        let descriptor = self.shared.spec.descriptor(&target.scope, target.user_id);
        if let Err(e) = self.subscription.update(descriptor) {
            let reason = e.to_string();
            log_event_with_fields(
                Event::SubscriptionFailed,
                &[("code", e.code()), ("error", reason.as_str())],
            );
        }

        recompute(Arc::clone(&self.shared), target, token, Trigger::Initial).await;
        pending.finish();
    }

    /// Recount now. No-op until the scope is armed.
    pub async fn refresh(&self) {
        let Some(armed) = self.shared.armed() else {
            return;
        };
        self.shared
            .state
            .send_modify(|state| *state = CounterState::loading(state.value));
        recompute(Arc::clone(&self.shared), armed.target, armed.token, Trigger::Refresh).await;
    }

    /// Current state
    pub fn state(&self) -> CounterState {
        *self.shared.state.borrow()
    }

    /// Watch state changes
    pub fn watch(&self) -> watch::Receiver<CounterState> {
        self.shared.state.subscribe()
    }

    /// Watch the underlying registration
    pub fn subscription_status(&self) -> watch::Receiver<SubscriptionStatus> {
        self.subscription.status()
    }

    /// Scope last requested, armed or not
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Whether the change feed is armed
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_active()
    }

    /// Release everything and supersede pending fetches. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.shared.generation.advance();
        self.subscription.release();
        self.shared.disarm();
        self.scope = None;
    }

    /// Whether `scope` is already in place and needs no work
    fn is_settled_on(&self, scope: &Option<String>) -> bool {
        if *scope != self.scope {
            return false;
        }
        scope.is_none() || self.shared.armed().is_some()
    }

    fn identity_unresolved(&self, token: &GenerationToken, scope: &str, reason: &str) {
        log_event_with_fields(
            Event::IdentityUnresolved,
            &[("scope", scope), ("reason", reason)],
        );
        if token.is_current() {
            self.shared.state.send_replace(CounterState::idle());
        }
    }
}

impl Drop for LiveCounter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for LiveCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveCounter")
            .field("counter", &self.shared.spec.name)
            .field("scope", &self.scope)
            .field("state", &*self.shared.state.borrow())
            .field("subscription", &self.subscription)
            .finish()
    }
}

/// What started a recount
#[derive(Debug, Clone, Copy)]
enum Trigger {
    /// First count after the scope was armed
    Initial,
    /// A forwarded change event
    Change,
    /// An explicit `refresh`
    Refresh,
}

impl Trigger {
    fn as_str(&self) -> &'static str {
        match self {
            Trigger::Initial => "initial",
            Trigger::Change => "change",
            Trigger::Refresh => "refresh",
        }
    }
}

/// Change-feed handler: every event schedules a full recount
fn on_change(shared: &Arc<CounterShared>, event: &ChangeEvent) {
    // Target and token are read together: a stale target always carries a stale token
    let Some(armed) = shared.armed() else {
        return;
    };

    log_event_with_fields(
        Event::CounterRecomputeStarted,
        &[
            ("counter", shared.spec.name.as_str()),
            ("event_type", event.event_type.to_string().as_str()),
        ],
    );
    tokio::spawn(recompute(
        Arc::clone(shared),
        armed.target,
        armed.token,
        Trigger::Change,
    ));
}

async fn recompute(
    shared: Arc<CounterShared>,
    target: CountTarget,
    token: GenerationToken,
    trigger: Trigger,
) {
    let query = shared.spec.count_query(&target.scope, target.user_id);
    let result = shared.client.query().count(&query).await;

    match result {
        Ok(value) if token.is_current() => {
            shared.state.send_replace(CounterState::ready(value));
            shared.mark_counted(&token);
            let value = value.to_string();
            log_event_with_fields(
                Event::CounterRecomputed,
                &[
                    ("counter", shared.spec.name.as_str()),
                    ("scope", target.scope.as_str()),
                    ("trigger", trigger.as_str()),
                    ("value", value.as_str()),
                ],
            );
        }
        Ok(_) => {
            log_event_with_fields(Event::CounterSuperseded, &[("scope", target.scope.as_str())]);
        }
        Err(e) => {
            let reason = e.to_string();
            log_event_with_fields(
                Event::CounterRecomputeFailed,
                &[
                    ("code", e.code()),
                    ("counter", shared.spec.name.as_str()),
                    ("error", reason.as_str()),
                    ("scope", target.scope.as_str()),
                    ("trigger", trigger.as_str()),
                ],
            );
            if !token.is_current() {
                return;
            }
            if shared.has_count(&token) {
                shared.state.send_modify(|state| *state = state.settled());
            } else {
                shared.state.send_replace(CounterState::idle());
            }
        }
    }
}
