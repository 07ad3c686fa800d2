//! Observable events for campusdesk
//!
//! Events are explicit and typed.

use std::fmt;

use super::logger::Severity;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Configuration loaded
    ConfigLoaded,
    /// CLI command started
    CommandStart,
    /// CLI command finished
    CommandComplete,

    // Realtime subscriptions
    /// Change-feed registration requested
    SubscriptionRegistered,
    /// Change-feed registration released
    SubscriptionReleased,
    /// Change-feed registration failed
    SubscriptionFailed,
    /// Backend confirmed the registration
    SubscriptionConfirmed,
    /// Event dropped because the registration was already released
    EventDropped,

    // Websocket feed
    /// Websocket connection established
    FeedConnected,
    /// Websocket connection closed
    FeedClosed,
    /// Server reported an error on the feed
    FeedError,

    // Live counter
    /// Counter scope changed
    CounterScopeChanged,
    /// Recount scheduled by a change event
    CounterRecomputeStarted,
    /// Counter recomputed
    CounterRecomputed,
    /// Counter recompute failed
    CounterRecomputeFailed,
    /// Counter result discarded because the scope moved on
    CounterSuperseded,
    /// Caller identity could not be resolved
    IdentityUnresolved,

    // Views & access
    /// Module list loaded
    ViewLoaded,
    /// Module list failed to load
    ViewFailed,
    /// Module list result discarded because a newer load started
    ViewSuperseded,
    /// Permission lookup found no granting row
    AccessDenied,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::CommandStart => "COMMAND_START",
            Event::CommandComplete => "COMMAND_COMPLETE",

            Event::SubscriptionRegistered => "SUBSCRIPTION_REGISTERED",
            Event::SubscriptionReleased => "SUBSCRIPTION_RELEASED",
            Event::SubscriptionFailed => "SUBSCRIPTION_FAILED",
            Event::SubscriptionConfirmed => "SUBSCRIPTION_CONFIRMED",
            Event::EventDropped => "EVENT_DROPPED",

            Event::FeedConnected => "FEED_CONNECTED",
            Event::FeedClosed => "FEED_CLOSED",
            Event::FeedError => "FEED_ERROR",

            Event::CounterScopeChanged => "COUNTER_SCOPE_CHANGED",
            Event::CounterRecomputeStarted => "COUNTER_RECOMPUTE_STARTED",
            Event::CounterRecomputed => "COUNTER_RECOMPUTED",
            Event::CounterRecomputeFailed => "COUNTER_RECOMPUTE_FAILED",
            Event::CounterSuperseded => "COUNTER_SUPERSEDED",
            Event::IdentityUnresolved => "IDENTITY_UNRESOLVED",

            Event::ViewLoaded => "VIEW_LOADED",
            Event::ViewFailed => "VIEW_FAILED",
            Event::ViewSuperseded => "VIEW_SUPERSEDED",
            Event::AccessDenied => "ACCESS_DENIED",
        }
    }

    /// Severity this event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::SubscriptionFailed
            | Event::FeedError
            | Event::CounterRecomputeFailed
            | Event::ViewFailed => Severity::Error,
            Event::IdentityUnresolved | Event::AccessDenied => Severity::Warn,
            Event::EventDropped
            | Event::CounterSuperseded
            | Event::CounterRecomputeStarted
            | Event::ViewSuperseded => Severity::Trace,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
