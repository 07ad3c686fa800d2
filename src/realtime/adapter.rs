//! # Realtime Subscription Adapter
//!
//! Owns at most one change-feed registration and forwards every event it
//! delivers to a caller-supplied handler.
//!
//! ## Lifecycle
//!
//! `update(descriptor)` is the only transition:
//!
//! - same descriptor as before: nothing happens
//! - anything else: the current registration (if any) is released first,
//!   then, if the new descriptor is enabled, a new one is requested
//!
//! `release()` and `Drop` tear the registration down. Events still queued
//! for a released registration are dropped, never handed to the handler.
//!
//! Registration failures are not retried. They are logged and published
//! on the [`SubscriptionStatus`] watch channel.
//!
//! Must be used inside a Tokio runtime: each registration is pumped by a
//! spawned task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::descriptor::SubscriptionDescriptor;
use super::errors::RealtimeResult;
use crate::backend::{
    ChangeEvent, ChangeFeed, FeedHandle, FeedMessage, FeedRequest, FeedStatus, FeedStream,
};
use crate::observability::{log_event_with_fields, Event};

/// Callback invoked once per forwarded change event
pub type ChangeHandler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Registration state as seen by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// No registration requested
    Idle,
    /// Requested, not yet confirmed by the backend
    Joining,
    /// Confirmed by the backend
    Subscribed,
    /// Registration failed; no retry is attempted
    Failed(String),
    /// Released by the caller or closed by the backend
    Closed,
}

struct ActiveRegistration {
    handle: FeedHandle,
    live: Arc<AtomicBool>,
    pump: JoinHandle<()>,
}

/// Change-feed registration owned by one caller
pub struct RealtimeSubscription {
    feed: Arc<dyn ChangeFeed>,
    handler: ChangeHandler,
    descriptor: Option<SubscriptionDescriptor>,
    active: Option<ActiveRegistration>,
    status: Arc<watch::Sender<SubscriptionStatus>>,
}

impl RealtimeSubscription {
    /// Create an adapter with no registration
    pub fn new<F>(feed: Arc<dyn ChangeFeed>, handler: F) -> Self
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let (status, _) = watch::channel(SubscriptionStatus::Idle);
        Self {
            feed,
            handler: Arc::new(handler),
            descriptor: None,
            active: None,
            status: Arc::new(status),
        }
    }

    /// Apply a descriptor.
    ///
    /// Errors only for an invalid descriptor, in which case the current
    /// registration is left untouched.
    pub fn update(&mut self, descriptor: SubscriptionDescriptor) -> RealtimeResult<()> {
        let request = descriptor.to_request()?;

        if self.descriptor.as_ref() == Some(&descriptor) {
            return Ok(());
        }

        self.release_active();
        let enabled = descriptor.enabled;
        self.descriptor = Some(descriptor);

        if enabled {
            self.register(request);
        } else {
            self.status.send_replace(SubscriptionStatus::Idle);
        }
        Ok(())
    }

    /// Release the registration. Safe to call repeatedly.
    pub fn release(&mut self) {
        self.descriptor = None;
        self.release_active();
    }

    /// Whether a registration is currently held
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Last applied descriptor
    pub fn descriptor(&self) -> Option<&SubscriptionDescriptor> {
        self.descriptor.as_ref()
    }

    /// Watch registration status changes
    pub fn status(&self) -> watch::Receiver<SubscriptionStatus> {
        self.status.subscribe()
    }

    /// Current registration status
    pub fn current_status(&self) -> SubscriptionStatus {
        self.status.borrow().clone()
    }

    fn register(&mut self, request: FeedRequest) {
        let channel = request.channel.clone();
        let topic = request.topic();
        let (sink, stream) = mpsc::unbounded_channel();

        self.status.send_replace(SubscriptionStatus::Joining);

        match self.feed.subscribe(request, sink) {
            Ok(handle) => {
                log_event_with_fields(
                    Event::SubscriptionRegistered,
                    &[("channel", channel.as_str()), ("topic", topic.as_str())],
                );
                let live = Arc::new(AtomicBool::new(true));
                let pump = tokio::spawn(pump(
                    stream,
                    Arc::clone(&live),
                    Arc::clone(&self.handler),
                    Arc::clone(&self.status),
                    channel,
                ));
                self.active = Some(ActiveRegistration { handle, live, pump });
            }
            Err(e) => {
                let reason = e.to_string();
                log_event_with_fields(
                    Event::SubscriptionFailed,
                    &[
                        ("channel", channel.as_str()),
                        ("code", e.code()),
                        ("error", reason.as_str()),
                    ],
                );
                self.status.send_replace(SubscriptionStatus::Failed(reason));
            }
        }
    }

    fn release_active(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        // Dead before unsubscribing: anything still queued is dropped
        active.live.store(false, Ordering::SeqCst);
        active.pump.abort();
        self.feed.unsubscribe(&active.handle);
        self.status.send_replace(SubscriptionStatus::Closed);

        log_event_with_fields(
            Event::SubscriptionReleased,
            &[("channel", active.handle.channel())],
        );
    }
}

impl Drop for RealtimeSubscription {
    fn drop(&mut self) {
        self.release_active();
    }
}

impl std::fmt::Debug for RealtimeSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeSubscription")
            .field("descriptor", &self.descriptor)
            .field("active", &self.active.is_some())
            .field("status", &*self.status.borrow())
            .finish()
    }
}

/// Forward feed messages in delivery order until the registration dies
async fn pump(
    mut stream: FeedStream,
    live: Arc<AtomicBool>,
    handler: ChangeHandler,
    status: Arc<watch::Sender<SubscriptionStatus>>,
    channel: String,
) {
    while let Some(message) = stream.recv().await {
        if !live.load(Ordering::SeqCst) {
            log_event_with_fields(Event::EventDropped, &[("channel", channel.as_str())]);
            break;
        }

        match message {
            FeedMessage::Event(event) => handler(&event),
            FeedMessage::Status(FeedStatus::Subscribed) => {
                log_event_with_fields(
                    Event::SubscriptionConfirmed,
                    &[("channel", channel.as_str())],
                );
                status.send_replace(SubscriptionStatus::Subscribed);
            }
            FeedMessage::Status(FeedStatus::Failed(reason)) => {
                log_event_with_fields(
                    Event::SubscriptionFailed,
                    &[("channel", channel.as_str()), ("error", reason.as_str())],
                );
                status.send_replace(SubscriptionStatus::Failed(reason));
            }
            FeedMessage::Status(FeedStatus::Closed) => {
                status.send_replace(SubscriptionStatus::Closed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendResult, EventType, FeedSink};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Feed that records calls and keeps every sink, even after unsubscribe
    #[derive(Default)]
    struct RecordingFeed {
        log: Mutex<Vec<String>>,
        sinks: Mutex<Vec<FeedSink>>,
        reject: Mutex<Option<String>>,
    }

    impl RecordingFeed {
        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn subscribe_count(&self) -> usize {
            self.log().iter().filter(|l| l.starts_with("sub:")).count()
        }

        fn push(&self, index: usize, message: FeedMessage) {
            let _ = self.sinks.lock().unwrap()[index].send(message);
        }
    }

    impl ChangeFeed for RecordingFeed {
        fn subscribe(&self, request: FeedRequest, sink: FeedSink) -> BackendResult<FeedHandle> {
            if let Some(reason) = self.reject.lock().unwrap().clone() {
                return Err(BackendError::SubscriptionRejected(reason));
            }
            let mut sinks = self.sinks.lock().unwrap();
            sinks.push(sink);
            let id = sinks.len() as u64;
            self.log.lock().unwrap().push(format!("sub:{}:{}", id, request.channel));
            Ok(FeedHandle::new(id, request.channel))
        }

        fn unsubscribe(&self, handle: &FeedHandle) {
            self.log.lock().unwrap().push(format!("unsub:{}", handle.id()));
        }
    }

    fn event(sequence: u64) -> FeedMessage {
        FeedMessage::Event(ChangeEvent::new(
            sequence,
            EventType::Insert,
            "public",
            "messages",
            None,
            None,
        ))
    }

    fn adapter(feed: &Arc<RecordingFeed>) -> (RealtimeSubscription, mpsc::UnboundedReceiver<u64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let feed: Arc<dyn ChangeFeed> = feed.clone();
        let subscription = RealtimeSubscription::new(feed, move |event: &ChangeEvent| {
            let _ = tx.send(event.sequence);
        });
        (subscription, rx)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_disabled_never_registers() {
        let feed = Arc::new(RecordingFeed::default());
        let (mut sub, mut rx) = adapter(&feed);

        sub.update(SubscriptionDescriptor::new("c", "messages").enabled(false))
            .unwrap();

        assert_eq!(feed.subscribe_count(), 0);
        assert!(!sub.is_active());
        assert_eq!(sub.current_status(), SubscriptionStatus::Idle);
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_forwards_in_order_and_stops_after_release() {
        let feed = Arc::new(RecordingFeed::default());
        let (mut sub, mut rx) = adapter(&feed);
        sub.update(SubscriptionDescriptor::new("c", "messages")).unwrap();

        for sequence in 1..=5 {
            feed.push(0, event(sequence));
        }
        let mut received = Vec::new();
        for _ in 0..5 {
            let seq = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            received.push(seq);
        }
        assert_eq!(received, vec![1, 2, 3, 4, 5]);

        sub.release();
        feed.push(0, event(6));
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_queued_events_dropped_on_release() {
        let feed = Arc::new(RecordingFeed::default());
        let (mut sub, mut rx) = adapter(&feed);
        sub.update(SubscriptionDescriptor::new("c", "messages")).unwrap();

        // Queued but not yet pumped when release happens
        feed.push(0, event(1));
        sub.release();
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_change_releases_before_registering() {
        let feed = Arc::new(RecordingFeed::default());
        let (mut sub, _rx) = adapter(&feed);

        sub.update(SubscriptionDescriptor::new("a", "messages")).unwrap();
        sub.update(SubscriptionDescriptor::new("a", "messages").with_filter("recipient_id=eq.u1"))
            .unwrap();

        assert_eq!(feed.log(), vec!["sub:1:a", "unsub:1", "sub:2:a"]);
    }

    #[tokio::test]
    async fn test_identical_descriptor_is_noop() {
        let feed = Arc::new(RecordingFeed::default());
        let (mut sub, _rx) = adapter(&feed);

        let descriptor = SubscriptionDescriptor::new("a", "messages");
        sub.update(descriptor.clone()).unwrap();
        sub.update(descriptor).unwrap();

        assert_eq!(feed.subscribe_count(), 1);
    }

    #[tokio::test]
    async fn test_disable_releases() {
        let feed = Arc::new(RecordingFeed::default());
        let (mut sub, _rx) = adapter(&feed);

        sub.update(SubscriptionDescriptor::new("a", "messages")).unwrap();
        sub.update(SubscriptionDescriptor::new("a", "messages").enabled(false))
            .unwrap();

        assert!(!sub.is_active());
        assert_eq!(feed.log(), vec!["sub:1:a", "unsub:1"]);
    }

    #[tokio::test]
    async fn test_double_release_unsubscribes_once() {
        let feed = Arc::new(RecordingFeed::default());
        let (mut sub, _rx) = adapter(&feed);

        sub.update(SubscriptionDescriptor::new("a", "messages")).unwrap();
        sub.release();
        sub.release();
        drop(sub);

        assert_eq!(feed.log(), vec!["sub:1:a", "unsub:1"]);
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let feed = Arc::new(RecordingFeed::default());
        {
            let (mut sub, _rx) = adapter(&feed);
            sub.update(SubscriptionDescriptor::new("a", "messages")).unwrap();
        }
        assert_eq!(feed.log(), vec!["sub:1:a", "unsub:1"]);
    }

    #[tokio::test]
    async fn test_registration_failure_reported_on_status() {
        let feed = Arc::new(RecordingFeed::default());
        *feed.reject.lock().unwrap() = Some("realtime disabled".to_string());
        let (mut sub, _rx) = adapter(&feed);

        sub.update(SubscriptionDescriptor::new("a", "messages")).unwrap();

        assert!(!sub.is_active());
        assert_eq!(
            sub.current_status(),
            SubscriptionStatus::Failed("Subscription rejected: realtime disabled".to_string())
        );

        // Same descriptor again does not retry
        sub.update(SubscriptionDescriptor::new("a", "messages")).unwrap();
        assert!(feed.log().is_empty());
    }

    #[tokio::test]
    async fn test_status_follows_feed() {
        let feed = Arc::new(RecordingFeed::default());
        let (mut sub, _rx) = adapter(&feed);
        let mut status = sub.status();

        sub.update(SubscriptionDescriptor::new("a", "messages")).unwrap();
        assert_eq!(sub.current_status(), SubscriptionStatus::Joining);

        feed.push(0, FeedMessage::Status(FeedStatus::Subscribed));
        tokio::time::timeout(
            Duration::from_secs(1),
            status.wait_for(|s| *s == SubscriptionStatus::Subscribed),
        )
        .await
        .unwrap()
        .unwrap();

        sub.release();
        assert_eq!(sub.current_status(), SubscriptionStatus::Closed);
    }

    #[tokio::test]
    async fn test_invalid_descriptor_keeps_registration() {
        let feed = Arc::new(RecordingFeed::default());
        let (mut sub, _rx) = adapter(&feed);

        sub.update(SubscriptionDescriptor::new("a", "messages")).unwrap();
        assert!(sub
            .update(SubscriptionDescriptor::new("a", "messages").with_filter("nonsense"))
            .is_err());

        assert!(sub.is_active());
        assert_eq!(feed.log(), vec!["sub:1:a"]);
    }
}
