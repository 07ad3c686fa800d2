//! WebSocket Change Feed Tests
//!
//! Drives the adapter against a local websocket server speaking the
//! realtime protocol.

use std::sync::Arc;
use std::time::Duration;

use campusdesk::backend::ws_feed::{ClientMessage, ServerMessage};
use campusdesk::backend::{ChangeEvent, ChangeFeed, EventType, WsChangeFeed};
use campusdesk::realtime::{RealtimeSubscription, SubscriptionDescriptor, SubscriptionStatus};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// What the server saw from the client
#[derive(Debug, Default)]
struct Transcript {
    received: Vec<ClientMessage>,
}

async fn recv_client(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
) -> Option<ClientMessage> {
    while let Some(Ok(msg)) = ws.next().await {
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).ok();
        }
    }
    None
}

async fn send_server(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    msg: &ServerMessage,
) {
    let text = serde_json::to_string(msg).unwrap();
    ws.send(Message::Text(text)).await.unwrap();
}

fn event(sequence: u64, recipient: &str) -> ChangeEvent {
    ChangeEvent::new(
        sequence,
        EventType::Insert,
        "public",
        "messages",
        Some(json!({"recipient_id": recipient})),
        None,
    )
}

/// Server that confirms the subscription, sends `events`, then waits for
/// the client to unsubscribe.
async fn spawn_server(events: Vec<ChangeEvent>) -> (String, oneshot::Receiver<Transcript>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let mut transcript = Transcript::default();

        // auth, subscribe
        for _ in 0..2 {
            if let Some(msg) = recv_client(&mut ws).await {
                transcript.received.push(msg);
            }
        }
        send_server(
            &mut ws,
            &ServerMessage::Subscribed {
                channel: "realtime:public:messages".into(),
                subscription_id: "sub-1".into(),
            },
        )
        .await;
        for event in events {
            send_server(
                &mut ws,
                &ServerMessage::Event {
                    channel: "realtime:public:messages".into(),
                    event,
                },
            )
            .await;
        }

        if let Some(msg) = recv_client(&mut ws).await {
            transcript.received.push(msg);
        }
        let _ = done_tx.send(transcript);
    });

    (url, done_rx)
}

#[tokio::test]
async fn test_websocket_delivery_and_release() {
    let (url, transcript) = spawn_server(vec![
        event(1, "u1"),
        event(2, "u2"),
        event(3, "u1"),
    ])
    .await;

    let feed: Arc<dyn ChangeFeed> = Arc::new(WsChangeFeed::new(url, Some("token-1".into())));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut adapter = RealtimeSubscription::new(feed, move |event: &ChangeEvent| {
        let _ = tx.send(event.sequence);
    });
    let mut status = adapter.status();

    adapter
        .update(SubscriptionDescriptor::new("unread", "messages").with_filter("recipient_id=eq.u1"))
        .unwrap();

    tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| *s == SubscriptionStatus::Subscribed),
    )
    .await
    .unwrap()
    .unwrap();

    let mut received = Vec::new();
    while received.len() < 2 {
        let sequence = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        received.push(sequence);
    }
    assert_eq!(received, vec![1, 3]);

    adapter.release();

    let transcript = tokio::time::timeout(Duration::from_secs(5), transcript)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        transcript.received[0],
        ClientMessage::Auth {
            token: "token-1".into()
        }
    );
    match &transcript.received[1] {
        ClientMessage::Subscribe { channel, filter } => {
            assert_eq!(channel, "realtime:public:messages");
            assert_eq!(
                filter.as_ref().map(|f| f.to_string()),
                Some("recipient_id=eq.u1".to_string())
            );
        }
        other => panic!("expected subscribe, got {:?}", other),
    }
    assert_eq!(
        transcript.received[2],
        ClientMessage::Unsubscribe {
            channel: "realtime:public:messages".into()
        }
    );
}

#[tokio::test]
async fn test_server_rejection_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _ = recv_client(&mut ws).await;
        send_server(
            &mut ws,
            &ServerMessage::Error {
                message: "table not published".into(),
                code: "REALTIME_SUBSCRIPTION_DENIED".into(),
            },
        )
        .await;
        // Keep the socket open until the client goes away
        while ws.next().await.is_some() {}
    });

    let feed: Arc<dyn ChangeFeed> = Arc::new(WsChangeFeed::new(url, None));
    let mut adapter = RealtimeSubscription::new(feed, |_: &ChangeEvent| {});
    let mut status = adapter.status();
    adapter
        .update(SubscriptionDescriptor::new("c", "messages"))
        .unwrap();

    let failed = tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| matches!(s, SubscriptionStatus::Failed(_))),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();

    match failed {
        SubscriptionStatus::Failed(reason) => {
            assert!(reason.contains("REALTIME_SUBSCRIPTION_DENIED"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_server_reported() {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let feed: Arc<dyn ChangeFeed> = Arc::new(WsChangeFeed::new(url, None));
    let mut adapter = RealtimeSubscription::new(feed, |_: &ChangeEvent| {});
    let mut status = adapter.status();
    adapter
        .update(SubscriptionDescriptor::new("c", "messages"))
        .unwrap();

    tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| matches!(s, SubscriptionStatus::Failed(_))),
    )
    .await
    .unwrap()
    .unwrap();
}

#[test]
fn test_subscribe_outside_runtime_fails() {
    let feed = WsChangeFeed::new("ws://127.0.0.1:9", None);
    let request = SubscriptionDescriptor::new("c", "messages")
        .to_request()
        .unwrap();
    let (sink, _stream) = mpsc::unbounded_channel();
    assert!(feed.subscribe(request, sink).is_err());
}
