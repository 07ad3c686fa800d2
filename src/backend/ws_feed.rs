//! # WebSocket Change Feed
//!
//! [`ChangeFeed`] over the realtime websocket endpoint. Each registration
//! owns one connection; the connection task pushes events and status into
//! the registration's sink until it is unsubscribed or the server goes away.
//! Nothing is retried: a failed or dropped connection is reported once as
//! [`FeedStatus::Failed`] / [`FeedStatus::Closed`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use futures_util::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::errors::{BackendError, BackendResult};
use super::feed::{
    ChangeEvent, ChangeFeed, FeedHandle, FeedMessage, FeedRequest, FeedSink, FeedStatus,
};
use super::filter::FilterExpr;
use crate::config::ClientConfig;
use crate::observability::{log_event_with_fields, Event};

/// Message sent to the realtime server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Present an access token
    Auth { token: String },

    /// Subscribe to a topic (`realtime:<schema>:<table>`)
    Subscribe {
        channel: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<FilterExpr>,
    },

    /// Unsubscribe from a topic
    Unsubscribe { channel: String },
}

/// Message received from the realtime server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Subscription confirmed
    Subscribed {
        channel: String,
        subscription_id: String,
    },

    /// Unsubscription confirmed
    Unsubscribed { channel: String },

    /// Row change
    Event { channel: String, event: ChangeEvent },

    /// Heartbeat response
    Heartbeat {
        #[serde(default)]
        ref_id: Option<String>,
        server_time: i64,
    },

    /// Error message
    Error { message: String, code: String },

    /// System message
    System { message: String },
}

/// Websocket-backed change feed
#[derive(Debug)]
pub struct WsChangeFeed {
    url: String,
    access_token: Option<String>,
    next_id: AtomicU64,
    connections: Mutex<HashMap<u64, oneshot::Sender<()>>>,
}

impl WsChangeFeed {
    pub fn new(url: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            url: url.into(),
            access_token,
            next_id: AtomicU64::new(0),
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Build from `realtime_url` / `access_token`; None without a URL
    pub fn from_config(config: &ClientConfig) -> Option<Self> {
        config
            .realtime_url
            .as_ref()
            .map(|url| Self::new(url.clone(), config.access_token.clone()))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of connections still owned by the feed
    pub fn connection_count(&self) -> usize {
        self.connections.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl ChangeFeed for WsChangeFeed {
    fn subscribe(&self, request: FeedRequest, sink: FeedSink) -> BackendResult<FeedHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| BackendError::Network("no async runtime for websocket feed".into()))?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = FeedHandle::new(id, request.channel.clone());
        let (stop_tx, stop_rx) = oneshot::channel();

        self.connections
            .lock()
            .map_err(|_| BackendError::SubscriptionRejected("connection lock poisoned".into()))?
            .insert(id, stop_tx);

        runtime.spawn(run_connection(
            self.url.clone(),
            self.access_token.clone(),
            request,
            sink,
            stop_rx,
        ));

        Ok(handle)
    }

    fn unsubscribe(&self, handle: &FeedHandle) {
        let stop = self
            .connections
            .lock()
            .ok()
            .and_then(|mut connections| connections.remove(&handle.id()));
        if let Some(stop) = stop {
            let _ = stop.send(());
        }
    }
}

async fn run_connection(
    url: String,
    token: Option<String>,
    request: FeedRequest,
    sink: FeedSink,
    mut stop: oneshot::Receiver<()>,
) {
    let outcome = drive_connection(&url, token, &request, &sink, &mut stop).await;
    match outcome {
        Ok(()) => {
            log_event_with_fields(Event::FeedClosed, &[("channel", request.channel.as_str())]);
            let _ = sink.send(FeedMessage::Status(FeedStatus::Closed));
        }
        Err(e) => {
            let error = e.to_string();
            log_event_with_fields(
                Event::FeedError,
                &[("channel", request.channel.as_str()), ("error", error.as_str())],
            );
            let _ = sink.send(FeedMessage::Status(FeedStatus::Failed(error)));
        }
    }
}

async fn drive_connection(
    url: &str,
    token: Option<String>,
    request: &FeedRequest,
    sink: &FeedSink,
    stop: &mut oneshot::Receiver<()>,
) -> BackendResult<()> {
    let (ws_stream, _) = tokio::select! {
        connected = connect_async(url) => connected.map_err(|e| {
            BackendError::Network(format!("websocket handshake failed: {}", e))
        })?,
        _ = &mut *stop => return Ok(()),
    };
    log_event_with_fields(
        Event::FeedConnected,
        &[("channel", request.channel.as_str()), ("url", url)],
    );

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    if let Some(token) = token {
        send_message(&mut ws_sender, &ClientMessage::Auth { token }).await?;
    }

    let topic = request.topic();
    send_message(
        &mut ws_sender,
        &ClientMessage::Subscribe {
            channel: topic.clone(),
            filter: request.filter.clone(),
        },
    )
    .await?;

    let mut subscribed = false;

    loop {
        tokio::select! {
            _ = &mut *stop => {
                let unsubscribe = ClientMessage::Unsubscribe { channel: topic };
                let _ = send_message(&mut ws_sender, &unsubscribe).await;
                let _ = ws_sender.close().await;
                return Ok(());
            }

            msg = ws_receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let delivered = match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(ServerMessage::Subscribed { .. }) => {
                            subscribed = true;
                            sink.send(FeedMessage::Status(FeedStatus::Subscribed)).is_ok()
                        }
                        Ok(ServerMessage::Event { event, .. }) => {
                            if request.matches(&event) {
                                sink.send(FeedMessage::Event(event)).is_ok()
                            } else {
                                true
                            }
                        }
                        Ok(ServerMessage::Error { message, code }) => {
                            if !subscribed {
                                return Err(BackendError::SubscriptionRejected(format!(
                                    "{}: {}",
                                    code, message
                                )));
                            }
                            log_event_with_fields(
                                Event::FeedError,
                                &[
                                    ("channel", request.channel.as_str()),
                                    ("code", code.as_str()),
                                    ("error", message.as_str()),
                                ],
                            );
                            true
                        }
                        Ok(_) => true,
                        Err(e) => {
                            let error = format!("invalid server message: {}", e);
                            log_event_with_fields(
                                Event::FeedError,
                                &[("channel", request.channel.as_str()), ("error", error.as_str())],
                            );
                            true
                        }
                    };

                    // Subscriber gone
                    if !delivered {
                        let _ = ws_sender.close().await;
                        return Ok(());
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    ws_sender
                        .send(Message::Pong(data))
                        .await
                        .map_err(|e| BackendError::Network(e.to_string()))?;
                }
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Err(e)) => return Err(BackendError::Network(e.to_string())),
                Some(Ok(_)) => {}
            }
        }
    }
}

async fn send_message<S>(sender: &mut S, message: &ClientMessage) -> BackendResult<()>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = serde_json::to_string(message)
        .map_err(|e| BackendError::Network(format!("failed to encode message: {}", e)))?;
    sender
        .send(Message::Text(json))
        .await
        .map_err(|e| BackendError::Network(e.to_string()))
}
