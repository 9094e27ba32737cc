//! Push Subscription Client
//!
//! One spawned task per subscription owns the WebSocket. Events reach the
//! caller through a bounded channel; the [`Subscription`] handle stops the
//! task when closed or dropped.

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::packet::{EnginePacket, PacketError, SocketPacket, ENGINE_IO_VERSION};
use crate::config::ClientConfig;
use crate::model::{ChannelId, Feed};
use crate::session::{AccessToken, Session};

/// Event the client emits to enter a channel's room
pub const JOIN_ROOM_EVENT: &str = "joinRoom";

/// Event the server emits for every new reading
pub const NEW_READING_EVENT: &str = "newFeed";

const MAX_BACKOFF_MS: u64 = 30_000;

/// Events held back while the receiver is full; the oldest go first past this
const MAX_PENDING_EVENTS: usize = 1024;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// What a subscription delivers
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// Room joined; readings follow
    Joined { channel_id: ChannelId },
    /// A new reading for the room
    Reading(Feed),
    /// Connection lost, retrying
    Reconnecting { attempt: u32 },
    /// Gave up; no further events
    Disconnected { reason: String },
}

/// Errors that end one push connection
#[derive(Error, Debug)]
pub enum PushError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Push connection timed out")]
    Timeout,

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Connection rejected: {0}")]
    Rejected(String),

    #[error("Protocol error: {0}")]
    Packet(#[from] PacketError),

    #[error("Connection closed by server")]
    ServerClosed,
}

/// Result type for push operations
pub type PushResult<T> = Result<T, PushError>;

/// Factory for channel subscriptions
#[derive(Debug, Clone)]
pub struct PushClient {
    endpoint: String,
    connect_timeout: Duration,
    max_reconnect_attempts: u32,
    event_buffer: usize,
}

impl PushClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            endpoint: websocket_endpoint(&config.push_base_url),
            connect_timeout: config.connect_timeout,
            max_reconnect_attempts: config.max_reconnect_attempts,
            event_buffer: config.event_buffer.max(1),
        }
    }

    /// Full WebSocket URL, including the Engine.IO query
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Join `channel_id`'s room in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self, session: &Session, channel_id: &ChannelId) -> Subscription {
        let (events_tx, events_rx) = mpsc::channel(self.event_buffer);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let worker = Worker {
            endpoint: self.endpoint.clone(),
            channel_id: channel_id.clone(),
            token: session.token().cloned(),
            connect_timeout: self.connect_timeout,
            max_reconnect_attempts: self.max_reconnect_attempts,
            events: events_tx,
        };

        tracing::info!(channel_id = %channel_id, endpoint = %self.endpoint, "Subscribing to push channel");
        let task = tokio::spawn(worker.run(shutdown_rx));

        Subscription {
            channel_id: channel_id.clone(),
            events: events_rx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
            closed: false,
        }
    }
}

/// `http(s)://host` → `ws(s)://host/socket.io/?EIO=4&transport=websocket`
fn websocket_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!(
        "{}/socket.io/?EIO={}&transport=websocket",
        ws_base, ENGINE_IO_VERSION
    )
}

fn backoff(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    Duration::from_millis((1000u64 << exp).min(MAX_BACKOFF_MS))
}

/// Cancellable handle to one room subscription
pub struct Subscription {
    channel_id: ChannelId,
    events: mpsc::Receiver<PushEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    closed: bool,
}

impl Subscription {
    /// Wrap an event source that is not a socket (replays, other transports)
    pub fn from_receiver(channel_id: ChannelId, events: mpsc::Receiver<PushEvent>) -> Self {
        Self {
            channel_id,
            events,
            shutdown: None,
            task: None,
            closed: false,
        }
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// True once cancelled, given up (`Disconnected`) or ended
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Next event, or `None` once the subscription is closed or the source ends
    pub async fn next(&mut self) -> Option<PushEvent> {
        if self.closed {
            return None;
        }
        let event = self.events.recv().await;
        self.observe(event.as_ref());
        event
    }

    /// Non-blocking variant of [`next`](Self::next)
    pub fn try_next(&mut self) -> Option<PushEvent> {
        if self.closed {
            return None;
        }
        match self.events.try_recv() {
            Ok(event) => {
                self.observe(Some(&event));
                Some(event)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                None
            }
        }
    }

    fn observe(&mut self, event: Option<&PushEvent>) {
        if matches!(event, None | Some(PushEvent::Disconnected { .. })) {
            self.closed = true;
        }
    }

    /// Leave the room and wait for the connection to shut down
    pub async fn close(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn cancel(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.events.close();
        if !std::mem::replace(&mut self.closed, true) {
            tracing::debug!(channel_id = %self.channel_id, "Push subscription cancelled");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel_id", &self.channel_id)
            .field("closed", &self.closed)
            .finish()
    }
}

struct Worker {
    endpoint: String,
    channel_id: ChannelId,
    token: Option<AccessToken>,
    connect_timeout: Duration,
    max_reconnect_attempts: u32,
    events: mpsc::Sender<PushEvent>,
}

impl Worker {
    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let mut attempt: u32 = 0;
        let mut backlog = Backlog::default();

        loop {
            let error = match self.session(&mut shutdown, &mut attempt, &mut backlog).await {
                Ok(()) => return,
                Err(e) => e,
            };

            // Socket is gone, so waiting on the receiver no longer stalls it
            if !self.flush(&mut backlog).await {
                return;
            }

            let reason = error.to_string();
            if matches!(error, PushError::Rejected(_)) {
                tracing::warn!(channel_id = %self.channel_id, reason = %reason, "Push connection rejected");
                let _ = self.events.send(PushEvent::Disconnected { reason }).await;
                return;
            }

            attempt += 1;
            if attempt > self.max_reconnect_attempts {
                tracing::warn!(channel_id = %self.channel_id, reason = %reason, "Push channel lost, giving up");
                let _ = self.events.send(PushEvent::Disconnected { reason }).await;
                return;
            }

            tracing::warn!(
                channel_id = %self.channel_id,
                attempt,
                reason = %reason,
                "Push channel lost, reconnecting"
            );
            if self
                .events
                .send(PushEvent::Reconnecting { attempt })
                .await
                .is_err()
            {
                return;
            }

            tokio::select! {
                _ = &mut shutdown => return,
                _ = tokio::time::sleep(backoff(attempt)) => {}
            }
        }
    }

    /// One connection. `Ok` means stop for good (closed by the owner);
    /// `Err` means the connection was lost and may be retried.
    ///
    /// Events queue up in `backlog` while the receiver is full so pings keep
    /// being answered.
    async fn session(
        &self,
        shutdown: &mut oneshot::Receiver<()>,
        attempt: &mut u32,
        backlog: &mut Backlog,
    ) -> PushResult<()> {
        let connect = tokio::time::timeout(self.connect_timeout, connect_async(self.endpoint.as_str()));
        let stream = tokio::select! {
            _ = &mut *shutdown => return Ok(()),
            result = connect => match result {
                Ok(Ok((stream, _))) => stream,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(PushError::Timeout),
            },
        };
        tracing::debug!(channel_id = %self.channel_id, "WebSocket connected");

        let (mut write, mut read) = stream.split();
        // Until the open packet tells us the ping cadence
        let mut idle_limit = self.connect_timeout;
        let mut deadline = Instant::now() + idle_limit;
        let mut handshaken = false;

        loop {
            let next = tokio::select! {
                _ = &mut *shutdown => {
                    let _ = send(&mut write, EnginePacket::Message(SocketPacket::disconnect())).await;
                    let _ = write.send(Message::Close(None)).await;
                    tracing::info!(channel_id = %self.channel_id, "Push subscription closed");
                    return Ok(());
                }
                permit = self.events.reserve(), if !backlog.is_empty() => {
                    let Ok(permit) = permit else {
                        return Ok(());
                    };
                    if let Some(event) = backlog.pop() {
                        permit.send(event);
                    }
                    continue;
                }
                next = tokio::time::timeout_at(deadline, read.next()) => next,
            };
            deadline = Instant::now() + idle_limit;

            let message = match next {
                Err(_) => return Err(PushError::Timeout),
                Ok(None) => return Err(PushError::ServerClosed),
                Ok(Some(Err(e))) => return Err(e.into()),
                Ok(Some(Ok(message))) => message,
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => return Err(PushError::ServerClosed),
                _ => continue,
            };

            let packet = match EnginePacket::decode(&text) {
                Ok(packet) => packet,
                Err(e) => {
                    tracing::warn!(channel_id = %self.channel_id, error = %e, "Ignoring undecodable push packet");
                    continue;
                }
            };

            match packet {
                EnginePacket::Open(handshake) => {
                    idle_limit =
                        Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
                    deadline = Instant::now() + idle_limit;
                    handshaken = true;
                    let auth = self
                        .token
                        .as_ref()
                        .map(|token| json!({ "token": token.as_str() }));
                    send(&mut write, EnginePacket::Message(SocketPacket::connect(auth))).await?;
                }
                EnginePacket::Ping(data) => {
                    send(&mut write, EnginePacket::Pong(data)).await?;
                }
                EnginePacket::Close => return Err(PushError::ServerClosed),
                EnginePacket::Message(packet) => {
                    if !handshaken {
                        return Err(PushError::Handshake(
                            "message received before open packet".into(),
                        ));
                    }
                    let Some(event) = self.on_socket_packet(packet, &mut write, attempt).await?
                    else {
                        continue;
                    };
                    if !self.deliver(backlog, event) {
                        return Ok(());
                    }
                }
                EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
            }
        }
    }

    /// The event a Socket.IO packet produces, if any
    async fn on_socket_packet(
        &self,
        packet: SocketPacket,
        write: &mut WsSink,
        attempt: &mut u32,
    ) -> PushResult<Option<PushEvent>> {
        match packet {
            SocketPacket::Connect { .. } => {
                let join = SocketPacket::event(
                    JOIN_ROOM_EVENT,
                    json!({ "channelId": self.channel_id.as_str() }),
                );
                send(write, EnginePacket::Message(join)).await?;
                *attempt = 0;
                tracing::info!(channel_id = %self.channel_id, "Joined push room");
                Ok(Some(PushEvent::Joined {
                    channel_id: self.channel_id.clone(),
                }))
            }
            SocketPacket::ConnectError { data, .. } => {
                let message = data
                    .as_ref()
                    .and_then(|d| d.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("connection refused")
                    .to_string();
                Err(PushError::Rejected(message))
            }
            SocketPacket::Disconnect { .. } => Err(PushError::ServerClosed),
            SocketPacket::Event { name, args, .. } if name == NEW_READING_EVENT => {
                let Some(payload) = args.into_iter().next() else {
                    tracing::warn!(channel_id = %self.channel_id, "Reading event without payload");
                    return Ok(None);
                };
                match serde_json::from_value::<Feed>(payload) {
                    Ok(feed) => {
                        tracing::debug!(channel_id = %self.channel_id, feed_id = %feed.id, "Reading pushed");
                        Ok(Some(PushEvent::Reading(feed)))
                    }
                    Err(e) => {
                        tracing::warn!(channel_id = %self.channel_id, error = %e, "Ignoring malformed reading");
                        Ok(None)
                    }
                }
            }
            SocketPacket::Event { name, .. } => {
                tracing::debug!(channel_id = %self.channel_id, event = %name, "Ignoring push event");
                Ok(None)
            }
            SocketPacket::Ack { .. } => Ok(None),
        }
    }

    /// Hand `event` to the receiver without waiting. Returns `false` when the
    /// receiver is gone.
    fn deliver(&self, backlog: &mut Backlog, event: PushEvent) -> bool {
        let event = if backlog.is_empty() {
            match self.events.try_send(event) {
                Ok(()) => return true,
                Err(TrySendError::Closed(_)) => return false,
                Err(TrySendError::Full(event)) => event,
            }
        } else {
            event
        };
        backlog.push(event, &self.channel_id);
        true
    }

    /// Wait for the receiver to take everything held back
    async fn flush(&self, backlog: &mut Backlog) -> bool {
        while let Some(event) = backlog.pop() {
            if self.events.send(event).await.is_err() {
                return false;
            }
        }
        true
    }
}

#[derive(Default)]
struct Backlog {
    events: VecDeque<PushEvent>,
    dropped: u64,
}

impl Backlog {
    fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn pop(&mut self) -> Option<PushEvent> {
        self.events.pop_front()
    }

    fn push(&mut self, event: PushEvent, channel_id: &ChannelId) {
        if self.events.len() >= MAX_PENDING_EVENTS {
            self.events.pop_front();
            self.dropped += 1;
            tracing::warn!(
                channel_id = %channel_id,
                dropped = self.dropped,
                "Push receiver lagging, dropped oldest event"
            );
        }
        self.events.push_back(event);
    }
}

async fn send(write: &mut WsSink, packet: EnginePacket) -> PushResult<()> {
    write.send(Message::Text(packet.encode())).await?;
    Ok(())
}
