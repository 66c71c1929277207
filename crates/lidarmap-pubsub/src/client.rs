//! Pub/sub client over a single WebSocket connection
//!
//! The client owns one connection to a broker, a table of topic handlers and
//! two kinds of background task:
//!
//! - a receive loop per live connection, which decodes frames and dispatches
//!   PUBLISH messages to every handler whose topic is a prefix of the message
//!   topic
//! - at most one reconnect task, started when a connect attempt fails or the
//!   receive loop ends, which retries with a fixed backoff until it succeeds
//!
//! Handlers run on the receive loop, one frame at a time. The table lock is
//! released before any handler is invoked, and a panicking handler is logged
//! without taking the loop down.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::protocol::{self, Flag, Message};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;

/// Callback invoked with the payload of each matching PUBLISH
pub type Handler = Arc<dyn Fn(&[u8]) + Send + Sync>;

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Not connected to broker")]
    NotConnected,
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
    #[error("Send failed: {0}")]
    Send(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Client is shut down")]
    Shutdown,
}

/// Broker location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub address: Address,
    /// Delay before each reconnect attempt
    pub reconnect_delay: Duration,
}

impl ClientConfig {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// State shared between the public handle and its background tasks
struct Inner {
    url: String,
    reconnect_delay: Duration,
    subscriptions: Mutex<HashMap<String, Handler>>,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    /// Serializes connect attempts from `begin` and the reconnect task
    connect_lock: tokio::sync::Mutex<()>,
    connected: AtomicBool,
    reconnecting: AtomicBool,
    scheduled_reconnects: AtomicUsize,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

/// Handle to a broker connection.
///
/// Create one per process and share it by reference (or `Arc`). Dropping the
/// handle cancels its background tasks; call [`shutdown`](Self::shutdown) to
/// also wait for them.
pub struct PubSubClient {
    inner: Arc<Inner>,
}

impl PubSubClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: config.address.url(),
                reconnect_delay: config.reconnect_delay,
                subscriptions: Mutex::new(HashMap::new()),
                sink: tokio::sync::Mutex::new(None),
                connect_lock: tokio::sync::Mutex::new(()),
                connected: AtomicBool::new(false),
                reconnecting: AtomicBool::new(false),
                scheduled_reconnects: AtomicUsize::new(0),
                cancel: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Connect and start the receive loop.
    ///
    /// On failure a reconnect is scheduled (unless one is already pending)
    /// and the error is returned for information only: the client keeps
    /// trying in the background.
    pub async fn begin(&self) -> Result<(), ClientError> {
        match self.inner.connect().await {
            Ok(()) => Ok(()),
            Err(ClientError::Shutdown) => Err(ClientError::Shutdown),
            Err(e) => {
                warn!("Failed to connect to {}: {}", self.inner.url, e);
                self.inner.schedule_reconnect();
                Err(e)
            }
        }
    }

    /// Register `handler` for every topic starting with `topic` and tell the
    /// broker. Replaces any handler already registered under `topic`.
    pub async fn subscribe<F>(
        &self,
        topic: impl Into<String>,
        handler: F,
    ) -> Result<(), ClientError>
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let topic = topic.into();
        self.inner
            .subscriptions()
            .insert(topic.clone(), Arc::new(handler));
        debug!("SUBSCRIBE {}", topic);
        self.inner.send(&Message::subscribe(topic)).await
    }

    /// Drop the handler for `topic`. Unknown topics are ignored.
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), ClientError> {
        if self.inner.subscriptions().remove(topic).is_none() {
            return Ok(());
        }
        debug!("UNSUBSCRIBE {}", topic);
        match self.inner.send(&Message::unsubscribe(topic)).await {
            // The broker forgot this connection's subscriptions when it dropped.
            Err(ClientError::NotConnected) => Ok(()),
            other => other,
        }
    }

    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(), ClientError> {
        self.inner.send(&Message::publish(topic, payload)).await
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// True while a reconnect task is alive
    pub fn is_reconnecting(&self) -> bool {
        self.inner.reconnecting.load(Ordering::SeqCst)
    }

    /// Number of reconnect tasks started over the client's lifetime
    pub fn scheduled_reconnects(&self) -> usize {
        self.inner.scheduled_reconnects.load(Ordering::SeqCst)
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.inner.subscriptions().keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Cancel pending reconnects, close the connection and wait for every
    /// background task to finish.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let sink = self.inner.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                debug!("Error closing connection to {}: {}", self.inner.url, e);
            }
        }
        self.inner.connected.store(false, Ordering::SeqCst);

        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        info!("Client for {} shut down", self.inner.url);
    }
}

impl Drop for PubSubClient {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

impl Inner {
    fn subscriptions(&self) -> MutexGuard<'_, HashMap<String, Handler>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        let _guard = self.connect_lock.lock().await;
        if self.cancel.is_cancelled() {
            return Err(ClientError::Shutdown);
        }
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }

        let (ws, _) = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ClientError::Shutdown),
            result = connect_async(self.url.as_str()) => {
                result.map_err(|e| ClientError::ConnectionLost(e.to_string()))?
            }
        };
        let (sink, stream) = ws.split();

        {
            let mut slot = self.sink.lock().await;
            if self.cancel.is_cancelled() {
                return Err(ClientError::Shutdown);
            }
            *slot = Some(sink);
            self.connected.store(true, Ordering::SeqCst);
        }
        info!("Connected to {}", self.url);

        let inner = self.clone();
        self.tasks.spawn(async move {
            inner.receive_loop(stream).await;
        });

        self.resubscribe().await;
        Ok(())
    }

    /// Re-send SUBSCRIBE for every table entry after a fresh connect.
    async fn resubscribe(&self) {
        let topics: Vec<String> = self.subscriptions().keys().cloned().collect();
        for topic in topics {
            match self.send(&Message::subscribe(topic.as_str())).await {
                Ok(()) => debug!("Restored subscription {}", topic),
                Err(e) => warn!("Failed to restore subscription {}: {}", topic, e),
            }
        }
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        if self.cancel.is_cancelled() {
            return;
        }
        if self
            .reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Reconnect to {} already pending", self.url);
            return;
        }

        self.scheduled_reconnects.fetch_add(1, Ordering::SeqCst);
        info!("Reconnecting to {} in {:?}", self.url, self.reconnect_delay);

        let inner = self.clone();
        self.tasks.spawn(async move {
            inner.reconnect_loop().await;
        });
    }

    /// Retry until connected. Only this task clears the pending flag, so at
    /// most one reconnect task is alive at a time.
    async fn reconnect_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }

            match self.connect().await {
                Ok(()) | Err(ClientError::Shutdown) => break,
                Err(e) => warn!(
                    "Reconnect to {} failed: {}; retrying in {:?}",
                    self.url, e, self.reconnect_delay
                ),
            }
        }
        self.reconnecting.store(false, Ordering::SeqCst);

        // A receive loop that ended while the flag was still set could not
        // schedule; pick that up here.
        if !self.connected.load(Ordering::SeqCst) {
            self.schedule_reconnect();
        }
    }

    async fn receive_loop(self: Arc<Self>, mut stream: SplitStream<WsStream>) {
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(WsMessage::Binary(data))) => self.dispatch(&data),
                Some(Ok(WsMessage::Close(frame))) => {
                    info!("Broker closed connection: {:?}", frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Read from {} failed: {}", self.url, e);
                    break;
                }
                None => {
                    info!("Connection to {} ended", self.url);
                    break;
                }
            }
        }

        {
            let mut slot = self.sink.lock().await;
            *slot = None;
            self.connected.store(false, Ordering::SeqCst);
        }
        self.schedule_reconnect();
    }

    fn dispatch(&self, data: &[u8]) {
        let msg = match protocol::decode(data) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Dropping malformed frame ({} bytes): {}", data.len(), e);
                return;
            }
        };
        if msg.flag != Flag::Publish {
            debug!("Ignoring {:?} frame for {}", msg.flag, msg.topic);
            return;
        }

        let handlers: Vec<Handler> = self
            .subscriptions()
            .iter()
            .filter(|(prefix, _)| msg.topic.starts_with(prefix.as_str()))
            .map(|(_, handler)| handler.clone())
            .collect();

        debug!(
            "PUBLISH {} ({} bytes) -> {} handlers",
            msg.topic,
            msg.payload.len(),
            handlers.len()
        );
        for handler in handlers {
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| handler(&msg.payload))) {
                let reason = panic
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
                    .unwrap_or("unknown panic");
                error!("Handler for {} panicked: {}", msg.topic, reason);
            }
        }
    }

    async fn send(&self, msg: &Message) -> Result<(), ClientError> {
        let mut slot = self.sink.lock().await;
        let sink = slot.as_mut().ok_or(ClientError::NotConnected)?;
        sink.send(WsMessage::Binary(protocol::encode(msg).into()))
            .await?;
        Ok(())
    }
}
