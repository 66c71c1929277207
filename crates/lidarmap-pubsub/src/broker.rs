//! WebSocket broker routing frames between clients

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::{Bytes, Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::protocol::{self, Flag, Message};

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

type ClientId = u64;

/// Per-connection state
struct ClientState {
    /// Topic prefixes this connection listens to
    subscriptions: HashSet<String>,
    /// Channel to the connection's writer task
    tx: mpsc::UnboundedSender<WsMessage>,
}

/// Shared state across all connection handlers
struct SharedState {
    clients: Mutex<HashMap<ClientId, ClientState>>,
    next_id: AtomicU64,
}

impl SharedState {
    fn clients(&self) -> MutexGuard<'_, HashMap<ClientId, ClientState>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Topic router: forwards each PUBLISH to every connection subscribed to a
/// prefix of its topic.
#[derive(Clone)]
pub struct Broker {
    state: Arc<SharedState>,
}

impl Broker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SharedState {
                clients: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Bind the listening socket without accepting yet.
    pub async fn bind(&self, addr: impl ToSocketAddrs) -> Result<BoundBroker, BrokerError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(BoundBroker {
            listener,
            state: self.state.clone(),
        })
    }

    /// Bind and serve until the process exits.
    pub async fn listen(&self, addr: impl ToSocketAddrs) -> Result<(), BrokerError> {
        self.bind(addr).await?.serve(CancellationToken::new()).await
    }

    /// Number of open client connections
    pub fn client_count(&self) -> usize {
        self.state.clients().len()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

/// A broker with a bound listener
pub struct BoundBroker {
    listener: TcpListener,
    state: Arc<SharedState>,
}

impl BoundBroker {
    pub fn local_addr(&self) -> Result<SocketAddr, BrokerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `cancel` fires, then close every connection
    /// and wait for their handlers.
    pub async fn serve(self, cancel: CancellationToken) -> Result<(), BrokerError> {
        info!("Broker listening on {}", self.local_addr()?);
        let tracker = TaskTracker::new();

        loop {
            let (stream, peer) = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted?,
            };
            debug!("Accepted connection from {}", peer);

            let state = self.state.clone();
            let cancel = cancel.clone();
            tracker.spawn(async move {
                if let Err(e) = handle_connection(stream, state, cancel).await {
                    warn!("Connection error from {}: {}", peer, e);
                }
            });
        }

        tracker.close();
        tracker.wait().await;
        info!("Broker stopped");
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<SharedState>,
    cancel: CancellationToken,
) -> Result<(), BrokerError> {
    let ws = accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    // Create channel for sending frames to this client
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    // Register client
    let client_id = state.next_id.fetch_add(1, Ordering::SeqCst);
    state.clients().insert(
        client_id,
        ClientState {
            subscriptions: HashSet::new(),
            tx,
        },
    );

    // Forward queued frames to the socket
    let forward_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = ws_rx.next() => next,
        };

        let data = match next {
            Some(Ok(WsMessage::Binary(data))) => data,
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!("Client {} read error: {}", client_id, e);
                break;
            }
        };

        match protocol::decode(&data) {
            Ok(msg) => handle_message(&state, client_id, msg),
            Err(e) => warn!("Dropping malformed frame from client {}: {}", client_id, e),
        }
    }

    // Cleanup: remove client
    state.clients().remove(&client_id);
    forward_task.abort();
    debug!("Client {} disconnected", client_id);
    Ok(())
}

fn handle_message(state: &SharedState, client_id: ClientId, msg: Message) {
    let mut clients = state.clients();

    match msg.flag {
        Flag::Subscribe => {
            if let Some(client) = clients.get_mut(&client_id) {
                debug!("Client {} SUBSCRIBE {}", client_id, msg.topic);
                client.subscriptions.insert(msg.topic);
            }
        }

        Flag::Unsubscribe => {
            if let Some(client) = clients.get_mut(&client_id) {
                debug!("Client {} UNSUBSCRIBE {}", client_id, msg.topic);
                client.subscriptions.remove(&msg.topic);
            }
        }

        Flag::Publish => {
            let frame = Bytes::from(protocol::encode(&msg));
            let mut delivered = 0;
            for client in clients.values() {
                let interested = client
                    .subscriptions
                    .iter()
                    .any(|prefix| msg.topic.starts_with(prefix.as_str()));
                if interested && client.tx.send(WsMessage::Binary(frame.clone())).is_ok() {
                    delivered += 1;
                }
            }
            debug!(
                "Client {} PUBLISH {} ({} bytes) -> {} clients",
                client_id,
                msg.topic,
                msg.payload.len(),
                delivered
            );
        }
    }
}
