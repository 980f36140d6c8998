//! Transport handle
//!
//! Owns at most one duplex connection to the editing server. `connect` is
//! idempotent: while a connection exists it is returned unchanged, even if
//! a different token is passed. `disconnect` clears the handle so the next
//! `connect` starts a fresh connection.
//!
//! The WebSocket implementation keeps the connection alive on its own,
//! reconnecting with exponential backoff until it is told to stop or the
//! server rejects the token.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::message::{ClientMessage, ProtocolError, ServerMessage};
use crate::token::AccessToken;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors handing a frame to the transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("No connection")]
    NotConnected,

    #[error("Connection task has stopped")]
    Closed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Lifecycle and message events delivered to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A connection attempt started
    Connecting,
    /// The server accepted the connection
    Connected,
    /// The connection dropped or an attempt failed; the transport retries
    Disconnected { reason: Option<String> },
    /// The server refused the token; the transport stops retrying
    Rejected { reason: String },
    /// A decoded frame from the server
    Message(ServerMessage),
}

/// Result of `Transport::connect`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new connection was started
    Created,
    /// A connection already existed and was kept as is
    Existing,
}

/// Identity of the current connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: String,
    pub url: String,
}

/// Handle returned by `subscribe`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Duplex channel to the editing server
pub trait Transport {
    /// Start a connection unless one already exists
    fn connect(&mut self, token: &AccessToken) -> ConnectOutcome;

    /// Tear down the connection and forget it
    fn disconnect(&mut self);

    /// The current connection, if any
    fn connection(&self) -> Option<&ConnectionInfo>;

    /// Send a message over the current connection
    fn emit(&mut self, message: ClientMessage) -> Result<(), TransportError>;

    /// Register for transport events
    fn subscribe(&mut self) -> Subscription;

    /// Remove a registration; returns whether it existed
    fn unsubscribe(&mut self, id: ListenerId) -> bool;
}

/// Receiving end of a subscription
#[derive(Debug)]
pub struct Subscription {
    id: ListenerId,
    receiver: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Subscription {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Next event; `None` once unsubscribed
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Debug, Default)]
struct ListenerTable {
    next_id: u64,
    senders: HashMap<ListenerId, mpsc::UnboundedSender<TransportEvent>>,
}

/// Registry fanning transport events out to subscribers
#[derive(Debug, Clone, Default)]
pub struct Listeners {
    inner: Arc<Mutex<ListenerTable>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, ListenerTable> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, receiver) = mpsc::unbounded_channel();
        let mut table = self.table();
        table.next_id += 1;
        let id = ListenerId(table.next_id);
        table.senders.insert(id, tx);
        Subscription { id, receiver }
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.table().senders.remove(&id).is_some()
    }

    /// Deliver to every live subscriber, pruning dropped ones
    pub fn broadcast(&self, event: TransportEvent) {
        self.table()
            .senders
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.table().senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Configuration for the WebSocket transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// WebSocket URL
    pub url: String,
    /// Initial reconnect delay
    pub initial_reconnect_delay: Duration,
    /// Maximum reconnect delay
    pub max_reconnect_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3000".to_string(),
            initial_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

struct Connection {
    info: ConnectionInfo,
    outgoing: mpsc::UnboundedSender<String>,
    shutdown: oneshot::Sender<()>,
}

/// WebSocket transport
///
/// Each connection runs on its own task. Dropping the handle stops it.
pub struct WsTransport {
    config: TransportConfig,
    connection: Option<Connection>,
    listeners: Listeners,
}

impl WsTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            connection: None,
            listeners: Listeners::new(),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

impl Transport for WsTransport {
    fn connect(&mut self, token: &AccessToken) -> ConnectOutcome {
        if let Some(existing) = &self.connection {
            debug!(
                connection = %existing.info.id,
                "Connection already exists, keeping its token"
            );
            return ConnectOutcome::Existing;
        }

        let info = ConnectionInfo {
            id: format!("geditor-{}", &uuid::Uuid::new_v4().to_string()[..8]),
            url: self.config.url.clone(),
        };
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();

        info!(connection = %info.id, "Opening connection to {}", info.url);
        tokio::spawn(connection_loop(
            self.config.clone(),
            token.clone(),
            info.id.clone(),
            outgoing_rx,
            shutdown_rx,
            self.listeners.clone(),
        ));

        self.connection = Some(Connection {
            info,
            outgoing,
            shutdown,
        });
        ConnectOutcome::Created
    }

    fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            info!(connection = %connection.info.id, "Closing connection");
            let _ = connection.shutdown.send(());
        }
    }

    fn connection(&self) -> Option<&ConnectionInfo> {
        self.connection.as_ref().map(|c| &c.info)
    }

    fn emit(&mut self, message: ClientMessage) -> Result<(), TransportError> {
        let connection = self.connection.as_ref().ok_or(TransportError::NotConnected)?;
        let frame = message.encode()?;
        connection
            .outgoing
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }

    fn subscribe(&mut self) -> Subscription {
        self.listeners.subscribe()
    }

    fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }
}

/// Why an attempt to open the socket failed
enum OpenError {
    /// Worth retrying
    Failed(String),
    /// The server (or our own input) rules out a retry
    Rejected(String),
}

/// Why a live connection ended
enum PumpExit {
    Shutdown,
    Closed(Option<String>),
}

/// Connection task with reconnection
///
/// Frames are only queued for the socket they were sent against. Whatever
/// is still queued when a socket dies, or is sent while the task waits to
/// reconnect, is dropped rather than replayed on the next socket.
async fn connection_loop(
    config: TransportConfig,
    token: AccessToken,
    connection_id: String,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    mut shutdown: oneshot::Receiver<()>,
    listeners: Listeners,
) {
    let mut reconnect_delay = config.initial_reconnect_delay;
    let mut lost_connection = false;

    loop {
        listeners.broadcast(TransportEvent::Connecting);

        let attempt = tokio::select! {
            result = open_socket(&config.url, &token) => result,
            _ = &mut shutdown => {
                debug!(connection = %connection_id, "Shutdown while connecting");
                return;
            }
        };

        match attempt {
            Ok(ws) => {
                info!(connection = %connection_id, "Connected to {}", config.url);
                if lost_connection {
                    discard_queued(&mut outgoing, &connection_id);
                }
                // Connection established, reset backoff
                reconnect_delay = config.initial_reconnect_delay;
                listeners.broadcast(TransportEvent::Connected);

                match pump(ws, &mut outgoing, &mut shutdown, &listeners).await {
                    PumpExit::Shutdown => {
                        debug!(connection = %connection_id, "Connection closed by client");
                        return;
                    }
                    PumpExit::Closed(reason) => {
                        warn!(
                            connection = %connection_id,
                            "Connection lost: {}",
                            reason.as_deref().unwrap_or("closed by server")
                        );
                        lost_connection = true;
                        discard_queued(&mut outgoing, &connection_id);
                        listeners.broadcast(TransportEvent::Disconnected { reason });
                    }
                }
            }
            Err(OpenError::Rejected(reason)) => {
                warn!(connection = %connection_id, "Connection rejected: {}", reason);
                listeners.broadcast(TransportEvent::Rejected { reason });
                return;
            }
            Err(OpenError::Failed(reason)) => {
                warn!(connection = %connection_id, "Connection attempt failed: {}", reason);
                lost_connection = true;
                discard_queued(&mut outgoing, &connection_id);
                listeners.broadcast(TransportEvent::Disconnected {
                    reason: Some(reason),
                });
            }
        }

        // Wait before reconnecting, but check for shutdown
        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {
                // Exponential backoff
                reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay);
            }
            _ = &mut shutdown => return,
        }
    }
}

/// Drop frames that never reached a live socket
fn discard_queued(outgoing: &mut mpsc::UnboundedReceiver<String>, connection_id: &str) {
    let mut dropped = 0;
    while outgoing.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        debug!(connection = %connection_id, "Dropped {} unsent frames", dropped);
    }
}

/// Open the WebSocket with the bearer token
async fn open_socket(url: &str, token: &AccessToken) -> Result<WsStream, OpenError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| OpenError::Rejected(format!("invalid server URL '{}': {}", url, e)))?;
    let header = HeaderValue::from_str(&token.bearer())
        .map_err(|_| OpenError::Rejected("access token is not a valid header value".to_string()))?;
    request.headers_mut().insert(AUTHORIZATION, header);

    match connect_async(request).await {
        Ok((ws, _response)) => Ok(ws),
        Err(WsError::Http(response)) if is_auth_failure(response.status()) => Err(
            OpenError::Rejected(format!("server answered HTTP {}", response.status())),
        ),
        Err(e) => Err(OpenError::Failed(e.to_string())),
    }
}

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// Move frames both ways until the connection ends
async fn pump(
    ws: WsStream,
    outgoing: &mut mpsc::UnboundedReceiver<String>,
    shutdown: &mut oneshot::Receiver<()>,
    listeners: &Listeners,
) -> PumpExit {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            _ = &mut *shutdown => {
                write.close().await.ok();
                return PumpExit::Shutdown;
            }

            frame = outgoing.recv() => {
                match frame {
                    Some(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            return PumpExit::Closed(Some(e.to_string()));
                        }
                    }
                    None => {
                        // Handle dropped
                        write.close().await.ok();
                        return PumpExit::Shutdown;
                    }
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => deliver(&text, listeners),
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => deliver(&text, listeners),
                        Err(_) => warn!("Skipping non UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        return PumpExit::Closed(frame.map(|f| f.reason.to_string()));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return PumpExit::Closed(Some(e.to_string())),
                    None => return PumpExit::Closed(None),
                }
            }
        }
    }
}

fn deliver(text: &str, listeners: &Listeners) {
    match ServerMessage::decode(text) {
        Ok(message) => listeners.broadcast(TransportEvent::Message(message)),
        Err(e) => warn!("Skipping undecodable frame: {}", e),
    }
}
