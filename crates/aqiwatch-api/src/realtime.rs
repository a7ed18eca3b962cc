//! Realtime AQI stream over a WebSocket.
//!
//! Holds at most one session at a time. [`RealtimeClient::connect`] starts a
//! session in the background and returns immediately; the outcome arrives
//! as a [`RealtimeEvent`] on the broadcast channel vended by
//! [`RealtimeClient::events`]. Parsed readings arrive on
//! [`RealtimeClient::updates`].
//!
//! The client never reconnects on its own. Whoever owns it decides when to
//! call `connect()` again.
//!
//! # Example
//!
//! ```rust,ignore
//! use aqiwatch_api::{RealtimeClient, RealtimeEvent, TransportConfig};
//! use url::Url;
//!
//! let client = RealtimeClient::new(Url::parse("wss://aqi.example.com/ws")?, &TransportConfig::default())?;
//! let mut events = client.events();
//! let mut updates = client.updates();
//! client.connect();
//!
//! if events.recv().await? == RealtimeEvent::Connected {
//!     client.subscribe_to_station("DL-ANAND-VIHAR")?;
//!     while let Ok(update) = updates.recv().await {
//!         println!("{}: {}", update.subject_id, update.aqi);
//!     }
//! }
//!
//! client.dispose();
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::transport::{SECRET_HEADER, TransportConfig};

// ── Broadcast channel capacities ─────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 64;
const UPDATE_CHANNEL_CAPACITY: usize = 1024;

// ── Public event types ───────────────────────────────────────────────

/// Lifecycle signal for the realtime session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeEvent {
    /// Handshake completed; subscriptions may be sent.
    Connected,
    /// The server closed an established session, or the stream ended.
    Disconnected,
    /// Connecting failed or an established session broke.
    Error(String),
}

/// A single AQI reading pushed by the server.
///
/// Uses `#[serde(flatten)]` to keep every field beyond the core set, so
/// nothing the server sends is silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AqiUpdate {
    /// Station id or location key the reading belongs to.
    pub subject_id: String,

    /// Index value.
    pub aqi: f64,

    /// When the value was measured.
    pub observed_at: DateTime<Utc>,

    /// All remaining fields the server sends (pollutants, station name, ...).
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

// ── Wire frames ──────────────────────────────────────────────────────

/// Frames this client sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    SubscribeLocation { lat: f64, lon: f64 },
    SubscribeStation { station_id: String },
    UnsubscribeAll,
}

/// Frames the server sends. Unknown `type`s are ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    AqiUpdate(AqiUpdate),
    Error {
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Other,
}

// ── RealtimeClient ───────────────────────────────────────────────────

/// Handle to the realtime stream. Cheaply cloneable.
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<Inner>,
}

struct Inner {
    url: Url,
    secret: Option<SecretString>,
    events_tx: broadcast::Sender<RealtimeEvent>,
    updates_tx: broadcast::Sender<Arc<AqiUpdate>>,
    session: Mutex<Option<Session>>,
    next_session: AtomicU64,
    connected: AtomicBool,
    /// Parent of every session token; cancelled once by `dispose()`.
    cancel: CancellationToken,
}

struct Session {
    id: u64,
    cancel: CancellationToken,
    outbound: mpsc::UnboundedSender<ClientFrame>,
}

impl RealtimeClient {
    /// Create a client for a `ws://` or `wss://` endpoint. Does not connect.
    pub fn new(url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::WebSocketConnect(format!(
                "unsupported scheme '{}' (expected ws or wss)",
                url.scheme()
            )));
        }

        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (updates_tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                url,
                secret: transport.secret.clone(),
                events_tx,
                updates_tx,
                session: Mutex::new(None),
                next_session: AtomicU64::new(1),
                connected: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
        })
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Start a new session, replacing any existing one.
    ///
    /// Returns immediately. Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        if self.inner.cancel.is_cancelled() {
            tracing::debug!("connect() after dispose ignored");
            return;
        }

        let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        let cancel = self.inner.cancel.child_token();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let previous = self.inner.lock_session().replace(Session {
            id,
            cancel: cancel.clone(),
            outbound,
        });
        if let Some(previous) = previous {
            tracing::debug!(session = previous.id, "replacing realtime session");
            previous.cancel.cancel();
        }
        self.inner.connected.store(false, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            run_session(inner, id, cancel, outbound_rx).await;
        });
    }

    /// Lifecycle signals. Each call returns an independent receiver.
    pub fn events(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Parsed AQI updates. Each call returns an independent receiver.
    pub fn updates(&self) -> broadcast::Receiver<Arc<AqiUpdate>> {
        self.inner.updates_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub fn subscribe_to_location(&self, lat: f64, lon: f64) -> Result<(), Error> {
        self.send_frame(ClientFrame::SubscribeLocation { lat, lon })
    }

    pub fn subscribe_to_station(&self, station_id: &str) -> Result<(), Error> {
        self.send_frame(ClientFrame::SubscribeStation {
            station_id: station_id.to_owned(),
        })
    }

    pub fn unsubscribe_all(&self) -> Result<(), Error> {
        self.send_frame(ClientFrame::UnsubscribeAll)
    }

    /// Abandon the current session or pending handshake without publishing
    /// an event. Unlike [`dispose`](Self::dispose), later connects still work.
    pub fn disconnect(&self) {
        if let Some(session) = self.inner.lock_session().take() {
            tracing::debug!(session = session.id, "realtime session abandoned");
            session.cancel.cancel();
        }
        self.inner.connected.store(false, Ordering::SeqCst);
    }

    /// Tear down the current session and refuse future connects. Idempotent.
    pub fn dispose(&self) {
        self.inner.cancel.cancel();
        self.inner.lock_session().take();
        self.inner.connected.store(false, Ordering::SeqCst);
    }

    fn send_frame(&self, frame: ClientFrame) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        let guard = self.inner.lock_session();
        let session = guard.as_ref().ok_or(Error::NotConnected)?;
        session.outbound.send(frame).map_err(|_| Error::NotConnected)
    }
}

impl Inner {
    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, id: u64) -> bool {
        self.lock_session().as_ref().is_some_and(|s| s.id == id)
    }

    /// Mark session `id` as open, unless it was superseded meanwhile.
    fn open(&self, id: u64) -> bool {
        if !self.is_current(id) {
            return false;
        }
        self.connected.store(true, Ordering::SeqCst);
        // Ignore send errors -- just means no active subscribers right now
        let _ = self.events_tx.send(RealtimeEvent::Connected);
        true
    }

    /// Close session `id` and publish its final event, unless superseded.
    fn finish(&self, id: u64, event: RealtimeEvent) {
        {
            let mut guard = self.lock_session();
            if guard.as_ref().is_none_or(|s| s.id != id) {
                return;
            }
            guard.take();
        }
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events_tx.send(event);
    }
}

// ── Single session lifecycle ─────────────────────────────────────────

/// Connect once, then pump frames until the session ends.
///
/// A cancelled session is superseded or disposed: it publishes nothing.
async fn run_session(
    inner: Arc<Inner>,
    id: u64,
    cancel: CancellationToken,
    outbound: mpsc::UnboundedReceiver<ClientFrame>,
) {
    tracing::info!(url = %inner.url, session = id, "Connecting to realtime stream");

    let request = match build_request(&inner.url, inner.secret.as_ref()) {
        Ok(r) => r,
        Err(e) => {
            inner.finish(id, RealtimeEvent::Error(e.to_string()));
            return;
        }
    };

    let connected = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        result = tokio_tungstenite::connect_async(request) => result,
    };

    let ws_stream = match connected {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::warn!(error = %e, session = id, "Realtime handshake failed");
            inner.finish(
                id,
                RealtimeEvent::Error(Error::WebSocketConnect(e.to_string()).to_string()),
            );
            return;
        }
    };

    if !inner.open(id) {
        return;
    }
    tracing::info!(session = id, "Realtime stream connected");

    let result = pump(ws_stream, &inner.updates_tx, &cancel, outbound).await;
    if cancel.is_cancelled() {
        tracing::debug!(session = id, "Realtime session cancelled");
        return;
    }

    match result {
        Ok(()) => inner.finish(id, RealtimeEvent::Disconnected),
        Err(e) => {
            tracing::warn!(error = %e, session = id, "Realtime session failed");
            inner.finish(id, RealtimeEvent::Error(e.to_string()));
        }
    }
}

fn build_request(url: &Url, secret: Option<&SecretString>) -> Result<ClientRequestBuilder, Error> {
    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(secret) = secret {
        request = request.with_header(SECRET_HEADER, secret.expose_secret());
    }
    Ok(request)
}

/// Read server frames and write queued client frames until the stream ends.
async fn pump<S>(
    ws_stream: S,
    updates_tx: &broadcast::Sender<Arc<AqiUpdate>>,
    cancel: &CancellationToken,
    mut outbound: mpsc::UnboundedReceiver<ClientFrame>,
) -> Result<(), Error>
where
    S: Stream<Item = Result<tungstenite::Message, tungstenite::Error>>
        + Sink<tungstenite::Message, Error = tungstenite::Error>
        + Unpin,
{
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.close().await;
                return Ok(());
            }
            Some(frame) = outbound.recv() => {
                let text = encode_frame(&frame)?;
                tracing::debug!(frame = %text, "Sending realtime frame");
                write
                    .send(tungstenite::Message::text(text))
                    .await
                    .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        parse_and_broadcast(text.as_str(), updates_tx);
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!("Realtime ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "Realtime close frame received"
                            );
                        } else {
                            tracing::info!("Realtime close frame received (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        tracing::info!("Realtime stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

// ── Frame encoding / parsing ─────────────────────────────────────────

fn encode_frame(frame: &ClientFrame) -> Result<String, Error> {
    serde_json::to_string(frame).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: format!("{frame:?}"),
    })
}

/// Parse a text frame and broadcast it if it carries a reading.
fn parse_and_broadcast(text: &str, updates_tx: &broadcast::Sender<Arc<AqiUpdate>>) {
    match serde_json::from_str::<ServerFrame>(text) {
        Ok(ServerFrame::AqiUpdate(update)) => {
            // Ignore send errors -- just means no active subscribers right now
            let _ = updates_tx.send(Arc::new(update));
        }
        Ok(ServerFrame::Error { message }) => {
            tracing::warn!(message = %message, "Realtime server reported an error");
        }
        Ok(ServerFrame::Other) => {
            tracing::trace!("Ignoring realtime frame of unknown type");
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to parse realtime frame");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
