//! Connection Supervisor: the single WebSocket link to the server
//!
//! Owns the connection lifecycle: handshake with bearer credentials,
//! heartbeat, inbound dispatch, outbound serialization and the reconnect
//! policy.
//!
//! # Architecture
//!
//! ```text
//!                      ┌──────────────┐  text frames   ┌─────────────┐
//! Outbound::send ────▸ │ writer task  │ ─────────────▸ │             │
//! heartbeat task ────▸ │ (sole sink)  │                │   Server    │
//! handler tasks ─────▸ └──────────────┘                │             │
//!        ▲                                             │             │
//!        │ Reply         ┌──────────────┐  text frames │             │
//!        └───────────────│ reader loop  │ ◂─────────── │             │
//!          RequestRouter └──────────────┘              └─────────────┘
//! ```
//!
//! - Every inbound request runs on its own task; replies go out in
//!   completion order, correlated by `requestId` only
//! - A reply is sent only on the connection its request arrived on
//! - Close code 1008 means the credentials were rejected: no retry until the
//!   caller connects again
//! - Any other unexpected close schedules one reconnect after a fixed delay

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request as HandshakeRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use super::state::{ConnectionState, ConnectionStateMachine};
use crate::config::AgentConfig;
use crate::protocol::{Envelope, MessageType};
use crate::router::{Reply, RequestRouter};

/// Close code the server uses to reject credentials.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

const CLOSE_NORMAL: u16 = 1000;

/// How long `disconnect()` waits for the socket to wind down.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection is not open")]
    TransportClosed,

    #[error("Credentials rejected by server")]
    CredentialRejected,

    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Endpoint and timing for the connection.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub url: String,
    pub token: String,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    /// Pause between consecutive `FILE_CHUNK` frames
    pub chunk_pacing: Duration,
}

impl ConnectionSettings {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(60),
            chunk_pacing: Duration::from_millis(10),
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            url: config.server_url.clone(),
            token: config.token.clone(),
            heartbeat_interval: Duration::from_secs(config.connection.heartbeat_interval_seconds),
            reconnect_delay: Duration::from_secs(config.connection.reconnect_delay_seconds),
            chunk_pacing: Duration::from_millis(config.connection.chunk_pacing_millis),
        }
    }
}

/// The live (or starting) connection.
struct Link {
    generation: u64,
    /// `None` until the handshake completes, and again once closing starts
    writer: Option<mpsc::UnboundedSender<Message>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

struct Inner {
    settings: Mutex<ConnectionSettings>,
    machine: Mutex<ConnectionStateMachine>,
    router: RequestRouter,
    generation: AtomicU64,
    /// Lock order: `link` before `machine`.
    link: Mutex<Option<Link>>,
    reconnect: Mutex<Option<CancellationToken>>,
}

impl Inner {
    /// Queue `envelope` on connection `generation`, if it is still the open one.
    fn send_on(&self, generation: Option<u64>, envelope: &Envelope) -> Result<(), ConnectionError> {
        let text = envelope
            .encode()
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;

        let link = self.link.lock();
        let writer = link
            .as_ref()
            .filter(|link| generation.map_or(true, |g| g == link.generation))
            .and_then(|link| link.writer.as_ref())
            .ok_or(ConnectionError::TransportClosed)?;

        writer
            .send(Message::Text(text.into()))
            .map_err(|_| ConnectionError::TransportClosed)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.link
            .lock()
            .as_ref()
            .is_some_and(|link| link.generation == generation)
    }
}

/// Clone-able handle for pushing envelopes on whatever connection is open.
#[derive(Clone)]
pub struct Outbound {
    inner: Arc<Inner>,
}

impl Outbound {
    /// Queue a frame. Fails with `TransportClosed` when no connection is open.
    pub fn send(&self, envelope: Envelope) -> Result<(), ConnectionError> {
        self.inner.send_on(None, &envelope)
    }

    pub fn is_open(&self) -> bool {
        self.inner.machine.lock().state() == ConnectionState::Open
    }
}

/// Owns the server connection and its lifecycle.
pub struct ConnectionSupervisor {
    inner: Arc<Inner>,
}

impl ConnectionSupervisor {
    pub fn new(settings: ConnectionSettings, router: RequestRouter) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings: Mutex::new(settings),
                machine: Mutex::new(ConnectionStateMachine::new()),
                router,
                generation: AtomicU64::new(0),
                link: Mutex::new(None),
                reconnect: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.machine.lock().state()
    }

    /// Error that ended the most recent connection
    pub fn last_error(&self) -> Option<ConnectionError> {
        self.inner.machine.lock().last_error().cloned()
    }

    pub fn outbound(&self) -> Outbound {
        Outbound {
            inner: self.inner.clone(),
        }
    }

    /// New URL/token, used from the next connection attempt on.
    pub fn update_endpoint(&self, url: impl Into<String>, token: impl Into<String>) {
        let mut settings = self.inner.settings.lock();
        settings.url = url.into();
        settings.token = token.into();
    }

    /// Start connecting. No-op while connecting or open.
    ///
    /// Also the way out of a credential rejection.
    pub fn connect(&self) {
        start_connection(&self.inner);
    }

    /// Close with normal closure and wait for the link to wind down.
    ///
    /// Cancels any pending reconnect; never triggers one.
    pub async fn disconnect(&self) {
        cancel_reconnect(&self.inner);

        let task = {
            let mut link = self.inner.link.lock();
            let Some(link) = link.as_mut() else {
                return;
            };
            if let Err(e) = self.inner.machine.lock().start_closing() {
                debug!("[supervisor] {}", e);
            }
            if let Some(writer) = link.writer.take() {
                let _ = writer.send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: "Agent disconnecting".into(),
                })));
            }
            link.cancel.cancel();
            link.task.take()
        };

        info!("[supervisor] Disconnecting");
        if let Some(task) = task {
            if tokio::time::timeout(DISCONNECT_TIMEOUT, task).await.is_err() {
                warn!("[supervisor] Connection task did not stop in time");
            }
        }
    }
}

fn start_connection(inner: &Arc<Inner>) {
    let mut link = inner.link.lock();
    {
        let mut machine = inner.machine.lock();
        if machine.state() != ConnectionState::Disconnected {
            debug!("[supervisor] connect() ignored while {}", machine.state());
            return;
        }
        if let Err(e) = machine.start_connecting() {
            warn!("[supervisor] {}", e);
            return;
        }
    }
    cancel_reconnect(inner);

    let generation = inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_connection(inner.clone(), generation, cancel.clone()));

    *link = Some(Link {
        generation,
        writer: None,
        cancel,
        task: Some(task),
    });
}

fn cancel_reconnect(inner: &Inner) {
    if let Some(pending) = inner.reconnect.lock().take() {
        pending.cancel();
    }
}

fn schedule_reconnect(inner: &Arc<Inner>) {
    let delay = inner.settings.lock().reconnect_delay;
    let token = CancellationToken::new();
    if let Some(previous) = inner.reconnect.lock().replace(token.clone()) {
        previous.cancel();
    }

    info!("[supervisor] Reconnecting in {}s", delay.as_secs_f32());
    let weak = Arc::downgrade(inner);
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(delay) => {
                if let Some(inner) = weak.upgrade() {
                    info!("[supervisor] Attempting reconnection...");
                    start_connection(&inner);
                }
            }
        }
    });
}

/// Why the reader loop stopped.
enum Ending {
    /// `disconnect()` was called
    Requested,
    Closed(Option<(u16, String)>),
    Failed(ConnectionError),
}

async fn run_connection(inner: Arc<Inner>, generation: u64, cancel: CancellationToken) {
    let settings = inner.settings.lock().clone();
    let ending = tokio::select! {
        _ = cancel.cancelled() => Ending::Requested,
        ending = serve(&inner, &settings, generation, &cancel) => ending,
    };
    cancel.cancel();

    let reconnect = {
        let mut link = inner.link.lock();
        if link.as_ref().map(|l| l.generation) != Some(generation) {
            return;
        }
        *link = None;

        let (error, reconnect) = match ending {
            Ending::Requested => {
                info!("[supervisor] Disconnected");
                (None, false)
            }
            Ending::Closed(Some((CLOSE_POLICY_VIOLATION, reason))) => {
                error!(
                    "[supervisor] Server rejected credentials ({}). Check the token and reconnect manually.",
                    reason
                );
                (Some(ConnectionError::CredentialRejected), false)
            }
            Ending::Failed(ConnectionError::CredentialRejected) => {
                error!("[supervisor] Server rejected credentials during handshake. Check the token and reconnect manually.");
                (Some(ConnectionError::CredentialRejected), false)
            }
            Ending::Failed(e @ ConnectionError::InvalidUrl(_)) => {
                error!("[supervisor] {}", e);
                (Some(e), false)
            }
            Ending::Closed(Some((CLOSE_NORMAL, reason))) => {
                info!("[supervisor] Server closed the connection: {}", reason);
                (None, false)
            }
            Ending::Closed(frame) => {
                let detail = match frame {
                    Some((code, reason)) => format!("code {}: {}", code, reason),
                    None => "no close frame".to_string(),
                };
                warn!("[supervisor] Connection closed ({})", detail);
                (Some(ConnectionError::TransportClosed), true)
            }
            Ending::Failed(e) => {
                warn!("[supervisor] Connection lost: {}", e);
                (Some(e), true)
            }
        };

        if let Err(e) = inner.machine.lock().closed(error) {
            debug!("[supervisor] {}", e);
        }
        reconnect
    };

    if reconnect {
        schedule_reconnect(&inner);
    }
}

/// Handshake, then pump frames until the link ends.
async fn serve(
    inner: &Arc<Inner>,
    settings: &ConnectionSettings,
    generation: u64,
    cancel: &CancellationToken,
) -> Ending {
    let request = match build_request(&settings.url, &settings.token) {
        Ok(request) => request,
        Err(e) => return Ending::Failed(e),
    };

    info!("[supervisor] Connecting to {}", settings.url);
    let ws = match tokio_tungstenite::connect_async(request).await {
        Ok((ws, _response)) => ws,
        Err(WsError::Http(response))
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            return Ending::Failed(ConnectionError::CredentialRejected);
        }
        Err(e) => return Ending::Failed(ConnectionError::Transport(e.to_string())),
    };

    let (mut sink, mut stream) = ws.split();
    let (write_tx, mut write_rx) = mpsc::unbounded_channel::<Message>();

    {
        let mut link = inner.link.lock();
        let Some(link) = link.as_mut().filter(|l| l.generation == generation) else {
            return Ending::Requested;
        };
        link.writer = Some(write_tx);
        if let Err(e) = inner.machine.lock().open() {
            warn!("[supervisor] {}", e);
            return Ending::Requested;
        }
    }
    info!("[supervisor] Connected to {}", settings.url);

    // Writer: the only task that touches the sink. Exits after sending a
    // close frame or once every sender is gone.
    tokio::spawn(async move {
        while let Some(message) = write_rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if let Err(e) = sink.send(message).await {
                debug!("[supervisor] Write failed: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
        debug!("[supervisor] Writer task ended");
    });

    spawn_heartbeat(inner.clone(), generation, settings.heartbeat_interval, cancel.clone());

    loop {
        let Some(frame) = stream.next().await else {
            return Ending::Failed(ConnectionError::Transport("stream ended".to_string()));
        };
        match frame {
            Ok(Message::Text(text)) => on_text(inner, generation, &text),
            Ok(Message::Close(frame)) => {
                return Ending::Closed(frame.map(|f| (u16::from(f.code), f.reason.to_string())));
            }
            Ok(Message::Binary(_)) => debug!("[supervisor] Ignoring binary frame"),
            Ok(_) => {}
            Err(e) => return Ending::Failed(ConnectionError::Transport(e.to_string())),
        }
    }
}

fn spawn_heartbeat(inner: Arc<Inner>, generation: u64, period: Duration, cancel: CancellationToken) {
    // interval_at panics on a zero period
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if inner.send_on(Some(generation), &Envelope::heartbeat()).is_err() {
                        break;
                    }
                    debug!("[supervisor] Heartbeat sent");
                }
            }
        }
    });
}

fn on_text(inner: &Arc<Inner>, generation: u64, text: &str) {
    let envelope = match Envelope::decode(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("[supervisor] Dropping frame: {}", e);
            return;
        }
    };

    match envelope.message_type() {
        MessageType::Welcome => {
            info!(
                "[supervisor] Server welcome: {}",
                envelope.data.unwrap_or_default()
            );
        }
        kind if kind.is_informational() => debug!("[supervisor] {} received", kind.as_tag()),
        _ => {
            let inner = inner.clone();
            tokio::spawn(async move {
                let reply = inner.router.dispatch(envelope).await;
                send_reply(&inner, generation, reply).await;
            });
        }
    }
}

async fn send_reply(inner: &Inner, generation: u64, reply: Reply) {
    match reply {
        Reply::None => {}
        Reply::Single(envelope) => {
            if let Err(e) = inner.send_on(Some(generation), &envelope) {
                debug!(
                    "[supervisor] Discarding reply for {:?}: {}",
                    envelope.request_id, e
                );
            }
        }
        Reply::Chunked { request_id, chunks } => {
            let pacing = inner.settings.lock().chunk_pacing;
            for chunk in chunks {
                let is_last = chunk.is_last;
                let envelope = chunk.into_envelope(&request_id);
                if inner.send_on(Some(generation), &envelope).is_err() {
                    debug!("[supervisor] Connection gone, aborting chunks for {}", request_id);
                    return;
                }
                if !is_last && !pacing.is_zero() {
                    tokio::time::sleep(pacing).await;
                    if !inner.is_current(generation) {
                        return;
                    }
                }
            }
        }
    }
}

/// Handshake request carrying the token as a bearer header and as a `token`
/// query parameter.
fn build_request(url: &str, token: &str) -> Result<HandshakeRequest, ConnectionError> {
    let mut endpoint = Url::parse(url).map_err(|e| ConnectionError::InvalidUrl(e.to_string()))?;
    endpoint.query_pairs_mut().append_pair("token", token);

    let mut request = endpoint
        .as_str()
        .into_client_request()
        .map_err(|e| ConnectionError::InvalidUrl(e.to_string()))?;
    let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| ConnectionError::InvalidUrl("token is not a valid header value".to_string()))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);
    Ok(request)
}
