// Auto-reconnecting WebSocket session to the relay.
//
// One driver task owns the socket. Callers talk to it through a bounded
// outbound queue and observe it through a `watch` of the connection state.

use crate::domain::{PublishOutcome, Role, ScanEvent, ScanPublisher, TransportError};
use crate::interface_adapters::protocol::{
    ClientInfoDto, ClientMessage, ScanEventDto, ServerEventKind, ServerMessage,
};

use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type EventHandler = Arc<dyn Fn(&ServerMessage) + Send + Sync>;

pub type SendOutcome = PublishOutcome;

pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const OUTBOUND_CAPACITY: usize = 64;
const LOG_THROTTLE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub url: String,
    pub role: Role,
    pub platform: Option<String>,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl TransportSettings {
    pub fn new(url: impl Into<String>, role: Role) -> Self {
        Self {
            url: url.into(),
            role,
            platform: None,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    // Retry budget exhausted; terminal.
    Disconnected,
    // Closed by the owner; terminal.
    Closed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Closed)
    }
}

// State shared between the handle and its driver task.
struct Shared {
    settings: TransportSettings,
    state_tx: watch::Sender<ConnectionState>,
    epoch: AtomicU64,
    handlers: std::sync::Mutex<HashMap<ServerEventKind, Vec<EventHandler>>>,
}

impl Shared {
    // Closed is terminal: nothing moves the session out of it.
    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == ConnectionState::Closed || *current == state {
                return false;
            }
            tracing::debug!(previous = ?*current, ?state, "transport state changed");
            *current = state;
            true
        });
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn mark_connected(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        self.set_state(ConnectionState::Connected);
        tracing::info!(epoch, url = %self.settings.url, "connected to relay");
    }

    fn dispatch(&self, message: &ServerMessage) {
        // Clone the handler list so handlers may register more handlers.
        let handlers = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&message.kind())
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(message);
        }
    }
}

/// Client side of one relay connection, surviving transport loss.
///
/// Each successful (re)connection announces the role again and becomes a
/// new server session; `connection_epoch` counts them.
pub struct TransportSession {
    shared: Arc<Shared>,
    outbound_tx: mpsc::Sender<ClientMessage>,
    outbound_rx: std::sync::Mutex<Option<mpsc::Receiver<ClientMessage>>>,
    shutdown_tx: watch::Sender<bool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl TransportSession {
    pub fn new(settings: TransportSettings) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                settings,
                state_tx,
                epoch: AtomicU64::new(0),
                handlers: std::sync::Mutex::new(HashMap::new()),
            }),
            outbound_tx,
            outbound_rx: std::sync::Mutex::new(Some(outbound_rx)),
            shutdown_tx,
            driver: Mutex::new(None),
        }
    }

    /// Opens the first connection (first attempt immediately, then the retry
    /// policy) and starts the driver task. Register handlers before calling
    /// this to see the first `session_info` and `presence_update`.
    pub async fn connect(&self) -> Result<(), TransportError> {
        // Subscribe before checking so a concurrent close() is always observed.
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow() {
            return Err(TransportError::Closed);
        }
        let Some(outbound_rx) = self
            .outbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            tracing::debug!("transport already started");
            return Ok(());
        };

        let settings = &self.shared.settings;
        self.shared.set_state(ConnectionState::Connecting);

        let total_attempts = settings.reconnect_attempts.saturating_add(1);
        let mut ws = None;
        for attempt in 1..=total_attempts {
            let delay = if attempt > 1 {
                settings.reconnect_delay
            } else {
                Duration::ZERO
            };
            let result = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    tracing::debug!(attempt, "connect abandoned; session closed");
                    return Err(TransportError::Closed);
                }
                result = async {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    open_and_announce(settings).await
                } => result,
            };
            match result {
                Ok(stream) => {
                    ws = Some(stream);
                    break;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, url = %settings.url, "connect attempt failed");
                }
            }
        }

        let Some(mut ws) = ws else {
            self.shared.set_state(ConnectionState::Disconnected);
            return Err(TransportError::RetriesExhausted {
                attempts: total_attempts,
            });
        };

        if *shutdown_rx.borrow() {
            if let Err(e) = ws.close(None).await {
                tracing::debug!(error = %e, "close handshake failed");
            }
            return Err(TransportError::Closed);
        }

        self.shared.mark_connected();
        // Hand over the receiver subscribed above so a close() racing this
        // point still reads as a change.
        let driver = tokio::spawn(drive(
            Arc::clone(&self.shared),
            ws,
            outbound_rx,
            shutdown_rx,
        ));
        *self.driver.lock().await = Some(driver);
        Ok(())
    }

    /// Enqueues a message. Anything sent while not connected is dropped.
    pub fn send(&self, message: ClientMessage) -> SendOutcome {
        let state = self.shared.state();
        if state != ConnectionState::Connected {
            tracing::debug!(?state, "send dropped while not connected");
            return SendOutcome::Dropped;
        }
        match self.outbound_tx.try_send(message) {
            Ok(()) => SendOutcome::Queued,
            Err(e) => {
                tracing::debug!(error = %e, "send dropped; outbound queue unavailable");
                SendOutcome::Dropped
            }
        }
    }

    pub fn request_presence(&self) -> SendOutcome {
        self.send(ClientMessage::RequestPresence)
    }

    /// Registers a handler called once per inbound message of `kind`,
    /// in arrival order, on the driver task.
    pub fn on_event<F>(&self, kind: ServerEventKind, handler: F)
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.shared
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn role(&self) -> Role {
        self.shared.settings.role
    }

    /// Tears the connection down. Safe to call in any state, any number of times.
    pub async fn close(&self) {
        self.shutdown_tx.send_replace(true);
        let driver = self.driver.lock().await.take();
        if let Some(handle) = driver
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "transport driver ended abnormally");
        }
        self.shared.set_state(ConnectionState::Closed);
    }
}

impl ScanPublisher for TransportSession {
    fn publish(&self, event: ScanEvent) -> PublishOutcome {
        self.send(ClientMessage::ScanEvent(ScanEventDto::from(&event)))
    }

    fn connection_epoch(&self) -> u64 {
        self.shared.epoch.load(Ordering::Acquire)
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        // Let the driver wind down if the owner never called close().
        self.shutdown_tx.send_replace(true);
    }
}

enum LinkEnd {
    Lost,
    Shutdown,
}

enum ReconnectFailure {
    Exhausted { attempts: u32 },
    Shutdown,
}

async fn drive(
    shared: Arc<Shared>,
    mut ws: WsStream,
    mut outbound_rx: mpsc::Receiver<ClientMessage>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        match run_link(&shared, &mut ws, &mut outbound_rx, &mut shutdown_rx).await {
            LinkEnd::Shutdown => {
                // Flush what was accepted before close() so a piped batch is not lost.
                while let Ok(message) = outbound_rx.try_recv() {
                    if send_json(&mut ws, &message).await.is_err() {
                        break;
                    }
                }
                if let Err(e) = ws.close(None).await {
                    tracing::debug!(error = %e, "close handshake failed");
                }
                shared.set_state(ConnectionState::Closed);
                return;
            }
            LinkEnd::Lost => {}
        }

        // Scans are a live stream: whatever was queued for the lost link is gone.
        let mut dropped = 0usize;
        while outbound_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::warn!(dropped, "dropped queued messages after connection loss");
        }

        match reconnect(&shared, &mut shutdown_rx).await {
            Ok(stream) => ws = stream,
            Err(ReconnectFailure::Shutdown) => {
                shared.set_state(ConnectionState::Closed);
                return;
            }
            Err(ReconnectFailure::Exhausted { attempts }) => {
                tracing::error!(attempts, url = %shared.settings.url, "relay unreachable; giving up");
                shared.set_state(ConnectionState::Disconnected);
                return;
            }
        }
    }
}

async fn run_link(
    shared: &Shared,
    ws: &mut WsStream,
    outbound_rx: &mut mpsc::Receiver<ClientMessage>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> LinkEnd {
    if *shutdown_rx.borrow() {
        return LinkEnd::Shutdown;
    }

    let every = shared.settings.heartbeat_interval;
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_invalid_log = Instant::now()
        .checked_sub(LOG_THROTTLE)
        .unwrap_or_else(Instant::now);

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => return LinkEnd::Shutdown,

            Some(message) = outbound_rx.recv() => {
                if let Err(e) = send_json(ws, &message).await {
                    tracing::warn!(error = %e, "send failed; connection lost");
                    return LinkEnd::Lost;
                }
            }

            _ = heartbeat.tick() => {
                if let Err(e) = send_json(ws, &ClientMessage::Heartbeat).await {
                    tracing::warn!(error = %e, "heartbeat failed; connection lost");
                    return LinkEnd::Lost;
                }
            }

            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerMessage>(text.as_str()) {
                        Ok(message) => shared.dispatch(&message),
                        Err(e) => {
                            if should_log(&mut last_invalid_log) {
                                tracing::debug!(error = %e, "ignoring unrecognized server message");
                            }
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .as_ref()
                        .map(|f| f.reason.as_str().to_string())
                        .unwrap_or_default();
                    tracing::warn!(%reason, "relay closed the connection");
                    return LinkEnd::Lost;
                }
                // Pings are answered by tungstenite on the next write.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "websocket error; connection lost");
                    return LinkEnd::Lost;
                }
                None => {
                    tracing::warn!("websocket stream ended; connection lost");
                    return LinkEnd::Lost;
                }
            },
        }
    }
}

async fn reconnect(
    shared: &Shared,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<WsStream, ReconnectFailure> {
    let settings = &shared.settings;

    for attempt in 1..=settings.reconnect_attempts {
        shared.set_state(ConnectionState::Reconnecting { attempt });
        tracing::info!(attempt, max = settings.reconnect_attempts, "reconnecting");

        let result = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => return Err(ReconnectFailure::Shutdown),
            result = async {
                tokio::time::sleep(settings.reconnect_delay).await;
                open_and_announce(settings).await
            } => result,
        };

        match result {
            Ok(ws) => {
                shared.mark_connected();
                return Ok(ws);
            }
            Err(e) => tracing::warn!(attempt, error = %e, "reconnect attempt failed"),
        }
    }

    Err(ReconnectFailure::Exhausted {
        attempts: settings.reconnect_attempts,
    })
}

// Connects within the timeout, then announces the role and asks for presence.
async fn open_and_announce(settings: &TransportSettings) -> Result<WsStream, TransportError> {
    let (mut ws, _response) = timeout(settings.connect_timeout, connect_async(settings.url.as_str()))
        .await
        .map_err(|_| TransportError::ConnectTimeout)??;

    let hello = ClientMessage::ClientInfo(ClientInfoDto::new(
        settings.role,
        settings.platform.clone(),
    ));
    send_json(&mut ws, &hello).await?;
    send_json(&mut ws, &ClientMessage::RequestPresence).await?;
    Ok(ws)
}

async fn send_json(ws: &mut WsStream, message: &ClientMessage) -> Result<(), TransportError> {
    let text = serde_json::to_string(message).map_err(TransportError::Serialization)?;
    ws.send(Message::Text(text.into())).await?;
    Ok(())
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}
