//! WebSocket session lifecycle: connect, dispatch, reconnect.
//!
//! One [`ConnectionSession`] owns one logical channel to the monitoring
//! server. A supervisor task runs the connect loop: establish the socket
//! (bearer token as a query parameter), split it into a writer task and a
//! read loop, and feed every inbound frame to the [`Dispatcher`]. When
//! the channel dies abnormally the same loop sleeps out the backoff delay
//! and reconnects — a single loop means reconnection timers can never
//! stack. Deliberate closes (ours, or a server close with code 1000) end
//! the loop without retrying.
//!
//! ```text
//! open(token) ──► ┌────────────── supervisor ──────────────┐
//!                 │ Connecting ─► Connected ─► read loop    │
//!                 │      ▲                        │         │
//!                 │      └── sleep(backoff) ◄── abnormal    │
//!                 │                 │                       │
//!                 │                 └─ attempts > max ─► Failed
//!                 └────────────────────────────────────────┘
//! ```
//!
//! Reference: Kleppmann, Chapter 8 — The Trouble with Distributed Systems

use std::sync::Arc;
use std::time::Duration;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

use crate::dispatch::Dispatcher;
use crate::protocol::{ClientMessage, Position, Profile, ProtocolError};
use crate::registry::{EntityRegistry, InterceptedMessage};

/// Connection status surfaced to the exterior UI collaborator.
///
/// The engine itself holds no UI state; it only emits these signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No channel (initial, or after a deliberate close).
    Disconnected,
    Connecting,
    Connected,
    /// Abnormal closure; a reconnect is scheduled after `delay`.
    Retrying { attempt: u32, delay: Duration },
    /// Reconnection attempts exhausted. Terminal.
    Failed,
}

/// Events emitted by the engine for the exterior collaborators
/// (map, table, chat log, decryption modal).
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    Status(ConnectionStatus),
    /// A previously unknown submarine appeared in a ping response.
    SubmarineDetected { id: String, position: Position },
    /// A decrypted track update moved a submarine.
    PositionUpdated { id: String, position: Position },
    /// A multi-part transmission completed reassembly.
    MessageIntercepted {
        id: String,
        message: InterceptedMessage,
    },
    /// One key attempt of a running search (watched live).
    KeyTrace { id: String, key: u32, text: String },
    /// Key search succeeded; the entity is now `Decrypted`.
    KeyRecovered {
        id: String,
        key: u8,
        profile: Profile,
    },
    /// Key search exhausted the space; the entity is now `Failed`.
    RecoveryFailed { id: String },
}

/// Explicit reconnection policy: attempt counter, bound, delay curve.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    attempts: u32,
    max_attempts: u32,
    base_delay: Duration,
    cap: Duration,
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, cap: Duration) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            base_delay,
            cap,
        }
    }

    /// Record a failure and yield the delay before the next attempt, or
    /// `None` once the attempt budget is spent (terminal).
    ///
    /// The counter increments first, so the first delay is already one
    /// doubling above the base: 2s, 4s, 8s, ... capped.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if self.attempts > self.max_attempts {
            return None;
        }
        let exp = self.attempts.min(20); // avoid shift overflow; cap dominates anyway
        Some((self.base_delay * 2u32.pow(exp)).min(self.cap))
    }

    /// A successful connection resets the counter.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket endpoint, e.g. `ws://host:port/ws`. The token is
    /// appended as a query parameter on connect.
    pub server_url: String,
    /// Reconnection attempts before giving up.
    pub max_reconnect_attempts: u32,
    /// Base delay of the exponential backoff.
    pub base_delay: Duration,
    /// Upper bound on any single backoff delay.
    pub max_delay: Duration,
    /// Event channel capacity.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:9090/ws".to_string(),
            max_reconnect_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            event_capacity: 256,
        }
    }
}

impl SessionConfig {
    fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.max_reconnect_attempts, self.base_delay, self.max_delay)
    }
}

/// One logical connection to the monitoring server.
pub struct ConnectionSession {
    config: SessionConfig,
    /// Shared entity state; the registry is the sole owner of mutation.
    registry: Arc<RwLock<EntityRegistry>>,
    status: Arc<RwLock<ConnectionStatus>>,
    event_tx: mpsc::Sender<TrackerEvent>,
    event_rx: Option<mpsc::Receiver<TrackerEvent>>,
    /// Writer-task handle slot; `None` while no channel is up.
    outgoing_tx: Arc<RwLock<Option<mpsc::Sender<Message>>>>,
    supervisor: Option<JoinHandle<()>>,
}

impl ConnectionSession {
    pub fn new(config: SessionConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
        Self {
            config,
            registry: Arc::new(RwLock::new(EntityRegistry::new())),
            status: Arc::new(RwLock::new(ConnectionStatus::Disconnected)),
            event_tx,
            event_rx: Some(event_rx),
            outgoing_tx: Arc::new(RwLock::new(None)),
            supervisor: None,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<TrackerEvent>> {
        self.event_rx.take()
    }

    /// Handle to the shared registry, for read access and for wiring up
    /// a [`crate::recovery::KeyRecoveryEngine`].
    pub fn registry(&self) -> Arc<RwLock<EntityRegistry>> {
        self.registry.clone()
    }

    /// A clone of the event sender, for components that emit alongside
    /// the session (key recovery).
    pub fn event_sender(&self) -> mpsc::Sender<TrackerEvent> {
        self.event_tx.clone()
    }

    pub async fn status(&self) -> ConnectionStatus {
        *self.status.read().await
    }

    /// Open the channel with the given session token.
    ///
    /// Without a token nothing is spawned and [`ProtocolError::MissingToken`]
    /// comes back. Re-opening supersedes any previous supervisor, so at
    /// most one connect loop (and thus one pending reconnect timer)
    /// exists per session.
    pub async fn open(&mut self, token: Option<String>) -> Result<(), ProtocolError> {
        let Some(token) = token else {
            log::warn!("open called without a token");
            return Err(ProtocolError::MissingToken);
        };
        if let Some(stale) = self.supervisor.take() {
            stale.abort();
        }
        self.outgoing_tx.write().await.take();

        let dispatcher = Dispatcher::new(self.registry.clone(), self.event_tx.clone());
        self.supervisor = Some(tokio::spawn(supervise(
            self.config.clone(),
            token,
            dispatcher,
            self.status.clone(),
            self.event_tx.clone(),
            self.outgoing_tx.clone(),
        )));
        Ok(())
    }

    /// Deliberately close the channel. No reconnection is scheduled and
    /// any pending reconnect timer dies with the supervisor.
    pub async fn close(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.abort();
        }
        if let Some(tx) = self.outgoing_tx.write().await.take() {
            let _ = tx.send(Message::Close(None)).await;
        }
        set_status(&self.status, &self.event_tx, ConnectionStatus::Disconnected).await;
        log::info!("session closed");
    }

    /// Send a sonar ping for the given coordinates.
    pub async fn send_ping(&self, latitude: f64, longitude: f64) -> Result<(), ProtocolError> {
        let encoded = ClientMessage::ping(latitude, longitude).encode()?;
        let guard = self.outgoing_tx.read().await;
        let tx = guard.as_ref().ok_or(ProtocolError::ConnectionClosed)?;
        tx.send(Message::Text(encoded.into()))
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            supervisor.abort();
        }
    }
}

async fn set_status(
    slot: &Arc<RwLock<ConnectionStatus>>,
    events: &mpsc::Sender<TrackerEvent>,
    status: ConnectionStatus,
) {
    *slot.write().await = status;
    let _ = events.send(TrackerEvent::Status(status)).await;
}

/// How one established connection ended.
enum Closure {
    /// Server closed with code 1000, or the caller tore the session down.
    Deliberate,
    /// Everything else: errors, EOF, non-normal close codes.
    Abnormal,
}

/// The connect loop: one iteration per (re)connection attempt.
async fn supervise(
    config: SessionConfig,
    token: String,
    dispatcher: Dispatcher,
    status: Arc<RwLock<ConnectionStatus>>,
    events: mpsc::Sender<TrackerEvent>,
    outgoing_slot: Arc<RwLock<Option<mpsc::Sender<Message>>>>,
) {
    let url = format!("{}?token={}", config.server_url, token);
    let mut backoff = config.backoff();

    loop {
        set_status(&status, &events, ConnectionStatus::Connecting).await;

        match tokio_tungstenite::connect_async(&url).await {
            Ok((stream, _)) => {
                log::info!("connected to {}", config.server_url);
                backoff.reset();

                let (mut writer, mut reader) = stream.split();

                // Writer task: forward the outgoing channel to the socket.
                // Must be installed before the Connected signal goes out.
                let (out_tx, mut out_rx) = mpsc::channel::<Message>(64);
                *outgoing_slot.write().await = Some(out_tx);
                let writer_task = tokio::spawn(async move {
                    while let Some(message) = out_rx.recv().await {
                        if writer.send(message).await.is_err() {
                            break;
                        }
                    }
                });
                set_status(&status, &events, ConnectionStatus::Connected).await;

                // Read loop: every text frame goes through the dispatcher.
                let closure = loop {
                    match reader.next().await {
                        Some(Ok(Message::Text(text))) => dispatcher.dispatch(&text).await,
                        Some(Ok(Message::Close(frame))) => {
                            let normal = frame
                                .as_ref()
                                .is_some_and(|f| f.code == CloseCode::Normal);
                            log::info!("server closed the channel ({frame:?})");
                            break if normal {
                                Closure::Deliberate
                            } else {
                                Closure::Abnormal
                            };
                        }
                        Some(Ok(_)) => {} // binary/ping/pong: not part of this protocol
                        Some(Err(e)) => {
                            log::warn!("channel error: {e}");
                            break Closure::Abnormal;
                        }
                        None => break Closure::Abnormal,
                    }
                };

                outgoing_slot.write().await.take();
                writer_task.abort();

                if let Closure::Deliberate = closure {
                    set_status(&status, &events, ConnectionStatus::Disconnected).await;
                    return;
                }
            }
            Err(e) => log::warn!("connect failed: {e}"),
        }

        match backoff.next_delay() {
            Some(delay) => {
                let attempt = backoff.attempts();
                log::info!("reconnecting in {delay:?} (attempt {attempt})");
                set_status(
                    &status,
                    &events,
                    ConnectionStatus::Retrying { attempt, delay },
                )
                .await;
                tokio::time::sleep(delay).await;
            }
            None => {
                log::error!("reconnection attempts exhausted, giving up");
                set_status(&status, &events, ConnectionStatus::Failed).await;
                return;
            }
        }
    }
}
