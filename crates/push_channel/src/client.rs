//! crates/push_channel/src/client.rs
//!
//! Client side of the push channel: establishes the WebSocket connection,
//! joins the user's room, and repairs the connection when the transport
//! drops. Push delivery makes no guarantee across a disconnect gap, so every
//! (re)join is followed by a REST backfill — REST is the source of truth and
//! the push channel is purely a latency optimization.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::header::AUTHORIZATION;
use tokio::sync::watch;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, protocol::Message},
};
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::protocol::{ClientFrame, NotificationDto, ServerFrame, UnreadCountBody};

/// Push-connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connecting,
    Connected,
    Joined,
}

/// Errors surfaced by the push client.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Invalid bearer token: {0}")]
    BearerToken(#[from] tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Join rejected by server: {0}")]
    JoinRejected(String),
    #[error("Connection attempts exhausted after {0} tries")]
    AttemptsExhausted(u32),
    #[error("Server closed the connection")]
    ConnectionClosed,
}

/// Configuration for one push client.
#[derive(Debug, Clone)]
pub struct PushClientConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:3000/ws`.
    pub ws_url: String,
    /// REST base for backfill fetches, e.g. `http://localhost:3000`.
    pub api_base: String,
    /// Bearer token presented on both transports.
    pub bearer_token: String,
    /// The identity whose room we join.
    pub user_id: Uuid,
    /// Bounded reconnection attempts; after exhaustion the client stops.
    pub max_connect_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Fixed delay before the single join retry.
    pub join_retry_delay: Duration,
}

impl Default for PushClientConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:3000/ws".to_string(),
            api_base: "http://localhost:3000".to_string(),
            bearer_token: String::new(),
            user_id: Uuid::nil(),
            max_connect_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            join_retry_delay: Duration::from_secs(1),
        }
    }
}

/// Capped exponential backoff for connection attempt `attempt` (0-based).
pub fn backoff_delay(config: &PushClientConfig, attempt: u32) -> Duration {
    let exp = attempt.min(16);
    let delay = config.initial_backoff.saturating_mul(1u32 << exp);
    delay.min(config.max_backoff)
}

/// Delay before retrying after `failures` consecutive failed connect
/// attempts (1-based). The first retry waits the initial backoff.
pub fn retry_delay(config: &PushClientConfig, failures: u32) -> Duration {
    backoff_delay(config, failures.saturating_sub(1))
}

/// Callbacks for state the server pushes down. Implemented by whatever is
/// rendering the notification bell.
pub trait PushEvents: Send + Sync {
    fn on_phase(&self, phase: Phase);
    fn on_notifications(&self, items: Vec<NotificationDto>);
    fn on_unread_count(&self, count: i64);
    fn on_new_notification(&self, notification: NotificationDto);
}

/// Outcome of one connected session, used to decide how to reconnect.
enum SessionEnd {
    /// The client closed the connection on purpose; do not reconnect.
    CleanClose,
    /// The transport dropped; reconnect immediately.
    Lost,
}

/// Progress of the join handshake. A server error before the join succeeds
/// is retried exactly once; a second one rejects the session. Errors after
/// the join are informational.
#[derive(Debug, Default)]
struct JoinHandshake {
    joined: bool,
    retried: bool,
}

enum JoinErrorAction {
    Retry,
    Reject,
    Log,
}

impl JoinHandshake {
    fn confirm(&mut self) {
        self.joined = true;
    }

    fn on_error(&mut self) -> JoinErrorAction {
        if self.joined {
            JoinErrorAction::Log
        } else if self.retried {
            JoinErrorAction::Reject
        } else {
            self.retried = true;
            JoinErrorAction::Retry
        }
    }
}

/// Handle for closing the push channel from outside the run loop.
pub struct PushShutdown {
    tx: watch::Sender<bool>,
}

impl PushShutdown {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Resolves when a shutdown is signaled. Pends forever if the handle was
/// dropped without signaling, so the run loop keeps serving.
async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    if *rx.borrow() {
        return;
    }
    while rx.changed().await.is_ok() {
        if *rx.borrow() {
            return;
        }
    }
    std::future::pending::<()>().await;
}

pub struct PushClient {
    config: PushClientConfig,
    http: reqwest::Client,
    shutdown: watch::Receiver<bool>,
}

impl PushClient {
    pub fn new(config: PushClientConfig) -> (Self, PushShutdown) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                config,
                http: reqwest::Client::new(),
                shutdown: rx,
            },
            PushShutdown { tx },
        )
    }

    /// Runs the connection loop until a clean close or attempt exhaustion.
    ///
    /// A failed connect attempt backs off exponentially (capped); a session
    /// that was established and then lost reconnects immediately with the
    /// attempt counter reset.
    pub async fn run<E: PushEvents>(&self, events: &E) -> Result<(), PushError> {
        let mut attempt: u32 = 0;
        loop {
            if *self.shutdown.borrow() {
                events.on_phase(Phase::Disconnected);
                info!("push channel closed cleanly");
                return Ok(());
            }
            events.on_phase(Phase::Connecting);
            match self.connect_and_run(events).await {
                Ok(SessionEnd::CleanClose) => {
                    events.on_phase(Phase::Disconnected);
                    info!("push channel closed cleanly");
                    return Ok(());
                }
                Ok(SessionEnd::Lost) => {
                    events.on_phase(Phase::Disconnected);
                    warn!("push transport lost, reconnecting");
                    attempt = 0;
                }
                Err(e) => {
                    events.on_phase(Phase::Disconnected);
                    attempt += 1;
                    if attempt >= self.config.max_connect_attempts {
                        warn!("push connection attempts exhausted: {e}");
                        return Err(PushError::AttemptsExhausted(attempt));
                    }
                    let delay = retry_delay(&self.config, attempt);
                    warn!("push connect failed ({e}), retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn connect_and_run<E: PushEvents>(&self, events: &E) -> Result<SessionEnd, PushError> {
        Url::parse(&self.config.ws_url)?;
        let mut request = self.config.ws_url.as_str().into_client_request()?;
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {}", self.config.bearer_token).parse()?,
        );

        let (ws_stream, _response) = connect_async(request).await?;
        events.on_phase(Phase::Connected);
        let (mut write, mut read) = ws_stream.split();

        // Join the room. One retry after a fixed delay if the server reports
        // an error on the first attempt.
        let join = serde_json::to_string(&ClientFrame::Join {
            user_id: self.config.user_id,
        })?;
        write.send(Message::Text(join.clone())).await?;

        let mut handshake = JoinHandshake::default();
        let shutdown = wait_for_shutdown(self.shutdown.clone());
        tokio::pin!(shutdown);

        loop {
            let msg = tokio::select! {
                _ = &mut shutdown => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::CleanClose);
                }
                msg = read.next() => msg,
            };
            let Some(msg) = msg else {
                break;
            };
            match msg? {
                Message::Text(text) => {
                    let frame: ServerFrame = match serde_json::from_str(&text) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("undecodable server frame: {e}");
                            continue;
                        }
                    };
                    match frame {
                        ServerFrame::Joined { .. } => {
                            handshake.confirm();
                            events.on_phase(Phase::Joined);
                            // Backfill anything missed while disconnected.
                            self.backfill(events).await?;
                        }
                        ServerFrame::Error { message } => match handshake.on_error() {
                            JoinErrorAction::Retry => {
                                tokio::time::sleep(self.config.join_retry_delay).await;
                                write.send(Message::Text(join.clone())).await?;
                            }
                            JoinErrorAction::Reject => {
                                return Err(PushError::JoinRejected(message));
                            }
                            JoinErrorAction::Log => {
                                warn!("server error frame: {message}");
                            }
                        },
                        ServerFrame::NewNotification { ack_id, notification } => {
                            self.ack(&mut write, ack_id).await?;
                            events.on_new_notification(notification);
                        }
                        ServerFrame::Notifications { ack_id, items } => {
                            self.ack(&mut write, ack_id).await?;
                            events.on_notifications(items);
                        }
                        ServerFrame::UnreadCount { ack_id, count } => {
                            self.ack(&mut write, ack_id).await?;
                            events.on_unread_count(count);
                        }
                    }
                }
                Message::Ping(data) => {
                    write.send(Message::Pong(data)).await?;
                }
                Message::Close(_) => {
                    // A close we did not initiate counts as transport loss.
                    return Ok(SessionEnd::Lost);
                }
                _ => {}
            }
        }

        if handshake.joined {
            Ok(SessionEnd::Lost)
        } else {
            Err(PushError::ConnectionClosed)
        }
    }

    async fn ack<S>(&self, write: &mut S, ack_id: u64) -> Result<(), PushError>
    where
        S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        let ack = serde_json::to_string(&ClientFrame::Ack { ack_id })?;
        write.send(Message::Text(ack)).await?;
        Ok(())
    }

    /// Fetches the authoritative notification state over REST.
    async fn backfill<E: PushEvents>(&self, events: &E) -> Result<(), PushError> {
        let bearer = format!("Bearer {}", self.config.bearer_token);

        let items: Vec<NotificationDto> = self
            .http
            .get(format!("{}/notifications", self.config.api_base))
            .header(AUTHORIZATION, &bearer)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        events.on_notifications(items);

        let unread: UnreadCountBody = self
            .http
            .get(format!("{}/notifications/unread-count", self.config.api_base))
            .header(AUTHORIZATION, &bearer)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        events.on_unread_count(unread.count);

        Ok(())
    }
}
