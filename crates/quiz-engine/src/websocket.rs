//! Live round events over WebSocket.
//!
//! Every event is a JSON object with `event` and `payload` fields:
//!
//! - `connected`: sent on connect, with the current round (if any)
//! - `round_started`: a new round began
//! - `tick`: the countdown advanced
//! - `answer_graded`: an answer was graded
//! - `answer_unverified`: an answer could not be verified
//! - `round_over`: the round ended
//! - `error`: something went wrong outside a request

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::AppState;
use crate::session::{SessionStatus, SessionView};

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for `connected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// The current round, if one exists.
    pub session: Option<SessionView>,
}

/// Payload for `round_started` and `round_over`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundPayload {
    /// Snapshot of the round.
    pub session: SessionView,
}

/// Payload for `tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickPayload {
    /// Round the tick belongs to.
    pub session_id: Uuid,
    /// Countdown after the tick.
    pub seconds_remaining: u32,
}

/// Payload for `answer_graded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerGradedPayload {
    /// Round the answer belongs to.
    pub session_id: Uuid,
    /// Index of the graded question.
    pub question_index: usize,
    /// The verdict.
    pub is_correct: bool,
    /// XP earned.
    pub xp_awarded: u64,
    /// Round status after the answer.
    pub status: SessionStatus,
}

/// Payload for `answer_unverified`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerUnverifiedPayload {
    /// Round the answer belongs to.
    pub session_id: Uuid,
    /// Why verification failed.
    pub message: String,
}

/// Payload for `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable error message.
    pub message: String,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Round events pushed to WebSocket clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum RoundEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// A new round began.
    RoundStarted(RoundPayload),
    /// The countdown advanced.
    Tick(TickPayload),
    /// An answer was graded.
    AnswerGraded(AnswerGradedPayload),
    /// An answer could not be verified.
    AnswerUnverified(AnswerUnverifiedPayload),
    /// The round ended.
    RoundOver(RoundPayload),
    /// An error occurred.
    Error(ErrorPayload),
}

impl RoundEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub const fn connected(session: Option<SessionView>) -> Self {
        Self::Connected(ConnectedPayload { session })
    }

    /// Creates a `RoundStarted` event.
    #[must_use]
    pub const fn round_started(session: SessionView) -> Self {
        Self::RoundStarted(RoundPayload { session })
    }

    /// Creates a `Tick` event.
    #[must_use]
    pub const fn tick(session_id: Uuid, seconds_remaining: u32) -> Self {
        Self::Tick(TickPayload {
            session_id,
            seconds_remaining,
        })
    }

    /// Creates a `RoundOver` event.
    #[must_use]
    pub const fn round_over(session: SessionView) -> Self {
        Self::RoundOver(RoundPayload { session })
    }

    /// Creates an `Error` event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Returns the event name as sent on the wire.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::RoundStarted(_) => "round_started",
            Self::Tick(_) => "tick",
            Self::AnswerGraded(_) => "answer_graded",
            Self::AnswerUnverified(_) => "answer_unverified",
            Self::RoundOver(_) => "round_over",
            Self::Error(_) => "error",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Fans round events out to every connected client.
///
/// Events are not kept for clients that connect later.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<RoundEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RoundEvent> {
        self.sender.subscribe()
    }

    /// Sends an event; returns how many subscribers will receive it.
    pub fn send(&self, event: RoundEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Missed pongs tolerated before the connection is closed.
const MAX_MISSED_PONGS: u8 = 3;

/// Upgrade handler for `GET /ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    debug!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_event<S>(sender: &mut S, event: &RoundEvent) -> bool
where
    S: futures::Sink<Message> + Unpin,
{
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            warn!(event = event.event_name(), "Failed to serialize event: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(json)).await.is_ok()
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before reading the snapshot so no event falls in between.
    let mut events = state.broadcaster.subscribe();
    let current = state.current_view().await;

    if !send_event(&mut sender, &RoundEvent::connected(current)).await {
        debug!("Client disconnected before receiving connected event");
        return;
    }
    info!("WebSocket client connected");

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    // The first tick completes immediately.
    heartbeat.tick().await;
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {
                        debug!("Ignoring message from client");
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                }
            }

            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if !send_event(&mut sender, &event).await {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}
