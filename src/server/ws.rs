use std::time::Duration;

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use claimboard_common::{DepartmentId, JobId, OfficeId, UserId};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::Instrument;

use super::api::{ApiError, SharedState, USER_HEADER};
use crate::access::NavRequest;
use crate::board::{BoardSession, BoardView, DropTarget, LaneId, Notice, SessionEvent};
use crate::errors::BoardError;
use crate::store::JobStore;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

// ── WebSocket message types ──────────────────────────────────────────

/// Drag gestures sent by the client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    DragStart { job_id: JobId },
    Drop { job_id: JobId, target: ClientDropTarget },
    Cancel,
}

/// `{"lane": "review"}`, `{"job": "J2"}` or `"outside"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientDropTarget {
    Lane(String),
    Job(JobId),
    Outside,
}

impl ClientDropTarget {
    fn into_target(self) -> Result<DropTarget, BoardError> {
        Ok(match self {
            Self::Lane(name) => DropTarget::Lane(name.parse::<LaneId>()?),
            Self::Job(id) => DropTarget::Job(id),
            Self::Outside => DropTarget::Outside,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    Board { board: BoardView },
    Notice { notice: Notice },
    Error { message: String },
    Closed { reason: String },
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub user_id: Option<UserId>,
    pub office_id: Option<OfficeId>,
    pub department_id: Option<DepartmentId>,
}

// ── WebSocket handler ────────────────────────────────────────────────

/// Opens the board session before upgrading, so scope failures surface as
/// plain HTTP errors.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
) -> Result<Response, ApiError> {
    let user_id = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(UserId::from)
        .or(query.user_id)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_HEADER} header")))?;
    let request = NavRequest {
        office_id: query.office_id,
        department_id: query.department_id,
    };
    let session = BoardSession::open(state.store.clone(), state.engine.clone(), user_id, request).await?;
    let span = tracing::info_span!(
        "ws",
        conn_id = %uuid::Uuid::new_v4(),
        user_id = %session.user_id(),
    );
    Ok(ws
        .on_upgrade(move |socket| run_socket_loop(socket, session).instrument(span))
        .into_response())
}

enum Step {
    Ping,
    Session(crate::board::SessionInput),
    Client(Option<Result<Message, axum::Error>>),
}

/// Core WebSocket loop with ping/pong keepalive.
///
/// Combines session events, client gestures, and periodic ping/pong health
/// checking into a single select loop. If no Pong is received within
/// [`PONG_TIMEOUT`] after a Ping is sent, the connection is considered dead
/// and the loop exits.
async fn run_socket_loop<S: JobStore>(socket: WebSocket, mut session: BoardSession<S>) {
    let (mut sender, mut receiver) = socket.split();

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately; consume it so the first real
    // ping fires after PING_INTERVAL has elapsed.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    let initial = ServerMessage::Board {
        board: session.board(),
    };
    if send(&mut sender, &initial).await.is_err() {
        return;
    }

    loop {
        let step = tokio::select! {
            _ = ping_interval.tick() => Step::Ping,
            input = session.wait() => Step::Session(input),
            msg = receiver.next() => Step::Client(msg),
        };

        let outgoing = match step {
            // ── Periodic ping ───────────────────────────────────────
            Step::Ping => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    tracing::debug!("pong timeout, dropping socket");
                    break;
                }
                if sender.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
                continue;
            }

            // ── Session events ──────────────────────────────────────
            Step::Session(input) => match session.process(input).await {
                Some(event) => event_messages(event),
                None => continue,
            },

            // ── Client messages ─────────────────────────────────────
            Step::Client(msg) => match msg {
                Some(Ok(Message::Text(text))) => handle_client(&mut session, text.as_str()),
                Some(Ok(Message::Pong(_))) => {
                    last_pong = Instant::now();
                    awaiting_pong = false;
                    continue;
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            },
        };

        let mut closed = false;
        for message in &outgoing {
            closed |= matches!(message, ServerMessage::Closed { .. });
            if send(&mut sender, message).await.is_err() {
                closed = true;
                break;
            }
        }
        if closed {
            break;
        }
    }

    session.close();
    // Best-effort close frame
    let _ = sender.send(Message::Close(None)).await;
}

async fn send(sender: &mut SplitSink<WebSocket, Message>, message: &ServerMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize server message");
            Ok(())
        }
    }
}

fn event_messages(event: SessionEvent) -> Vec<ServerMessage> {
    match event {
        SessionEvent::Board(board) => vec![ServerMessage::Board { board }],
        SessionEvent::Notice { notice, board } => {
            vec![ServerMessage::Notice { notice }, ServerMessage::Board { board }]
        }
        SessionEvent::Closed { reason } => vec![ServerMessage::Closed { reason }],
    }
}

/// Apply one client gesture. Errors are reported alongside the (reverted)
/// board; they never end the connection.
pub fn handle_client<S: JobStore>(session: &mut BoardSession<S>, text: &str) -> Vec<ServerMessage> {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            return vec![ServerMessage::Error {
                message: format!("invalid message: {e}"),
            }];
        }
    };

    let result = match message {
        ClientMessage::DragStart { job_id } => session.drag_start(&job_id),
        ClientMessage::Drop { job_id, target } => match target.into_target() {
            Ok(target) => session.drop_on(&job_id, target).map(|_| ()),
            Err(e) => {
                session.cancel();
                Err(e)
            }
        },
        ClientMessage::Cancel => {
            session.cancel();
            Ok(())
        }
    };

    let board = ServerMessage::Board {
        board: session.board(),
    };
    match result {
        Ok(()) => vec![board],
        Err(e) => vec![
            ServerMessage::Error {
                message: e.to_string(),
            },
            board,
        ],
    }
}

// ── Tests ────────────────────────────────────────────────────────────
