//! Live board session.
//!
//! Couples one [`BoardController`] to a [`JobStore`]: loads the scoped
//! snapshot, listens to the live feed, and performs drop writes in detached
//! tasks. A write always runs to completion even if the session is closed
//! before it lands; its result is simply not observed.

use std::sync::Arc;

use claimboard_common::{Job, JobId, UserId};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

use super::controller::{BoardController, BoardView, DropOutcome, DropTarget, ExternalOutcome, SessionPhase};
use super::transition::TransitionEngine;
use crate::access::{NavRequest, Scope, ScopeResolver};
use crate::errors::{BoardError, ScopeError, SessionError, StoreError};
use crate::store::{FeedEvent, JobStore};

/// Something the client should be told about.
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Re-render.
    Board(BoardView),
    /// Re-render and surface `notice` (rejected write, overridden move).
    Notice { notice: Notice, board: BoardView },
    /// The session can no longer serve this user and request.
    Closed { reason: String },
}

struct WriteResult {
    job_id: JobId,
    result: Result<Job, StoreError>,
}

enum Incoming {
    Write(WriteResult),
    Feed(Result<FeedEvent, broadcast::error::RecvError>),
}

/// Opaque input returned by [`BoardSession::wait`].
pub struct SessionInput(Incoming);

pub struct BoardSession<S: JobStore> {
    store: Arc<S>,
    engine: TransitionEngine,
    user_id: UserId,
    request: NavRequest,
    controller: BoardController,
    feed: broadcast::Receiver<FeedEvent>,
    writes_tx: mpsc::UnboundedSender<WriteResult>,
    writes_rx: mpsc::UnboundedReceiver<WriteResult>,
}

impl<S: JobStore> BoardSession<S> {
    /// Subscribe first, then load, so no committed write can fall between
    /// the snapshot and the feed.
    pub async fn open(
        store: Arc<S>,
        engine: TransitionEngine,
        user_id: UserId,
        request: NavRequest,
    ) -> Result<Self, SessionError> {
        let feed = store.subscribe();
        let controller = load(store.as_ref(), &engine, &user_id, &request).await?;
        let (writes_tx, writes_rx) = mpsc::unbounded_channel();
        tracing::info!(
            user_id = %user_id,
            context = ?controller.scope().context(),
            jobs = controller.view().len(),
            "board session opened"
        );
        Ok(Self {
            store,
            engine,
            user_id,
            request,
            controller,
            feed,
            writes_tx,
            writes_rx,
        })
    }

    pub fn board(&self) -> BoardView {
        self.controller.board()
    }

    pub fn phase(&self) -> SessionPhase {
        self.controller.phase()
    }

    pub fn scope(&self) -> &Scope {
        self.controller.scope()
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn drag_start(&mut self, job_id: &JobId) -> Result<(), BoardError> {
        self.controller.on_drag_start(job_id)
    }

    pub fn cancel(&mut self) {
        self.controller.cancel();
    }

    /// Drop the dragged card. A `Write` outcome has already been rendered
    /// optimistically and its patch is in flight.
    pub fn drop_on(&mut self, job_id: &JobId, target: DropTarget) -> Result<DropOutcome, BoardError> {
        let outcome = self.controller.on_drop(job_id, target)?;
        if let DropOutcome::Write { job_id, patch } = &outcome {
            let store = self.store.clone();
            let tx = self.writes_tx.clone();
            let job_id = job_id.clone();
            let patch = patch.clone();
            tokio::spawn(async move {
                let result = store.apply_patch(&job_id, &patch).await;
                if let Err(e) = &result {
                    tracing::warn!(job_id = %job_id, error = %e, "job patch rejected");
                }
                // Session may be gone; the write stands either way.
                let _ = tx.send(WriteResult { job_id, result });
            });
        }
        Ok(outcome)
    }

    /// Wait for the next change worth rendering.
    pub async fn next_event(&mut self) -> SessionEvent {
        loop {
            let input = self.wait().await;
            if let Some(event) = self.process(input).await {
                return event;
            }
        }
    }

    /// Next raw input (write result or feed record). Cancel-safe, so it can
    /// sit in a `select!` next to the client socket.
    pub async fn wait(&mut self) -> SessionInput {
        let incoming = tokio::select! {
            Some(write) = self.writes_rx.recv() => Incoming::Write(write),
            recv = self.feed.recv() => Incoming::Feed(recv),
        };
        SessionInput(incoming)
    }

    /// Apply an input from `wait`. `None` when nothing visible changed.
    pub async fn process(&mut self, input: SessionInput) -> Option<SessionEvent> {
        match input.0 {
            Incoming::Write(write) => self.on_write(write),
            Incoming::Feed(Ok(event)) => self.on_feed(event).await,
            Incoming::Feed(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                tracing::warn!(skipped, user_id = %self.user_id, "feed lagged, reloading board");
                Some(self.rebuild().await)
            }
            Incoming::Feed(Err(broadcast::error::RecvError::Closed)) => Some(SessionEvent::Closed {
                reason: "live feed closed".to_string(),
            }),
        }
    }

    /// Detach from the live feed. In-flight writes still complete.
    pub fn close(self) {}

    fn on_write(&mut self, write: WriteResult) -> Option<SessionEvent> {
        let WriteResult { job_id, result } = write;
        match result {
            // Confirmation arrives through the feed.
            Ok(_) => None,
            Err(e) => {
                let err = e.into_board_error(&job_id);
                let message = match self.controller.on_write_result(&job_id, Err(err)) {
                    Err(err) => err.to_string(),
                    Ok(()) => return None,
                };
                Some(SessionEvent::Notice {
                    notice: Notice {
                        job_id: Some(job_id),
                        message,
                    },
                    board: self.controller.board(),
                })
            }
        }
    }

    async fn on_feed(&mut self, event: FeedEvent) -> Option<SessionEvent> {
        match event {
            FeedEvent::JobChanged { job } => {
                let job_id = job.id.clone();
                match self.controller.on_external_update(job) {
                    ExternalOutcome::Ignored => None,
                    ExternalOutcome::Overridden {
                        optimistic,
                        authoritative,
                    } => Some(SessionEvent::Notice {
                        notice: Notice {
                            job_id: Some(job_id),
                            message: format!(
                                "another change moved this job to {authoritative} (not {optimistic})"
                            ),
                        },
                        board: self.controller.board(),
                    }),
                    ExternalOutcome::Applied | ExternalOutcome::Confirmed | ExternalOutcome::Removed => {
                        Some(SessionEvent::Board(self.controller.board()))
                    }
                }
            }
            FeedEvent::UserChanged { user } if user.id == self.user_id => {
                tracing::info!(user_id = %user.id, role = %user.role, "membership changed, rebuilding session");
                Some(self.rebuild().await)
            }
            FeedEvent::OfficeChanged { office } if office.org_id == self.scope().org_id => {
                self.refresh_directory().await
            }
            FeedEvent::DepartmentChanged { department } if department.org_id == self.scope().org_id => {
                self.refresh_directory().await
            }
            _ => None,
        }
    }

    async fn refresh_directory(&mut self) -> Option<SessionEvent> {
        let org_id = self.scope().org_id.clone();
        match self.store.directory(&org_id).await {
            Ok(directory) => {
                self.controller.set_directory(directory);
                None
            }
            Err(e) => {
                tracing::error!(org_id = %org_id, error = %e, "failed to refresh directory");
                None
            }
        }
    }

    async fn rebuild(&mut self) -> SessionEvent {
        match load(self.store.as_ref(), &self.engine, &self.user_id, &self.request).await {
            Ok(controller) => {
                self.controller = controller;
                SessionEvent::Board(self.controller.board())
            }
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "session no longer valid");
                SessionEvent::Closed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

impl<S: JobStore> Drop for BoardSession<S> {
    fn drop(&mut self) {
        tracing::debug!(user_id = %self.user_id, "board session closed");
    }
}

async fn load<S: JobStore + ?Sized>(
    store: &S,
    engine: &TransitionEngine,
    user_id: &UserId,
    request: &NavRequest,
) -> Result<BoardController, SessionError> {
    let user = store
        .user(user_id)
        .await?
        .ok_or_else(|| ScopeError::UnknownUser(user_id.clone()))?;
    let directory = store.directory(&user.org_id).await?;
    let scope = ScopeResolver::new(&directory).resolve(&user, request)?;
    let jobs = store.jobs_in_scope(&scope).await?;
    Ok(BoardController::new(user, directory, scope, engine.clone(), jobs))
}
