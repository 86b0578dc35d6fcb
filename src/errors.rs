//! Typed error hierarchy for Claimboard.
//!
//! Three top-level enums cover the three subsystems:
//! - `ScopeError`: hierarchy/visibility resolution failures
//! - `BoardError`: workflow board transitions and session failures
//! - `StoreError`: persistence collaborator failures
//!
//! `SessionError` wraps the first and last for opening a board session.

use claimboard_common::{JobId, UserId};
use thiserror::Error;

/// Errors from resolving a user's visibility scope.
#[derive(Debug, Error)]
pub enum ScopeError {
    /// The request reaches outside the user's hierarchy. Callers redirect or
    /// hide; they never fall back to a narrower scope.
    #[error("Scope denied: {0}")]
    Denied(String),

    /// The user record violates the role/membership invariant. Caller bug.
    #[error("Invalid membership for user {user_id}: {message}")]
    InvalidMembership { user_id: UserId, message: String },

    #[error("User {0} not found")]
    UnknownUser(UserId),
}

/// Errors from the workflow board (transition engine and board sessions).
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Scope denied: {0}")]
    ScopeDenied(String),

    #[error("Job {job_id} is closed out; no further lane transitions")]
    TerminalJob { job_id: JobId },

    #[error("Unknown lane '{0}'")]
    UnknownLane(String),

    #[error("Write rejected for job {job_id}: {message}")]
    WriteConflict { job_id: JobId, message: String },

    #[error("Job {0} is not on this board")]
    UnknownJob(JobId),

    #[error("No drag in progress for job {0}")]
    NotDragging(JobId),

    #[error("Job {0} is still being reconciled")]
    ReconcileInFlight(JobId),
}

impl From<ScopeError> for BoardError {
    fn from(err: ScopeError) -> Self {
        BoardError::ScopeDenied(err.to_string())
    }
}

/// Errors from the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    /// The store refused the write precondition (record gone or terminal).
    #[error("Conflict on job {job_id}: {message}")]
    Conflict { job_id: JobId, message: String },

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Database(err)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.into())
    }
}

impl StoreError {
    /// Fold a failed patch write into the board's error taxonomy.
    pub fn into_board_error(self, job_id: &JobId) -> BoardError {
        BoardError::WriteConflict {
            job_id: job_id.clone(),
            message: self.to_string(),
        }
    }
}

/// Errors from opening or rebuilding a board session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_error_denied_is_matchable() {
        let err = ScopeError::Denied("office O2".to_string());
        match &err {
            ScopeError::Denied(msg) => assert_eq!(msg, "office O2"),
            _ => panic!("Expected Denied"),
        }
    }

    #[test]
    fn scope_error_converts_to_board_scope_denied() {
        let err: BoardError = ScopeError::Denied("department D9".to_string()).into();
        match &err {
            BoardError::ScopeDenied(msg) => assert!(msg.contains("D9")),
            _ => panic!("Expected BoardError::ScopeDenied"),
        }
    }

    #[test]
    fn board_error_terminal_job_carries_id() {
        let err = BoardError::TerminalJob {
            job_id: JobId::from("J42"),
        };
        assert!(err.to_string().contains("J42"));
    }

    #[test]
    fn store_conflict_becomes_write_conflict() {
        let job_id = JobId::from("J1");
        let err = StoreError::Conflict {
            job_id: job_id.clone(),
            message: "job is closed out".to_string(),
        }
        .into_board_error(&job_id);
        match err {
            BoardError::WriteConflict { job_id: id, message } => {
                assert_eq!(id, job_id);
                assert!(message.contains("closed out"));
            }
            other => panic!("Expected WriteConflict, got {other:?}"),
        }
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ScopeError::UnknownUser(UserId::from("u1")));
        assert_std_error(&BoardError::UnknownLane("backlog".into()));
        assert_std_error(&StoreError::LockPoisoned);
        assert_std_error(&SessionError::from(StoreError::LockPoisoned));
    }
}
