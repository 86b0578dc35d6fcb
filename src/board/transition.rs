//! Lane transition engine.
//!
//! Turns "move this job into that lane" into the minimal field patch that
//! makes `lane_of(patched) == target`, and owns every side effect of a move:
//! auto-claim on entering `in_progress`, clearing assignees on return to
//! `unassigned`, and the `updated_at` stamp. The returned patch must be
//! applied as a whole.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use claimboard_common::{Job, JobStatus, User, UserId};
use serde::{Deserialize, Serialize};

use super::lane::{LaneId, is_legal, lane_of};
use crate::access::ScopeResolver;
use crate::errors::BoardError;

/// Time source for `updated_at` stamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Field changes for a single job. Absent fields are left untouched by the
/// merge-update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_user_ids: Option<Vec<UserId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl JobPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.assigned_user_ids.is_none() && self.updated_at.is_none()
    }

    /// Merge onto `job`, returning the patched copy.
    pub fn apply(&self, job: &Job) -> Job {
        let mut patched = job.clone();
        if let Some(status) = self.status {
            patched.status = status;
        }
        if let Some(assigned) = &self.assigned_user_ids {
            patched.assigned_user_ids = assigned.clone();
        }
        if let Some(updated_at) = self.updated_at {
            patched.updated_at = updated_at;
        }
        patched
    }
}

#[derive(Clone)]
pub struct TransitionEngine {
    clock: Arc<dyn Clock>,
}

impl Default for TransitionEngine {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl TransitionEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn compute_transition(
        &self,
        job: &Job,
        target: LaneId,
        acting_user_id: &UserId,
    ) -> Result<JobPatch, BoardError> {
        let current = lane_of(job);
        if current == target {
            return Ok(JobPatch::default());
        }
        if job.status.is_terminal() || !is_legal(current, target) {
            return Err(BoardError::TerminalJob {
                job_id: job.id.clone(),
            });
        }

        let mut patch = JobPatch::default();
        match target {
            LaneId::Unassigned => {
                if job.is_assigned() {
                    patch.assigned_user_ids = Some(Vec::new());
                }
                // Review would keep the job in the review lane; fall back to
                // the field-work entry point. Field-work stamps are kept.
                if job.status == JobStatus::Review {
                    patch.status = Some(JobStatus::Mitigation);
                }
            }
            LaneId::InProgress => {
                if !job.status.is_field_work() {
                    patch.status = Some(JobStatus::Mitigation);
                }
                if !job.is_assigned() {
                    patch.assigned_user_ids = Some(vec![acting_user_id.clone()]);
                }
            }
            LaneId::Review => patch.status = Some(JobStatus::Review),
            LaneId::Done => patch.status = Some(JobStatus::Closeout),
        }
        patch.updated_at = Some(self.clock.now());

        debug_assert_eq!(lane_of(&patch.apply(job)), target);
        tracing::debug!(
            job_id = %job.id,
            from = %current,
            to = %target,
            acting_user = %acting_user_id,
            "computed lane transition"
        );
        Ok(patch)
    }

    /// Scope check composed in front of `compute_transition`.
    pub fn authorize_and_compute(
        &self,
        resolver: &ScopeResolver<'_>,
        user: &User,
        job: &Job,
        target: LaneId,
    ) -> Result<JobPatch, BoardError> {
        if !resolver.can_write(user, job) {
            tracing::warn!(job_id = %job.id, user_id = %user.id, "move outside writable scope");
            return Err(BoardError::ScopeDenied(format!(
                "user {} may not move job {}",
                user.id, job.id
            )));
        }
        self.compute_transition(job, target, &user.id)
    }
}
