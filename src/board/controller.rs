//! Board session state machine.
//!
//! ```text
//!            drag_start              drop (patch)            external update
//!   Idle ─────────────────> Dragging ───────────> Reconciling ──────────────> Idle
//!     ^                        │                      │
//!     │  drop (error / no-op)  │                      │ write failed
//!     └────────────────────────┴──────────────────────┘   (revert to snapshot)
//! ```
//!
//! The controller is synchronous and owns no I/O. `BoardSession` feeds it
//! drag gestures, write results and live-feed records; it answers with what
//! to write and what to render.

use std::collections::{BTreeMap, HashMap};

use claimboard_common::{Job, JobId, User};
use serde::{Deserialize, Serialize};

use super::lane::{LaneId, lane_of};
use super::transition::{JobPatch, TransitionEngine};
use crate::access::{Directory, Scope, ScopeResolver};
use crate::errors::BoardError;

/// Where a card was released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropTarget {
    Lane(LaneId),
    /// Dropped onto another card; lands in that card's lane, just before it.
    Job(JobId),
    /// Released outside any drop target.
    Outside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Dragging,
    Reconciling,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    /// Nothing to persist; the card stays in (or returns to) its lane.
    NoOp,
    /// Card is rendered optimistically; the caller must write `patch`.
    Write { job_id: JobId, patch: JobPatch },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExternalOutcome {
    Applied,
    /// Authoritative record agrees with the optimistic placement.
    Confirmed,
    /// Another write landed first; the authoritative lane replaced ours.
    Overridden { optimistic: LaneId, authoritative: LaneId },
    /// Job left the scope (or never was in it).
    Removed,
    Ignored,
}

/// Card order per lane.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaneView {
    lanes: BTreeMap<LaneId, Vec<JobId>>,
}

impl LaneView {
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut sorted: Vec<&Job> = jobs.into_iter().collect();
        sorted.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| a.id.cmp(&b.id)));
        let mut view = Self::default();
        for job in sorted {
            view.insert(lane_of(job), job.id.clone(), None);
        }
        view
    }

    pub fn len(&self) -> usize {
        self.lanes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self, lane: LaneId) -> &[JobId] {
        self.lanes.get(&lane).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn position(&self, id: &JobId) -> Option<(LaneId, usize)> {
        self.lanes
            .iter()
            .find_map(|(lane, ids)| ids.iter().position(|i| i == id).map(|idx| (*lane, idx)))
    }

    pub fn remove(&mut self, id: &JobId) -> Option<LaneId> {
        let (lane, idx) = self.position(id)?;
        if let Some(ids) = self.lanes.get_mut(&lane) {
            ids.remove(idx);
        }
        Some(lane)
    }

    pub fn insert(&mut self, lane: LaneId, id: JobId, index: Option<usize>) {
        let ids = self.lanes.entry(lane).or_default();
        match index {
            Some(idx) if idx <= ids.len() => ids.insert(idx, id),
            _ => ids.push(id),
        }
    }

    /// Keep the card where it is if it is already in `lane`, else move it to
    /// the end of `lane`.
    pub fn place(&mut self, id: &JobId, lane: LaneId) {
        if matches!(self.position(id), Some((current, _)) if current == lane) {
            return;
        }
        self.remove(id);
        self.insert(lane, id.clone(), None);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LaneColumn {
    pub lane: LaneId,
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
    pub phase: SessionPhase,
    pub scope: Scope,
    pub lanes: Vec<LaneColumn>,
}

#[derive(Debug, Clone)]
enum State {
    Idle,
    Dragging {
        job_id: JobId,
        snapshot: LaneView,
    },
    Reconciling {
        job_id: JobId,
        snapshot: LaneView,
        optimistic: Job,
    },
}

pub struct BoardController {
    user: User,
    directory: Directory,
    scope: Scope,
    engine: TransitionEngine,
    jobs: HashMap<JobId, Job>,
    view: LaneView,
    state: State,
}

impl BoardController {
    /// `jobs` outside `scope` are dropped on the floor.
    pub fn new(
        user: User,
        directory: Directory,
        scope: Scope,
        engine: TransitionEngine,
        jobs: Vec<Job>,
    ) -> Self {
        let jobs: HashMap<JobId, Job> = jobs
            .into_iter()
            .filter(|j| scope.covers_job(j))
            .map(|j| (j.id.clone(), j))
            .collect();
        let view = LaneView::from_jobs(jobs.values());
        Self {
            user,
            directory,
            scope,
            engine,
            jobs,
            view,
            state: State::Idle,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match self.state {
            State::Idle => SessionPhase::Idle,
            State::Dragging { .. } => SessionPhase::Dragging,
            State::Reconciling { .. } => SessionPhase::Reconciling,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn view(&self) -> &LaneView {
        &self.view
    }

    pub fn job(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn set_directory(&mut self, directory: Directory) {
        self.directory = directory;
    }

    pub fn on_drag_start(&mut self, job_id: &JobId) -> Result<(), BoardError> {
        if let State::Reconciling { job_id: pending, .. } = &self.state {
            return Err(BoardError::ReconcileInFlight(pending.clone()));
        }
        if !self.jobs.contains_key(job_id) {
            return Err(BoardError::UnknownJob(job_id.clone()));
        }
        // A drag that never dropped is abandoned.
        if let State::Dragging { snapshot, .. } = &self.state {
            self.view = snapshot.clone();
        }
        self.state = State::Dragging {
            job_id: job_id.clone(),
            snapshot: self.view.clone(),
        };
        Ok(())
    }

    /// Release outside any target or an explicit cancel.
    pub fn cancel(&mut self) {
        if let State::Dragging { snapshot, .. } = &self.state {
            self.view = snapshot.clone();
            self.state = State::Idle;
        }
    }

    pub fn on_drop(&mut self, job_id: &JobId, target: DropTarget) -> Result<DropOutcome, BoardError> {
        let snapshot = match &self.state {
            State::Dragging {
                job_id: dragging,
                snapshot,
            } if dragging == job_id => snapshot.clone(),
            _ => return Err(BoardError::NotDragging(job_id.clone())),
        };
        let Some(job) = self.jobs.get(job_id).cloned() else {
            self.revert(snapshot);
            return Err(BoardError::UnknownJob(job_id.clone()));
        };

        let current = lane_of(&job);
        let (lane, index) = match &target {
            DropTarget::Lane(lane) => (*lane, None),
            DropTarget::Outside => (current, None),
            DropTarget::Job(other) if other == job_id => (current, None),
            DropTarget::Job(other) => match self.view.position(other) {
                Some((lane, _)) => (lane, Some(other.clone())),
                None => {
                    self.revert(snapshot);
                    return Err(BoardError::UnknownJob(other.clone()));
                }
            },
        };

        // Same lane: at most a local reorder, never a write.
        if lane == current {
            self.revert(snapshot);
            if let Some(before) = &index {
                self.move_card(job_id, lane, before);
            }
            return Ok(DropOutcome::NoOp);
        }

        let resolver = ScopeResolver::new(&self.directory);
        let patch = match self
            .engine
            .authorize_and_compute(&resolver, &self.user, &job, lane)
        {
            Ok(patch) => patch,
            Err(err) => {
                self.revert(snapshot);
                return Err(err);
            }
        };

        self.view = snapshot.clone();
        if let Some(before) = &index {
            self.move_card(job_id, lane, before);
        } else {
            self.view.remove(job_id);
            self.view.insert(lane, job_id.clone(), None);
        }
        tracing::info!(job_id = %job_id, from = %current, to = %lane, "optimistic move");
        self.state = State::Reconciling {
            job_id: job_id.clone(),
            snapshot,
            optimistic: patch.apply(&job),
        };
        Ok(DropOutcome::Write {
            job_id: job_id.clone(),
            patch,
        })
    }

    /// Result of the patch write. Failures revert to the pre-drag snapshot;
    /// success keeps waiting for the live feed to confirm.
    pub fn on_write_result(&mut self, job_id: &JobId, result: Result<(), BoardError>) -> Result<(), BoardError> {
        let Err(err) = result else {
            return Ok(());
        };
        if let State::Reconciling {
            job_id: pending,
            snapshot,
            ..
        } = &self.state
            && pending == job_id
        {
            tracing::warn!(job_id = %job_id, error = %err, "write failed, reverting optimistic move");
            let snapshot = snapshot.clone();
            self.revert(snapshot);
        }
        Err(err)
    }

    pub fn on_external_update(&mut self, job: Job) -> ExternalOutcome {
        if !self.scope.covers_job(&job) {
            return if self.forget(&job.id) {
                ExternalOutcome::Removed
            } else {
                ExternalOutcome::Ignored
            };
        }

        let lane = lane_of(&job);
        let id = job.id.clone();
        self.jobs.insert(id.clone(), job);

        match &mut self.state {
            State::Reconciling {
                job_id,
                optimistic,
                ..
            } if *job_id == id => {
                let optimistic_lane = lane_of(optimistic);
                self.view.place(&id, lane);
                self.state = State::Idle;
                if optimistic_lane == lane {
                    ExternalOutcome::Confirmed
                } else {
                    tracing::warn!(
                        job_id = %id,
                        optimistic = %optimistic_lane,
                        authoritative = %lane,
                        "concurrent edit won, discarding optimistic placement"
                    );
                    ExternalOutcome::Overridden {
                        optimistic: optimistic_lane,
                        authoritative: lane,
                    }
                }
            }
            State::Reconciling { snapshot, .. } | State::Dragging { snapshot, .. } => {
                snapshot.place(&id, lane);
                self.view.place(&id, lane);
                ExternalOutcome::Applied
            }
            State::Idle => {
                self.view.place(&id, lane);
                ExternalOutcome::Applied
            }
        }
    }

    pub fn on_external_remove(&mut self, job_id: &JobId) -> ExternalOutcome {
        if self.forget(job_id) {
            ExternalOutcome::Removed
        } else {
            ExternalOutcome::Ignored
        }
    }

    /// Grouped view to render; the in-flight card shows its optimistic state.
    pub fn board(&self) -> BoardView {
        let optimistic = match &self.state {
            State::Reconciling { optimistic, .. } => Some(optimistic),
            _ => None,
        };
        let lanes = LaneId::ALL
            .into_iter()
            .map(|lane| LaneColumn {
                lane,
                jobs: self
                    .view
                    .ids(lane)
                    .iter()
                    .filter_map(|id| match optimistic {
                        Some(job) if &job.id == id => Some(job.clone()),
                        _ => self.jobs.get(id).cloned(),
                    })
                    .collect(),
            })
            .collect();
        BoardView {
            phase: self.phase(),
            scope: self.scope.clone(),
            lanes,
        }
    }

    fn move_card(&mut self, id: &JobId, lane: LaneId, before: &JobId) {
        self.view.remove(id);
        let index = self.view.position(before).map(|(_, idx)| idx);
        self.view.insert(lane, id.clone(), index);
    }

    fn revert(&mut self, snapshot: LaneView) {
        self.view = snapshot;
        self.state = State::Idle;
    }

    fn forget(&mut self, job_id: &JobId) -> bool {
        let known = self.jobs.remove(job_id).is_some();
        self.view.remove(job_id);
        let in_flight = match &mut self.state {
            State::Dragging { job_id: id, snapshot }
            | State::Reconciling {
                job_id: id,
                snapshot,
                ..
            } => {
                snapshot.remove(job_id);
                id == job_id
            }
            State::Idle => false,
        };
        if in_flight {
            self.state = State::Idle;
        }
        known
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::NavRequest;
    use crate::access::scope::tests::{directory, user};
    use crate::board::transition::tests::{engine, job};
    use claimboard_common::{JobStatus, Role};

    fn controller_for(actor: User, jobs: Vec<Job>) -> BoardController {
        let dir = directory();
        let scope = ScopeResolver::new(&dir)
            .resolve(&actor, &NavRequest::default())
            .unwrap();
        BoardController::new(actor, dir, scope, engine(), jobs)
    }

    fn manager() -> User {
        user("dm", Role::DeptManager, Some("O1"), Some("D1"))
    }

    fn board_jobs() -> Vec<Job> {
        vec![
            job("J1", JobStatus::Fnol, &[]),
            job("J2", JobStatus::Mitigation, &["u1"]),
            job("J3", JobStatus::Review, &["u1"]),
            job("J4", JobStatus::Closeout, &["u2"]),
            job("J5", JobStatus::Fnol, &[]),
        ]
    }

    fn lane_ids(c: &BoardController, lane: LaneId) -> Vec<&str> {
        c.view().ids(lane).iter().map(|id| id.as_str()).collect()
    }

    #[test]
    fn initial_view_groups_jobs_by_lane() {
        let c = controller_for(manager(), board_jobs());
        assert_eq!(lane_ids(&c, LaneId::Unassigned), vec!["J1", "J5"]);
        assert_eq!(lane_ids(&c, LaneId::InProgress), vec!["J2"]);
        assert_eq!(lane_ids(&c, LaneId::Review), vec!["J3"]);
        assert_eq!(lane_ids(&c, LaneId::Done), vec!["J4"]);
        assert_eq!(c.phase(), SessionPhase::Idle);
    }

    #[test]
    fn jobs_outside_scope_never_load() {
        let mut foreign = job("X", JobStatus::Fnol, &[]);
        foreign.department_id = "D2".into();
        let c = controller_for(manager(), vec![foreign]);
        assert!(c.view().ids(LaneId::Unassigned).is_empty());
        assert!(c.job(&"X".into()).is_none());
    }

    #[test]
    fn drop_renders_optimistically_then_confirms() {
        let mut c = controller_for(manager(), board_jobs());
        c.on_drag_start(&"J1".into()).unwrap();
        assert_eq!(c.phase(), SessionPhase::Dragging);

        let outcome = c
            .on_drop(&"J1".into(), DropTarget::Lane(LaneId::InProgress))
            .unwrap();
        let DropOutcome::Write { job_id, patch } = outcome else {
            panic!("expected a write");
        };
        assert_eq!(job_id.as_str(), "J1");
        assert_eq!(patch.assigned_user_ids, Some(vec!["dm".into()]));
        assert_eq!(c.phase(), SessionPhase::Reconciling);
        assert_eq!(lane_ids(&c, LaneId::InProgress), vec!["J2", "J1"]);

        let rendered = c.board();
        let in_progress = &rendered.lanes[1];
        assert_eq!(in_progress.lane, LaneId::InProgress);
        assert_eq!(in_progress.jobs[1].status, JobStatus::Mitigation);

        let confirmed = patch.apply(c.job(&"J1".into()).unwrap());
        assert_eq!(c.on_external_update(confirmed), ExternalOutcome::Confirmed);
        assert_eq!(c.phase(), SessionPhase::Idle);
        assert_eq!(lane_ids(&c, LaneId::InProgress), vec!["J2", "J1"]);
    }

    #[test]
    fn concurrent_edit_overrides_optimistic_lane() {
        let mut c = controller_for(manager(), board_jobs());
        c.on_drag_start(&"J2".into()).unwrap();
        c.on_drop(&"J2".into(), DropTarget::Lane(LaneId::Review)).unwrap();
        assert_eq!(lane_ids(&c, LaneId::Review), vec!["J3", "J2"]);

        let mut theirs = job("J2", JobStatus::Mitigation, &[]);
        theirs.updated_at = chrono::Utc::now();
        let outcome = c.on_external_update(theirs);
        assert_eq!(
            outcome,
            ExternalOutcome::Overridden {
                optimistic: LaneId::Review,
                authoritative: LaneId::Unassigned,
            }
        );
        assert_eq!(c.phase(), SessionPhase::Idle);
        assert_eq!(lane_ids(&c, LaneId::Review), vec!["J3"]);
        assert_eq!(lane_ids(&c, LaneId::Unassigned), vec!["J1", "J5", "J2"]);
    }

    #[test]
    fn two_sessions_converge_on_last_confirmed_write() {
        let mut a = controller_for(manager(), board_jobs());
        let mut b = controller_for(user("oa", Role::OfficeAdmin, Some("O1"), None), board_jobs());

        a.on_drag_start(&"J1".into()).unwrap();
        let DropOutcome::Write { patch: to_review, .. } =
            a.on_drop(&"J1".into(), DropTarget::Lane(LaneId::Review)).unwrap()
        else {
            panic!("expected a write");
        };
        b.on_drag_start(&"J1".into()).unwrap();
        let DropOutcome::Write { patch: to_progress, .. } =
            b.on_drop(&"J1".into(), DropTarget::Lane(LaneId::InProgress)).unwrap()
        else {
            panic!("expected a write");
        };

        let original = job("J1", JobStatus::Fnol, &[]);
        let first = to_review.apply(&original);
        let second = to_progress.apply(&first);

        for update in [first, second] {
            a.on_external_update(update.clone());
            b.on_external_update(update);
        }
        for c in [&a, &b] {
            assert_eq!(c.phase(), SessionPhase::Idle);
            assert_eq!(c.view().position(&"J1".into()).unwrap().0, LaneId::InProgress);
        }
    }

    #[test]
    fn illegal_drop_reverts_without_rendering() {
        let mut c = controller_for(manager(), board_jobs());
        let before = c.view().clone();
        c.on_drag_start(&"J4".into()).unwrap();
        let err = c
            .on_drop(&"J4".into(), DropTarget::Lane(LaneId::Review))
            .unwrap_err();
        assert!(matches!(err, BoardError::TerminalJob { .. }));
        assert_eq!(c.view(), &before);
        assert_eq!(c.phase(), SessionPhase::Idle);
    }

    #[test]
    fn member_drop_is_scope_denied() {
        let mut c = controller_for(user("m", Role::Member, Some("O1"), Some("D1")), board_jobs());
        let before = c.view().clone();
        c.on_drag_start(&"J1".into()).unwrap();
        let err = c
            .on_drop(&"J1".into(), DropTarget::Lane(LaneId::InProgress))
            .unwrap_err();
        assert!(matches!(err, BoardError::ScopeDenied(_)));
        assert_eq!(c.view(), &before);
    }

    #[test]
    fn write_failure_reverts_to_snapshot() {
        let mut c = controller_for(manager(), board_jobs());
        let before = c.view().clone();
        c.on_drag_start(&"J1".into()).unwrap();
        c.on_drop(&"J1".into(), DropTarget::Lane(LaneId::Done)).unwrap();
        assert_ne!(c.view(), &before);

        let err = c.on_write_result(
            &"J1".into(),
            Err(BoardError::WriteConflict {
                job_id: "J1".into(),
                message: "rejected".into(),
            }),
        );
        assert!(err.is_err());
        assert_eq!(c.view(), &before);
        assert_eq!(c.phase(), SessionPhase::Idle);
    }

    #[test]
    fn successful_write_keeps_waiting_for_feed() {
        let mut c = controller_for(manager(), board_jobs());
        c.on_drag_start(&"J1".into()).unwrap();
        c.on_drop(&"J1".into(), DropTarget::Lane(LaneId::Review)).unwrap();
        c.on_write_result(&"J1".into(), Ok(())).unwrap();
        assert_eq!(c.phase(), SessionPhase::Reconciling);
        assert!(matches!(
            c.on_drag_start(&"J5".into()),
            Err(BoardError::ReconcileInFlight(_))
        ));
    }

    #[test]
    fn release_outside_is_a_no_op() {
        let mut c = controller_for(manager(), board_jobs());
        let before = c.view().clone();
        c.on_drag_start(&"J2".into()).unwrap();
        assert_eq!(c.on_drop(&"J2".into(), DropTarget::Outside).unwrap(), DropOutcome::NoOp);
        assert_eq!(c.view(), &before);
        assert_eq!(c.phase(), SessionPhase::Idle);
    }

    #[test]
    fn drop_onto_card_in_same_lane_reorders_locally() {
        let mut c = controller_for(manager(), board_jobs());
        c.on_drag_start(&"J5".into()).unwrap();
        let outcome = c.on_drop(&"J5".into(), DropTarget::Job("J1".into())).unwrap();
        assert_eq!(outcome, DropOutcome::NoOp);
        assert_eq!(lane_ids(&c, LaneId::Unassigned), vec!["J5", "J1"]);
    }

    #[test]
    fn drop_onto_card_in_other_lane_lands_before_it() {
        let mut c = controller_for(manager(), board_jobs());
        c.on_drag_start(&"J1".into()).unwrap();
        let outcome = c.on_drop(&"J1".into(), DropTarget::Job("J3".into())).unwrap();
        assert!(matches!(outcome, DropOutcome::Write { .. }));
        assert_eq!(lane_ids(&c, LaneId::Review), vec!["J1", "J3"]);
    }

    #[test]
    fn drop_without_drag_is_rejected() {
        let mut c = controller_for(manager(), board_jobs());
        assert!(matches!(
            c.on_drop(&"J1".into(), DropTarget::Lane(LaneId::Review)),
            Err(BoardError::NotDragging(_))
        ));
        c.on_drag_start(&"J1".into()).unwrap();
        assert!(matches!(
            c.on_drop(&"J5".into(), DropTarget::Lane(LaneId::Review)),
            Err(BoardError::NotDragging(_))
        ));
    }

    #[test]
    fn update_leaving_scope_removes_card() {
        let mut c = controller_for(manager(), board_jobs());
        let mut moved = job("J2", JobStatus::Mitigation, &["u1"]);
        moved.department_id = "D2".into();
        assert_eq!(c.on_external_update(moved), ExternalOutcome::Removed);
        assert!(c.view().position(&"J2".into()).is_none());

        let mut stranger = job("J9", JobStatus::Fnol, &[]);
        stranger.office_id = "O2".into();
        stranger.department_id = "D3".into();
        assert_eq!(c.on_external_update(stranger), ExternalOutcome::Ignored);
    }

    #[test]
    fn updates_during_drag_survive_cancel() {
        let mut c = controller_for(manager(), board_jobs());
        c.on_drag_start(&"J1".into()).unwrap();
        c.on_external_update(job("J5", JobStatus::Review, &[]));
        c.cancel();
        assert_eq!(c.phase(), SessionPhase::Idle);
        assert_eq!(lane_ids(&c, LaneId::Review), vec!["J3", "J5"]);
        assert_eq!(lane_ids(&c, LaneId::Unassigned), vec!["J1"]);
    }
}
