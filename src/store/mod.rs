//! Persistence collaborator.
//!
//! [`JobStore`] is the seam between board sessions and storage: merge-update
//! of a single job, scoped job queries, the org directory, and a live feed of
//! every committed write. [`SqliteStore`] is the production implementation.
//!
//! Writes publish while the database lock is still held, so feed order
//! always matches commit order.

pub mod db;
pub mod feed;

use async_trait::async_trait;
use claimboard_common::{Department, DepartmentId, Job, JobId, Office, OfficeId, OrgId, User, UserId};
use tokio::sync::broadcast;

use crate::access::{Directory, Scope};
use crate::board::JobPatch;
use crate::errors::StoreError;

pub use db::{BoardDb, DbHandle};
pub use feed::{FeedEvent, LiveFeed};

#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Merge `patch` onto the stored job. Last write wins; there is no
    /// version check.
    async fn apply_patch(&self, job_id: &JobId, patch: &JobPatch) -> Result<Job, StoreError>;

    async fn jobs_in_scope(&self, scope: &Scope) -> Result<Vec<Job>, StoreError>;

    async fn directory(&self, org_id: &OrgId) -> Result<Directory, StoreError>;

    async fn user(&self, user_id: &UserId) -> Result<Option<User>, StoreError>;

    /// Receiver for writes committed after this call.
    fn subscribe(&self) -> broadcast::Receiver<FeedEvent>;
}

/// SQLite-backed store that publishes each committed write on its feed.
#[derive(Clone)]
pub struct SqliteStore {
    db: DbHandle,
    feed: LiveFeed,
}

impl SqliteStore {
    pub fn new(db: BoardDb, feed_capacity: usize) -> Self {
        Self {
            db: DbHandle::new(db),
            feed: LiveFeed::new(feed_capacity),
        }
    }

    pub fn db(&self) -> &DbHandle {
        &self.db
    }

    pub fn feed(&self) -> &LiveFeed {
        &self.feed
    }

    pub async fn create_job(&self, job: Job) -> Result<Job, StoreError> {
        let feed = self.feed.clone();
        let job = self
            .db
            .call(move |db| {
                let job = db.insert_job(&job)?;
                feed.publish(FeedEvent::JobChanged { job: job.clone() });
                Ok(job)
            })
            .await?;
        tracing::info!(job_id = %job.id, department_id = %job.department_id, "job created");
        Ok(job)
    }

    pub async fn job(&self, job_id: &JobId) -> Result<Option<Job>, StoreError> {
        let id = job_id.clone();
        Ok(self.db.call(move |db| db.get_job(&id)).await?)
    }

    pub async fn office(&self, office_id: &OfficeId) -> Result<Option<Office>, StoreError> {
        let id = office_id.clone();
        Ok(self.db.call(move |db| db.get_office(&id)).await?)
    }

    pub async fn department(&self, department_id: &DepartmentId) -> Result<Option<Department>, StoreError> {
        let id = department_id.clone();
        Ok(self.db.call(move |db| db.get_department(&id)).await?)
    }

    pub async fn upsert_office(&self, office: Office) -> Result<Office, StoreError> {
        let feed = self.feed.clone();
        Ok(self
            .db
            .call(move |db| {
                let office = db.upsert_office(&office)?;
                feed.publish(FeedEvent::OfficeChanged {
                    office: office.clone(),
                });
                Ok(office)
            })
            .await?)
    }

    pub async fn upsert_department(&self, department: Department) -> Result<Department, StoreError> {
        let feed = self.feed.clone();
        Ok(self
            .db
            .call(move |db| {
                let department = db.upsert_department(&department)?;
                feed.publish(FeedEvent::DepartmentChanged {
                    department: department.clone(),
                });
                Ok(department)
            })
            .await?)
    }

    pub async fn upsert_user(&self, user: User) -> Result<User, StoreError> {
        let feed = self.feed.clone();
        let user = self
            .db
            .call(move |db| {
                let user = db.upsert_user(&user)?;
                feed.publish(FeedEvent::UserChanged { user: user.clone() });
                Ok(user)
            })
            .await?;
        tracing::info!(user_id = %user.id, role = %user.role, "user saved");
        Ok(user)
    }
}

#[async_trait]
impl JobStore for SqliteStore {
    async fn apply_patch(&self, job_id: &JobId, patch: &JobPatch) -> Result<Job, StoreError> {
        let id = job_id.clone();
        let patch = patch.clone();
        let feed = self.feed.clone();
        let job = self
            .db
            .call_store(move |db| {
                let job = db.apply_patch(&id, &patch)?;
                feed.publish(FeedEvent::JobChanged { job: job.clone() });
                Ok(job)
            })
            .await?;
        tracing::debug!(job_id = %job.id, status = %job.status, "job patched");
        Ok(job)
    }

    async fn jobs_in_scope(&self, scope: &Scope) -> Result<Vec<Job>, StoreError> {
        let scope = scope.clone();
        Ok(self.db.call(move |db| db.list_jobs(&scope)).await?)
    }

    async fn directory(&self, org_id: &OrgId) -> Result<Directory, StoreError> {
        let org_id = org_id.clone();
        Ok(self.db.call(move |db| db.directory(&org_id)).await?)
    }

    async fn user(&self, user_id: &UserId) -> Result<Option<User>, StoreError> {
        let user_id = user_id.clone();
        Ok(self.db.call(move |db| db.get_user(&user_id)).await?)
    }

    fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.feed.subscribe()
    }
}
