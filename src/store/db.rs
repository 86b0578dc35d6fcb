use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use claimboard_common::{
    Department, DepartmentId, Job, JobId, JobStatus, Office, OfficeId, OrgId, Role, User, UserId,
};
use rusqlite::{Connection, OptionalExtension, params};

use crate::access::{Directory, Scope};
use crate::board::JobPatch;
use crate::errors::StoreError;

/// Async-safe handle to the board database.
///
/// Wraps `BoardDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&BoardDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }

    /// Like `call`, for closures that report `StoreError` themselves.
    pub async fn call_store<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&BoardDb) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| StoreError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Database(anyhow::anyhow!("DB task panicked: {e}")))?
    }

    /// Acquire the database mutex synchronously. For startup and tests only.
    pub fn lock_sync(&self) -> Result<std::sync::MutexGuard<'_, BoardDb>> {
        self.inner
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }
}

pub struct BoardDb {
    conn: Connection,
}

const JOB_COLUMNS: &str =
    "id, org_id, office_id, department_id, title, status, assigned_user_ids, updated_at";

impl BoardDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS offices (
                    id TEXT PRIMARY KEY,
                    org_id TEXT NOT NULL,
                    name TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS departments (
                    id TEXT PRIMARY KEY,
                    org_id TEXT NOT NULL,
                    office_id TEXT NOT NULL REFERENCES offices(id),
                    name TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    role TEXT NOT NULL,
                    org_id TEXT NOT NULL,
                    office_id TEXT,
                    department_id TEXT,
                    name TEXT NOT NULL DEFAULT ''
                );

                CREATE TABLE IF NOT EXISTS jobs (
                    id TEXT PRIMARY KEY,
                    org_id TEXT NOT NULL,
                    office_id TEXT NOT NULL REFERENCES offices(id),
                    department_id TEXT NOT NULL REFERENCES departments(id),
                    title TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'fnol',
                    assigned_user_ids TEXT NOT NULL DEFAULT '[]',
                    updated_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_jobs_scope ON jobs(org_id, office_id, department_id);
                CREATE INDEX IF NOT EXISTS idx_departments_office ON departments(office_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Directory ─────────────────────────────────────────────────────

    pub fn upsert_office(&self, office: &Office) -> Result<Office> {
        self.conn
            .execute(
                "INSERT INTO offices (id, org_id, name) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                params![office.id.as_str(), office.org_id.as_str(), office.name],
            )
            .context("Failed to upsert office")?;
        Ok(office.clone())
    }

    pub fn upsert_department(&self, department: &Department) -> Result<Department> {
        self.conn
            .execute(
                "INSERT INTO departments (id, org_id, office_id, name) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                params![
                    department.id.as_str(),
                    department.org_id.as_str(),
                    department.office_id.as_str(),
                    department.name
                ],
            )
            .context("Failed to upsert department")?;
        Ok(department.clone())
    }

    pub fn get_office(&self, id: &OfficeId) -> Result<Option<Office>> {
        self.conn
            .query_row(
                "SELECT id, org_id, name FROM offices WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok(Office {
                        id: row.get::<_, String>(0)?.into(),
                        org_id: row.get::<_, String>(1)?.into(),
                        name: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("Failed to query office")
    }

    pub fn get_department(&self, id: &DepartmentId) -> Result<Option<Department>> {
        self.conn
            .query_row(
                "SELECT id, org_id, office_id, name FROM departments WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok(Department {
                        id: row.get::<_, String>(0)?.into(),
                        org_id: row.get::<_, String>(1)?.into(),
                        office_id: row.get::<_, String>(2)?.into(),
                        name: row.get(3)?,
                    })
                },
            )
            .optional()
            .context("Failed to query department")
    }

    pub fn list_offices(&self, org_id: &OrgId) -> Result<Vec<Office>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, org_id, name FROM offices WHERE org_id = ?1 ORDER BY id")
            .context("Failed to prepare list_offices")?;
        let rows = stmt
            .query_map(params![org_id.as_str()], |row| {
                Ok(Office {
                    id: row.get::<_, String>(0)?.into(),
                    org_id: row.get::<_, String>(1)?.into(),
                    name: row.get(2)?,
                })
            })
            .context("Failed to query offices")?;
        let mut offices = Vec::new();
        for row in rows {
            offices.push(row.context("Failed to read office row")?);
        }
        Ok(offices)
    }

    pub fn list_departments(&self, org_id: &OrgId) -> Result<Vec<Department>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, org_id, office_id, name FROM departments WHERE org_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare list_departments")?;
        let rows = stmt
            .query_map(params![org_id.as_str()], |row| {
                Ok(Department {
                    id: row.get::<_, String>(0)?.into(),
                    org_id: row.get::<_, String>(1)?.into(),
                    office_id: row.get::<_, String>(2)?.into(),
                    name: row.get(3)?,
                })
            })
            .context("Failed to query departments")?;
        let mut departments = Vec::new();
        for row in rows {
            departments.push(row.context("Failed to read department row")?);
        }
        Ok(departments)
    }

    pub fn directory(&self, org_id: &OrgId) -> Result<Directory> {
        Ok(Directory::new(
            self.list_offices(org_id)?,
            self.list_departments(org_id)?,
        ))
    }

    // ── Users ─────────────────────────────────────────────────────────

    pub fn upsert_user(&self, user: &User) -> Result<User> {
        self.conn
            .execute(
                "INSERT INTO users (id, role, org_id, office_id, department_id, name)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    role = excluded.role,
                    office_id = excluded.office_id,
                    department_id = excluded.department_id,
                    name = excluded.name",
                params![
                    user.id.as_str(),
                    user.role.as_str(),
                    user.org_id.as_str(),
                    user.office_id.as_ref().map(|o| o.as_str()),
                    user.department_id.as_ref().map(|d| d.as_str()),
                    user.name,
                ],
            )
            .context("Failed to upsert user")?;
        self.get_user(&user.id)?
            .context("User not found after upsert")
    }

    pub fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, role, org_id, office_id, department_id, name FROM users WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        role: row.get(1)?,
                        org_id: row.get(2)?,
                        office_id: row.get(3)?,
                        department_id: row.get(4)?,
                        name: row.get(5)?,
                    })
                },
            )
            .optional()
            .context("Failed to query user")?;
        row.map(UserRow::into_user).transpose()
    }

    // ── Jobs ──────────────────────────────────────────────────────────

    pub fn insert_job(&self, job: &Job) -> Result<Job> {
        let assigned =
            serde_json::to_string(&job.assigned_user_ids).context("Failed to encode assignees")?;
        self.conn
            .execute(
                "INSERT INTO jobs (id, org_id, office_id, department_id, title, status, assigned_user_ids, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    job.id.as_str(),
                    job.org_id.as_str(),
                    job.office_id.as_str(),
                    job.department_id.as_str(),
                    job.title,
                    job.status.as_str(),
                    assigned,
                    timestamp(&job.updated_at),
                ],
            )
            .context("Failed to insert job")?;
        self.get_job(&job.id)?.context("Job not found after insert")
    }

    pub fn get_job(&self, id: &JobId) -> Result<Option<Job>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![id.as_str()],
                JobRow::from_row,
            )
            .optional()
            .context("Failed to query job")?;
        row.map(JobRow::into_job).transpose()
    }

    /// Jobs visible through `scope`, oldest update first.
    pub fn list_jobs(&self, scope: &Scope) -> Result<Vec<Job>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM jobs
                 WHERE org_id = ?1
                   AND (?2 IS NULL OR office_id = ?2)
                   AND (?3 IS NULL OR department_id = ?3)
                 ORDER BY updated_at, id"
            ))
            .context("Failed to prepare list_jobs")?;
        let rows = stmt
            .query_map(
                params![
                    scope.org_id.as_str(),
                    scope.office_id.concrete().map(|o| o.as_str()),
                    scope.department_id.concrete().map(|d| d.as_str()),
                ],
                JobRow::from_row,
            )
            .context("Failed to query jobs")?;
        let mut jobs = Vec::new();
        for row in rows {
            let r = row.context("Failed to read job row")?;
            jobs.push(r.into_job()?);
        }
        Ok(jobs)
    }

    /// Merge-update: only fields present in `patch` are written, all in one
    /// transaction. Refuses jobs that vanished or are already closed out.
    pub fn apply_patch(&self, id: &JobId, patch: &JobPatch) -> Result<Job, StoreError> {
        // Safety: DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let stored: Option<String> = tx
            .query_row(
                "SELECT status FROM jobs WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match stored.as_deref() {
            None => {
                return Err(StoreError::Conflict {
                    job_id: id.clone(),
                    message: "job no longer exists".to_string(),
                });
            }
            Some(status) if status == JobStatus::Closeout.as_str() && !patch.is_empty() => {
                return Err(StoreError::Conflict {
                    job_id: id.clone(),
                    message: "job is already closed out".to_string(),
                });
            }
            Some(_) => {}
        }

        if let Some(status) = patch.status {
            tx.execute(
                "UPDATE jobs SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id.as_str()],
            )
            .context("Failed to update job status")?;
        }
        if let Some(assigned) = &patch.assigned_user_ids {
            let encoded =
                serde_json::to_string(assigned).context("Failed to encode assignees")?;
            tx.execute(
                "UPDATE jobs SET assigned_user_ids = ?1 WHERE id = ?2",
                params![encoded, id.as_str()],
            )
            .context("Failed to update job assignees")?;
        }
        if let Some(updated_at) = &patch.updated_at {
            tx.execute(
                "UPDATE jobs SET updated_at = ?1 WHERE id = ?2",
                params![timestamp(updated_at), id.as_str()],
            )
            .context("Failed to update job timestamp")?;
        }

        tx.commit().context("Failed to commit job patch")?;
        self.get_job(id)?.ok_or_else(|| StoreError::NotFound {
            kind: "job",
            id: id.to_string(),
        })
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ── Row helpers ───────────────────────────────────────────────────────

struct UserRow {
    id: String,
    role: String,
    org_id: String,
    office_id: Option<String>,
    department_id: Option<String>,
    name: String,
}

impl UserRow {
    fn into_user(self) -> Result<User> {
        let role = Role::from_str(&self.role).context("Failed to parse user role")?;
        Ok(User {
            id: self.id.into(),
            role,
            org_id: self.org_id.into(),
            office_id: self.office_id.map(Into::into),
            department_id: self.department_id.map(Into::into),
            name: self.name,
        })
    }
}

/// Intermediate row struct for jobs.
struct JobRow {
    id: String,
    org_id: String,
    office_id: String,
    department_id: String,
    title: String,
    status: String,
    assigned_user_ids: String,
    updated_at: String,
}

impl JobRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            org_id: row.get(1)?,
            office_id: row.get(2)?,
            department_id: row.get(3)?,
            title: row.get(4)?,
            status: row.get(5)?,
            assigned_user_ids: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_job(self) -> Result<Job> {
        let status = JobStatus::from_str(&self.status).context("Failed to parse job status")?;
        let assigned_user_ids: Vec<UserId> = serde_json::from_str(&self.assigned_user_ids)
            .context("Failed to parse job assignees JSON")?;
        let updated_at = DateTime::parse_from_rfc3339(&self.updated_at)
            .context("Failed to parse job timestamp")?
            .with_timezone(&Utc);
        Ok(Job {
            id: self.id.into(),
            org_id: self.org_id.into(),
            office_id: self.office_id.into(),
            department_id: self.department_id.into(),
            title: self.title,
            status,
            assigned_user_ids,
            updated_at,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
