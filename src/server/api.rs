use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use claimboard_common::{Department, DepartmentId, Job, JobId, Office, OfficeId, Role, User, UserId};
use serde::{Deserialize, Serialize};

use crate::access::{Capability, NavContext, NavEntry, NavRequest, Scope, ScopeResolver, has_capability, nav};
use crate::board::{BoardController, LaneId, TransitionEngine};
use crate::errors::{BoardError, ScopeError, SessionError, StoreError};
use crate::store::{JobStore, SqliteStore};

/// Header carrying the acting user's id. Authentication happens upstream.
pub const USER_HEADER: &str = "x-user-id";

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub engine: TransitionEngine,
    pub catalog: Vec<NavEntry>,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub office_id: OfficeId,
    pub department_id: DepartmentId,
    pub title: String,
}

#[derive(Deserialize)]
pub struct MoveJobRequest {
    pub lane: String,
}

#[derive(Deserialize)]
pub struct UpsertOfficeRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct UpsertDepartmentRequest {
    pub office_id: OfficeId,
    pub name: String,
}

#[derive(Deserialize)]
pub struct UpsertUserRequest {
    pub role: Role,
    pub office_id: Option<OfficeId>,
    pub department_id: Option<DepartmentId>,
    #[serde(default)]
    pub name: String,
}

#[derive(Serialize)]
pub struct ScopeResponse {
    pub scope: Scope,
    pub context: NavContext,
    pub offices: Vec<Office>,
    pub departments: Vec<Department>,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<ScopeError> for ApiError {
    fn from(err: ScopeError) -> Self {
        match err {
            ScopeError::Denied(_) => ApiError::Forbidden(err.to_string()),
            ScopeError::UnknownUser(_) => ApiError::Unauthorized(err.to_string()),
            ScopeError::InvalidMembership { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        match err {
            BoardError::ScopeDenied(_) => ApiError::Forbidden(err.to_string()),
            BoardError::UnknownLane(_) => ApiError::BadRequest(err.to_string()),
            BoardError::UnknownJob(_) => ApiError::NotFound(err.to_string()),
            BoardError::TerminalJob { .. }
            | BoardError::WriteConflict { .. }
            | BoardError::NotDragging(_)
            | BoardError::ReconcileInFlight(_) => ApiError::Conflict(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::Conflict { .. } => ApiError::Conflict(err.to_string()),
            StoreError::Database(_) | StoreError::LockPoisoned => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Scope(e) => e.into(),
            SessionError::Store(e) => e.into(),
        }
    }
}

// ── Acting user ───────────────────────────────────────────────────────

/// The user named by the `x-user-id` header, loaded from the store.
pub struct ActingUser(pub User);

impl FromRequestParts<SharedState> for ActingUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_HEADER} header")))?;
        let user_id = UserId::from(id);
        let user = state
            .store
            .user(&user_id)
            .await?
            .ok_or(ScopeError::UnknownUser(user_id))?;
        Ok(ActingUser(user))
    }
}

fn require(user: &User, capability: Capability) -> Result<(), ApiError> {
    if has_capability(user.role, capability) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "role {} lacks {:?}",
            user.role, capability
        )))
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/scope", get(get_scope))
        .route("/api/nav", get(get_nav))
        .route("/api/board", get(get_board))
        .route("/api/jobs", post(create_job))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/jobs/{id}/move", post(move_job))
        .route("/api/offices/{id}", put(upsert_office))
        .route("/api/departments/{id}", put(upsert_department))
        .route("/api/users/{id}", put(upsert_user))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn resolve_scope(
    state: &AppState,
    user: &User,
    request: &NavRequest,
) -> Result<(crate::access::Directory, Scope), ApiError> {
    let directory = state.store.directory(&user.org_id).await?;
    let scope = ScopeResolver::new(&directory).resolve(user, request)?;
    Ok((directory, scope))
}

async fn get_scope(
    State(state): State<SharedState>,
    ActingUser(user): ActingUser,
    Query(request): Query<NavRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (directory, scope) = resolve_scope(&state, &user, &request).await?;
    Ok(Json(ScopeResponse {
        context: scope.context(),
        offices: directory.offices_in(&scope).into_iter().cloned().collect(),
        departments: directory.departments_in(&scope).into_iter().cloned().collect(),
        scope,
    }))
}

async fn get_nav(
    State(state): State<SharedState>,
    ActingUser(user): ActingUser,
    Query(request): Query<NavRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (_, scope) = resolve_scope(&state, &user, &request).await?;
    Ok(Json(nav::filter(&state.catalog, &user, &scope)))
}

async fn get_board(
    State(state): State<SharedState>,
    ActingUser(user): ActingUser,
    Query(request): Query<NavRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (directory, scope) = resolve_scope(&state, &user, &request).await?;
    let jobs = state.store.jobs_in_scope(&scope).await?;
    let controller = BoardController::new(user, directory, scope, state.engine.clone(), jobs);
    Ok(Json(controller.board()))
}

async fn create_job(
    State(state): State<SharedState>,
    ActingUser(user): ActingUser,
    Json(req): Json<CreateJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&user, Capability::CreateJobs)?;
    let request = NavRequest::department(req.office_id.clone(), req.department_id.clone());
    let (_, scope) = resolve_scope(&state, &user, &request).await?;
    if !scope.writable {
        return Err(ApiError::Forbidden(format!("user {} may not create jobs", user.id)));
    }
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }
    let job = Job::new(
        user.org_id.clone(),
        req.office_id,
        req.department_id,
        title,
        state.engine.now(),
    );
    let job = state.store.create_job(job).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

async fn get_job(
    State(state): State<SharedState>,
    ActingUser(user): ActingUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = JobId::from(id);
    let not_found = || ApiError::NotFound(format!("Job {} not found", job_id));
    let job = state.store.job(&job_id).await?.ok_or_else(not_found)?;
    let (_, scope) = resolve_scope(&state, &user, &NavRequest::default()).await?;
    if !scope.covers_job(&job) {
        return Err(not_found());
    }
    Ok(Json(job))
}

async fn move_job(
    State(state): State<SharedState>,
    ActingUser(user): ActingUser,
    Path(id): Path<String>,
    Json(req): Json<MoveJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let lane: LaneId = req.lane.parse()?;
    let job_id = JobId::from(id);
    let job = state
        .store
        .job(&job_id)
        .await?
        .ok_or_else(|| BoardError::UnknownJob(job_id.clone()))?;
    let directory = state.store.directory(&user.org_id).await?;
    let patch = state
        .engine
        .authorize_and_compute(&ScopeResolver::new(&directory), &user, &job, lane)?;
    if patch.is_empty() {
        return Ok(Json(job));
    }
    let job = state
        .store
        .apply_patch(&job_id, &patch)
        .await
        .map_err(|e| e.into_board_error(&job_id))?;
    Ok(Json(job))
}

async fn upsert_office(
    State(state): State<SharedState>,
    ActingUser(user): ActingUser,
    Path(id): Path<String>,
    Json(req): Json<UpsertOfficeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&user, Capability::ManageOffices)?;
    let office_id = OfficeId::from(id);
    if let Some(existing) = state.store.office(&office_id).await?
        && existing.org_id != user.org_id
    {
        return Err(ApiError::Forbidden(format!("office {} belongs to another organization", office_id)));
    }
    let office = state
        .store
        .upsert_office(Office {
            id: office_id,
            org_id: user.org_id.clone(),
            name: req.name,
        })
        .await?;
    Ok(Json(office))
}

async fn upsert_department(
    State(state): State<SharedState>,
    ActingUser(user): ActingUser,
    Path(id): Path<String>,
    Json(req): Json<UpsertDepartmentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&user, Capability::ManageDepartments)?;
    let department_id = DepartmentId::from(id);
    resolve_scope(&state, &user, &NavRequest::office(req.office_id.clone())).await?;
    if let Some(existing) = state.store.department(&department_id).await? {
        if existing.org_id != user.org_id {
            return Err(ApiError::Forbidden(format!(
                "department {} belongs to another organization",
                department_id
            )));
        }
        if existing.office_id != req.office_id {
            return Err(ApiError::BadRequest(format!(
                "department {} cannot move from office {} to {}",
                department_id, existing.office_id, req.office_id
            )));
        }
    }
    let department = state
        .store
        .upsert_department(Department {
            id: department_id,
            org_id: user.org_id.clone(),
            office_id: req.office_id,
            name: req.name,
        })
        .await?;
    Ok(Json(department))
}

/// Members can only be placed inside the acting user's own scope, and never
/// above the acting user's role.
async fn upsert_user(
    State(state): State<SharedState>,
    ActingUser(actor): ActingUser,
    Path(id): Path<String>,
    Json(req): Json<UpsertUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&actor, Capability::ManageMembers)?;
    if req.role < actor.role {
        return Err(ApiError::Forbidden(format!(
            "{} cannot grant {}",
            actor.role, req.role
        )));
    }

    let user_id = UserId::from(id);
    let directory = state.store.directory(&actor.org_id).await?;
    let resolver = ScopeResolver::new(&directory);
    let within_actor_scope = |office: &Option<OfficeId>, department: &Option<DepartmentId>| {
        let request = NavRequest {
            office_id: office.clone(),
            department_id: department.clone(),
        };
        match office {
            Some(_) => resolver.resolve(&actor, &request).map(|_| ()),
            None if actor.role.is_global() => Ok(()),
            None => Err(ScopeError::Denied(format!("{} cannot manage org-wide members", actor.role))),
        }
    };

    if let Some(existing) = state.store.user(&user_id).await? {
        if existing.org_id != actor.org_id {
            return Err(ApiError::Forbidden(format!("user {} belongs to another organization", user_id)));
        }
        if existing.role < actor.role {
            return Err(ApiError::Forbidden(format!("{} cannot modify {}", actor.role, existing.role)));
        }
        within_actor_scope(&existing.office_id, &existing.department_id)?;
    }

    let user = User {
        id: user_id,
        role: req.role,
        org_id: actor.org_id.clone(),
        office_id: if req.role.requires_office() { req.office_id } else { None },
        department_id: if req.role.requires_department() { req.department_id } else { None },
        name: req.name,
    };
    match resolver.resolve(&user, &NavRequest::default()) {
        Ok(_) => {}
        Err(ScopeError::InvalidMembership { message, .. }) => return Err(ApiError::BadRequest(message)),
        Err(e) => return Err(e.into()),
    }
    within_actor_scope(&user.office_id, &user.department_id)?;

    let user = state.store.upsert_user(user).await?;
    Ok(Json(user))
}

// ── Tests ─────────────────────────────────────────────────────────────
