//! Effective visibility scope for a user and navigation request.
//!
//! `ScopeResolver::resolve` is a pure function of the user record, the
//! requested office/department and the org chart it was built with. It is
//! cheap and must be called again whenever either input changes; nothing is
//! cached between calls.

use std::collections::HashMap;

use claimboard_common::{Department, DepartmentId, Job, OfficeId, OrgId, Office, Role, User};
use serde::{Deserialize, Serialize, Serializer};

use crate::errors::ScopeError;

/// Either every member of a level or exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector<T> {
    All,
    Only(T),
}

impl<T> Selector<T> {
    pub fn concrete(&self) -> Option<&T> {
        match self {
            Selector::All => None,
            Selector::Only(id) => Some(id),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selector::All)
    }
}

impl<T: PartialEq> Selector<T> {
    pub fn admits(&self, id: &T) -> bool {
        match self {
            Selector::All => true,
            Selector::Only(only) => only == id,
        }
    }
}

impl<T: Serialize> Serialize for Selector<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Selector::All => serializer.serialize_str("ALL"),
            Selector::Only(id) => id.serialize(serializer),
        }
    }
}

/// Which navigation context a scope corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavContext {
    Global,
    Office,
    Department,
}

/// Office/department requested by navigation (URL params, pickers).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NavRequest {
    #[serde(default)]
    pub office_id: Option<OfficeId>,
    #[serde(default)]
    pub department_id: Option<DepartmentId>,
}

impl NavRequest {
    pub fn office(office_id: impl Into<OfficeId>) -> Self {
        Self {
            office_id: Some(office_id.into()),
            department_id: None,
        }
    }

    pub fn department(
        office_id: impl Into<OfficeId>,
        department_id: impl Into<DepartmentId>,
    ) -> Self {
        Self {
            office_id: Some(office_id.into()),
            department_id: Some(department_id.into()),
        }
    }
}

/// Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scope {
    pub org_id: OrgId,
    pub office_id: Selector<OfficeId>,
    pub department_id: Selector<DepartmentId>,
    /// Whether status/assignment writes are permitted inside this scope.
    pub writable: bool,
}

impl Scope {
    pub fn covers(&self, org_id: &OrgId, office_id: &OfficeId, department_id: &DepartmentId) -> bool {
        &self.org_id == org_id && self.office_id.admits(office_id) && self.department_id.admits(department_id)
    }

    pub fn covers_job(&self, job: &Job) -> bool {
        self.covers(&job.org_id, &job.office_id, &job.department_id)
    }

    pub fn context(&self) -> NavContext {
        match (&self.office_id, &self.department_id) {
            (Selector::All, _) => NavContext::Global,
            (Selector::Only(_), Selector::All) => NavContext::Office,
            (Selector::Only(_), Selector::Only(_)) => NavContext::Department,
        }
    }
}

/// Org chart lookups used to validate requested identifiers.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    offices: HashMap<OfficeId, Office>,
    departments: HashMap<DepartmentId, Department>,
}

impl Directory {
    pub fn new(offices: Vec<Office>, departments: Vec<Department>) -> Self {
        Self {
            offices: offices.into_iter().map(|o| (o.id.clone(), o)).collect(),
            departments: departments.into_iter().map(|d| (d.id.clone(), d)).collect(),
        }
    }

    pub fn upsert_office(&mut self, office: Office) {
        self.offices.insert(office.id.clone(), office);
    }

    pub fn upsert_department(&mut self, department: Department) {
        self.departments.insert(department.id.clone(), department);
    }

    pub fn office(&self, id: &OfficeId) -> Option<&Office> {
        self.offices.get(id)
    }

    pub fn department(&self, id: &DepartmentId) -> Option<&Department> {
        self.departments.get(id)
    }

    /// Offices visible through `scope`, sorted by id.
    pub fn offices_in(&self, scope: &Scope) -> Vec<&Office> {
        let mut offices: Vec<&Office> = self
            .offices
            .values()
            .filter(|o| o.org_id == scope.org_id && scope.office_id.admits(&o.id))
            .collect();
        offices.sort_by(|a, b| a.id.cmp(&b.id));
        offices
    }

    /// Departments visible through `scope`, sorted by id.
    pub fn departments_in(&self, scope: &Scope) -> Vec<&Department> {
        let mut departments: Vec<&Department> = self
            .departments
            .values()
            .filter(|d| scope.covers(&d.org_id, &d.office_id, &d.id))
            .collect();
        departments.sort_by(|a, b| a.id.cmp(&b.id));
        departments
    }
}

pub struct ScopeResolver<'a> {
    directory: &'a Directory,
}

impl<'a> ScopeResolver<'a> {
    pub fn new(directory: &'a Directory) -> Self {
        Self { directory }
    }

    pub fn resolve(&self, user: &User, request: &NavRequest) -> Result<Scope, ScopeError> {
        self.check_membership(user)?;

        let (office_id, department_id) = match user.role {
            Role::Owner | Role::OrgAdmin => self.resolve_global(user, request)?,
            Role::OfficeAdmin => self.resolve_office_admin(user, request)?,
            Role::DeptManager | Role::Member => self.resolve_pinned(user, request)?,
        };

        Ok(Scope {
            org_id: user.org_id.clone(),
            office_id,
            department_id,
            writable: user.role != Role::Member,
        })
    }

    /// `job` must sit inside the user's broadest scope and the role must be
    /// allowed to change status/assignment.
    pub fn can_write(&self, user: &User, job: &Job) -> bool {
        if user.role == Role::Member || job.org_id != user.org_id {
            return false;
        }
        self.resolve(user, &NavRequest::default())
            .map(|scope| scope.covers_job(job))
            .unwrap_or(false)
    }

    fn resolve_global(
        &self,
        user: &User,
        request: &NavRequest,
    ) -> Result<(Selector<OfficeId>, Selector<DepartmentId>), ScopeError> {
        let office = match &request.office_id {
            Some(id) => {
                self.office_in_org(user, id)?;
                Some(id.clone())
            }
            None => None,
        };

        match &request.department_id {
            None => Ok((office.map_or(Selector::All, Selector::Only), Selector::All)),
            Some(dept_id) => {
                let department = self.department_in_org(user, dept_id)?;
                if let Some(office_id) = &office
                    && &department.office_id != office_id
                {
                    return Err(ScopeError::Denied(format!(
                        "department {} is not part of office {}",
                        dept_id, office_id
                    )));
                }
                // A concrete department always pins its owning office.
                Ok((
                    Selector::Only(department.office_id.clone()),
                    Selector::Only(dept_id.clone()),
                ))
            }
        }
    }

    fn resolve_office_admin(
        &self,
        user: &User,
        request: &NavRequest,
    ) -> Result<(Selector<OfficeId>, Selector<DepartmentId>), ScopeError> {
        let home = required_office(user)?;
        if let Some(requested) = &request.office_id
            && requested != home
        {
            return Err(ScopeError::Denied(format!(
                "office {} is outside {}'s office {}",
                requested, user.id, home
            )));
        }

        let department = match &request.department_id {
            None => Selector::All,
            Some(dept_id) => {
                let department = self.department_in_org(user, dept_id)?;
                if &department.office_id != home {
                    return Err(ScopeError::Denied(format!(
                        "department {} is outside office {}",
                        dept_id, home
                    )));
                }
                Selector::Only(dept_id.clone())
            }
        };

        Ok((Selector::Only(home.clone()), department))
    }

    fn resolve_pinned(
        &self,
        user: &User,
        request: &NavRequest,
    ) -> Result<(Selector<OfficeId>, Selector<DepartmentId>), ScopeError> {
        let office = required_office(user)?;
        let department = required_department(user)?;

        if let Some(requested) = &request.office_id
            && requested != office
        {
            return Err(ScopeError::Denied(format!(
                "office {} is outside {}'s office {}",
                requested, user.id, office
            )));
        }
        if let Some(requested) = &request.department_id
            && requested != department
        {
            return Err(ScopeError::Denied(format!(
                "department {} is outside {}'s department {}",
                requested, user.id, department
            )));
        }

        Ok((Selector::Only(office.clone()), Selector::Only(department.clone())))
    }

    fn office_in_org(&self, user: &User, id: &OfficeId) -> Result<&Office, ScopeError> {
        match self.directory.office(id) {
            Some(office) if office.org_id == user.org_id => Ok(office),
            _ => Err(ScopeError::Denied(format!(
                "office {} is not part of organization {}",
                id, user.org_id
            ))),
        }
    }

    fn department_in_org(&self, user: &User, id: &DepartmentId) -> Result<&Department, ScopeError> {
        match self.directory.department(id) {
            Some(department) if department.org_id == user.org_id => Ok(department),
            _ => Err(ScopeError::Denied(format!(
                "department {} is not part of organization {}",
                id, user.org_id
            ))),
        }
    }

    /// Role/membership invariant. A violation is a caller bug, never a user
    /// error, so it is logged loudly.
    fn check_membership(&self, user: &User) -> Result<(), ScopeError> {
        let invalid = |message: &str| {
            tracing::error!(user_id = %user.id, role = %user.role, "{}", message);
            Err(ScopeError::InvalidMembership {
                user_id: user.id.clone(),
                message: message.to_string(),
            })
        };

        if user.role.requires_office() && user.office_id.is_none() {
            return invalid("role requires an office membership");
        }
        if user.role.requires_department() && user.department_id.is_none() {
            return invalid("role requires a department membership");
        }
        if user.role.requires_office()
            && let Some(office_id) = &user.office_id
            && !self
                .directory
                .office(office_id)
                .is_some_and(|office| office.org_id == user.org_id)
        {
            return invalid("office is not part of the user's organization");
        }
        if user.role.requires_department()
            && let (Some(office_id), Some(dept_id)) = (&user.office_id, &user.department_id)
        {
            match self.directory.department(dept_id) {
                Some(department) if department.org_id != user.org_id => {
                    return invalid("department is not part of the user's organization");
                }
                Some(department) if &department.office_id != office_id => {
                    return invalid("department does not belong to the user's office");
                }
                Some(_) => {}
                None => return invalid("department is not part of the user's organization"),
            }
        }
        Ok(())
    }
}

fn required_office(user: &User) -> Result<&OfficeId, ScopeError> {
    user.office_id.as_ref().ok_or_else(|| ScopeError::InvalidMembership {
        user_id: user.id.clone(),
        message: "role requires an office membership".to_string(),
    })
}

fn required_department(user: &User) -> Result<&DepartmentId, ScopeError> {
    user.department_id.as_ref().ok_or_else(|| ScopeError::InvalidMembership {
        user_id: user.id.clone(),
        message: "role requires a department membership".to_string(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use claimboard_common::JobStatus;

    /// Org `acme`: office O1 (D1, D2), office O2 (D3). Org `other`: office X1 (X1D).
    pub(crate) fn directory() -> Directory {
        let office = |id: &str, org: &str| Office {
            id: id.into(),
            org_id: org.into(),
            name: format!("Office {id}"),
        };
        let dept = |id: &str, office: &str, org: &str| Department {
            id: id.into(),
            org_id: org.into(),
            office_id: office.into(),
            name: format!("Dept {id}"),
        };
        Directory::new(
            vec![office("O1", "acme"), office("O2", "acme"), office("X1", "other")],
            vec![
                dept("D1", "O1", "acme"),
                dept("D2", "O1", "acme"),
                dept("D3", "O2", "acme"),
                dept("X1D", "X1", "other"),
            ],
        )
    }

    pub(crate) fn user(id: &str, role: Role, office: Option<&str>, dept: Option<&str>) -> User {
        User {
            id: id.into(),
            role,
            org_id: "acme".into(),
            office_id: office.map(OfficeId::from),
            department_id: dept.map(DepartmentId::from),
            name: id.to_string(),
        }
    }

    fn job(office: &str, dept: &str) -> Job {
        Job {
            id: "J1".into(),
            org_id: "acme".into(),
            office_id: office.into(),
            department_id: dept.into(),
            title: String::new(),
            status: JobStatus::Fnol,
            assigned_user_ids: vec![],
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn owner_defaults_to_everything() {
        let dir = directory();
        let scope = ScopeResolver::new(&dir)
            .resolve(&user("o", Role::Owner, None, None), &NavRequest::default())
            .unwrap();
        assert_eq!(scope.office_id, Selector::All);
        assert_eq!(scope.department_id, Selector::All);
        assert_eq!(scope.context(), NavContext::Global);
        assert!(scope.writable);
    }

    #[test]
    fn org_admin_may_request_any_office_in_org() {
        let dir = directory();
        let resolver = ScopeResolver::new(&dir);
        let admin = user("a", Role::OrgAdmin, None, None);
        let scope = resolver.resolve(&admin, &NavRequest::office("O2")).unwrap();
        assert_eq!(scope.office_id, Selector::Only("O2".into()));
        assert_eq!(scope.department_id, Selector::All);
        assert_eq!(scope.context(), NavContext::Office);

        let err = resolver.resolve(&admin, &NavRequest::office("X1")).unwrap_err();
        assert!(matches!(err, ScopeError::Denied(_)));
    }

    #[test]
    fn global_department_request_pins_owning_office() {
        let dir = directory();
        let resolver = ScopeResolver::new(&dir);
        let owner = user("o", Role::Owner, None, None);
        let request = NavRequest {
            office_id: None,
            department_id: Some("D3".into()),
        };
        let scope = resolver.resolve(&owner, &request).unwrap();
        assert_eq!(scope.office_id, Selector::Only("O2".into()));
        assert_eq!(scope.context(), NavContext::Department);

        let mismatched = NavRequest::department("O1", "D3");
        assert!(matches!(
            resolver.resolve(&owner, &mismatched),
            Err(ScopeError::Denied(_))
        ));
    }

    #[test]
    fn office_admin_foreign_office_is_denied_not_rescoped() {
        let dir = directory();
        let resolver = ScopeResolver::new(&dir);
        let admin = user("oa", Role::OfficeAdmin, Some("O1"), None);

        let err = resolver.resolve(&admin, &NavRequest::office("O2")).unwrap_err();
        assert!(matches!(err, ScopeError::Denied(_)));

        let scope = resolver.resolve(&admin, &NavRequest::default()).unwrap();
        assert_eq!(scope.office_id, Selector::Only("O1".into()));
        assert_eq!(scope.department_id, Selector::All);
    }

    #[test]
    fn office_admin_departments_limited_to_own_office() {
        let dir = directory();
        let resolver = ScopeResolver::new(&dir);
        let admin = user("oa", Role::OfficeAdmin, Some("O1"), None);

        let request = NavRequest {
            office_id: None,
            department_id: Some("D2".into()),
        };
        let scope = resolver.resolve(&admin, &request).unwrap();
        assert_eq!(scope.department_id, Selector::Only("D2".into()));

        let foreign = NavRequest {
            office_id: None,
            department_id: Some("D3".into()),
        };
        assert!(matches!(resolver.resolve(&admin, &foreign), Err(ScopeError::Denied(_))));
    }

    #[test]
    fn member_is_pinned_to_own_department() {
        let dir = directory();
        let resolver = ScopeResolver::new(&dir);
        let member = user("m", Role::Member, Some("O1"), Some("D1"));

        let scope = resolver.resolve(&member, &NavRequest::default()).unwrap();
        assert_eq!(scope.office_id, Selector::Only("O1".into()));
        assert_eq!(scope.department_id, Selector::Only("D1".into()));
        assert!(!scope.writable);

        let same = resolver.resolve(&member, &NavRequest::department("O1", "D1")).unwrap();
        assert_eq!(same, scope);

        assert!(matches!(
            resolver.resolve(&member, &NavRequest::department("O1", "D2")),
            Err(ScopeError::Denied(_))
        ));
        assert!(matches!(
            resolver.resolve(&member, &NavRequest::office("O2")),
            Err(ScopeError::Denied(_))
        ));
    }

    #[test]
    fn missing_membership_is_a_caller_bug() {
        let dir = directory();
        let resolver = ScopeResolver::new(&dir);
        let broken = user("x", Role::DeptManager, Some("O1"), None);
        assert!(matches!(
            resolver.resolve(&broken, &NavRequest::default()),
            Err(ScopeError::InvalidMembership { .. })
        ));

        let crossed = user("y", Role::Member, Some("O2"), Some("D1"));
        assert!(matches!(
            resolver.resolve(&crossed, &NavRequest::default()),
            Err(ScopeError::InvalidMembership { .. })
        ));
    }

    #[test]
    fn unknown_membership_ids_are_a_caller_bug() {
        let dir = directory();
        let resolver = ScopeResolver::new(&dir);
        let cases = [
            user("a", Role::OfficeAdmin, Some("O9"), None),
            user("b", Role::DeptManager, Some("O1"), Some("D9")),
            user("c", Role::Member, Some("O9"), Some("D1")),
            user("d", Role::Member, Some("X1"), Some("X1D")),
        ];
        for broken in &cases {
            assert!(
                matches!(
                    resolver.resolve(broken, &NavRequest::default()),
                    Err(ScopeError::InvalidMembership { .. })
                ),
                "{} should be rejected",
                broken.id
            );
        }
    }

    #[test]
    fn non_global_scopes_never_exceed_membership() {
        let dir = directory();
        let resolver = ScopeResolver::new(&dir);
        let requests = [
            NavRequest::default(),
            NavRequest::office("O1"),
            NavRequest::office("O2"),
            NavRequest::department("O1", "D1"),
            NavRequest::department("O1", "D2"),
            NavRequest::department("O2", "D3"),
        ];
        let users = [
            user("oa", Role::OfficeAdmin, Some("O1"), None),
            user("dm", Role::DeptManager, Some("O1"), Some("D1")),
            user("m", Role::Member, Some("O1"), Some("D1")),
        ];
        for u in &users {
            for request in &requests {
                let Ok(scope) = resolver.resolve(u, request) else {
                    continue;
                };
                assert_eq!(scope.office_id.concrete(), u.office_id.as_ref());
                if u.role.requires_department() {
                    assert_eq!(scope.department_id.concrete(), u.department_id.as_ref());
                }
            }
        }
    }

    #[test]
    fn can_write_excludes_members_and_foreign_jobs() {
        let dir = directory();
        let resolver = ScopeResolver::new(&dir);
        let manager = user("dm", Role::DeptManager, Some("O1"), Some("D1"));
        let member = user("m", Role::Member, Some("O1"), Some("D1"));
        let office_admin = user("oa", Role::OfficeAdmin, Some("O1"), None);

        assert!(resolver.can_write(&manager, &job("O1", "D1")));
        assert!(!resolver.can_write(&manager, &job("O1", "D2")));
        assert!(!resolver.can_write(&member, &job("O1", "D1")));
        assert!(resolver.can_write(&office_admin, &job("O1", "D2")));
        assert!(!resolver.can_write(&office_admin, &job("O2", "D3")));

        let mut foreign = job("O1", "D1");
        foreign.org_id = "other".into();
        assert!(!resolver.can_write(&manager, &foreign));
    }

    #[test]
    fn directory_listings_follow_scope() {
        let dir = directory();
        let resolver = ScopeResolver::new(&dir);
        let admin = user("oa", Role::OfficeAdmin, Some("O1"), None);
        let scope = resolver.resolve(&admin, &NavRequest::default()).unwrap();
        let offices: Vec<&str> = dir.offices_in(&scope).iter().map(|o| o.id.as_str()).collect();
        let depts: Vec<&str> = dir.departments_in(&scope).iter().map(|d| d.id.as_str()).collect();
        assert_eq!(offices, vec!["O1"]);
        assert_eq!(depts, vec!["D1", "D2"]);
    }

    #[test]
    fn scope_serializes_all_marker() {
        let dir = directory();
        let scope = ScopeResolver::new(&dir)
            .resolve(&user("oa", Role::OfficeAdmin, Some("O1"), None), &NavRequest::default())
            .unwrap();
        let json = serde_json::to_value(&scope).unwrap();
        assert_eq!(json["office_id"], "O1");
        assert_eq!(json["department_id"], "ALL");
    }
}
