//! Declarative navigation catalog filtered by role and resolved scope.
//!
//! An entry survives when the user's role is listed in `roles` and the
//! scope's context is listed in `contexts`. Survivors get `:officeId` and
//! `:departmentId` substituted; an entry whose placeholders cannot be filled
//! from the scope or the user's own membership is dropped rather than
//! emitted with a dangling link.

use claimboard_common::{Role, User};
use serde::{Deserialize, Serialize};

use super::scope::{NavContext, Scope};

pub const OFFICE_PLACEHOLDER: &str = ":officeId";
pub const DEPARTMENT_PLACEHOLDER: &str = ":departmentId";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavEntry {
    pub id: String,
    pub label: String,
    /// Path template, e.g. `/offices/:officeId/board`.
    pub path: String,
    pub roles: Vec<Role>,
    pub contexts: Vec<NavContext>,
}

impl NavEntry {
    pub fn new(id: &str, label: &str, path: &str, roles: &[Role], contexts: &[NavContext]) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            path: path.to_string(),
            roles: roles.to_vec(),
            contexts: contexts.to_vec(),
        }
    }

    /// Placeholders in `path` other than the two known ones.
    pub fn unknown_placeholders(&self) -> Vec<&str> {
        self.path
            .split('/')
            .filter(|seg| seg.starts_with(':'))
            .filter(|seg| *seg != OFFICE_PLACEHOLDER && *seg != DEPARTMENT_PLACEHOLDER)
            .collect()
    }
}

/// Built-in catalog used when the config file declares none.
pub fn default_catalog() -> Vec<NavEntry> {
    use NavContext::*;
    use Role::*;

    vec![
        NavEntry::new("org-dashboard", "Dashboard", "/dashboard", &[Owner, OrgAdmin], &[Global]),
        NavEntry::new("offices", "Offices", "/offices", &[Owner, OrgAdmin], &[Global]),
        NavEntry::new(
            "org-settings",
            "Organization settings",
            "/settings",
            &[Owner],
            &[Global],
        ),
        NavEntry::new(
            "office-board",
            "Office board",
            "/offices/:officeId/board",
            &[Owner, OrgAdmin, OfficeAdmin],
            &[Global, Office],
        ),
        NavEntry::new(
            "office-departments",
            "Departments",
            "/offices/:officeId/departments",
            &[Owner, OrgAdmin, OfficeAdmin],
            &[Office],
        ),
        NavEntry::new(
            "office-team",
            "Team",
            "/offices/:officeId/users",
            &[Owner, OrgAdmin, OfficeAdmin],
            &[Office, Department],
        ),
        NavEntry::new(
            "dept-board",
            "Department board",
            "/offices/:officeId/departments/:departmentId/board",
            &[Owner, OrgAdmin, OfficeAdmin, DeptManager, Member],
            &[Department],
        ),
        NavEntry::new(
            "dept-new-job",
            "New job",
            "/offices/:officeId/departments/:departmentId/jobs/new",
            &[Owner, OrgAdmin, OfficeAdmin, DeptManager],
            &[Department],
        ),
        NavEntry::new(
            "my-tasks",
            "My tasks",
            "/departments/:departmentId/tasks",
            &[DeptManager, Member],
            &[Department],
        ),
    ]
}

pub fn filter(catalog: &[NavEntry], user: &User, scope: &Scope) -> Vec<NavEntry> {
    let context = scope.context();
    catalog
        .iter()
        .filter(|entry| entry.roles.contains(&user.role) && entry.contexts.contains(&context))
        .filter_map(|entry| {
            let path = substitute(&entry.path, user, scope)?;
            Some(NavEntry {
                path,
                ..entry.clone()
            })
        })
        .collect()
}

/// Scope ids win; the user's own membership fills in where the scope says
/// ALL. Placeholders match whole path segments only. `None` when a required
/// id is available from neither, or the path has an unknown placeholder.
fn substitute(template: &str, user: &User, scope: &Scope) -> Option<String> {
    let segments = template
        .split('/')
        .map(|segment| match segment {
            OFFICE_PLACEHOLDER => {
                let office = scope.office_id.concrete().or(user.office_id.as_ref())?;
                scope.office_id.admits(office).then(|| office.as_str())
            }
            DEPARTMENT_PLACEHOLDER => {
                let department = scope
                    .department_id
                    .concrete()
                    .or(user.department_id.as_ref())?;
                scope
                    .department_id
                    .admits(department)
                    .then(|| department.as_str())
            }
            other if other.starts_with(':') => None,
            other => Some(other),
        })
        .collect::<Option<Vec<&str>>>()?;
    Some(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::scope::tests::{directory, user};
    use crate::access::scope::{NavRequest, ScopeResolver};

    fn ids(entries: &[NavEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn member_sees_department_entries_with_substituted_ids() {
        let dir = directory();
        let member = user("m", Role::Member, Some("O1"), Some("D1"));
        let scope = ScopeResolver::new(&dir)
            .resolve(&member, &NavRequest::default())
            .unwrap();

        let entries = filter(&default_catalog(), &member, &scope);
        assert_eq!(ids(&entries), vec!["dept-board", "my-tasks"]);
        for entry in &entries {
            assert!(entry.contexts.contains(&NavContext::Department));
            assert!(!entry.path.contains(':'));
        }
        assert_eq!(entries[0].path, "/offices/O1/departments/D1/board");
        assert_eq!(entries[1].path, "/departments/D1/tasks");
    }

    #[test]
    fn office_admin_in_office_context() {
        let dir = directory();
        let admin = user("oa", Role::OfficeAdmin, Some("O1"), None);
        let scope = ScopeResolver::new(&dir)
            .resolve(&admin, &NavRequest::default())
            .unwrap();

        let entries = filter(&default_catalog(), &admin, &scope);
        assert_eq!(ids(&entries), vec!["office-board", "office-departments", "office-team"]);
        assert_eq!(entries[0].path, "/offices/O1/board");
    }

    #[test]
    fn global_scope_falls_back_to_home_office() {
        let dir = directory();
        let admin = user("a", Role::OrgAdmin, Some("O2"), None);
        let scope = ScopeResolver::new(&dir)
            .resolve(&admin, &NavRequest::default())
            .unwrap();

        let entries = filter(&default_catalog(), &admin, &scope);
        assert_eq!(ids(&entries), vec!["org-dashboard", "offices", "office-board"]);
        assert_eq!(entries[2].path, "/offices/O2/board");
    }

    #[test]
    fn unresolvable_placeholder_drops_entry() {
        let dir = directory();
        let owner = user("o", Role::Owner, None, None);
        let scope = ScopeResolver::new(&dir)
            .resolve(&owner, &NavRequest::default())
            .unwrap();

        let entries = filter(&default_catalog(), &owner, &scope);
        assert_eq!(ids(&entries), vec!["org-dashboard", "offices", "org-settings"]);
    }

    #[test]
    fn unknown_placeholders_are_reported() {
        let entry = NavEntry::new(
            "bad",
            "Bad",
            "/offices/:officeId/jobs/:jobId",
            &[Role::Owner],
            &[NavContext::Office],
        );
        assert_eq!(entry.unknown_placeholders(), vec![":jobId"]);
        assert!(default_catalog().iter().all(|e| e.unknown_placeholders().is_empty()));
    }

    #[test]
    fn placeholders_match_whole_segments_only() {
        let dir = directory();
        let admin = user("oa", Role::OfficeAdmin, Some("O1"), None);
        let scope = ScopeResolver::new(&dir)
            .resolve(&admin, &NavRequest::default())
            .unwrap();
        let catalog = vec![
            NavEntry::new("near-miss", "Near miss", "/offices/:officeIdx/board", &[Role::OfficeAdmin], &[NavContext::Office]),
            NavEntry::new("exact", "Exact", "/offices/:officeId/board", &[Role::OfficeAdmin], &[NavContext::Office]),
        ];
        assert_eq!(catalog[0].unknown_placeholders(), vec![":officeIdx"]);

        let entries = filter(&catalog, &admin, &scope);
        assert_eq!(ids(&entries), vec!["exact"]);
        assert_eq!(entries[0].path, "/offices/O1/board");
    }
}
