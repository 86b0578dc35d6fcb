//! Static role → capability table.
//!
//! | Role           | Capabilities (cumulative from the bottom up)             |
//! |----------------|----------------------------------------------------------|
//! | `Member`       | `ViewBoard`, `CompleteTasks`                             |
//! | `DeptManager`  | + `MoveJobs`, `AssignJobs`, `CreateJobs`                 |
//! | `OfficeAdmin`  | + `ManageDepartments`, `ManageMembers`, `ViewOffice`     |
//! | `OrgAdmin`     | + `ManageOffices`, `ViewAllOffices`                      |
//! | `Owner`        | + `ManageOrganization`                                   |

use claimboard_common::Role;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewBoard,
    CompleteTasks,
    MoveJobs,
    AssignJobs,
    CreateJobs,
    ViewOffice,
    ManageDepartments,
    ManageMembers,
    ViewAllOffices,
    ManageOffices,
    ManageOrganization,
}

const MEMBER: &[Capability] = &[Capability::ViewBoard, Capability::CompleteTasks];

const DEPT_MANAGER: &[Capability] = &[
    Capability::ViewBoard,
    Capability::CompleteTasks,
    Capability::MoveJobs,
    Capability::AssignJobs,
    Capability::CreateJobs,
];

const OFFICE_ADMIN: &[Capability] = &[
    Capability::ViewBoard,
    Capability::CompleteTasks,
    Capability::MoveJobs,
    Capability::AssignJobs,
    Capability::CreateJobs,
    Capability::ViewOffice,
    Capability::ManageDepartments,
    Capability::ManageMembers,
];

const ORG_ADMIN: &[Capability] = &[
    Capability::ViewBoard,
    Capability::CompleteTasks,
    Capability::MoveJobs,
    Capability::AssignJobs,
    Capability::CreateJobs,
    Capability::ViewOffice,
    Capability::ManageDepartments,
    Capability::ManageMembers,
    Capability::ViewAllOffices,
    Capability::ManageOffices,
];

const OWNER: &[Capability] = &[
    Capability::ViewBoard,
    Capability::CompleteTasks,
    Capability::MoveJobs,
    Capability::AssignJobs,
    Capability::CreateJobs,
    Capability::ViewOffice,
    Capability::ManageDepartments,
    Capability::ManageMembers,
    Capability::ViewAllOffices,
    Capability::ManageOffices,
    Capability::ManageOrganization,
];

/// Ordered capability set for a role.
pub fn capabilities(role: Role) -> &'static [Capability] {
    match role {
        Role::Owner => OWNER,
        Role::OrgAdmin => ORG_ADMIN,
        Role::OfficeAdmin => OFFICE_ADMIN,
        Role::DeptManager => DEPT_MANAGER,
        Role::Member => MEMBER,
    }
}

pub fn has_capability(role: Role, capability: Capability) -> bool {
    capabilities(role).contains(&capability)
}
