use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{DepartmentId, JobId, OfficeId, OrgId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Position of a user in the hierarchy.
///
/// Variants are declared from most to least privileged; each role's
/// capability set is a strict subset of the one above it, so the derived
/// `Ord` doubles as a privilege ordering (`Owner < Member`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    OrgAdmin,
    OfficeAdmin,
    DeptManager,
    Member,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Owner,
        Role::OrgAdmin,
        Role::OfficeAdmin,
        Role::DeptManager,
        Role::Member,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::OrgAdmin => "org_admin",
            Self::OfficeAdmin => "office_admin",
            Self::DeptManager => "dept_manager",
            Self::Member => "member",
        }
    }

    /// Organization-wide roles that are not pinned to an office.
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Owner | Self::OrgAdmin)
    }

    /// Roles that must carry an office membership.
    pub fn requires_office(&self) -> bool {
        !self.is_global()
    }

    /// Roles that must carry a department membership.
    pub fn requires_department(&self) -> bool {
        matches!(self, Self::DeptManager | Self::Member)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "org_admin" => Ok(Self::OrgAdmin),
            "office_admin" => Ok(Self::OfficeAdmin),
            "dept_manager" => Ok(Self::DeptManager),
            "member" => Ok(Self::Member),
            _ => Err(ParseEnumError {
                kind: "role",
                value: s.to_string(),
            }),
        }
    }
}

/// Persisted lifecycle stage of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// First Notice of Loss: intake, before any field work.
    Fnol,
    Mitigation,
    Reconstruction,
    Review,
    /// Terminal.
    Closeout,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Fnol,
        JobStatus::Mitigation,
        JobStatus::Reconstruction,
        JobStatus::Review,
        JobStatus::Closeout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fnol => "fnol",
            Self::Mitigation => "mitigation",
            Self::Reconstruction => "reconstruction",
            Self::Review => "review",
            Self::Closeout => "closeout",
        }
    }

    /// Field-work stages; only these can place an assigned job in progress.
    pub fn is_field_work(&self) -> bool {
        matches!(self, Self::Mitigation | Self::Reconstruction)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closeout)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fnol" => Ok(Self::Fnol),
            "mitigation" => Ok(Self::Mitigation),
            "reconstruction" => Ok(Self::Reconstruction),
            "review" => Ok(Self::Review),
            "closeout" => Ok(Self::Closeout),
            _ => Err(ParseEnumError {
                kind: "job status",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub role: Role,
    pub org_id: OrgId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub office_id: Option<OfficeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<DepartmentId>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Office {
    pub id: OfficeId,
    pub org_id: OrgId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub org_id: OrgId,
    pub office_id: OfficeId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub org_id: OrgId,
    pub office_id: OfficeId,
    pub department_id: DepartmentId,
    #[serde(default)]
    pub title: String,
    pub status: JobStatus,
    #[serde(default)]
    pub assigned_user_ids: Vec<UserId>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A freshly opened claim: FNOL, nobody assigned.
    pub fn new(
        org_id: OrgId,
        office_id: OfficeId,
        department_id: DepartmentId,
        title: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::generate(),
            org_id,
            office_id,
            department_id,
            title: title.into(),
            status: JobStatus::Fnol,
            assigned_user_ids: Vec::new(),
            updated_at: now,
        }
    }

    pub fn is_assigned(&self) -> bool {
        !self.assigned_user_ids.is_empty()
    }
}
