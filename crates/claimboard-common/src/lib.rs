//! Domain records shared by the Claimboard service and its clients.
//!
//! The hierarchy is Organization → Office → Department → User, and every
//! [`Job`] is owned by exactly one department.

pub mod ids;
pub mod models;

pub use ids::{DepartmentId, JobId, OfficeId, OrgId, UserId};
pub use models::{Department, Job, JobStatus, Office, ParseEnumError, Role, User};
