//! Identifier newtypes for the organization hierarchy.
//!
//! Every record carries a string identifier. Wrapping them in distinct types
//! keeps an `OfficeId` from ever being compared against a `DepartmentId`.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier of an organization (the tenant root).
    OrgId
);
string_id!(
    /// Identifier of an office inside an organization.
    OfficeId
);
string_id!(
    /// Identifier of a department inside an office.
    DepartmentId
);
string_id!(
    /// Identifier of a user.
    UserId
);
string_id!(
    /// Identifier of a restoration-claim job.
    JobId
);

impl JobId {
    /// Fresh random job identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = OfficeId::from("O1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"O1\"");
        let back: OfficeId = serde_json::from_str("\"O1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn generated_job_ids_are_unique() {
        assert_ne!(JobId::generate(), JobId::generate());
    }
}
