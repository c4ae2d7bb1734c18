//! Closed role enumeration for authorization checks.
//!
//! Positions are stored as strings in the profile table but compared as a
//! closed set: an unrecognized claimed role fails the same way as a
//! legitimate mismatch.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub enum Role {
    Developer,
    Hr,
    Owner,
    Intern,
    Employee,
    User,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Developer => "Developer",
            Self::Hr => "HR",
            Self::Owner => "Owner",
            Self::Intern => "Intern",
            Self::Employee => "Employee",
            Self::User => "User",
        }
    }

    /// Parse a position string, tolerating case differences.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "developer" | "admin" => Some(Self::Developer),
            "hr" => Some(Self::Hr),
            "owner" => Some(Self::Owner),
            "intern" => Some(Self::Intern),
            "employee" => Some(Self::Employee),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
