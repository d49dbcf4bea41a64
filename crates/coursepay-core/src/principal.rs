//! # Principals and Roles
//!
//! The authenticated caller, produced once by the HTTP authentication
//! boundary and passed explicitly into every settlement operation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::UserId;

/// Roles on the platform, ordered by privilege level.
///
/// The `Ord` derivation follows declaration order:
/// `Student < Instructor < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Buys subjects and takes exams.
    Student,
    /// Authors subjects and answers student queries.
    Instructor,
    /// Full access, including payment deletion.
    Admin,
}

impl Role {
    /// Return the string representation of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Instructor => "instructor",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Self::Student),
            "instructor" => Ok(Self::Instructor),
            "admin" => Ok(Self::Admin),
            other => Err(ValidationError::UnknownRole(other.to_string())),
        }
    }
}

/// Identity of the authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// The caller's user id.
    pub id: UserId,
    /// The caller's role.
    pub role: Role,
}

impl Principal {
    /// Construct a principal.
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    /// Whether the caller is an administrator.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Whether the caller is `user` or an administrator.
    pub fn acts_for(&self, user: &UserId) -> bool {
        self.is_admin() || self.id == *user
    }
}
