//! # Identity Newtypes
//!
//! Distinct identifier types for users, subjects, payments, and enrollments.
//! UUID-based identifiers are always valid by construction. The gateway
//! transaction identifier ([`TransactionUuid`]) is a validated string because
//! it travels through the gateway's redirect and comes back untrusted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| ValidationError::InvalidIdentifier(s.to_string()))
            }
        }
    };
}

uuid_identifier!(
    /// A registered user (student, instructor, or administrator).
    UserId
);

uuid_identifier!(
    /// A purchasable subject (course) in the catalog.
    SubjectId
);

uuid_identifier!(
    /// Store-assigned identity of a single payment attempt.
    PaymentId
);

uuid_identifier!(
    /// Store-assigned identity of a granted enrollment.
    EnrollmentId
);

/// Maximum length accepted for a gateway transaction identifier.
const TRANSACTION_UUID_MAX_LEN: usize = 64;

/// Locally generated transaction identifier sent to the gateway as
/// `transaction_uuid` and echoed back on confirmation.
///
/// Together with the owning [`UserId`] it forms the natural key of a payment.
///
/// # Validation
///
/// - 1 to 64 characters
/// - ASCII alphanumerics, `-` and `_` only
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransactionUuid(String);

impl TransactionUuid {
    /// Validate a transaction identifier received from a client or gateway.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        let valid_chars = s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if s.is_empty() || s.len() > TRANSACTION_UUID_MAX_LEN || !valid_chars {
            return Err(ValidationError::InvalidTransactionUuid(s));
        }
        Ok(Self(s))
    }

    /// Generate a fresh identifier for a new payment attempt.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Access the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TransactionUuid {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TransactionUuid> for String {
    fn from(value: TransactionUuid) -> Self {
        value.0
    }
}
