//! # Enrollment Record
//!
//! A user's granted access to a subject. The `(user_id, subject_id)` pair is
//! unique at the store layer, and every enrollment references the completed
//! payment that authorized it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::{EnrollmentId, PaymentId, SubjectId, UserId};
use crate::payment::{Payment, PaymentStatus};

/// Access state of an enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessStatus {
    /// Access granted.
    Active,
    /// Access window elapsed.
    Expired,
    /// Access withdrawn by an administrator.
    Suspended,
}

impl AccessStatus {
    /// Return the string representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Suspended => "suspended",
        }
    }
}

impl fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "suspended" => Ok(Self::Suspended),
            other => Err(ValidationError::UnknownStatus {
                kind: "access status",
                value: other.to_string(),
            }),
        }
    }
}

/// A granted enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    /// Store-assigned identity.
    pub id: EnrollmentId,
    /// Enrolled user.
    pub user_id: UserId,
    /// Subject the user may access.
    pub subject_id: SubjectId,
    /// The completed payment that authorized this enrollment.
    pub payment_id: PaymentId,
    /// Current access state.
    pub access_status: AccessStatus,
    /// When access was granted.
    pub enrolled_at: DateTime<Utc>,
}

impl Enrollment {
    /// Grant an `active` enrollment from a completed payment.
    ///
    /// Any other payment status is refused, so an enrollment value cannot be
    /// built for an unsettled payment.
    pub fn grant(payment: &Payment) -> Result<Self, ValidationError> {
        if payment.status != PaymentStatus::Completed || !payment.is_consistent() {
            return Err(ValidationError::PaymentNotSettled {
                payment_id: payment.id.to_string(),
                status: payment.status.to_string(),
            });
        }
        Ok(Self {
            id: EnrollmentId::new(),
            user_id: payment.user_id,
            subject_id: payment.subject_id,
            payment_id: payment.id,
            access_status: AccessStatus::Active,
            enrolled_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Amount;
    use crate::payment::VerificationStatus;

    fn payment() -> Payment {
        Payment::new_pending(
            UserId::new(),
            SubjectId::new(),
            Amount::from_units(500).unwrap(),
            None,
        )
    }

    #[test]
    fn grant_from_completed_payment() {
        let mut p = payment();
        p.status = PaymentStatus::Completed;
        p.verification_status = VerificationStatus::Verified;

        let e = Enrollment::grant(&p).unwrap();
        assert_eq!(e.user_id, p.user_id);
        assert_eq!(e.subject_id, p.subject_id);
        assert_eq!(e.payment_id, p.id);
        assert_eq!(e.access_status, AccessStatus::Active);
    }

    #[test]
    fn grant_refuses_pending_payment() {
        let err = Enrollment::grant(&payment()).unwrap_err();
        assert!(matches!(err, ValidationError::PaymentNotSettled { .. }));
    }

    #[test]
    fn grant_refuses_failed_payment() {
        let mut p = payment();
        p.status = PaymentStatus::Failed;
        assert!(Enrollment::grant(&p).is_err());
    }

    #[test]
    fn grant_refuses_unverified_completion() {
        let mut p = payment();
        p.status = PaymentStatus::Completed;
        assert!(Enrollment::grant(&p).is_err());
    }

    #[test]
    fn access_status_round_trips() {
        for s in [AccessStatus::Active, AccessStatus::Expired, AccessStatus::Suspended] {
            assert_eq!(s.as_str().parse::<AccessStatus>().unwrap(), s);
        }
    }
}
