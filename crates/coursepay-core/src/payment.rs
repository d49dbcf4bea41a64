//! # Payment Record
//!
//! One attempt by one user to pay for one subject.
//!
//! ## Lifecycle
//!
//! ```text
//! pending/unverified ──► completed/verified
//!        │
//!        └─────────────► failed/unverified
//! ```
//!
//! `completed` and `failed` are terminal. Nothing re-enters `pending`.
//! Mutation happens only through the settlement store's conditional update.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::ValidationError;
use crate::identity::{PaymentId, SubjectId, TransactionUuid, UserId};

/// Payment channel label recorded when the caller does not name one.
pub const DEFAULT_PAYMENT_METHOD: &str = "eSewa";

/// Settlement status of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Created, awaiting confirmation.
    Pending,
    /// Verified with the gateway and settled. Terminal.
    Completed,
    /// Rejected, mismatched, or otherwise unrecoverable. Terminal.
    Failed,
}

impl PaymentStatus {
    /// Return the string representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(ValidationError::UnknownStatus {
                kind: "payment status",
                value: other.to_string(),
            }),
        }
    }
}

/// Whether the gateway has confirmed the payment server-to-server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Not (yet) confirmed by the gateway.
    Unverified,
    /// Confirmed by the gateway. Terminal.
    Verified,
}

impl VerificationStatus {
    /// Return the string representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::Verified => "verified",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unverified" => Ok(Self::Unverified),
            "verified" => Ok(Self::Verified),
            other => Err(ValidationError::UnknownStatus {
                kind: "verification status",
                value: other.to_string(),
            }),
        }
    }
}

/// A single payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Store-assigned identity.
    pub id: PaymentId,
    /// Paying user. Immutable.
    pub user_id: UserId,
    /// Subject being purchased. Immutable.
    pub subject_id: SubjectId,
    /// Amount the gateway must confirm.
    pub amount: Amount,
    /// Free-text payment channel label.
    pub method: String,
    /// Locally generated id sent to the gateway. Immutable.
    pub transaction_uuid: TransactionUuid,
    /// Starts as `transaction_uuid`; replaced by the gateway's reference
    /// once verified.
    pub gateway_ref_id: String,
    /// Settlement status.
    pub status: PaymentStatus,
    /// Gateway verification status.
    pub verification_status: VerificationStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last status change.
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Create a fresh `pending/unverified` payment with a new transaction id.
    pub fn new_pending(
        user_id: UserId,
        subject_id: SubjectId,
        amount: Amount,
        method: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let transaction_uuid = TransactionUuid::generate();
        Self {
            id: PaymentId::new(),
            user_id,
            subject_id,
            amount,
            method: method
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string()),
            gateway_ref_id: transaction_uuid.to_string(),
            transaction_uuid,
            status: PaymentStatus::Pending,
            verification_status: VerificationStatus::Unverified,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the record satisfies `completed ⇒ verified`.
    pub fn is_consistent(&self) -> bool {
        self.status != PaymentStatus::Completed
            || self.verification_status == VerificationStatus::Verified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Payment {
        Payment::new_pending(
            UserId::new(),
            SubjectId::new(),
            Amount::from_units(1000).unwrap(),
            None,
        )
    }

    #[test]
    fn new_payment_is_pending_and_unverified() {
        let p = sample();
        assert_eq!(p.status, PaymentStatus::Pending);
        assert_eq!(p.verification_status, VerificationStatus::Unverified);
        assert!(p.is_consistent());
    }

    #[test]
    fn gateway_ref_starts_as_transaction_uuid() {
        let p = sample();
        assert_eq!(p.gateway_ref_id, p.transaction_uuid.as_str());
    }

    #[test]
    fn method_defaults_to_esewa() {
        assert_eq!(sample().method, DEFAULT_PAYMENT_METHOD);
        let blank = Payment::new_pending(
            UserId::new(),
            SubjectId::new(),
            Amount::from_units(1).unwrap(),
            Some("  ".to_string()),
        );
        assert_eq!(blank.method, DEFAULT_PAYMENT_METHOD);
    }

    #[test]
    fn completed_without_verification_is_inconsistent() {
        let mut p = sample();
        p.status = PaymentStatus::Completed;
        assert!(!p.is_consistent());
        p.verification_status = VerificationStatus::Verified;
        assert!(p.is_consistent());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
    }

    #[test]
    fn statuses_round_trip_through_str() {
        for s in [
            PaymentStatus::Pending,
            PaymentStatus::Completed,
            PaymentStatus::Failed,
        ] {
            assert_eq!(s.as_str().parse::<PaymentStatus>().unwrap(), s);
        }
        for v in [VerificationStatus::Unverified, VerificationStatus::Verified] {
            assert_eq!(v.as_str().parse::<VerificationStatus>().unwrap(), v);
        }
        assert!("refunded".parse::<PaymentStatus>().is_err());
    }
}
