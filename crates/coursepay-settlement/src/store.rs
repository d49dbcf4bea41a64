//! # Store Ports
//!
//! Typed persistence interfaces injected into the orchestrator. Adapters must
//! provide two atomic primitives:
//!
//! 1. [`PaymentStore::conditional_update_payment`]: apply a patch only if the
//!    payment's current status equals the expected one.
//! 2. [`EnrollmentStore::create_enrollment`]: fail with
//!    [`StoreError::Duplicate`] if the `(user_id, subject_id)` pair exists.
//!
//! Adapters must also refuse a second `completed` payment for the same
//! `(user_id, subject_id)` pair, reporting it as [`StoreError::Duplicate`]
//! from the conditional update.

use async_trait::async_trait;
use chrono::Utc;
use coursepay_core::{
    Amount, Enrollment, Payment, PaymentId, PaymentStatus, SubjectId, TransactionUuid, UserId,
    VerificationStatus,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Persistence failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("uniqueness constraint violated: {constraint}")]
    Duplicate {
        /// Name of the violated constraint.
        constraint: String,
    },

    /// The write references a row that no longer exists.
    #[error("referenced row missing: {constraint}")]
    MissingReference {
        /// Name of the violated foreign key.
        constraint: String,
    },

    /// The backend failed (connection, timeout, decode).
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Foreign key from an enrollment to the payment that authorized it.
pub const ENROLLMENT_PAYMENT_FK: &str = "enrollments_payment_id_fkey";

/// Constraint name for one enrollment per user per subject.
pub const ENROLLMENT_PAIR_CONSTRAINT: &str = "enrollments_user_subject_key";

/// Constraint name for one completed payment per user per subject.
pub const COMPLETED_PAYMENT_CONSTRAINT: &str = "payments_one_completed_per_subject";

/// Constraint name for the `(user_id, transaction_uuid)` natural key.
pub const PAYMENT_NATURAL_KEY_CONSTRAINT: &str = "payments_user_transaction_key";

/// Changes applied by a conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentPatch {
    /// New status.
    pub status: PaymentStatus,
    /// New verification status, if changing.
    pub verification_status: Option<VerificationStatus>,
    /// New gateway reference, if changing.
    pub gateway_ref_id: Option<String>,
}

impl PaymentPatch {
    /// `completed/verified` with the gateway's reference.
    pub fn complete(gateway_ref_id: impl Into<String>) -> Self {
        Self {
            status: PaymentStatus::Completed,
            verification_status: Some(VerificationStatus::Verified),
            gateway_ref_id: Some(gateway_ref_id.into()),
        }
    }

    /// `failed`, verification left untouched.
    pub fn fail() -> Self {
        Self {
            status: PaymentStatus::Failed,
            verification_status: None,
            gateway_ref_id: None,
        }
    }

    /// Apply to a record in memory.
    pub fn apply(&self, payment: &mut Payment) {
        payment.status = self.status;
        if let Some(v) = self.verification_status {
            payment.verification_status = v;
        }
        if let Some(r) = &self.gateway_ref_id {
            payment.gateway_ref_id = r.clone();
        }
        payment.updated_at = Utc::now();
    }
}

/// Persistence port for payments.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert a new payment.
    async fn create_payment(&self, payment: &Payment) -> Result<(), StoreError>;

    /// Look up by store id.
    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError>;

    /// Look up by natural key `(user_id, transaction_uuid)`.
    async fn find_payment_by_natural_key(
        &self,
        user_id: UserId,
        transaction_uuid: &TransactionUuid,
    ) -> Result<Option<Payment>, StoreError>;

    /// Look up by the user's payment carrying `gateway_ref_id`.
    async fn find_payment_by_gateway_ref(
        &self,
        user_id: UserId,
        gateway_ref_id: &str,
    ) -> Result<Option<Payment>, StoreError>;

    /// The user's completed payment for a subject, if any.
    async fn find_completed_payment(
        &self,
        user_id: UserId,
        subject_id: SubjectId,
    ) -> Result<Option<Payment>, StoreError>;

    /// All payments, or only `user_id`'s, newest first.
    async fn list_payments(&self, user_id: Option<UserId>) -> Result<Vec<Payment>, StoreError>;

    /// Compare-and-swap: apply `patch` only if the current status is
    /// `expected`. Returns whether the update was applied.
    async fn conditional_update_payment(
        &self,
        id: PaymentId,
        expected: PaymentStatus,
        patch: &PaymentPatch,
    ) -> Result<bool, StoreError>;

    /// Delete a payment. Returns whether it existed.
    async fn delete_payment(&self, id: PaymentId) -> Result<bool, StoreError>;
}

/// Persistence port for enrollments.
#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// Insert an enrollment, failing with [`StoreError::Duplicate`] if the
    /// `(user_id, subject_id)` pair exists. Adapters that enforce the
    /// payment reference report a deleted payment as
    /// [`StoreError::MissingReference`].
    async fn create_enrollment(&self, enrollment: &Enrollment) -> Result<(), StoreError>;

    /// The enrollment for a pair, if any.
    async fn find_enrollment(
        &self,
        user_id: UserId,
        subject_id: SubjectId,
    ) -> Result<Option<Enrollment>, StoreError>;

    /// The enrollment authorized by a payment, if any.
    async fn find_enrollment_by_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<Enrollment>, StoreError>;

    /// All enrollments, or only `user_id`'s, newest first.
    async fn list_enrollments(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<Enrollment>, StoreError>;

    /// Delete enrollments referencing a payment. Returns how many.
    async fn delete_enrollment_by_payment_id(&self, payment_id: PaymentId)
        -> Result<u64, StoreError>;
}

/// A purchasable subject as seen by settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Identity.
    pub id: SubjectId,
    /// Display title.
    pub title: String,
    /// Listed price. `None` for subjects priced at checkout.
    pub price: Option<Amount>,
}

/// Read-only catalog lookup.
#[async_trait]
pub trait SubjectCatalog: Send + Sync {
    /// Find a subject.
    async fn find_subject(&self, id: SubjectId) -> Result<Option<Subject>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> Payment {
        Payment::new_pending(
            UserId::new(),
            SubjectId::new(),
            Amount::from_units(100).unwrap(),
            None,
        )
    }

    #[test]
    fn complete_patch_sets_all_fields() {
        let mut p = pending();
        PaymentPatch::complete("REF-9").apply(&mut p);
        assert_eq!(p.status, PaymentStatus::Completed);
        assert_eq!(p.verification_status, VerificationStatus::Verified);
        assert_eq!(p.gateway_ref_id, "REF-9");
        assert!(p.is_consistent());
    }

    #[test]
    fn fail_patch_leaves_verification_and_ref() {
        let mut p = pending();
        let original_ref = p.gateway_ref_id.clone();
        PaymentPatch::fail().apply(&mut p);
        assert_eq!(p.status, PaymentStatus::Failed);
        assert_eq!(p.verification_status, VerificationStatus::Unverified);
        assert_eq!(p.gateway_ref_id, original_ref);
    }
}
