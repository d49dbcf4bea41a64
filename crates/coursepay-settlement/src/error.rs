//! # Settlement Errors
//!
//! One variant per failure a caller must branch on. Terminal failures have
//! already moved the payment to `failed` by the time they are returned;
//! retryable ones have not touched it.

use coursepay_core::{Amount, PaymentId, SubjectId, UserId};
use thiserror::Error;

use crate::store::StoreError;

/// Errors from settlement operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    /// The confirmation is structurally invalid. No state change.
    #[error("invalid confirmation: {0}")]
    InvalidConfirmation(String),

    /// No payment matches. No state change.
    #[error("payment not found")]
    PaymentNotFound,

    /// The subject does not exist in the catalog.
    #[error("subject {0} not found")]
    SubjectNotFound(SubjectId),

    /// The requested amount is invalid for this subject.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The user already holds a completed payment for this subject.
    #[error("subject {subject_id} is already paid for")]
    AlreadyPaid {
        /// The subject.
        subject_id: SubjectId,
    },

    /// The payment already failed; a new attempt is needed.
    #[error("payment {payment_id} has already failed")]
    AlreadyFailed {
        /// The payment.
        payment_id: PaymentId,
    },

    /// Confirmed amount differs from the stored amount. Payment is now failed.
    #[error("amount mismatch on payment {payment_id}: expected {expected}, got {reported}")]
    AmountMismatch {
        /// The payment.
        payment_id: PaymentId,
        /// Stored amount.
        expected: Amount,
        /// Amount carried by the confirmation or the gateway.
        reported: Amount,
    },

    /// The gateway gave no usable answer. Retryable; payment still pending.
    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// The gateway reports the transaction as not complete. Payment is now
    /// failed.
    #[error("gateway verification failed for payment {payment_id}: status {status}")]
    VerificationFailed {
        /// The payment.
        payment_id: PaymentId,
        /// Status reported by the gateway or the callback.
        status: String,
    },

    /// An enrollment for this pair already references a different payment.
    #[error("duplicate enrollment for user {user_id} in subject {subject_id}")]
    DuplicateEnrollment {
        /// The user.
        user_id: UserId,
        /// The subject.
        subject_id: SubjectId,
    },

    /// The principal may not perform this operation.
    #[error("forbidden")]
    Forbidden,

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SettlementError {
    /// Whether re-invoking the operation with the same input may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GatewayUnavailable(_) | Self::Store(StoreError::Backend(_))
        )
    }

    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfirmation(_) => "INVALID_CONFIRMATION",
            Self::PaymentNotFound => "PAYMENT_NOT_FOUND",
            Self::SubjectNotFound(_) => "SUBJECT_NOT_FOUND",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::AlreadyPaid { .. } => "ALREADY_PAID",
            Self::AlreadyFailed { .. } => "ALREADY_FAILED",
            Self::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            Self::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            Self::VerificationFailed { .. } => "VERIFICATION_FAILED",
            Self::DuplicateEnrollment { .. } => "DUPLICATE_ENROLLMENT",
            Self::Forbidden => "FORBIDDEN",
            Self::Store(_) => "STORE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
