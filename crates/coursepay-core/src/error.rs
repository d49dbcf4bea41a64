//! # Validation Errors
//!
//! Structured errors for domain primitives, built with `thiserror`.
//! Each variant carries the rejected input so operators can diagnose a bad
//! request or a misbehaving gateway without guesswork.

use thiserror::Error;

/// Validation errors for domain primitive newtypes and records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The amount string is not a decimal number.
    #[error("invalid amount: \"{0}\" (expected a plain decimal such as 1000 or 99.50)")]
    InvalidAmount(String),

    /// The amount is zero or negative.
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(String),

    /// The amount carries more fractional digits than the currency allows.
    #[error("amount {value} has more than {max_scale} fractional digits")]
    AmountPrecision {
        /// The rejected amount.
        value: String,
        /// Maximum permitted fractional digits.
        max_scale: u32,
    },

    /// Transaction identifier is empty, too long, or has forbidden characters.
    #[error("invalid transaction_uuid: \"{0}\" (expected 1-64 characters of [A-Za-z0-9_-])")]
    InvalidTransactionUuid(String),

    /// A UUID-based identifier failed to parse.
    #[error("invalid identifier: \"{0}\"")]
    InvalidIdentifier(String),

    /// Role string is not one of the known roles.
    #[error("unknown role: \"{0}\" (expected student, instructor or admin)")]
    UnknownRole(String),

    /// A persisted status string has no matching variant.
    #[error("unknown {kind} value: \"{value}\"")]
    UnknownStatus {
        /// Which status enum was being parsed.
        kind: &'static str,
        /// The unrecognised value.
        value: String,
    },

    /// An enrollment was requested for a payment that has not completed.
    #[error("payment {payment_id} is {status}, enrollment requires a completed payment")]
    PaymentNotSettled {
        /// The payment that was offered as authorization.
        payment_id: String,
        /// Its current status.
        status: String,
    },
}
