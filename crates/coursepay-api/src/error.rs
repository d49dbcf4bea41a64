//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Settlement errors keep their machine code (`AMOUNT_MISMATCH`,
//! `GATEWAY_UNAVAILABLE`, ...) and map to HTTP status as follows:
//!
//! | Settlement error | Status |
//! |------------------|--------|
//! | `InvalidConfirmation`, `InvalidAmount` | 422 |
//! | `PaymentNotFound`, `SubjectNotFound` | 404 |
//! | `Forbidden` | 403 |
//! | `AlreadyPaid`, `AlreadyFailed`, store constraint clash | 409 |
//! | `AmountMismatch`, `VerificationFailed` | 402 |
//! | `GatewayUnavailable` | 503 + `Retry-After` |
//! | `DuplicateEnrollment`, store backend, internal | 500 |
//!
//! 500-class messages are logged and replaced with a generic message.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use coursepay_settlement::{SettlementError, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Seconds a client should wait before retrying a 503.
pub const RETRY_AFTER_SECS: u32 = 5;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "AMOUNT_MISMATCH").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid token (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authorization failure (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),

    /// Settlement outcome, mapped per the table above.
    #[error(transparent)]
    Settlement(#[from] SettlementError),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Settlement(err) => (settlement_status(err), err.kind()),
        }
    }

    fn is_internal(&self) -> bool {
        self.status_and_code().0.is_server_error()
            && !matches!(
                self,
                Self::Settlement(SettlementError::GatewayUnavailable(_))
            )
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Settlement(SettlementError::AmountMismatch {
                payment_id,
                expected,
                reported,
            }) => Some(serde_json::json!({
                "payment_id": payment_id,
                "expected": expected,
                "reported": reported,
            })),
            Self::Settlement(SettlementError::VerificationFailed { payment_id, status }) => {
                Some(serde_json::json!({ "payment_id": payment_id, "status": status }))
            }
            Self::Settlement(SettlementError::AlreadyPaid { subject_id }) => {
                Some(serde_json::json!({ "subject_id": subject_id }))
            }
            Self::Settlement(SettlementError::AlreadyFailed { payment_id }) => {
                Some(serde_json::json!({ "payment_id": payment_id }))
            }
            _ => None,
        }
    }
}

fn settlement_status(err: &SettlementError) -> StatusCode {
    match err {
        SettlementError::InvalidConfirmation(_) | SettlementError::InvalidAmount(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        SettlementError::PaymentNotFound | SettlementError::SubjectNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        SettlementError::Forbidden => StatusCode::FORBIDDEN,
        SettlementError::AlreadyPaid { .. }
        | SettlementError::AlreadyFailed { .. }
        | SettlementError::Store(StoreError::Duplicate { .. })
        | SettlementError::Store(StoreError::MissingReference { .. }) => StatusCode::CONFLICT,
        SettlementError::AmountMismatch { .. } | SettlementError::VerificationFailed { .. } => {
            StatusCode::PAYMENT_REQUIRED
        }
        SettlementError::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        SettlementError::DuplicateEnrollment { .. }
        | SettlementError::Store(StoreError::Backend(_))
        | SettlementError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = if self.is_internal() {
            tracing::error!(error = %self, code, "internal server error");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: self.details(),
            },
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
        }
        response
    }
}

/// Convert core validation errors to API errors.
impl From<coursepay_core::ValidationError> for AppError {
    fn from(err: coursepay_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}
