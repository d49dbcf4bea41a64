//! # Payments API
//!
//! Initiation, signed gateway intents, confirmation (explicit and via the
//! gateway redirect), reads and administrative deletion. Handlers only
//! translate between HTTP and [`SettlementOrchestrator`] calls.
//!
//! [`SettlementOrchestrator`]: coursepay_settlement::SettlementOrchestrator

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use coursepay_core::{Amount, Payment, PaymentId, SubjectId, UserId};
use coursepay_gateway::GatewayPayload;
use coursepay_settlement::{Confirmation, ConfirmOutcome, SettlementError};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Caller;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_query, extract_validated_json, Validate};
use crate::routes::enrollments::EnrollmentView;
use crate::state::AppState;

const MAX_METHOD_LEN: usize = 64;

// ── DTOs ────────────────────────────────────────────────────────────────────

/// Payment as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subject_id: Uuid,
    /// Canonical decimal string.
    pub amount: String,
    pub method: String,
    pub transaction_uuid: String,
    pub gateway_ref_id: String,
    /// `pending | completed | failed`.
    pub status: String,
    /// `unverified | verified`.
    pub verification_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Payment> for PaymentView {
    fn from(p: Payment) -> Self {
        Self {
            id: *p.id.as_uuid(),
            user_id: *p.user_id.as_uuid(),
            subject_id: *p.subject_id.as_uuid(),
            amount: p.amount.canonical(),
            method: p.method,
            transaction_uuid: p.transaction_uuid.to_string(),
            gateway_ref_id: p.gateway_ref_id,
            status: p.status.as_str().to_string(),
            verification_status: p.verification_status.as_str().to_string(),
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Initiate a payment for a subject.
#[derive(Debug, Deserialize, ToSchema)]
pub struct InitiatePaymentRequest {
    pub subject_id: Uuid,
    /// Decimal string or JSON number.
    #[schema(value_type = String, example = "1000")]
    pub amount: serde_json::Value,
    /// Payment channel label. Defaults to `eSewa`.
    #[serde(default)]
    pub method: Option<String>,
}

impl Validate for InitiatePaymentRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(method) = &self.method {
            if method.len() > MAX_METHOD_LEN {
                return Err(format!("method must be at most {MAX_METHOD_LEN} characters"));
            }
        }
        Ok(())
    }
}

/// Confirm a gateway transaction.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmPaymentRequest {
    /// Paying user. Defaults to the caller.
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub transaction_uuid: String,
    pub ref_id: String,
    /// Decimal string or JSON number.
    #[schema(value_type = String, example = "1000")]
    pub total_amount: serde_json::Value,
    /// The gateway's base64 redirect blob, if the client has it.
    #[serde(default)]
    pub data: Option<String>,
}

/// Query string of the gateway's success redirect.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CallbackQuery {
    /// Base64 JSON blob appended by the gateway.
    pub data: String,
}

/// Result of a confirmation.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConfirmResponse {
    /// `settled` for the call that completed the payment,
    /// `already_settled` for replays.
    pub outcome: String,
    pub payment: PaymentView,
    pub enrollment: Option<EnrollmentView>,
}

impl From<ConfirmOutcome> for ConfirmResponse {
    fn from(outcome: ConfirmOutcome) -> Self {
        match outcome {
            ConfirmOutcome::Settled {
                payment,
                enrollment,
            } => Self {
                outcome: "settled".into(),
                payment: payment.into(),
                enrollment: Some(enrollment.into()),
            },
            ConfirmOutcome::AlreadySettled {
                payment,
                enrollment,
            } => Self {
                outcome: "already_settled".into(),
                payment: payment.into(),
                enrollment: enrollment.map(Into::into),
            },
        }
    }
}

/// Signed form for the gateway's hosted payment page.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IntentResponse {
    pub payment_id: Uuid,
    /// Fields to post to `form_action`.
    #[schema(value_type = Object)]
    pub payload: GatewayPayload,
}

/// Result of an administrative delete.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeletePaymentResponse {
    pub payment_id: Uuid,
    pub enrollments_removed: u64,
}

/// Render a JSON string or number as amount text.
fn amount_text(value: &serde_json::Value) -> Result<String, String> {
    match value {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(format!("amount must be a string or number, got {other}")),
    }
}

// ── Router ──────────────────────────────────────────────────────────────────

/// Build the payments router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/payments", post(initiate_payment).get(list_payments))
        .route("/v1/payments/confirm", post(confirm_payment))
        .route("/v1/payments/callback", get(payment_callback))
        .route(
            "/v1/payments/:id",
            get(get_payment).delete(delete_payment),
        )
        .route("/v1/payments/:id/intent", post(build_intent))
}

/// POST /v1/payments: Create a pending payment.
#[utoipa::path(
    post,
    path = "/v1/payments",
    request_body = InitiatePaymentRequest,
    responses(
        (status = 201, description = "Payment created", body = PaymentView),
        (status = 404, description = "Unknown subject", body = crate::error::ErrorBody),
        (status = 409, description = "Subject already paid for", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid amount", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
pub async fn initiate_payment(
    State(state): State<AppState>,
    Caller(principal): Caller,
    body: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PaymentView>), AppError> {
    let req = extract_validated_json(body)?;
    let text = amount_text(&req.amount).map_err(SettlementError::InvalidAmount)?;
    let amount =
        Amount::parse(&text).map_err(|e| SettlementError::InvalidAmount(e.to_string()))?;

    let payment = state
        .settlement
        .initiate_payment(
            &principal,
            SubjectId::from_uuid(req.subject_id),
            amount,
            req.method,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(payment.into())))
}

/// GET /v1/payments: Payments visible to the caller.
#[utoipa::path(
    get,
    path = "/v1/payments",
    responses(
        (status = 200, description = "Payments, newest first", body = Vec<PaymentView>),
    ),
    tag = "payments"
)]
pub async fn list_payments(
    State(state): State<AppState>,
    Caller(principal): Caller,
) -> Result<Json<Vec<PaymentView>>, AppError> {
    let payments = state.settlement.list_payments(&principal).await?;
    Ok(Json(payments.into_iter().map(Into::into).collect()))
}

/// GET /v1/payments/:id: Read one payment.
#[utoipa::path(
    get,
    path = "/v1/payments/{id}",
    params(("id" = Uuid, Path, description = "Payment id")),
    responses(
        (status = 200, description = "The payment", body = PaymentView),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentView>, AppError> {
    let payment = state
        .settlement
        .get_payment(&principal, PaymentId::from_uuid(id))
        .await?;
    Ok(Json(payment.into()))
}

/// DELETE /v1/payments/:id: Delete a payment and its enrollment. Admin only.
#[utoipa::path(
    delete,
    path = "/v1/payments/{id}",
    params(("id" = Uuid, Path, description = "Payment id")),
    responses(
        (status = 200, description = "Deleted", body = DeletePaymentResponse),
        (status = 403, description = "Not an administrator", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
pub async fn delete_payment(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletePaymentResponse>, AppError> {
    let deleted = state
        .settlement
        .delete_payment(&principal, PaymentId::from_uuid(id))
        .await?;
    Ok(Json(DeletePaymentResponse {
        payment_id: *deleted.payment_id.as_uuid(),
        enrollments_removed: deleted.enrollments_removed,
    }))
}

/// POST /v1/payments/:id/intent: Signed gateway form for a pending payment.
#[utoipa::path(
    post,
    path = "/v1/payments/{id}/intent",
    params(("id" = Uuid, Path, description = "Payment id")),
    responses(
        (status = 200, description = "Signed intent", body = IntentResponse),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 409, description = "Payment no longer pending", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
pub async fn build_intent(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<IntentResponse>, AppError> {
    let payload = state
        .settlement
        .build_intent_for_payment(&principal, PaymentId::from_uuid(id))
        .await?;
    Ok(Json(IntentResponse {
        payment_id: id,
        payload,
    }))
}

/// POST /v1/payments/confirm: Settle a payment from a gateway confirmation.
#[utoipa::path(
    post,
    path = "/v1/payments/confirm",
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Payment settled (or already settled)", body = ConfirmResponse),
        (status = 402, description = "Amount mismatch or gateway rejection", body = crate::error::ErrorBody),
        (status = 404, description = "No matching payment", body = crate::error::ErrorBody),
        (status = 422, description = "Malformed confirmation", body = crate::error::ErrorBody),
        (status = 503, description = "Gateway unavailable, retry later", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    Caller(principal): Caller,
    body: Result<Json<ConfirmPaymentRequest>, JsonRejection>,
) -> Result<Json<ConfirmResponse>, AppError> {
    // Field content is checked by the orchestrator, which reports
    // `INVALID_CONFIRMATION`.
    let req = extract_json(body)?;
    let total_amount =
        amount_text(&req.total_amount).map_err(SettlementError::InvalidConfirmation)?;
    let confirmation = Confirmation {
        user_id: req
            .user_id
            .map(UserId::from_uuid)
            .unwrap_or(principal.id),
        transaction_uuid: req.transaction_uuid,
        ref_id: req.ref_id,
        total_amount,
        raw_gateway_blob: req.data,
    };
    let outcome = state
        .settlement
        .confirm_payment(&principal, confirmation)
        .await?;
    Ok(Json(outcome.into()))
}

/// GET /v1/payments/callback: The gateway's success redirect.
#[utoipa::path(
    get,
    path = "/v1/payments/callback",
    params(("data" = String, Query, description = "Base64 JSON blob from the gateway")),
    responses(
        (status = 200, description = "Payment settled (or already settled)", body = ConfirmResponse),
        (status = 402, description = "Gateway reported failure", body = crate::error::ErrorBody),
        (status = 422, description = "Undecodable blob", body = crate::error::ErrorBody),
        (status = 503, description = "Gateway unavailable, retry later", body = crate::error::ErrorBody),
    ),
    tag = "payments"
)]
pub async fn payment_callback(
    State(state): State<AppState>,
    Caller(principal): Caller,
    query: Result<Query<CallbackQuery>, QueryRejection>,
) -> Result<Json<ConfirmResponse>, AppError> {
    let query = extract_query(query)?;
    let confirmation = Confirmation::from_redirect(principal.id, &query.data)?;
    let outcome = state
        .settlement
        .confirm_payment(&principal, confirmation)
        .await?;
    Ok(Json(outcome.into()))
}
