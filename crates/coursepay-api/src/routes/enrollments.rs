//! # Enrollments API
//!
//! Read-only. Enrollments are created by payment settlement and removed by
//! payment deletion; there is no direct write route.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use coursepay_core::Enrollment;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Caller;
use crate::error::AppError;
use crate::state::AppState;

/// Enrollment as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnrollmentView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subject_id: Uuid,
    /// The completed payment that granted access.
    pub payment_id: Uuid,
    /// `active | expired | suspended`.
    pub access_status: String,
    pub enrolled_at: DateTime<Utc>,
}

impl From<Enrollment> for EnrollmentView {
    fn from(e: Enrollment) -> Self {
        Self {
            id: *e.id.as_uuid(),
            user_id: *e.user_id.as_uuid(),
            subject_id: *e.subject_id.as_uuid(),
            payment_id: *e.payment_id.as_uuid(),
            access_status: e.access_status.as_str().to_string(),
            enrolled_at: e.enrolled_at,
        }
    }
}

/// Build the enrollments router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/enrollments", get(list_enrollments))
}

/// GET /v1/enrollments: Enrollments visible to the caller.
#[utoipa::path(
    get,
    path = "/v1/enrollments",
    responses(
        (status = 200, description = "Enrollments, newest first", body = Vec<EnrollmentView>),
    ),
    tag = "enrollments"
)]
pub async fn list_enrollments(
    State(state): State<AppState>,
    Caller(principal): Caller,
) -> Result<Json<Vec<EnrollmentView>>, AppError> {
    let enrollments = state.settlement.list_enrollments(&principal).await?;
    Ok(Json(enrollments.into_iter().map(Into::into).collect()))
}
