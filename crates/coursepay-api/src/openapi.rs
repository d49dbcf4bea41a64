//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI spec served
//! at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "coursepay API",
        version = "0.3.0",
        description = "Payment initiation, gateway verification and enrollment settlement.",
        license(name = "BUSL-1.1")
    ),
    paths(
        // Payments
        crate::routes::payments::initiate_payment,
        crate::routes::payments::list_payments,
        crate::routes::payments::get_payment,
        crate::routes::payments::delete_payment,
        crate::routes::payments::build_intent,
        crate::routes::payments::confirm_payment,
        crate::routes::payments::payment_callback,
        // Enrollments
        crate::routes::enrollments::list_enrollments,
        // Operations
        crate::middleware::metrics::metrics_handler,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::payments::PaymentView,
        crate::routes::payments::InitiatePaymentRequest,
        crate::routes::payments::ConfirmPaymentRequest,
        crate::routes::payments::CallbackQuery,
        crate::routes::payments::ConfirmResponse,
        crate::routes::payments::IntentResponse,
        crate::routes::payments::DeletePaymentResponse,
        crate::routes::enrollments::EnrollmentView,
        crate::middleware::metrics::MetricsSnapshot,
    )),
    tags(
        (name = "payments", description = "Payment lifecycle"),
        (name = "enrollments", description = "Granted subject access"),
        (name = "operations", description = "Service metrics"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json: Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
