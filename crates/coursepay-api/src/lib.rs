//! # coursepay-api: Axum API Service
//!
//! HTTP surface over the settlement orchestrator.
//!
//! ## API Surface
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | `POST` | `/v1/payments` | initiate a pending payment |
//! | `GET` | `/v1/payments` | list visible payments |
//! | `GET` | `/v1/payments/:id` | read one payment |
//! | `DELETE` | `/v1/payments/:id` | delete payment and enrollment (admin) |
//! | `POST` | `/v1/payments/:id/intent` | signed gateway form |
//! | `POST` | `/v1/payments/confirm` | settle from a confirmation |
//! | `GET` | `/v1/payments/callback` | settle from the gateway redirect |
//! | `GET` | `/v1/enrollments` | list visible enrollments |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```
//!
//! `/health/*`, `/metrics` and `/openapi.json` are served without
//! credentials.

pub mod auth;
pub mod bootstrap;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use state::{AppConfig, AppState};

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::middleware::metrics::ApiMetrics;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics = ApiMetrics::new();

    let api = Router::new()
        .merge(routes::payments::router())
        .merge(routes::enrollments::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(axum::Extension(auth_config));

    let public = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(middleware::metrics::metrics_handler))
        .merge(openapi::router());

    Router::new()
        .merge(public)
        .merge(api)
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(metrics))
        .with_state(state)
}

/// Liveness probe. Always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe. 200 once backing stores answer, 503 otherwise.
async fn readiness(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.is_ready().await {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}
