//! # Database Persistence Layer
//!
//! Postgres adapters for the settlement store ports via SQLx.
//!
//! The database layer is **optional**. When `DATABASE_URL` is set, payments,
//! enrollments and the subject catalog live in PostgreSQL. When absent, the
//! service runs on in-memory stores (development and tests).
//!
//! ## Concurrency primitives
//!
//! - Payment compare-and-swap is a single `UPDATE ... WHERE id = $n AND
//!   status = $m`; `rows_affected() == 1` means the caller won.
//! - `enrollments_user_subject_key` and the partial unique index
//!   `payments_one_completed_per_subject` surface as
//!   [`StoreError::Duplicate`] carrying the violated name.
//! - Deleting a payment cascades to its enrollment in the same statement.
//!   An enrollment insert that loses to that delete fails on
//!   `enrollments_payment_id_fkey` and surfaces as
//!   [`StoreError::MissingReference`].

pub mod enrollments;
pub mod payments;
pub mod subjects;

pub use enrollments::PgEnrollmentStore;
pub use payments::PgPaymentStore;
pub use subjects::PgSubjectCatalog;

use coursepay_settlement::StoreError;
use sqlx::postgres::{PgPool, PgPoolOptions};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL not set, running in-memory only mode. \
                 State will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// Map a driver error onto the store port's error type.
pub(crate) fn store_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if let Some(mapped) = classify(db.code().as_deref(), db.constraint()) {
            return mapped;
        }
    }
    tracing::error!(error = %err, "database error");
    StoreError::Backend(err.to_string())
}

/// Constraint violations the settlement layer reacts to, by SQLSTATE.
fn classify(code: Option<&str>, constraint: Option<&str>) -> Option<StoreError> {
    let constraint = constraint.unwrap_or("unknown").to_string();
    match code? {
        UNIQUE_VIOLATION => Some(StoreError::Duplicate { constraint }),
        FOREIGN_KEY_VIOLATION => Some(StoreError::MissingReference { constraint }),
        _ => None,
    }
}

/// A stored value that no longer parses into its domain type.
pub(crate) fn corrupt(table: &str, id: uuid::Uuid, reason: impl std::fmt::Display) -> StoreError {
    tracing::error!(table, %id, %reason, "undecodable row");
    StoreError::Backend(format!("undecodable {table} row {id}: {reason}"))
}
