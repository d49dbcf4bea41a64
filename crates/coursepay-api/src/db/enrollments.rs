//! Enrollment persistence on the `enrollments` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coursepay_core::{Enrollment, EnrollmentId, PaymentId, SubjectId, UserId};
use coursepay_settlement::{EnrollmentStore, StoreError};
use sqlx::PgPool;
use uuid::Uuid;

use super::{corrupt, store_error};

const SELECT: &str =
    "SELECT id, user_id, subject_id, payment_id, access_status, enrolled_at FROM enrollments";

/// [`EnrollmentStore`] over Postgres.
#[derive(Debug, Clone)]
pub struct PgEnrollmentStore {
    pool: PgPool,
}

impl PgEnrollmentStore {
    /// Wrap a pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EnrollmentStore for PgEnrollmentStore {
    async fn create_enrollment(&self, enrollment: &Enrollment) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO enrollments (id, user_id, subject_id, payment_id, access_status, enrolled_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(enrollment.id.as_uuid())
        .bind(enrollment.user_id.as_uuid())
        .bind(enrollment.subject_id.as_uuid())
        .bind(enrollment.payment_id.as_uuid())
        .bind(enrollment.access_status.as_str())
        .bind(enrollment.enrolled_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn find_enrollment(
        &self,
        user_id: UserId,
        subject_id: SubjectId,
    ) -> Result<Option<Enrollment>, StoreError> {
        let row = sqlx::query_as::<_, EnrollmentRow>(&format!(
            "{SELECT} WHERE user_id = $1 AND subject_id = $2"
        ))
        .bind(user_id.as_uuid())
        .bind(subject_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        row.map(EnrollmentRow::into_enrollment).transpose()
    }

    async fn find_enrollment_by_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<Enrollment>, StoreError> {
        let row = sqlx::query_as::<_, EnrollmentRow>(&format!(
            "{SELECT} WHERE payment_id = $1 LIMIT 1"
        ))
        .bind(payment_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        row.map(EnrollmentRow::into_enrollment).transpose()
    }

    async fn list_enrollments(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<Enrollment>, StoreError> {
        let rows = sqlx::query_as::<_, EnrollmentRow>(&format!(
            "{SELECT} WHERE ($1::uuid IS NULL OR user_id = $1) ORDER BY enrolled_at DESC"
        ))
        .bind(user_id.map(|u| *u.as_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        rows.into_iter().map(EnrollmentRow::into_enrollment).collect()
    }

    async fn delete_enrollment_by_payment_id(
        &self,
        payment_id: PaymentId,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM enrollments WHERE payment_id = $1")
            .bind(payment_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected())
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct EnrollmentRow {
    id: Uuid,
    user_id: Uuid,
    subject_id: Uuid,
    payment_id: Uuid,
    access_status: String,
    enrolled_at: DateTime<Utc>,
}

impl EnrollmentRow {
    fn into_enrollment(self) -> Result<Enrollment, StoreError> {
        Ok(Enrollment {
            id: EnrollmentId::from_uuid(self.id),
            user_id: UserId::from_uuid(self.user_id),
            subject_id: SubjectId::from_uuid(self.subject_id),
            payment_id: PaymentId::from_uuid(self.payment_id),
            access_status: self
                .access_status
                .parse()
                .map_err(|e| corrupt("enrollments", self.id, e))?,
            enrolled_at: self.enrolled_at,
        })
    }
}
