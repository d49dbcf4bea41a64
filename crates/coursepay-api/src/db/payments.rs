//! Payment persistence on the `payments` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coursepay_core::{
    Amount, Payment, PaymentId, PaymentStatus, SubjectId, TransactionUuid, UserId,
};
use coursepay_settlement::{PaymentPatch, PaymentStore, StoreError};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::{corrupt, store_error};

const COLUMNS: &str = "id, user_id, subject_id, amount, method, transaction_uuid, gateway_ref_id, \
                       status, verification_status, created_at, updated_at";

/// [`PaymentStore`] over Postgres.
#[derive(Debug, Clone)]
pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    /// Wrap a pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn select_where(predicate: &str) -> String {
    format!("SELECT {COLUMNS} FROM payments WHERE {predicate}")
}

fn decode(row: Option<PaymentRow>) -> Result<Option<Payment>, StoreError> {
    row.map(PaymentRow::into_payment).transpose()
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn create_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO payments (id, user_id, subject_id, amount, method, transaction_uuid,
                                   gateway_ref_id, status, verification_status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(payment.id.as_uuid())
        .bind(payment.user_id.as_uuid())
        .bind(payment.subject_id.as_uuid())
        .bind(payment.amount.as_decimal())
        .bind(&payment.method)
        .bind(payment.transaction_uuid.as_str())
        .bind(&payment.gateway_ref_id)
        .bind(payment.status.as_str())
        .bind(payment.verification_status.as_str())
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query_as::<_, PaymentRow>(&select_where("id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        decode(row)
    }

    async fn find_payment_by_natural_key(
        &self,
        user_id: UserId,
        transaction_uuid: &TransactionUuid,
    ) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query_as::<_, PaymentRow>(&select_where(
            "user_id = $1 AND transaction_uuid = $2",
        ))
        .bind(user_id.as_uuid())
        .bind(transaction_uuid.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        decode(row)
    }

    async fn find_payment_by_gateway_ref(
        &self,
        user_id: UserId,
        gateway_ref_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query_as::<_, PaymentRow>(&select_where(
            "user_id = $1 AND gateway_ref_id = $2 ORDER BY created_at DESC LIMIT 1",
        ))
        .bind(user_id.as_uuid())
        .bind(gateway_ref_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        decode(row)
    }

    async fn find_completed_payment(
        &self,
        user_id: UserId,
        subject_id: SubjectId,
    ) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query_as::<_, PaymentRow>(&select_where(
            "user_id = $1 AND subject_id = $2 AND status = 'completed'",
        ))
        .bind(user_id.as_uuid())
        .bind(subject_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        decode(row)
    }

    async fn list_payments(&self, user_id: Option<UserId>) -> Result<Vec<Payment>, StoreError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&select_where(
            "($1::uuid IS NULL OR user_id = $1) ORDER BY created_at DESC",
        ))
        .bind(user_id.map(|u| *u.as_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;
        rows.into_iter().map(PaymentRow::into_payment).collect()
    }

    async fn conditional_update_payment(
        &self,
        id: PaymentId,
        expected: PaymentStatus,
        patch: &PaymentPatch,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE payments
                SET status = $1,
                    verification_status = COALESCE($2, verification_status),
                    gateway_ref_id = COALESCE($3, gateway_ref_id),
                    updated_at = $4
              WHERE id = $5 AND status = $6",
        )
        .bind(patch.status.as_str())
        .bind(patch.verification_status.map(|v| v.as_str()))
        .bind(patch.gateway_ref_id.as_deref())
        .bind(Utc::now())
        .bind(id.as_uuid())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_payment(&self, id: PaymentId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM payments WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected() > 0)
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    user_id: Uuid,
    subject_id: Uuid,
    amount: Decimal,
    method: String,
    transaction_uuid: String,
    gateway_ref_id: String,
    status: String,
    verification_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_payment(self) -> Result<Payment, StoreError> {
        let id = self.id;
        Ok(Payment {
            id: PaymentId::from_uuid(id),
            user_id: UserId::from_uuid(self.user_id),
            subject_id: SubjectId::from_uuid(self.subject_id),
            amount: Amount::new(self.amount).map_err(|e| corrupt("payments", id, e))?,
            method: self.method,
            transaction_uuid: TransactionUuid::new(self.transaction_uuid)
                .map_err(|e| corrupt("payments", id, e))?,
            gateway_ref_id: self.gateway_ref_id,
            status: self.status.parse().map_err(|e| corrupt("payments", id, e))?,
            verification_status: self
                .verification_status
                .parse()
                .map_err(|e| corrupt("payments", id, e))?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
