//! Read-only subject lookups on the `subjects` table.

use async_trait::async_trait;
use coursepay_core::{Amount, SubjectId};
use coursepay_settlement::{StoreError, Subject, SubjectCatalog};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::{corrupt, store_error};

/// [`SubjectCatalog`] over Postgres.
#[derive(Debug, Clone)]
pub struct PgSubjectCatalog {
    pool: PgPool,
}

impl PgSubjectCatalog {
    /// Wrap a pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubjectCatalog for PgSubjectCatalog {
    async fn find_subject(&self, id: SubjectId) -> Result<Option<Subject>, StoreError> {
        let row = sqlx::query_as::<_, SubjectRow>(
            "SELECT id, title, price FROM subjects WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;
        row.map(SubjectRow::into_subject).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct SubjectRow {
    id: Uuid,
    title: String,
    price: Option<Decimal>,
}

impl SubjectRow {
    fn into_subject(self) -> Result<Subject, StoreError> {
        let price = self
            .price
            .map(Amount::new)
            .transpose()
            .map_err(|e| corrupt("subjects", self.id, e))?;
        Ok(Subject {
            id: SubjectId::from_uuid(self.id),
            title: self.title,
            price,
        })
    }
}
