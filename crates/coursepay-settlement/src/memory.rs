//! # In-Memory Adapters
//!
//! `parking_lot::RwLock<HashMap>` stores implementing the settlement ports.
//! Each method takes the lock once and releases it before returning, so no
//! lock is ever held across `.await`. Every check-then-write (natural key,
//! compare-and-swap, pair uniqueness) happens under a single write lock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use coursepay_core::{
    Enrollment, EnrollmentId, Payment, PaymentId, PaymentStatus, SubjectId, TransactionUuid,
    UserId,
};
use parking_lot::RwLock;

use crate::store::{
    EnrollmentStore, PaymentPatch, PaymentStore, StoreError, Subject, SubjectCatalog,
    COMPLETED_PAYMENT_CONSTRAINT, ENROLLMENT_PAIR_CONSTRAINT, PAYMENT_NATURAL_KEY_CONSTRAINT,
};

/// In-memory [`PaymentStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentStore {
    data: Arc<RwLock<HashMap<PaymentId, Payment>>>,
}

impl InMemoryPaymentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored payments.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn newest_first<T>(mut items: Vec<T>, key: impl Fn(&T) -> chrono::DateTime<chrono::Utc>) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
    items
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let mut guard = self.data.write();
        let clash = guard.values().any(|p| {
            p.user_id == payment.user_id && p.transaction_uuid == payment.transaction_uuid
        });
        if clash || guard.contains_key(&payment.id) {
            return Err(StoreError::Duplicate {
                constraint: PAYMENT_NATURAL_KEY_CONSTRAINT.to_string(),
            });
        }
        guard.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        Ok(self.data.read().get(&id).cloned())
    }

    async fn find_payment_by_natural_key(
        &self,
        user_id: UserId,
        transaction_uuid: &TransactionUuid,
    ) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .data
            .read()
            .values()
            .find(|p| p.user_id == user_id && &p.transaction_uuid == transaction_uuid)
            .cloned())
    }

    async fn find_payment_by_gateway_ref(
        &self,
        user_id: UserId,
        gateway_ref_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .data
            .read()
            .values()
            .find(|p| p.user_id == user_id && p.gateway_ref_id == gateway_ref_id)
            .cloned())
    }

    async fn find_completed_payment(
        &self,
        user_id: UserId,
        subject_id: SubjectId,
    ) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .data
            .read()
            .values()
            .find(|p| {
                p.user_id == user_id
                    && p.subject_id == subject_id
                    && p.status == PaymentStatus::Completed
            })
            .cloned())
    }

    async fn list_payments(&self, user_id: Option<UserId>) -> Result<Vec<Payment>, StoreError> {
        let items: Vec<Payment> = self
            .data
            .read()
            .values()
            .filter(|p| user_id.map_or(true, |u| p.user_id == u))
            .cloned()
            .collect();
        Ok(newest_first(items, |p| p.created_at))
    }

    async fn conditional_update_payment(
        &self,
        id: PaymentId,
        expected: PaymentStatus,
        patch: &PaymentPatch,
    ) -> Result<bool, StoreError> {
        let mut guard = self.data.write();
        let Some(current) = guard.get(&id) else {
            return Ok(false);
        };
        if current.status != expected {
            return Ok(false);
        }
        if patch.status == PaymentStatus::Completed {
            let (user_id, subject_id) = (current.user_id, current.subject_id);
            let already = guard.values().any(|p| {
                p.id != id
                    && p.user_id == user_id
                    && p.subject_id == subject_id
                    && p.status == PaymentStatus::Completed
            });
            if already {
                return Err(StoreError::Duplicate {
                    constraint: COMPLETED_PAYMENT_CONSTRAINT.to_string(),
                });
            }
        }
        match guard.get_mut(&id) {
            Some(payment) => {
                patch.apply(payment);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_payment(&self, id: PaymentId) -> Result<bool, StoreError> {
        Ok(self.data.write().remove(&id).is_some())
    }
}

/// In-memory [`EnrollmentStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryEnrollmentStore {
    data: Arc<RwLock<HashMap<EnrollmentId, Enrollment>>>,
}

impl InMemoryEnrollmentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored enrollments.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EnrollmentStore for InMemoryEnrollmentStore {
    async fn create_enrollment(&self, enrollment: &Enrollment) -> Result<(), StoreError> {
        let mut guard = self.data.write();
        let exists = guard
            .values()
            .any(|e| e.user_id == enrollment.user_id && e.subject_id == enrollment.subject_id);
        if exists {
            return Err(StoreError::Duplicate {
                constraint: ENROLLMENT_PAIR_CONSTRAINT.to_string(),
            });
        }
        guard.insert(enrollment.id, enrollment.clone());
        Ok(())
    }

    async fn find_enrollment(
        &self,
        user_id: UserId,
        subject_id: SubjectId,
    ) -> Result<Option<Enrollment>, StoreError> {
        Ok(self
            .data
            .read()
            .values()
            .find(|e| e.user_id == user_id && e.subject_id == subject_id)
            .cloned())
    }

    async fn find_enrollment_by_payment(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<Enrollment>, StoreError> {
        Ok(self
            .data
            .read()
            .values()
            .find(|e| e.payment_id == payment_id)
            .cloned())
    }

    async fn list_enrollments(
        &self,
        user_id: Option<UserId>,
    ) -> Result<Vec<Enrollment>, StoreError> {
        let items: Vec<Enrollment> = self
            .data
            .read()
            .values()
            .filter(|e| user_id.map_or(true, |u| e.user_id == u))
            .cloned()
            .collect();
        Ok(newest_first(items, |e| e.enrolled_at))
    }

    async fn delete_enrollment_by_payment_id(
        &self,
        payment_id: PaymentId,
    ) -> Result<u64, StoreError> {
        let mut guard = self.data.write();
        let before = guard.len();
        guard.retain(|_, e| e.payment_id != payment_id);
        Ok((before - guard.len()) as u64)
    }
}

/// In-memory [`SubjectCatalog`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    data: Arc<RwLock<HashMap<SubjectId, Subject>>>,
}

impl InMemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a subject.
    pub fn insert(&self, subject: Subject) {
        self.data.write().insert(subject.id, subject);
    }
}

#[async_trait]
impl SubjectCatalog for InMemoryCatalog {
    async fn find_subject(&self, id: SubjectId) -> Result<Option<Subject>, StoreError> {
        Ok(self.data.read().get(&id).cloned())
    }
}
