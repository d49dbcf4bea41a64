//! # Settlement Orchestrator
//!
//! The per-payment state machine:
//!
//! ```text
//! pending/unverified ──(verified, CAS won)──► completed/verified ──► enrollment
//!        │
//!        └──(amount mismatch | gateway rejected)──► failed/unverified
//! ```
//!
//! ## Confirmation pipeline
//!
//! | Step | Check | On failure |
//! |------|-------|------------|
//! | A | structure, callback cross-check | `InvalidConfirmation`, no change |
//! | B | locate by `(user, transaction_uuid)`, else by `gateway_ref_id` | `PaymentNotFound`, no change |
//! | C | already `completed` / `failed` | replay success / `AlreadyFailed` |
//! | D | confirmed amount equals stored amount | `failed`, `AmountMismatch` |
//! | E | gateway status check under a hard timeout | `failed` + `VerificationFailed`, or `GatewayUnavailable` with no change |
//! | F | CAS `pending → completed` | loser re-reads and replays |
//! | G | winner creates the enrollment | `DuplicateEnrollment` (logged as a bug) |
//!
//! Concurrency control is entirely the store's: the CAS in F has exactly one
//! winner, and the enrollment pair constraint in G backs it up.

use std::sync::Arc;
use std::time::Duration;

use coursepay_core::{
    Amount, Enrollment, Payment, PaymentId, PaymentStatus, Principal, SubjectId, TransactionUuid,
    UserId,
};
use coursepay_gateway::{
    decode_redirect_payload, ConfigError, GatewayPayload, IntentSigner, PaymentGateway,
    RedirectPayload, VerificationOutcome,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::SettlementError;
use crate::guard;
use crate::store::{EnrollmentStore, PaymentPatch, PaymentStore, StoreError, SubjectCatalog};

const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 15;
const MAX_REF_ID_LEN: usize = 128;

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Hard bound on one gateway verification, retries included.
    pub verify_timeout: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            verify_timeout: Duration::from_secs(DEFAULT_VERIFY_TIMEOUT_SECS),
        }
    }
}

impl SettlementConfig {
    /// Load from `SETTLEMENT_VERIFY_TIMEOUT_SECS` (default 15).
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("SETTLEMENT_VERIFY_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs = raw.trim().parse::<u64>().map_err(|_| {
                    ConfigError::InvalidValue("SETTLEMENT_VERIFY_TIMEOUT_SECS".into(), raw.clone())
                })?;
                Ok(Self {
                    verify_timeout: Duration::from_secs(secs),
                })
            }
            Err(_) => Ok(Self::default()),
        }
    }
}

/// The store adapters the orchestrator is wired to.
#[derive(Clone)]
pub struct Stores {
    /// Payment records.
    pub payments: Arc<dyn PaymentStore>,
    /// Enrollment records.
    pub enrollments: Arc<dyn EnrollmentStore>,
    /// Subject catalog.
    pub catalog: Arc<dyn SubjectCatalog>,
}

/// An inbound claim that a gateway transaction completed.
///
/// Fields are raw because the message may come from a client-controlled
/// redirect; [`SettlementOrchestrator::confirm_payment`] validates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    /// Paying user.
    pub user_id: UserId,
    /// Merchant transaction id.
    pub transaction_uuid: String,
    /// Gateway transaction reference.
    pub ref_id: String,
    /// Amount claimed as charged.
    pub total_amount: String,
    /// The gateway's base64 redirect blob, when the confirmation came from
    /// the browser redirect.
    pub raw_gateway_blob: Option<String>,
}

impl Confirmation {
    /// Build a confirmation from a redirect blob, attaching the blob so
    /// confirmation cross-checks it.
    pub fn from_redirect(user_id: UserId, blob: &str) -> Result<Self, SettlementError> {
        let decoded = decode_redirect_payload(blob)
            .map_err(|e| SettlementError::InvalidConfirmation(e.to_string()))?;
        Ok(Self {
            user_id,
            transaction_uuid: decoded.transaction_uuid.to_string(),
            ref_id: decoded.transaction_code,
            total_amount: decoded.total_amount.canonical(),
            raw_gateway_blob: Some(blob.to_string()),
        })
    }
}

struct ValidConfirmation {
    user_id: UserId,
    transaction_uuid: TransactionUuid,
    ref_id: String,
    total_amount: Amount,
    callback: Option<RedirectPayload>,
}

fn validate(c: Confirmation) -> Result<ValidConfirmation, SettlementError> {
    let invalid = |msg: String| SettlementError::InvalidConfirmation(msg);

    let transaction_uuid =
        TransactionUuid::new(c.transaction_uuid.trim()).map_err(|e| invalid(e.to_string()))?;
    let total_amount = Amount::parse(&c.total_amount).map_err(|e| invalid(e.to_string()))?;
    let ref_id = c.ref_id.trim().to_string();
    if ref_id.is_empty() {
        return Err(invalid("ref_id is required".into()));
    }
    if ref_id.len() > MAX_REF_ID_LEN || ref_id.chars().any(char::is_control) {
        return Err(invalid("ref_id is malformed".into()));
    }

    let callback = match c.raw_gateway_blob.as_deref() {
        Some(blob) => {
            let decoded = decode_redirect_payload(blob).map_err(|e| invalid(e.to_string()))?;
            if decoded.transaction_uuid != transaction_uuid
                || decoded.total_amount != total_amount
                || decoded.transaction_code != ref_id
            {
                return Err(invalid("callback data does not match confirmation".into()));
            }
            Some(decoded)
        }
        None => None,
    };

    Ok(ValidConfirmation {
        user_id: c.user_id,
        transaction_uuid,
        ref_id,
        total_amount,
        callback,
    })
}

/// Successful result of [`SettlementOrchestrator::confirm_payment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmOutcome {
    /// This call performed the `pending → completed` transition.
    Settled {
        /// The completed payment.
        payment: Payment,
        /// The enrollment created for it.
        enrollment: Enrollment,
    },
    /// The payment was already completed; nothing was re-verified or
    /// re-provisioned.
    AlreadySettled {
        /// The completed payment.
        payment: Payment,
        /// Its enrollment.
        enrollment: Option<Enrollment>,
    },
}

impl ConfirmOutcome {
    /// The completed payment.
    pub fn payment(&self) -> &Payment {
        match self {
            Self::Settled { payment, .. } | Self::AlreadySettled { payment, .. } => payment,
        }
    }

    /// Whether this call performed the transition.
    pub fn is_new_settlement(&self) -> bool {
        matches!(self, Self::Settled { .. })
    }
}

/// Result of an administrative delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedPayment {
    /// The deleted payment.
    pub payment_id: PaymentId,
    /// Enrollments removed with it.
    pub enrollments_removed: u64,
}

/// Drives payments from intent to enrollment.
pub struct SettlementOrchestrator {
    payments: Arc<dyn PaymentStore>,
    enrollments: Arc<dyn EnrollmentStore>,
    catalog: Arc<dyn SubjectCatalog>,
    gateway: Arc<dyn PaymentGateway>,
    signer: IntentSigner,
    config: SettlementConfig,
}

impl std::fmt::Debug for SettlementOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementOrchestrator")
            .field("signer", &self.signer)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SettlementOrchestrator {
    /// Wire the orchestrator.
    pub fn new(
        stores: Stores,
        gateway: Arc<dyn PaymentGateway>,
        signer: IntentSigner,
        config: SettlementConfig,
    ) -> Self {
        Self {
            payments: stores.payments,
            enrollments: stores.enrollments,
            catalog: stores.catalog,
            gateway,
            signer,
            config,
        }
    }

    // ── InitiatePayment ─────────────────────────────────────────────

    /// Create a `pending/unverified` payment for `subject_id`.
    ///
    /// Rejects with `AlreadyPaid` iff the principal already holds a
    /// completed payment for the subject. Pending and failed attempts do not
    /// block a new one.
    pub async fn initiate_payment(
        &self,
        principal: &Principal,
        subject_id: SubjectId,
        amount: Amount,
        method: Option<String>,
    ) -> Result<Payment, SettlementError> {
        let subject = self
            .catalog
            .find_subject(subject_id)
            .await?
            .ok_or(SettlementError::SubjectNotFound(subject_id))?;

        if let Some(price) = subject.price {
            if price != amount {
                return Err(SettlementError::InvalidAmount(format!(
                    "subject is priced at {price}, requested {amount}"
                )));
            }
        }

        if self
            .payments
            .find_completed_payment(principal.id, subject_id)
            .await?
            .is_some()
        {
            return Err(SettlementError::AlreadyPaid { subject_id });
        }

        let payment = Payment::new_pending(principal.id, subject_id, amount, method);
        self.payments.create_payment(&payment).await?;
        info!(
            payment_id = %payment.id,
            user_id = %payment.user_id,
            subject_id = %payment.subject_id,
            transaction_uuid = %payment.transaction_uuid,
            amount = %payment.amount,
            "payment initiated"
        );
        Ok(payment)
    }

    /// Signed gateway form for the principal's own pending payment.
    pub async fn build_intent_for_payment(
        &self,
        principal: &Principal,
        payment_id: PaymentId,
    ) -> Result<GatewayPayload, SettlementError> {
        let found = self.payments.get_payment(payment_id).await?;
        let payment = guard::authorize_payment_owner(principal, found)?;
        match payment.status {
            PaymentStatus::Pending => {}
            PaymentStatus::Completed => {
                return Err(SettlementError::AlreadyPaid {
                    subject_id: payment.subject_id,
                })
            }
            PaymentStatus::Failed => {
                return Err(SettlementError::AlreadyFailed {
                    payment_id: payment.id,
                })
            }
        }
        self.signer
            .intent_for(payment.amount, &payment.transaction_uuid)
            .map_err(|e| SettlementError::Internal(e.to_string()))
    }

    // ── ConfirmPayment ──────────────────────────────────────────────

    /// Settle a payment from an untrusted confirmation.
    pub async fn confirm_payment(
        &self,
        principal: &Principal,
        confirmation: Confirmation,
    ) -> Result<ConfirmOutcome, SettlementError> {
        guard::authorize_confirmation(principal, &confirmation.user_id)?;

        // A
        let c = validate(confirmation)?;

        // B
        let payment = self.locate(&c).await?;

        // C
        match payment.status {
            PaymentStatus::Completed => return self.replay(payment).await,
            PaymentStatus::Failed => {
                return Err(SettlementError::AlreadyFailed {
                    payment_id: payment.id,
                })
            }
            PaymentStatus::Pending => {}
        }

        // D
        if c.total_amount != payment.amount {
            let err = SettlementError::AmountMismatch {
                payment_id: payment.id,
                expected: payment.amount,
                reported: c.total_amount,
            };
            return self.fail(&payment, err).await;
        }

        if let Some(callback) = &c.callback {
            if !callback.is_complete() {
                let err = SettlementError::VerificationFailed {
                    payment_id: payment.id,
                    status: callback.status.clone(),
                };
                return self.fail(&payment, err).await;
            }
        }

        // E
        let verification = match tokio::time::timeout(
            self.config.verify_timeout,
            self.gateway
                .verify_with_gateway(&payment.transaction_uuid, payment.amount),
        )
        .await
        {
            Ok(v) => v,
            Err(_) => {
                warn!(
                    payment_id = %payment.id,
                    timeout = ?self.config.verify_timeout,
                    "gateway verification timed out; payment left pending"
                );
                return Err(SettlementError::GatewayUnavailable(format!(
                    "verification timed out after {:?}",
                    self.config.verify_timeout
                )));
            }
        };

        match verification.outcome {
            VerificationOutcome::Verified => {}
            VerificationOutcome::Unavailable { reason } => {
                warn!(
                    payment_id = %payment.id,
                    %reason,
                    "gateway unavailable; payment left pending"
                );
                return Err(SettlementError::GatewayUnavailable(reason));
            }
            VerificationOutcome::Rejected => {
                let err = SettlementError::VerificationFailed {
                    payment_id: payment.id,
                    status: verification
                        .raw_status
                        .unwrap_or_else(|| "UNKNOWN".to_string()),
                };
                return self.fail(&payment, err).await;
            }
        }

        if let Some(reported) = verification.amount {
            if reported != payment.amount {
                let err = SettlementError::AmountMismatch {
                    payment_id: payment.id,
                    expected: payment.amount,
                    reported,
                };
                return self.fail(&payment, err).await;
            }
        }

        let ref_id = match verification.ref_id {
            Some(gateway_ref) => {
                if gateway_ref != c.ref_id {
                    warn!(
                        payment_id = %payment.id,
                        claimed = %c.ref_id,
                        reported = %gateway_ref,
                        "confirmation ref_id differs from gateway reference"
                    );
                }
                gateway_ref
            }
            None => c.ref_id,
        };

        // F
        let patch = PaymentPatch::complete(ref_id);
        match self
            .payments
            .conditional_update_payment(payment.id, PaymentStatus::Pending, &patch)
            .await
        {
            Ok(true) => {}
            Ok(false) => return self.after_lost_race(payment.id).await,
            Err(StoreError::Duplicate { constraint }) => {
                error!(
                    payment_id = %payment.id,
                    user_id = %payment.user_id,
                    subject_id = %payment.subject_id,
                    %constraint,
                    "verified payment for a subject already paid for; needs manual refund"
                );
                let err = SettlementError::AlreadyPaid {
                    subject_id: payment.subject_id,
                };
                return self.fail(&payment, err).await;
            }
            Err(e) => return Err(e.into()),
        }

        let mut completed = payment;
        patch.apply(&mut completed);
        info!(
            payment_id = %completed.id,
            user_id = %completed.user_id,
            subject_id = %completed.subject_id,
            gateway_ref_id = %completed.gateway_ref_id,
            "payment completed"
        );

        // G
        let enrollment = self.provision_live(&completed).await?;
        info!(
            payment_id = %completed.id,
            enrollment_id = %enrollment.id,
            "enrollment granted"
        );
        Ok(ConfirmOutcome::Settled {
            payment: completed,
            enrollment,
        })
    }

    async fn locate(&self, c: &ValidConfirmation) -> Result<Payment, SettlementError> {
        if let Some(p) = self
            .payments
            .find_payment_by_natural_key(c.user_id, &c.transaction_uuid)
            .await?
        {
            return Ok(p);
        }
        self.payments
            .find_payment_by_gateway_ref(c.user_id, &c.ref_id)
            .await?
            .ok_or(SettlementError::PaymentNotFound)
    }

    /// Idempotent success for an already-completed payment.
    ///
    /// A completed payment whose enrollment is not yet visible (the winner of
    /// a race has not reached step G, or an earlier run stopped between F
    /// and G) gets it provisioned here. The pair constraint keeps the count
    /// at one.
    async fn replay(&self, payment: Payment) -> Result<ConfirmOutcome, SettlementError> {
        let enrollment = match self.enrollments.find_enrollment_by_payment(payment.id).await? {
            Some(e) => e,
            None => self.provision_live(&payment).await?,
        };
        info!(payment_id = %payment.id, "confirmation replayed for completed payment");
        Ok(ConfirmOutcome::AlreadySettled {
            payment,
            enrollment: Some(enrollment),
        })
    }

    /// Re-read after losing the completion CAS.
    async fn after_lost_race(&self, id: PaymentId) -> Result<ConfirmOutcome, SettlementError> {
        let current = self
            .payments
            .get_payment(id)
            .await?
            .ok_or(SettlementError::PaymentNotFound)?;
        match current.status {
            PaymentStatus::Completed => self.replay(current).await,
            PaymentStatus::Failed => Err(SettlementError::AlreadyFailed { payment_id: id }),
            PaymentStatus::Pending => Err(SettlementError::Internal(format!(
                "conditional update on pending payment {id} did not apply"
            ))),
        }
    }

    /// Move `payment` to `failed` and return `err`.
    ///
    /// If a concurrent confirmation already moved it, report what it became.
    async fn fail(
        &self,
        payment: &Payment,
        err: SettlementError,
    ) -> Result<ConfirmOutcome, SettlementError> {
        let applied = self
            .payments
            .conditional_update_payment(payment.id, PaymentStatus::Pending, &PaymentPatch::fail())
            .await?;
        if applied {
            warn!(
                payment_id = %payment.id,
                user_id = %payment.user_id,
                reason = err.kind(),
                "payment failed"
            );
            return Err(err);
        }
        match self.payments.get_payment(payment.id).await? {
            Some(current) if current.status == PaymentStatus::Completed => {
                self.replay(current).await
            }
            Some(_) => Err(err),
            None => Err(SettlementError::PaymentNotFound),
        }
    }

    /// [`provision`](Self::provision), then confirm the payment is still
    /// completed.
    ///
    /// An admin delete can land between reading the payment and inserting
    /// its enrollment. The new enrollment is withdrawn and the caller sees
    /// `PaymentNotFound`.
    async fn provision_live(&self, payment: &Payment) -> Result<Enrollment, SettlementError> {
        let enrollment = match self.provision(payment).await {
            Ok(e) => e,
            Err(SettlementError::Store(StoreError::MissingReference { constraint })) => {
                warn!(
                    payment_id = %payment.id,
                    %constraint,
                    "payment deleted before its enrollment was written"
                );
                return Err(SettlementError::PaymentNotFound);
            }
            Err(e) => return Err(e),
        };
        let still_completed = matches!(
            self.payments.get_payment(payment.id).await?,
            Some(p) if p.status == PaymentStatus::Completed
        );
        if still_completed {
            return Ok(enrollment);
        }
        let withdrawn = self
            .enrollments
            .delete_enrollment_by_payment_id(payment.id)
            .await?;
        warn!(
            payment_id = %payment.id,
            enrollment_id = %enrollment.id,
            withdrawn,
            "payment deleted while provisioning; enrollment withdrawn"
        );
        Err(SettlementError::PaymentNotFound)
    }

    /// Create the enrollment for a completed payment.
    ///
    /// A uniqueness clash with an enrollment for the same payment is success.
    /// A clash with any other payment means the one-completed-payment rule
    /// was broken somewhere and is reported as `DuplicateEnrollment`.
    async fn provision(&self, payment: &Payment) -> Result<Enrollment, SettlementError> {
        let enrollment =
            Enrollment::grant(payment).map_err(|e| SettlementError::Internal(e.to_string()))?;
        match self.enrollments.create_enrollment(&enrollment).await {
            Ok(()) => Ok(enrollment),
            Err(StoreError::Duplicate { constraint }) => {
                let existing = self
                    .enrollments
                    .find_enrollment(payment.user_id, payment.subject_id)
                    .await?;
                match existing {
                    Some(e) if e.payment_id == payment.id => Ok(e),
                    other => {
                        error!(
                            payment_id = %payment.id,
                            user_id = %payment.user_id,
                            subject_id = %payment.subject_id,
                            existing_payment_id = ?other.map(|e| e.payment_id),
                            %constraint,
                            "enrollment already exists for a different payment"
                        );
                        Err(SettlementError::DuplicateEnrollment {
                            user_id: payment.user_id,
                            subject_id: payment.subject_id,
                        })
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    // ── Reads and administration ────────────────────────────────────

    /// Read a payment as `principal`.
    pub async fn get_payment(
        &self,
        principal: &Principal,
        payment_id: PaymentId,
    ) -> Result<Payment, SettlementError> {
        let found = self.payments.get_payment(payment_id).await?;
        guard::authorize_payment_read(principal, found)
    }

    /// Payments visible to `principal`.
    pub async fn list_payments(&self, principal: &Principal) -> Result<Vec<Payment>, SettlementError> {
        Ok(self
            .payments
            .list_payments(guard::visible_owner(principal))
            .await?)
    }

    /// Enrollments visible to `principal`.
    pub async fn list_enrollments(
        &self,
        principal: &Principal,
    ) -> Result<Vec<Enrollment>, SettlementError> {
        Ok(self
            .enrollments
            .list_enrollments(guard::visible_owner(principal))
            .await?)
    }

    /// Delete a payment and any enrollment it authorized. Admin only.
    pub async fn delete_payment(
        &self,
        principal: &Principal,
        payment_id: PaymentId,
    ) -> Result<DeletedPayment, SettlementError> {
        guard::require_admin(principal)?;
        if self.payments.get_payment(payment_id).await?.is_none() {
            return Err(SettlementError::PaymentNotFound);
        }
        let mut enrollments_removed = self
            .enrollments
            .delete_enrollment_by_payment_id(payment_id)
            .await?;
        self.payments.delete_payment(payment_id).await?;
        // A confirmation replay may have re-provisioned between the two
        // deletes. Anything written after this sweep sees the payment gone
        // and withdraws itself.
        enrollments_removed += self
            .enrollments
            .delete_enrollment_by_payment_id(payment_id)
            .await?;
        info!(
            payment_id = %payment_id,
            admin_id = %principal.id,
            enrollments_removed,
            "payment deleted"
        );
        Ok(DeletedPayment {
            payment_id,
            enrollments_removed,
        })
    }
}
