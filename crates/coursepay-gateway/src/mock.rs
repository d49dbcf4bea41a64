//! # Mock Gateway
//!
//! Deterministic [`PaymentGateway`] for tests and for running the service
//! without gateway credentials. Follows the same trait as [`EsewaClient`] so
//! the orchestrator cannot tell them apart.
//!
//! [`EsewaClient`]: crate::EsewaClient

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use coursepay_core::{Amount, TransactionUuid};
use parking_lot::Mutex;

use crate::client::{GatewayVerification, PaymentGateway, VerificationOutcome, STATUS_COMPLETE};

#[derive(Debug, Clone)]
enum Behavior {
    /// Confirm whatever is asked, echoing the amount.
    Complete,
    /// Confirm, but report this amount instead of the requested one.
    CompleteWithAmount(Amount),
    /// Answer with a non-`COMPLETE` status.
    Status(String),
    /// Report no usable answer.
    Unavailable(String),
}

/// Scripted gateway double.
#[derive(Debug)]
pub struct MockGateway {
    behavior: Mutex<Behavior>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockGateway {
    fn with(behavior: Behavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// A gateway that confirms every transaction.
    pub fn completing() -> Self {
        Self::with(Behavior::Complete)
    }

    /// A gateway that confirms but reports a different charged amount.
    pub fn completing_with_amount(amount: Amount) -> Self {
        Self::with(Behavior::CompleteWithAmount(amount))
    }

    /// A gateway that answers every check with `status`.
    pub fn rejecting(status: impl Into<String>) -> Self {
        Self::with(Behavior::Status(status.into()))
    }

    /// A gateway that is unreachable.
    pub fn unavailable() -> Self {
        Self::with(Behavior::Unavailable("mock gateway unavailable".into()))
    }

    /// Delay every answer by `delay` (to exercise timeouts and races).
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = Some(delay);
        self
    }

    /// Switch to confirming every transaction.
    pub fn set_completing(&self) {
        *self.behavior.lock() = Behavior::Complete;
    }

    /// Switch to being unreachable.
    pub fn set_unavailable(&self) {
        *self.behavior.lock() = Behavior::Unavailable("mock gateway unavailable".into());
    }

    /// Number of status checks received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn verify_with_gateway(
        &self,
        transaction_uuid: &TransactionUuid,
        total_amount: Amount,
    ) -> GatewayVerification {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().clone();
        let delay = *self.delay.lock();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }

        let ref_id = Some(format!("MOCK-{}", transaction_uuid.as_str()));
        match behavior {
            Behavior::Complete => GatewayVerification {
                outcome: VerificationOutcome::Verified,
                ref_id,
                amount: Some(total_amount),
                raw_status: Some(STATUS_COMPLETE.to_string()),
            },
            Behavior::CompleteWithAmount(amount) => GatewayVerification {
                outcome: VerificationOutcome::Verified,
                ref_id,
                amount: Some(amount),
                raw_status: Some(STATUS_COMPLETE.to_string()),
            },
            Behavior::Status(status) => GatewayVerification {
                outcome: VerificationOutcome::Rejected,
                ref_id: None,
                amount: Some(total_amount),
                raw_status: Some(status),
            },
            Behavior::Unavailable(reason) => GatewayVerification::unavailable(reason),
        }
    }
}
