//! # Server-to-Server Status Verification
//!
//! `GET {base}{status_path}?product_code=..&total_amount=..&transaction_uuid=..`
//!
//! ```json
//! {"product_code":"EPAYTEST","transaction_uuid":"123","total_amount":100.0,
//!  "status":"COMPLETE","ref_id":"0001TS9"}
//! ```
//!
//! Only a 2xx response with a parseable body and `status == "COMPLETE"` is
//! [`VerificationOutcome::Verified`].

use std::time::Duration;

use async_trait::async_trait;
use coursepay_core::{Amount, TransactionUuid};
use serde::Deserialize;
use url::Url;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::retry::RetryPolicy;

/// The only status value accepted as a completed payment.
pub const STATUS_COMPLETE: &str = "COMPLETE";

/// Normalized result of a status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The gateway confirms the payment.
    Verified,
    /// The gateway answered with a status other than `COMPLETE`. Terminal.
    Rejected,
    /// No usable answer. Retryable; the payment must stay pending.
    Unavailable {
        /// Diagnostic reason, for logs only.
        reason: String,
    },
}

/// What the gateway said about a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayVerification {
    /// Classification.
    pub outcome: VerificationOutcome,
    /// The gateway's reference id, when reported.
    pub ref_id: Option<String>,
    /// Amount the gateway reports, when reported.
    pub amount: Option<Amount>,
    /// The raw `status` string, when a body was parsed.
    pub raw_status: Option<String>,
}

impl GatewayVerification {
    /// Whether the outcome is [`VerificationOutcome::Verified`].
    pub fn is_verified(&self) -> bool {
        self.outcome == VerificationOutcome::Verified
    }

    /// An `Unavailable` result with no gateway data.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            outcome: VerificationOutcome::Unavailable {
                reason: reason.into(),
            },
            ref_id: None,
            amount: None,
            raw_status: None,
        }
    }
}

/// Port for the gateway's transaction status endpoint.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Ask the gateway whether `transaction_uuid` completed for
    /// `total_amount`.
    async fn verify_with_gateway(
        &self,
        transaction_uuid: &TransactionUuid,
        total_amount: Amount,
    ) -> GatewayVerification;
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    ref_id: Option<String>,
    #[serde(default)]
    total_amount: Option<serde_json::Value>,
}

impl StatusResponse {
    /// A zero or unparseable amount (reported for unknown transactions) is
    /// treated as absent.
    fn reported_amount(&self) -> Option<Amount> {
        self.total_amount
            .clone()
            .and_then(|v| serde_json::from_value::<Amount>(v).ok())
    }
}

/// HTTP client for the eSewa status endpoint.
#[derive(Debug, Clone)]
pub struct EsewaClient {
    http: reqwest::Client,
    status_url: Url,
    product_code: String,
    retry: RetryPolicy,
}

impl EsewaClient {
    /// Create a client from configuration.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(5)))
            .build()?;
        Ok(Self {
            http,
            status_url: config.status_url()?,
            product_code: config.product_code.clone(),
            retry: RetryPolicy::from_config(config),
        })
    }

    async fn fetch_status(
        &self,
        transaction_uuid: &TransactionUuid,
        total_amount: Amount,
    ) -> Result<StatusResponse, String> {
        let amount = total_amount.canonical();
        let query = [
            ("product_code", self.product_code.as_str()),
            ("total_amount", amount.as_str()),
            ("transaction_uuid", transaction_uuid.as_str()),
        ];

        let resp = self
            .retry
            .send(|| self.http.get(self.status_url.clone()).query(&query).send())
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("status request timed out: {e}")
                } else {
                    format!("status request failed: {e}")
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(format!("status endpoint returned HTTP {status}: {body}"));
        }

        resp.json::<StatusResponse>()
            .await
            .map_err(|e| format!("malformed status response: {e}"))
    }
}

#[async_trait]
impl PaymentGateway for EsewaClient {
    async fn verify_with_gateway(
        &self,
        transaction_uuid: &TransactionUuid,
        total_amount: Amount,
    ) -> GatewayVerification {
        let body = match self.fetch_status(transaction_uuid, total_amount).await {
            Ok(body) => body,
            Err(reason) => {
                tracing::warn!(
                    transaction_uuid = %transaction_uuid,
                    %reason,
                    "gateway status check unavailable"
                );
                return GatewayVerification::unavailable(reason);
            }
        };

        let amount = body.reported_amount();
        let outcome = if body.status == STATUS_COMPLETE {
            VerificationOutcome::Verified
        } else {
            VerificationOutcome::Rejected
        };
        tracing::debug!(
            transaction_uuid = %transaction_uuid,
            status = %body.status,
            "gateway status check answered"
        );

        GatewayVerification {
            outcome,
            ref_id: body.ref_id.filter(|r| !r.trim().is_empty()),
            amount,
            raw_status: Some(body.status),
        }
    }
}
