//! # Outbound Payment Intent
//!
//! The browser posts [`GatewayPayload`] as a form to the gateway. Only
//! `total_amount`, `transaction_uuid` and `product_code` are signed. The
//! charge breakdown fields are always zero: the platform sells subjects at a
//! single inclusive price.

use coursepay_core::{Amount, TransactionUuid};
use coursepay_crypto::{sign, SignedFields, SigningSecret, SIGNED_FIELD_NAMES};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::GatewayConfig;
use crate::error::GatewayError;

/// The signed form payload for the gateway's hosted payment page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPayload {
    /// Net amount (`total_amount` minus the zero charges).
    pub amount: Amount,
    /// Always `"0"`.
    pub tax_amount: String,
    /// Always `"0"`.
    pub product_service_charge: String,
    /// Always `"0"`.
    pub product_delivery_charge: String,
    /// Signed total.
    pub total_amount: Amount,
    /// Signed merchant transaction id (the order id).
    pub transaction_uuid: TransactionUuid,
    /// Signed merchant product code.
    pub product_code: String,
    /// Redirect target on success.
    pub success_url: String,
    /// Redirect target on failure.
    pub failure_url: String,
    /// Comma-separated names of the signed fields, in signing order.
    pub signed_field_names: String,
    /// Base64 HMAC-SHA256 over the signed fields.
    pub signature: String,
    /// Where the form must be posted.
    pub form_action: String,
}

/// Assemble and sign an intent payload. Pure; performs no I/O.
pub fn build_intent(
    secret: &SigningSecret,
    product_code: &str,
    form_action: &Url,
    amount: Amount,
    order_id: &TransactionUuid,
    success_url: &Url,
    failure_url: &Url,
) -> Result<GatewayPayload, GatewayError> {
    let fields = SignedFields::new(amount, order_id.clone(), product_code);
    let signature = sign(&fields, secret).map_err(|e| GatewayError::NotConfigured {
        reason: e.to_string(),
    })?;

    Ok(GatewayPayload {
        amount,
        tax_amount: "0".to_string(),
        product_service_charge: "0".to_string(),
        product_delivery_charge: "0".to_string(),
        total_amount: amount,
        transaction_uuid: order_id.clone(),
        product_code: product_code.to_string(),
        success_url: success_url.to_string(),
        failure_url: failure_url.to_string(),
        signed_field_names: SIGNED_FIELD_NAMES.to_string(),
        signature: signature.as_str().to_string(),
        form_action: form_action.to_string(),
    })
}

/// The merchant profile needed to sign intents: secret, product code, form
/// target and redirect URLs, bound once at startup.
#[derive(Debug, Clone)]
pub struct IntentSigner {
    secret: SigningSecret,
    product_code: String,
    form_action: Url,
    success_url: Url,
    failure_url: Url,
}

impl IntentSigner {
    /// Bind an explicit merchant profile.
    pub fn new(
        secret: SigningSecret,
        product_code: impl Into<String>,
        form_action: Url,
        success_url: Url,
        failure_url: Url,
    ) -> Self {
        Self {
            secret,
            product_code: product_code.into(),
            form_action,
            success_url,
            failure_url,
        }
    }

    /// Bind the merchant profile from gateway configuration.
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            secret: config.secret.clone(),
            product_code: config.product_code.clone(),
            form_action: config.form_url.clone(),
            success_url: config.success_url.clone(),
            failure_url: config.failure_url.clone(),
        }
    }

    /// Build a signed payload using the configured redirect URLs.
    pub fn intent_for(
        &self,
        amount: Amount,
        order_id: &TransactionUuid,
    ) -> Result<GatewayPayload, GatewayError> {
        build_intent(
            &self.secret,
            &self.product_code,
            &self.form_action,
            amount,
            order_id,
            &self.success_url,
            &self.failure_url,
        )
    }

    /// The configured product code.
    pub fn product_code(&self) -> &str {
        &self.product_code
    }
}
