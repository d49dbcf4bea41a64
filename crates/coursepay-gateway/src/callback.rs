//! # Redirect Callback Decoding
//!
//! On success the gateway redirects the browser to the merchant's
//! `success_url` with `?data=<base64 JSON>`. The blob is client-carried and
//! therefore untrusted: it is decoded only to locate the payment and to
//! cross-check the values the status endpoint later confirms.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use coursepay_core::{Amount, TransactionUuid};
use serde::Deserialize;

use crate::client::STATUS_COMPLETE;
use crate::error::GatewayError;

/// Fields decoded from the redirect blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectPayload {
    /// The gateway's own transaction reference.
    pub transaction_code: String,
    /// Gateway status, `COMPLETE` on success.
    pub status: String,
    /// Amount the gateway reports as charged.
    pub total_amount: Amount,
    /// Merchant transaction id echoed back.
    pub transaction_uuid: TransactionUuid,
    /// Merchant product code echoed back, when present.
    pub product_code: Option<String>,
}

impl RedirectPayload {
    /// Whether the blob claims a completed payment.
    pub fn is_complete(&self) -> bool {
        self.status == STATUS_COMPLETE
    }
}

#[derive(Deserialize)]
struct RawRedirect {
    transaction_code: String,
    status: String,
    total_amount: serde_json::Value,
    transaction_uuid: String,
    #[serde(default)]
    product_code: Option<String>,
}

/// Decode a redirect blob.
///
/// Spaces are read as `+`, since a blob passed through a query string
/// without percent-encoding arrives with `+` turned into a space. The
/// gateway formats `total_amount` as `"1,000.0"` for large values, so digit
/// group separators are dropped before parsing.
pub fn decode_redirect_payload(blob: &str) -> Result<RedirectPayload, GatewayError> {
    let normalized: String = blob.trim().replace(' ', "+");
    if normalized.is_empty() {
        return Err(GatewayError::malformed("empty callback data"));
    }
    let bytes = STANDARD
        .decode(normalized.as_bytes())
        .map_err(|e| GatewayError::malformed(format!("base64: {e}")))?;
    let raw: RawRedirect = serde_json::from_slice(&bytes)
        .map_err(|e| GatewayError::malformed(format!("json: {e}")))?;

    let amount_text = match &raw.total_amount {
        serde_json::Value::String(s) => s.replace(',', ""),
        serde_json::Value::Number(n) => n.to_string(),
        other => {
            return Err(GatewayError::malformed(format!(
                "total_amount has unexpected type: {other}"
            )))
        }
    };
    let total_amount = Amount::parse(&amount_text)
        .map_err(|e| GatewayError::malformed(format!("total_amount: {e}")))?;
    let transaction_uuid = TransactionUuid::new(raw.transaction_uuid)
        .map_err(|e| GatewayError::malformed(e.to_string()))?;

    if raw.transaction_code.trim().is_empty() {
        return Err(GatewayError::malformed("transaction_code is empty"));
    }

    Ok(RedirectPayload {
        transaction_code: raw.transaction_code,
        status: raw.status,
        total_amount,
        transaction_uuid,
        product_code: raw.product_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(json: serde_json::Value) -> String {
        STANDARD.encode(serde_json::to_vec(&json).unwrap())
    }

    #[test]
    fn decodes_gateway_blob() {
        let blob = encode(serde_json::json!({
            "transaction_code": "000AWEO",
            "status": "COMPLETE",
            "total_amount": "1,000.0",
            "transaction_uuid": "250610-162413",
            "product_code": "EPAYTEST",
            "signed_field_names": "transaction_code,status,total_amount,transaction_uuid,product_code,signed_field_names",
            "signature": "62GcfZTmVkzhtUeh+QJ1AqiJrjoWWGof3U+eTPTZ7fA="
        }));
        let p = decode_redirect_payload(&blob).unwrap();
        assert_eq!(p.transaction_code, "000AWEO");
        assert!(p.is_complete());
        assert_eq!(p.total_amount, Amount::from_units(1000).unwrap());
        assert_eq!(p.transaction_uuid.as_str(), "250610-162413");
        assert_eq!(p.product_code.as_deref(), Some("EPAYTEST"));
    }

    #[test]
    fn numeric_amount_accepted() {
        let blob = encode(serde_json::json!({
            "transaction_code": "R1",
            "status": "COMPLETE",
            "total_amount": 99.5,
            "transaction_uuid": "t1"
        }));
        assert_eq!(
            decode_redirect_payload(&blob).unwrap().total_amount,
            Amount::parse("99.5").unwrap()
        );
    }

    #[test]
    fn plus_mangled_to_space_is_restored() {
        // Chosen so the encoding contains '+'.
        let blob = encode(serde_json::json!({
            "transaction_code": "R>>>",
            "status": "COMPLETE",
            "total_amount": "10",
            "transaction_uuid": "t1"
        }));
        assert!(blob.contains('+'));
        let mangled = blob.replace('+', " ");
        assert_eq!(
            decode_redirect_payload(&mangled).unwrap(),
            decode_redirect_payload(&blob).unwrap()
        );
    }

    #[test]
    fn non_complete_status_is_decoded_not_rejected() {
        let blob = encode(serde_json::json!({
            "transaction_code": "R2",
            "status": "CANCELED",
            "total_amount": "10",
            "transaction_uuid": "t2"
        }));
        assert!(!decode_redirect_payload(&blob).unwrap().is_complete());
    }

    #[test]
    fn garbage_is_malformed_not_panic() {
        for bad in ["", "%%%", "bm90IGpzb24=", &encode(serde_json::json!({"status": "COMPLETE"}))] {
            assert!(matches!(
                decode_redirect_payload(bad),
                Err(GatewayError::MalformedCallback { .. })
            ));
        }
    }

    #[test]
    fn invalid_amount_is_malformed() {
        let blob = encode(serde_json::json!({
            "transaction_code": "R3",
            "status": "COMPLETE",
            "total_amount": "-5",
            "transaction_uuid": "t3"
        }));
        assert!(decode_redirect_payload(&blob).is_err());
    }

    #[test]
    fn invalid_transaction_uuid_is_malformed() {
        let blob = encode(serde_json::json!({
            "transaction_code": "R4",
            "status": "COMPLETE",
            "total_amount": "5",
            "transaction_uuid": "a,b=c"
        }));
        assert!(decode_redirect_payload(&blob).is_err());
    }
}
