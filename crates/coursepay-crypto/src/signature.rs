//! # HMAC-SHA256 Signing and Verification
//!
//! ## Security Invariant
//!
//! Verification recomputes the MAC and compares raw bytes with
//! [`subtle::ConstantTimeEq`]. Signatures are never compared as strings.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use coursepay_core::{Amount, TransactionUuid};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// Value of the `signed_field_names` intent field. Must list the fields in
/// exactly the order [`SignedFields::canonical_message`] writes them.
pub const SIGNED_FIELD_NAMES: &str = "total_amount,transaction_uuid,product_code";

/// Process-wide signing secret.
///
/// The raw key bytes are zeroized on drop. `Debug` never prints them.
#[derive(Clone)]
pub struct SigningSecret {
    key: Zeroizing<Vec<u8>>,
}

impl SigningSecret {
    /// Wrap raw secret bytes. Empty secrets are rejected.
    pub fn new(bytes: impl Into<Vec<u8>>, source: &str) -> Result<Self, CryptoError> {
        let key = Zeroizing::new(bytes.into());
        if key.iter().all(u8::is_ascii_whitespace) {
            return Err(CryptoError::EmptySecret(source.to_string()));
        }
        // Fail here rather than on the first request.
        HmacSha256::new_from_slice(&key).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { key })
    }

    /// Load the secret from the environment variable `var`.
    pub fn from_env(var: &str) -> Result<Self, CryptoError> {
        let raw = std::env::var(var).map_err(|_| CryptoError::MissingSecret(var.to_string()))?;
        Self::new(raw.into_bytes(), var)
    }

    fn mac(&self) -> Result<HmacSha256, CryptoError> {
        HmacSha256::new_from_slice(&self.key).map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningSecret")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// The ordered tuple covered by the intent signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedFields {
    /// Total charged amount, rendered in canonical form.
    pub total_amount: Amount,
    /// Merchant-side transaction identifier.
    pub transaction_uuid: TransactionUuid,
    /// Merchant product code issued by the gateway.
    pub product_code: String,
}

impl SignedFields {
    /// Construct the field tuple.
    pub fn new(
        total_amount: Amount,
        transaction_uuid: TransactionUuid,
        product_code: impl Into<String>,
    ) -> Self {
        Self {
            total_amount,
            transaction_uuid,
            product_code: product_code.into(),
        }
    }

    /// The exact byte sequence that is signed.
    pub fn canonical_message(&self) -> String {
        format!(
            "total_amount={},transaction_uuid={},product_code={}",
            self.total_amount.canonical(),
            self.transaction_uuid.as_str(),
            self.product_code
        )
    }
}

/// A base64-encoded HMAC-SHA256 signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(String);

impl Signature {
    /// Wrap an encoded signature as received from a peer.
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// The base64 text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode to raw MAC bytes.
    pub fn decode(&self) -> Result<Vec<u8>, CryptoError> {
        STANDARD
            .decode(self.0.as_bytes())
            .map_err(|e| CryptoError::InvalidSignatureEncoding(e.to_string()))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sign `fields` with `secret`.
pub fn sign(fields: &SignedFields, secret: &SigningSecret) -> Result<Signature, CryptoError> {
    let mut mac = secret.mac()?;
    mac.update(fields.canonical_message().as_bytes());
    Ok(Signature(STANDARD.encode(mac.finalize().into_bytes())))
}

/// Verify `signature` over `fields`.
///
/// Returns `false` for any mismatch, including signatures that are not valid
/// base64 or have the wrong length.
pub fn verify(fields: &SignedFields, signature: &Signature, secret: &SigningSecret) -> bool {
    let Ok(provided) = signature.decode() else {
        return false;
    };
    let Ok(mut mac) = secret.mac() else {
        return false;
    };
    mac.update(fields.canonical_message().as_bytes());
    let expected = mac.finalize().into_bytes();
    // ct_eq on slices of different lengths returns false without early exit
    // on content.
    expected.as_slice().ct_eq(provided.as_slice()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secret() -> SigningSecret {
        SigningSecret::new(b"8gBm/:&EnhH.1/q".to_vec(), "test").unwrap()
    }

    fn fields(amount: &str, uuid: &str) -> SignedFields {
        SignedFields::new(
            Amount::parse(amount).unwrap(),
            TransactionUuid::new(uuid).unwrap(),
            "EPAYTEST",
        )
    }

    // ── Canonical message ───────────────────────────────────────────

    #[test]
    fn canonical_message_layout() {
        let f = fields("100", "241028");
        assert_eq!(
            f.canonical_message(),
            "total_amount=100,transaction_uuid=241028,product_code=EPAYTEST"
        );
    }

    #[test]
    fn canonical_message_ignores_trailing_zero_formatting() {
        assert_eq!(
            fields("100.00", "x").canonical_message(),
            fields("100", "x").canonical_message()
        );
    }

    #[test]
    fn signed_field_names_match_message_order() {
        let msg = fields("1", "a").canonical_message();
        let keys: Vec<&str> = msg
            .split(',')
            .map(|kv| kv.split('=').next().unwrap_or_default())
            .collect();
        assert_eq!(keys.join(","), SIGNED_FIELD_NAMES);
    }

    // ── Sign / verify ───────────────────────────────────────────────

    #[test]
    fn known_answer() {
        let sig = sign(&fields("100", "11-201-13"), &secret()).unwrap();
        assert_eq!(sig.as_str(), "5DZywcrTKD0gia/rsSMcrRHmJl+4Tbol6S+lWgdJ94E=");
    }

    #[test]
    fn sign_is_deterministic() {
        let f = fields("1000", "tx-1");
        assert_eq!(sign(&f, &secret()).unwrap(), sign(&f, &secret()).unwrap());
    }

    #[test]
    fn verify_accepts_own_signature() {
        let f = fields("1000", "tx-1");
        let sig = sign(&f, &secret()).unwrap();
        assert!(verify(&f, &sig, &secret()));
    }

    #[test]
    fn verify_rejects_other_secret() {
        let f = fields("1000", "tx-1");
        let sig = sign(&f, &secret()).unwrap();
        let other = SigningSecret::new(b"another".to_vec(), "test").unwrap();
        assert!(!verify(&f, &sig, &other));
    }

    #[test]
    fn verify_rejects_garbage_encoding() {
        let f = fields("1000", "tx-1");
        assert!(!verify(&f, &Signature::from_encoded("not base64!"), &secret()));
        assert!(!verify(&f, &Signature::from_encoded(""), &secret()));
    }

    #[test]
    fn verify_rejects_truncated_mac() {
        let f = fields("1000", "tx-1");
        let sig = sign(&f, &secret()).unwrap();
        let raw = sig.decode().unwrap();
        let short = Signature::from_encoded(STANDARD.encode(&raw[..16]));
        assert!(!verify(&f, &short, &secret()));
    }

    // ── Secret loading ──────────────────────────────────────────────

    #[test]
    fn empty_secret_rejected() {
        assert_eq!(
            SigningSecret::new(Vec::new(), "ESEWA_SECRET_KEY").unwrap_err(),
            CryptoError::EmptySecret("ESEWA_SECRET_KEY".into())
        );
        assert!(SigningSecret::new(b"  ".to_vec(), "X").is_err());
    }

    #[test]
    fn missing_env_secret_rejected() {
        let err = SigningSecret::from_env("COURSEPAY_TEST_SECRET_THAT_IS_NEVER_SET").unwrap_err();
        assert!(matches!(err, CryptoError::MissingSecret(_)));
    }

    #[test]
    fn debug_redacts_secret() {
        let dbg = format!("{:?}", secret());
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("EnhH"));
    }

    // ── Properties ──────────────────────────────────────────────────

    proptest! {
        #[test]
        fn round_trip_and_signature_mutation(
            units in 1u64..1_000_000,
            uuid in "[A-Za-z0-9_-]{1,40}",
            key in proptest::collection::vec(any::<u8>(), 1..64),
            pos in any::<prop::sample::Index>(),
            replacement in "[A-Za-z0-9+/=]",
        ) {
            prop_assume!(!key.iter().all(u8::is_ascii_whitespace));
            let secret = SigningSecret::new(key, "prop").unwrap();
            let f = SignedFields::new(
                Amount::from_units(units).unwrap(),
                TransactionUuid::new(uuid).unwrap(),
                "EPAYTEST",
            );
            let sig = sign(&f, &secret).unwrap();
            prop_assert!(verify(&f, &sig, &secret));

            let mut bytes = sig.as_str().as_bytes().to_vec();
            let i = pos.index(bytes.len());
            let new_byte = replacement.as_bytes()[0];
            prop_assume!(bytes[i] != new_byte);
            bytes[i] = new_byte;
            let mutated = Signature::from_encoded(String::from_utf8(bytes).unwrap());
            prop_assert!(!verify(&f, &mutated, &secret));
        }

        #[test]
        fn field_mutation_breaks_signature(
            units in 1u64..1_000_000,
            delta in 1u64..1_000,
            uuid in "[A-Za-z0-9]{2,40}",
            pos in any::<prop::sample::Index>(),
        ) {
            let secret = SigningSecret::new(b"fixed-secret".to_vec(), "prop").unwrap();
            let f = SignedFields::new(
                Amount::from_units(units).unwrap(),
                TransactionUuid::new(uuid.clone()).unwrap(),
                "EPAYTEST",
            );
            let sig = sign(&f, &secret).unwrap();

            let mut amount_changed = f.clone();
            amount_changed.total_amount = Amount::from_units(units + delta).unwrap();
            prop_assert!(!verify(&amount_changed, &sig, &secret));

            let mut chars: Vec<char> = uuid.chars().collect();
            let i = pos.index(chars.len());
            chars[i] = if chars[i] == '_' { '-' } else { '_' };
            let mut uuid_changed = f.clone();
            uuid_changed.transaction_uuid =
                TransactionUuid::new(chars.into_iter().collect::<String>()).unwrap();
            prop_assert!(!verify(&uuid_changed, &sig, &secret));

            let mut code_changed = f.clone();
            code_changed.product_code.push('X');
            prop_assert!(!verify(&code_changed, &sig, &secret));
        }
    }
}
