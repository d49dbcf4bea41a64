//! Property tests binding intent construction to the signature codec.

use coursepay_core::{Amount, TransactionUuid};
use coursepay_crypto::{verify, Signature, SignedFields, SigningSecret};
use coursepay_gateway::build_intent;
use proptest::prelude::*;
use url::Url;

fn secret() -> SigningSecret {
    SigningSecret::new(b"8gBm/:&EnhH.1/q".to_vec(), "test").unwrap()
}

fn intent(units: u64, txn: &str) -> coursepay_gateway::GatewayPayload {
    build_intent(
        &secret(),
        "EPAYTEST",
        &Url::parse("https://gw.test/form").unwrap(),
        Amount::from_units(units).unwrap(),
        &TransactionUuid::new(txn).unwrap(),
        &Url::parse("https://app.test/ok").unwrap(),
        &Url::parse("https://app.test/fail").unwrap(),
    )
    .unwrap()
}

proptest! {
    #[test]
    fn intent_signature_verifies(units in 1u64..10_000_000, txn in "[0-9]{6}-[a-z0-9]{1,20}") {
        let payload = intent(units, &txn);
        let fields = SignedFields::new(
            payload.total_amount,
            payload.transaction_uuid.clone(),
            payload.product_code.clone(),
        );
        prop_assert!(verify(&fields, &Signature::from_encoded(payload.signature.clone()), &secret()));
    }

    #[test]
    fn signature_binds_amount(units in 1u64..10_000_000, txn in "[0-9]{6}-[a-z0-9]{1,20}") {
        let payload = intent(units, &txn);
        let altered = SignedFields::new(
            Amount::from_units(units + 1).unwrap(),
            payload.transaction_uuid.clone(),
            payload.product_code.clone(),
        );
        prop_assert!(!verify(&altered, &Signature::from_encoded(payload.signature), &secret()));
    }
}
