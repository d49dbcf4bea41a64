//! # Settlement Against a Wire-Level Gateway
//!
//! Runs the settlement orchestrator with the real HTTP status client pointed
//! at a wiremock server, so verification goes through request construction,
//! response parsing and classification.

use std::sync::Arc;
use std::time::Duration;

use coursepay_api::bootstrap::in_memory_stores;
use coursepay_core::{Amount, Payment, PaymentStatus, Principal, Role, SubjectId, UserId};
use coursepay_crypto::{verify, Signature, SignedFields};
use coursepay_gateway::{EsewaClient, GatewayConfig, IntentSigner};
use coursepay_settlement::{
    Confirmation, SettlementConfig, SettlementError, SettlementOrchestrator, Subject,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STATUS_PATH: &str = "/api/epay/transaction/status/";

struct Harness {
    orch: SettlementOrchestrator,
    config: GatewayConfig,
    subject: SubjectId,
}

fn gateway_config(server: &MockServer) -> GatewayConfig {
    let base = server.uri();
    let mut cfg = GatewayConfig::from_lookup(|var| match var {
        "ESEWA_SECRET_KEY" => Some("8gBm/:&EnhH.1/q".to_string()),
        "ESEWA_PRODUCT_CODE" => Some("EPAYTEST".to_string()),
        "ESEWA_BASE_URL" => Some(base.clone()),
        "PAYMENT_SUCCESS_URL" => Some("http://app.test/ok".to_string()),
        "PAYMENT_FAILURE_URL" => Some("http://app.test/fail".to_string()),
        _ => None,
    })
    .unwrap();
    cfg.timeout = Duration::from_secs(2);
    cfg
}

fn harness(server: &MockServer) -> Harness {
    let config = gateway_config(server);
    let subject = SubjectId::new();
    let stores = in_memory_stores(vec![Subject {
        id: subject,
        title: "Physics".into(),
        price: Some(Amount::from_units(1000).unwrap()),
    }]);
    let orch = SettlementOrchestrator::new(
        stores,
        Arc::new(EsewaClient::new(&config).unwrap()),
        IntentSigner::from_config(&config),
        SettlementConfig::default(),
    );
    Harness {
        orch,
        config,
        subject,
    }
}

fn student() -> Principal {
    Principal::new(UserId::new(), Role::Student)
}

async fn pending(h: &Harness, who: &Principal) -> Payment {
    h.orch
        .initiate_payment(who, h.subject, Amount::from_units(1000).unwrap(), None)
        .await
        .unwrap()
}

fn confirmation(p: &Payment, total: &str) -> Confirmation {
    Confirmation {
        user_id: p.user_id,
        transaction_uuid: p.transaction_uuid.to_string(),
        ref_id: "000AWEO".into(),
        total_amount: total.into(),
        raw_gateway_blob: None,
    }
}

async fn mount_status(server: &MockServer, p: &Payment, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .and(query_param("transaction_uuid", p.transaction_uuid.as_str()))
        .and(query_param("total_amount", "1000"))
        .and(query_param("product_code", "EPAYTEST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

// ── Intent signature ────────────────────────────────────────────────────

#[tokio::test]
async fn intent_signature_verifies_with_merchant_secret() {
    let server = MockServer::start().await;
    let h = harness(&server);
    let me = student();
    let p = pending(&h, &me).await;

    let payload = h.orch.build_intent_for_payment(&me, p.id).await.unwrap();
    let fields = SignedFields::new(
        payload.total_amount,
        payload.transaction_uuid.clone(),
        payload.product_code.clone(),
    );
    let signature = Signature::from_encoded(payload.signature.clone());
    assert!(verify(&fields, &signature, &h.config.secret));

    let tampered = SignedFields::new(
        Amount::from_units(1).unwrap(),
        payload.transaction_uuid.clone(),
        payload.product_code.clone(),
    );
    assert!(!verify(&tampered, &signature, &h.config.secret));
    assert!(payload.form_action.starts_with(&server.uri()));
}

// ── Verified ────────────────────────────────────────────────────────────

#[tokio::test]
async fn complete_status_settles_and_enrolls() {
    let server = MockServer::start().await;
    let h = harness(&server);
    let me = student();
    let p = pending(&h, &me).await;
    mount_status(
        &server,
        &p,
        serde_json::json!({
            "product_code": "EPAYTEST",
            "transaction_uuid": p.transaction_uuid.as_str(),
            "total_amount": 1000.0,
            "status": "COMPLETE",
            "ref_id": "0007G36",
        }),
    )
    .await;

    let outcome = h.orch.confirm_payment(&me, confirmation(&p, "1000.0")).await.unwrap();
    assert!(outcome.is_new_settlement());
    assert_eq!(outcome.payment().status, PaymentStatus::Completed);
    assert_eq!(outcome.payment().gateway_ref_id, "0007G36");

    let enrollments = h.orch.list_enrollments(&me).await.unwrap();
    assert_eq!(enrollments.len(), 1);
    assert_eq!(enrollments[0].payment_id, p.id);

    let replay = h.orch.confirm_payment(&me, confirmation(&p, "1000")).await.unwrap();
    assert!(!replay.is_new_settlement());
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

// ── Rejected ────────────────────────────────────────────────────────────

#[tokio::test]
async fn pending_status_fails_without_enrollment() {
    let server = MockServer::start().await;
    let h = harness(&server);
    let me = student();
    let p = pending(&h, &me).await;
    mount_status(
        &server,
        &p,
        serde_json::json!({
            "product_code": "EPAYTEST",
            "transaction_uuid": p.transaction_uuid.as_str(),
            "total_amount": 1000.0,
            "status": "PENDING",
            "ref_id": null,
        }),
    )
    .await;

    let err = h
        .orch
        .confirm_payment(&me, confirmation(&p, "1000"))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::VerificationFailed { ref status, .. } if status == "PENDING"));
    assert_eq!(
        h.orch.get_payment(&me, p.id).await.unwrap().status,
        PaymentStatus::Failed
    );
    assert!(h.orch.list_enrollments(&me).await.unwrap().is_empty());
}

#[tokio::test]
async fn gateway_reported_amount_must_match() {
    let server = MockServer::start().await;
    let h = harness(&server);
    let me = student();
    let p = pending(&h, &me).await;
    mount_status(
        &server,
        &p,
        serde_json::json!({
            "product_code": "EPAYTEST",
            "transaction_uuid": p.transaction_uuid.as_str(),
            "total_amount": 10.0,
            "status": "COMPLETE",
            "ref_id": "0007G36",
        }),
    )
    .await;

    let err = h
        .orch
        .confirm_payment(&me, confirmation(&p, "1000"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "AMOUNT_MISMATCH");
    assert!(h.orch.list_enrollments(&me).await.unwrap().is_empty());
}

// ── Unavailable ─────────────────────────────────────────────────────────

#[tokio::test]
async fn server_error_leaves_payment_retryable() {
    let server = MockServer::start().await;
    let h = harness(&server);
    let me = student();
    let p = pending(&h, &me).await;

    Mock::given(method("GET"))
        .and(path(STATUS_PATH))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let err = h
        .orch
        .confirm_payment(&me, confirmation(&p, "1000"))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::GatewayUnavailable(_)));
    assert_eq!(
        h.orch.get_payment(&me, p.id).await.unwrap().status,
        PaymentStatus::Pending
    );

    mount_status(
        &server,
        &p,
        serde_json::json!({
            "product_code": "EPAYTEST",
            "transaction_uuid": p.transaction_uuid.as_str(),
            "total_amount": "1000.0",
            "status": "COMPLETE",
            "ref_id": "0007G36",
        }),
    )
    .await;

    let outcome = h.orch.confirm_payment(&me, confirmation(&p, "1000")).await.unwrap();
    assert!(outcome.is_new_settlement());
}
