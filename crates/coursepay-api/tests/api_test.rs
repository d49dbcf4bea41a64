//! # Router Tests for coursepay-api
//!
//! Drives the full router (auth, metrics, error mapping) over in-memory
//! stores and a scripted gateway.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use coursepay_api::bootstrap::in_memory_stores;
use coursepay_api::state::{AppConfig, AppState};
use coursepay_core::{Amount, SubjectId, UserId};
use coursepay_crypto::SigningSecret;
use coursepay_gateway::{IntentSigner, MockGateway};
use coursepay_settlement::{SettlementConfig, SettlementOrchestrator, Subject};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use url::Url;
use zeroize::Zeroizing;

struct TestApp {
    router: axum::Router,
    gateway: Arc<MockGateway>,
    subject: SubjectId,
}

fn signer() -> IntentSigner {
    IntentSigner::new(
        SigningSecret::new(b"api-test-secret".to_vec(), "test").unwrap(),
        "EPAYTEST",
        Url::parse("https://gw.test/api/epay/main/v2/form").unwrap(),
        Url::parse("https://app.test/ok").unwrap(),
        Url::parse("https://app.test/fail").unwrap(),
    )
}

fn test_app_with(gateway: MockGateway, config: AppConfig) -> TestApp {
    let subject = SubjectId::new();
    let stores = in_memory_stores(vec![Subject {
        id: subject,
        title: "Organic Chemistry".into(),
        price: Some(Amount::from_units(1000).unwrap()),
    }]);
    let gateway = Arc::new(gateway);
    let orchestrator = SettlementOrchestrator::new(
        stores,
        gateway.clone(),
        signer(),
        SettlementConfig::default(),
    );
    TestApp {
        router: coursepay_api::app(AppState::new(orchestrator, config)),
        gateway,
        subject,
    }
}

fn test_app() -> TestApp {
    test_app_with(MockGateway::completing(), AppConfig::default())
}

fn bearer(role: &str, user: UserId) -> String {
    format!("Bearer {role}:{user}")
}

async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, axum::http::HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    let request = match body {
        Some(b) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, headers, value)
}

async fn initiate(app: &TestApp, auth: &str, amount: Value) -> (StatusCode, Value) {
    let (status, _, body) = send(
        app,
        Method::POST,
        "/v1/payments",
        Some(auth),
        Some(json!({ "subject_id": app.subject.to_string(), "amount": amount })),
    )
    .await;
    (status, body)
}

fn confirmation(payment: &Value, total: Value) -> Value {
    json!({
        "transaction_uuid": payment["transaction_uuid"],
        "ref_id": "000AWEO",
        "total_amount": total,
    })
}

// -- Health, docs, auth -------------------------------------------------------

#[tokio::test]
async fn health_probes_need_no_credentials() {
    let app = test_app();
    let (status, _, body) = send(&app, Method::GET, "/health/liveness", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));

    let (status, _, body) = send(&app, Method::GET, "/health/readiness", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ready".into()));
}

#[tokio::test]
async fn openapi_lists_payment_routes() {
    let app = test_app();
    let (status, _, body) = send(&app, Method::GET, "/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let paths = body["paths"].as_object().unwrap();
    assert!(paths.contains_key("/v1/payments"));
    assert!(paths.contains_key("/v1/payments/confirm"));
    assert!(paths.contains_key("/v1/enrollments"));
}

#[tokio::test]
async fn api_routes_require_a_principal() {
    let app = test_app();
    let (status, _, body) = send(&app, Method::GET, "/v1/payments", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn configured_secret_is_enforced() {
    let config = AppConfig {
        port: 8080,
        auth_token: Some(Zeroizing::new("s3cret".to_string())),
    };
    let app = test_app_with(MockGateway::completing(), config);
    let me = UserId::new();

    let (status, _, _) = send(
        &app,
        Method::GET,
        "/v1/payments",
        Some(&format!("Bearer student:{me}:wrong")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(
        &app,
        Method::GET,
        "/v1/payments",
        Some(&format!("Bearer student:{me}:s3cret")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

// -- Happy path ---------------------------------------------------------------

#[tokio::test]
async fn initiate_intent_confirm_enroll() {
    let app = test_app();
    let me = UserId::new();
    let auth = bearer("student", me);

    let (status, payment) = initiate(&app, &auth, json!("1000")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(payment["status"], "pending");
    assert_eq!(payment["verification_status"], "unverified");
    assert_eq!(payment["method"], "eSewa");
    let id = payment["id"].as_str().unwrap().to_string();

    let (status, _, intent) = send(
        &app,
        Method::POST,
        &format!("/v1/payments/{id}/intent"),
        Some(&auth),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(intent["payload"]["total_amount"], "1000");
    assert_eq!(
        intent["payload"]["signed_field_names"],
        "total_amount,transaction_uuid,product_code"
    );
    assert!(!intent["payload"]["signature"].as_str().unwrap().is_empty());

    let (status, _, confirmed) = send(
        &app,
        Method::POST,
        "/v1/payments/confirm",
        Some(&auth),
        Some(confirmation(&payment, json!(1000))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["outcome"], "settled");
    assert_eq!(confirmed["payment"]["status"], "completed");
    assert_eq!(confirmed["payment"]["verification_status"], "verified");
    assert_eq!(confirmed["enrollment"]["payment_id"], id.as_str());

    let (status, _, replay) = send(
        &app,
        Method::POST,
        "/v1/payments/confirm",
        Some(&auth),
        Some(confirmation(&payment, json!("1000.00"))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["outcome"], "already_settled");
    assert_eq!(app.gateway.calls(), 1);

    let (_, _, enrollments) = send(&app, Method::GET, "/v1/enrollments", Some(&auth), None).await;
    assert_eq!(enrollments.as_array().unwrap().len(), 1);

    let (status, again) = initiate(&app, &auth, json!("1000")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(again["error"]["code"], "ALREADY_PAID");
}

#[tokio::test]
async fn redirect_callback_settles() {
    let app = test_app();
    let me = UserId::new();
    let auth = bearer("student", me);
    let (_, payment) = initiate(&app, &auth, json!(1000)).await;

    let blob = STANDARD.encode(
        json!({
            "transaction_code": "000AWEO",
            "status": "COMPLETE",
            "total_amount": "1,000.0",
            "transaction_uuid": payment["transaction_uuid"],
            "product_code": "EPAYTEST",
        })
        .to_string(),
    );
    let uri = format!(
        "/v1/payments/callback?data={}",
        blob.replace('+', "%2B").replace('/', "%2F").replace('=', "%3D")
    );
    let (status, _, body) = send(&app, Method::GET, &uri, Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["outcome"], "settled");
}

// -- Failure mapping ----------------------------------------------------------

#[tokio::test]
async fn amount_mismatch_is_402_and_terminal() {
    let app = test_app();
    let auth = bearer("student", UserId::new());
    let (_, payment) = initiate(&app, &auth, json!("1000")).await;

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/v1/payments/confirm",
        Some(&auth),
        Some(confirmation(&payment, json!("500"))),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["code"], "AMOUNT_MISMATCH");
    assert_eq!(body["error"]["details"]["expected"], "1000");

    let id = payment["id"].as_str().unwrap();
    let (_, _, stored) = send(
        &app,
        Method::GET,
        &format!("/v1/payments/{id}"),
        Some(&auth),
        None,
    )
    .await;
    assert_eq!(stored["status"], "failed");

    let (_, _, enrollments) = send(&app, Method::GET, "/v1/enrollments", Some(&auth), None).await;
    assert!(enrollments.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn gateway_outage_is_503_with_retry_after() {
    let app = test_app_with(MockGateway::unavailable(), AppConfig::default());
    let auth = bearer("student", UserId::new());
    let (_, payment) = initiate(&app, &auth, json!("1000")).await;

    let (status, headers, body) = send(
        &app,
        Method::POST,
        "/v1/payments/confirm",
        Some(&auth),
        Some(confirmation(&payment, json!("1000"))),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "GATEWAY_UNAVAILABLE");
    assert!(headers.contains_key(header::RETRY_AFTER));

    app.gateway.set_completing();
    let (status, _, body) = send(
        &app,
        Method::POST,
        "/v1/payments/confirm",
        Some(&auth),
        Some(confirmation(&payment, json!("1000"))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "settled");

    let (_, _, metrics) = send(&app, Method::GET, "/metrics", None, None).await;
    assert!(metrics["unavailable"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn initiate_validation() {
    let app = test_app();
    let auth = bearer("student", UserId::new());

    let (status, body) = initiate(&app, &auth, json!("999")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INVALID_AMOUNT");

    let (status, body) = initiate(&app, &auth, json!("-5")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INVALID_AMOUNT");

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/v1/payments",
        Some(&auth),
        Some(json!({ "subject_id": SubjectId::new().to_string(), "amount": "1000" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "SUBJECT_NOT_FOUND");

    let (status, _, _) = send(
        &app,
        Method::POST,
        "/v1/payments",
        Some(&auth),
        Some(json!({ "amount": "1000" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_confirmation_is_422() {
    let app = test_app();
    let auth = bearer("student", UserId::new());
    let (status, _, body) = send(
        &app,
        Method::POST,
        "/v1/payments/confirm",
        Some(&auth),
        Some(json!({ "transaction_uuid": "x", "ref_id": "", "total_amount": "1000" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INVALID_CONFIRMATION");
}

#[tokio::test]
async fn non_scalar_amounts_are_rejected_by_field() {
    let app = test_app();
    let auth = bearer("student", UserId::new());
    for total in [json!(null), json!({ "value": 1000 }), json!([1000]), json!(true)] {
        let (status, _, body) = send(
            &app,
            Method::POST,
            "/v1/payments/confirm",
            Some(&auth),
            Some(json!({ "transaction_uuid": "241028-0001", "ref_id": "000AWEO", "total_amount": total })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{total}");
        assert_eq!(body["error"]["code"], "INVALID_CONFIRMATION");
    }

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/v1/payments",
        Some(&auth),
        Some(json!({ "subject_id": SubjectId::new().to_string(), "amount": null })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INVALID_AMOUNT");
}

// -- Authorization ------------------------------------------------------------

#[tokio::test]
async fn payment_reads_do_not_leak_existence() {
    let app = test_app();
    let owner = bearer("student", UserId::new());
    let (_, payment) = initiate(&app, &owner, json!("1000")).await;
    let id = payment["id"].as_str().unwrap();
    let stranger = bearer("student", UserId::new());
    let admin = bearer("admin", UserId::new());

    let existing = format!("/v1/payments/{id}");
    let missing = format!("/v1/payments/{}", uuid::Uuid::new_v4());

    let (a, _, _) = send(&app, Method::GET, &existing, Some(&stranger), None).await;
    let (b, _, _) = send(&app, Method::GET, &missing, Some(&stranger), None).await;
    assert_eq!(a, StatusCode::FORBIDDEN);
    assert_eq!(b, StatusCode::FORBIDDEN);

    let (status, _, _) = send(&app, Method::GET, &existing, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(&app, Method::GET, &missing, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, _, mine) = send(&app, Method::GET, "/v1/payments", Some(&stranger), None).await;
    assert!(mine.as_array().unwrap().is_empty());
    let (_, _, all) = send(&app, Method::GET, "/v1/payments", Some(&admin), None).await;
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn student_cannot_confirm_for_another_user() {
    let app = test_app();
    let owner_id = UserId::new();
    let (_, payment) = initiate(&app, &bearer("student", owner_id), json!("1000")).await;

    let mut body = confirmation(&payment, json!("1000"));
    body["user_id"] = json!(owner_id.to_string());
    let (status, _, _) = send(
        &app,
        Method::POST,
        "/v1/payments/confirm",
        Some(&bearer("student", UserId::new())),
        Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = send(
        &app,
        Method::POST,
        "/v1/payments/confirm",
        Some(&bearer("admin", UserId::new())),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn delete_is_admin_only() {
    let app = test_app();
    let owner = bearer("student", UserId::new());
    let (_, payment) = initiate(&app, &owner, json!("1000")).await;
    send(
        &app,
        Method::POST,
        "/v1/payments/confirm",
        Some(&owner),
        Some(confirmation(&payment, json!("1000"))),
    )
    .await;
    let uri = format!("/v1/payments/{}", payment["id"].as_str().unwrap());

    let (status, _, _) = send(&app, Method::DELETE, &uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, body) = send(
        &app,
        Method::DELETE,
        &uri,
        Some(&bearer("admin", UserId::new())),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enrollments_removed"], 1);

    let (_, _, enrollments) = send(&app, Method::GET, "/v1/enrollments", Some(&owner), None).await;
    assert!(enrollments.as_array().unwrap().is_empty());
}
