mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration, Utc};
use common::{TestApp, TEST_CASHFREE_SECRET};
use genvideo_service::services::{PaymentRepository, UserRepository};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, ResponseTemplate,
};

async fn mock_create_order(app: &TestApp) {
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(header("x-client-id", "test-app-id"))
        .and(header("x-api-version", "2022-09-01"))
        .and(body_partial_json(json!({ "order_currency": "INR" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "cf_order_id": 2149460581_i64,
            "order_status": "ACTIVE",
            "payment_session_id": "session_abc",
            "order_expiry_time": "2030-01-01T00:00:00+05:30",
        })))
        .mount(&app.gateway)
        .await;
}

async fn mock_order_status(app: &TestApp, order_id: &str, status: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/orders/{}", order_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order_id": order_id,
            "cf_order_id": 2149460581_i64,
            "order_status": status,
        })))
        .mount(&app.gateway)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/orders/{}/payments", order_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "cf_payment_id": 885473311_i64,
            "payment_status": "SUCCESS",
            "payment_group": "upi",
        }])))
        .mount(&app.gateway)
        .await;
}

async fn create_order(app: &TestApp, token: &str) -> String {
    mock_create_order(app).await;
    let (status, body) = app
        .post_json(
            "/create_payment",
            json!({
                "amount": 499.0,
                "subscription_type": "pro",
                "duration_days": 30,
                "phone_number": "9999999999",
            }),
            Some(token),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["order_id"].as_str().unwrap().to_string()
}

fn webhook_body(order_id: &str) -> Value {
    json!({
        "type": "PAYMENT_SUCCESS_WEBHOOK",
        "data": { "order": { "order_id": order_id } },
    })
}

#[tokio::test]
async fn test_create_payment() {
    let app = TestApp::spawn().await;
    let (token, user_id) = app.signup("buyer@example.com").await;
    mock_create_order(&app).await;

    let (status, body) = app
        .post_json(
            "/create_payment",
            json!({
                "amount": 499.0,
                "subscription_type": "pro",
                "phone_number": "9999999999",
            }),
            Some(&token),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], "success");
    assert_eq!(body["cf_order_id"], "2149460581");
    assert_eq!(body["payment_session_id"], "session_abc");
    assert_eq!(body["payment_link"], "https://payments.test/order/#/2149460581");
    assert_eq!(body["currency"], "INR");
    assert_eq!(body["order_status"], "ACTIVE");

    let order_id = body["order_id"].as_str().unwrap();
    assert!(order_id.starts_with("order_"));

    let order = app.store.find_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.user_id, user_id);
    assert_eq!(order.duration_days, 30);
    assert_eq!(order.status, "INITIATED");

    let requests = app.gateway.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["customer_details"]["customer_email"], "buyer@example.com");
    assert_eq!(
        sent["order_meta"]["return_url"],
        format!("http://frontend.test/payment_success?order_id={}", order_id)
    );
    assert_eq!(sent["order_meta"]["notify_url"], "http://api.test/payment_webhook");
}

#[tokio::test]
async fn test_create_payment_validation() {
    let app = TestApp::spawn().await;
    let (token, _) = app.signup("invalid@example.com").await;

    for body in [
        json!({ "subscription_type": "pro", "phone_number": "1" }),
        json!({ "amount": 0, "subscription_type": "pro", "phone_number": "1" }),
        json!({ "amount": 10, "subscription_type": "pro", "phone_number": "1", "duration_days": 0 }),
        json!({ "amount": 10, "phone_number": "1" }),
        json!({ "amount": 10, "subscription_type": "pro", "phone_number": "1", "duration_days": 3651 }),
        json!({ "amount": 1.0, "subscription_type": "pro", "phone_number": "1", "duration_days": i32::MAX }),
    ] {
        let (status, _) = app.post_json("/create_payment", body, Some(&token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    assert!(app.gateway.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_payment_gateway_rejection() {
    let app = TestApp::spawn().await;
    let (token, _) = app.signup("rejected@example.com").await;

    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "message": "order_amount : invalid value",
            "code": "order_amount_invalid",
        })))
        .mount(&app.gateway)
        .await;

    let (status, body) = app
        .post_json(
            "/create_payment",
            json!({ "amount": 1.0, "subscription_type": "pro", "phone_number": "1" }),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["details"].as_str().unwrap().contains("order_amount_invalid"));
}

#[tokio::test]
async fn test_create_payment_not_configured() {
    let app = TestApp::spawn_with(|config| config.cashfree.app_id = String::new()).await;
    let (token, _) = app.signup("nocreds@example.com").await;

    let (status, _) = app
        .post_json(
            "/create_payment",
            json!({ "amount": 1.0, "subscription_type": "pro", "phone_number": "1" }),
            Some(&token),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_webhook_twice_credits_once() {
    let app = TestApp::spawn().await;
    let (token, user_id) = app.signup("twice@example.com").await;
    let order_id = create_order(&app, &token).await;
    mock_order_status(&app, &order_id, "PAID").await;

    let (status, body) = app
        .post_json("/payment_webhook", webhook_body(&order_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Payment processed successfully");

    let (status, body) = app
        .post_json("/payment_webhook", webhook_body(&order_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Payment already processed");

    assert_eq!(app.store.payment_count(), 1);

    let user = app.store.find_user_by_id(user_id).await.unwrap().unwrap();
    assert_eq!(user.subscription, "pro");
    assert_eq!(
        user.subscription_expiry,
        Some(Utc::now().date_naive() + Duration::days(30))
    );

    let payment = app.store.find_payment(&order_id).await.unwrap().unwrap();
    assert_eq!(payment.payment_method.as_deref(), Some("upi"));
    assert_eq!(payment.transaction_id.as_deref(), Some("885473311"));
    assert_eq!(payment.amount, 499.0);

    let order = app.store.find_order(&order_id).await.unwrap().unwrap();
    assert!(order.is_completed());
}

#[tokio::test]
async fn test_poll_and_webhook_credit_once() {
    let app = TestApp::spawn().await;
    let (token, _) = app.signup("racer@example.com").await;
    let order_id = create_order(&app, &token).await;
    mock_order_status(&app, &order_id, "PAID").await;

    let (status, body) = app
        .get(&format!("/payment_success?order_id={}", order_id), Some(&token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order_status"], "PAID");
    assert_eq!(body["processed"], true);

    let (_, body) = app
        .get(&format!("/payment_success?order_id={}", order_id), Some(&token))
        .await;
    assert_eq!(body["processed"], false);

    let (_, body) = app
        .post_json("/payment_webhook", webhook_body(&order_id), None)
        .await;
    assert_eq!(body["message"], "Payment already processed");

    assert_eq!(app.store.payment_count(), 1);
}

#[tokio::test]
async fn test_webhook_pending_order() {
    let app = TestApp::spawn().await;
    let (token, user_id) = app.signup("pending@example.com").await;
    let order_id = create_order(&app, &token).await;
    mock_order_status(&app, &order_id, "ACTIVE").await;

    let (status, body) = app
        .post_json("/payment_webhook", webhook_body(&order_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["order_status"], "ACTIVE");

    assert_eq!(app.store.payment_count(), 0);
    let user = app.store.find_user_by_id(user_id).await.unwrap().unwrap();
    assert_eq!(user.subscription, "free");
}

#[tokio::test]
async fn test_webhook_bad_payloads() {
    let app = TestApp::spawn().await;

    let (status, _) = app
        .post_json("/payment_webhook", json!({ "data": {} }), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post_json("/payment_webhook", webhook_body("order_unknown"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

fn sign(timestamp: &str, body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(TEST_CASHFREE_SECRET.as_bytes()).unwrap();
    mac.update(timestamp.as_bytes());
    mac.update(body.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

fn signed_webhook(body: &str, timestamp: &str, signature: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/payment_webhook")
        .header("content-type", "application/json")
        .header("x-webhook-timestamp", timestamp)
        .header("x-webhook-signature", signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_webhook_signature_verification() {
    let app = TestApp::spawn_with(|config| config.cashfree.verify_webhooks = true).await;
    let (token, _) = app.signup("signed@example.com").await;
    let order_id = create_order(&app, &token).await;
    mock_order_status(&app, &order_id, "PAID").await;

    let body = webhook_body(&order_id).to_string();
    let timestamp = "1700000000";

    let (status, _) = app
        .post_json("/payment_webhook", webhook_body(&order_id), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send_json(signed_webhook(&body, timestamp, "bm90LXRoZS1zaWduYXR1cmU="))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.store.payment_count(), 0);

    let (status, body) = app
        .send_json(signed_webhook(&body, timestamp, &sign(timestamp, &body)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Payment processed successfully");
    assert_eq!(app.store.payment_count(), 1);
}

#[tokio::test]
async fn test_payment_success_ownership_and_errors() {
    let app = TestApp::spawn().await;
    let (owner, _) = app.signup("payer@example.com").await;
    let (stranger, _) = app.signup("stranger@example.com").await;
    let order_id = create_order(&app, &owner).await;

    let (status, _) = app
        .get(&format!("/payment_success?order_id={}", order_id), Some(&stranger))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get("/payment_success", Some(&owner)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // No status mock mounted: the gateway answers 404
    let (status, body) = app
        .get(&format!("/payment_success?order_id={}", order_id), Some(&owner))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["details"], "Failed to verify payment");
}
