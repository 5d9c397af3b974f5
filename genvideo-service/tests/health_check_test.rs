mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::TestApp;

#[tokio::test]
async fn test_index_and_favicon() {
    let app = TestApp::spawn().await;

    let (status, body) = app.get("/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Backend is running");

    let response = app
        .send(Request::builder().uri("/favicon.ico").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::spawn().await;

    let (status, body) = app.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "genvideo-service");
    assert_eq!(body["database"], "up");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = TestApp::spawn().await;

    let response = app
        .send(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_common_response_headers() {
    let app = TestApp::spawn().await;

    let response = app
        .send(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.headers()["x-request-id"], "req-42");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["cache-control"], "no-store");
}

#[tokio::test]
async fn test_upload_body_limit() {
    let app = TestApp::spawn_with(|config| config.limits.max_content_length = 1024).await;
    let (token, _) = app.signup("big@example.com").await;

    let form = common::MultipartForm::complete().file("images", "huge.jpg", &vec![0u8; 4096]);
    let (status, _) = app.generate(&token, &form).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.renderer.jobs().is_empty());
}
