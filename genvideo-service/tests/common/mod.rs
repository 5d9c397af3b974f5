//! Test helpers for genvideo-service integration tests.
//!
//! The router runs in-process against `InMemoryStore`, `MockEmailService`, a fake
//! renderer and a wiremock stand-in for Cashfree.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use genvideo_service::{
    build_router,
    config::{
        CashfreeConfig, DatabaseConfig, Environment, GenvideoConfig, JwtConfig, LimitsConfig,
        MediaConfig, RateLimitConfig, SecurityConfig, SmtpConfig, UrlConfig,
    },
    media::{MediaError, RenderJob, Renderer},
    services::{InMemoryStore, MockEmailService},
    AppState, Backends,
};
use secrecy::Secret;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::MockServer;

pub const TEST_ADMIN_API_KEY: &str = "test-admin-key-12345";
pub const TEST_JWT_SECRET: &str = "test-jwt-secret-that-is-long-enough-for-hs256";
pub const TEST_CASHFREE_SECRET: &str = "test-cashfree-secret";
pub const TEST_PASSWORD: &str = "correct horse battery staple";
pub const VOICE_DURATION: f64 = 7.25;

/// Renderer that writes a placeholder file instead of calling ffmpeg.
#[derive(Default)]
pub struct FakeRenderer {
    pub duration: f64,
    pub jobs: Mutex<Vec<RenderJob>>,
}

impl FakeRenderer {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn jobs(&self) -> Vec<RenderJob> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError> {
        if !path.exists() {
            return Err(MediaError::UnreadableMedia(path.display().to_string()));
        }
        Ok(self.duration)
    }

    async fn render(&self, job: &RenderJob) -> Result<(), MediaError> {
        tokio::fs::write(&job.output, b"\x00\x00\x00\x18ftypmp42fake").await?;
        self.jobs.lock().unwrap().push(job.clone());
        Ok(())
    }
}

pub fn test_config(output: &Path, work: &Path, gateway_url: &str) -> GenvideoConfig {
    GenvideoConfig {
        common: service_core::config::Config {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        environment: Environment::Dev,
        service_name: "genvideo-service".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        database: DatabaseConfig {
            url: Secret::new("postgres://unused".to_string()),
            max_connections: 1,
        },
        jwt: JwtConfig {
            secret: Secret::new(TEST_JWT_SECRET.to_string()),
            expiration_seconds: 3600,
            reset_token_expiry_hours: 1,
        },
        limits: LimitsConfig {
            max_videos_per_user: 10,
            trial_days: 30,
            max_content_length: 32 * 1024 * 1024,
        },
        media: MediaConfig {
            output_base_folder: output.to_path_buf(),
            work_folder: work.to_path_buf(),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            render_timeout_seconds: 60,
            max_concurrent_renders: 1,
            video_width: 1280,
            video_height: 720,
            video_fps: 24,
            caption_font_file: None,
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            user: String::new(),
            password: Secret::new(String::new()),
            from: "no-reply@genvideo.test".to_string(),
        },
        urls: UrlConfig {
            frontend_url: "http://frontend.test".to_string(),
            public_base_url: "http://api.test".to_string(),
        },
        cashfree: CashfreeConfig {
            app_id: "test-app-id".to_string(),
            secret_key: Secret::new(TEST_CASHFREE_SECRET.to_string()),
            base_url: gateway_url.to_string(),
            checkout_url: "https://payments.test/order/#".to_string(),
            api_version: "2022-09-01".to_string(),
            verify_webhooks: false,
        },
        security: SecurityConfig {
            allowed_origins: vec!["*".to_string()],
            admin_api_key: Secret::new(TEST_ADMIN_API_KEY.to_string()),
        },
        rate_limit: RateLimitConfig {
            signin_attempts: 100,
            signin_window_seconds: 60,
            signup_attempts: 100,
            signup_window_seconds: 60,
            password_reset_attempts: 100,
            password_reset_window_seconds: 60,
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: InMemoryStore,
    pub email: MockEmailService,
    pub renderer: Arc<FakeRenderer>,
    pub gateway: MockServer,
    pub output_dir: PathBuf,
    pub work_dir: PathBuf,
    _dirs: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    pub async fn spawn_with(customize: impl FnOnce(&mut GenvideoConfig)) -> Self {
        Self::spawn_with_email(MockEmailService::new(), customize).await
    }

    pub async fn spawn_with_email(
        email: MockEmailService,
        customize: impl FnOnce(&mut GenvideoConfig),
    ) -> Self {
        let dirs = TempDir::new().expect("Failed to create temp dir");
        let output_dir = dirs.path().join("output");
        let work_dir = dirs.path().join("work");

        let gateway = MockServer::start().await;
        let mut config = test_config(&output_dir, &work_dir, &gateway.uri());
        customize(&mut config);

        let store = InMemoryStore::new();
        let renderer = Arc::new(FakeRenderer::new(VOICE_DURATION));

        let backends = Backends {
            users: Arc::new(store.clone()),
            videos: Arc::new(store.clone()),
            payments: Arc::new(store.clone()),
            email: Arc::new(email.clone()),
            renderer: renderer.clone(),
        };

        let state = AppState::new(config, backends).expect("Failed to build state");
        let router = build_router(state.clone())
            .await
            .expect("Failed to build router");

        Self {
            router,
            state,
            store,
            email,
            renderer,
            gateway,
            output_dir,
            work_dir,
            _dirs: dirs,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Send and decode the body as JSON (`Value::Null` when it is not JSON).
    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.send(request).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send_json(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        body: Value,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        self.json_request("POST", uri, body, token).await
    }

    pub async fn json_request(
        &self,
        method: &str,
        uri: &str,
        body: Value,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send_json(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    /// Register a user and return `(token, user_id)`.
    pub async fn signup(&self, email: &str) -> (String, i64) {
        let (status, body) = self
            .post_json(
                "/signup",
                serde_json::json!({
                    "email": email,
                    "password": TEST_PASSWORD,
                    "confirmPassword": TEST_PASSWORD,
                    "name": "Test User",
                }),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "signup failed: {}", body);

        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["id"].as_i64().unwrap(),
        )
    }

    pub async fn generate(&self, token: &str, form: &MultipartForm) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/generate_video")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, form.content_type())
            .body(Body::from(form.body()))
            .unwrap();
        self.send_json(request).await
    }
}

/// Minimal multipart/form-data encoder.
pub struct MultipartForm {
    boundary: String,
    parts: Vec<u8>,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartForm {
    pub fn new() -> Self {
        Self {
            boundary: "genvideo-test-boundary".to_string(),
            parts: Vec::new(),
        }
    }

    /// Two images, a voice track and background sound.
    pub fn complete() -> Self {
        Self::new()
            .file("images", "first.jpg", b"jpeg-one")
            .file("images", "second.png", b"png-two")
            .file("voice", "voice.mp3", b"voice-bytes")
            .file("backgroundSound", "music.mp3", b"music-bytes")
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.parts.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                self.boundary, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content: &[u8]) -> Self {
        self.parts.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                self.boundary, name, filename
            )
            .as_bytes(),
        );
        self.parts.extend_from_slice(content);
        self.parts.extend_from_slice(b"\r\n");
        self
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn body(&self) -> Vec<u8> {
        let mut body = self.parts.clone();
        body.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        body
    }
}
