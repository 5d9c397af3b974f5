pub mod config;
pub mod dtos;
pub mod handlers;
pub mod media;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::config::GenvideoConfig;
use crate::media::Renderer;
use crate::services::{
    CashfreeClient, EmailProvider, JwtService, PaymentRepository, UserRepository, VideoLibrary,
    VideoRepository,
};

pub use startup::Application;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GenvideoConfig>,
    pub users: Arc<dyn UserRepository>,
    pub videos: Arc<dyn VideoRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub jwt: JwtService,
    pub email: Arc<dyn EmailProvider>,
    pub cashfree: CashfreeClient,
    pub renderer: Arc<dyn Renderer>,
    pub library: VideoLibrary,
    pub signin_rate_limiter: IpRateLimiter,
    pub signup_rate_limiter: IpRateLimiter,
    pub password_reset_rate_limiter: IpRateLimiter,
}

/// Storage and outbound integrations the state is assembled from.
pub struct Backends {
    pub users: Arc<dyn UserRepository>,
    pub videos: Arc<dyn VideoRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub email: Arc<dyn EmailProvider>,
    pub renderer: Arc<dyn Renderer>,
}

impl AppState {
    pub fn new(config: GenvideoConfig, backends: Backends) -> Result<Self, AppError> {
        let rate = &config.rate_limit;
        let signin_rate_limiter =
            create_ip_rate_limiter(rate.signin_attempts, rate.signin_window_seconds);
        let signup_rate_limiter =
            create_ip_rate_limiter(rate.signup_attempts, rate.signup_window_seconds);
        let password_reset_rate_limiter = create_ip_rate_limiter(
            rate.password_reset_attempts,
            rate.password_reset_window_seconds,
        );

        let cashfree = CashfreeClient::new(config.cashfree.clone())?;
        if !cashfree.is_configured() {
            tracing::warn!("Cashfree credentials not configured - payment endpoints will return 503");
        }

        Ok(Self {
            jwt: JwtService::new(&config.jwt),
            library: VideoLibrary::new(config.media.output_base_folder.clone()),
            cashfree,
            users: backends.users,
            videos: backends.videos,
            payments: backends.payments,
            email: backends.email,
            renderer: backends.renderer,
            signin_rate_limiter,
            signup_rate_limiter,
            password_reset_rate_limiter,
            config: Arc::new(config),
        })
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(allowed_origins.iter().filter_map(|o| {
            o.parse::<HeaderValue>()
                .map_err(|e| tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e))
                .ok()
        }))
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::RANGE,
            HeaderName::from_static(handlers::auth::USER_EMAIL_HEADER),
            HeaderName::from_static(middleware::admin::ADMIN_API_KEY_HEADER),
        ])
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let signin_route = Router::new()
        .route("/signin", post(handlers::signin))
        .layer(from_fn_with_state(
            state.signin_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let signup_route = Router::new()
        .route("/signup", post(handlers::signup))
        .layer(from_fn_with_state(
            state.signup_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let forgot_password_route = Router::new()
        .route("/forgot-password", post(handlers::forgot_password))
        .layer(from_fn_with_state(
            state.password_reset_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let max_upload = state.config.limits.max_content_length;
    let generate_route = Router::new()
        .route("/generate_video", post(handlers::generate_video))
        .layer(from_fn(middleware::subscription_middleware))
        .layer(from_fn_with_state(state.clone(), middleware::auth_middleware))
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(RequestBodyLimitLayer::new(max_upload));

    let protected_routes = Router::new()
        .route("/logout", post(handlers::logout))
        .route("/get_videos", get(handlers::list_videos))
        .route("/delete_video", delete(handlers::delete_video))
        .route("/check_video_limit", get(handlers::check_video_limit))
        .route("/clear_cache", post(handlers::clear_cache))
        .route("/create_payment", post(handlers::create_payment))
        .route("/payment_success", get(handlers::payment_success))
        .route("/check_subscription", get(handlers::check_subscription))
        .layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    let media_routes = Router::new()
        .route("/video/:filename", get(handlers::serve_video))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::media_auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/update-subscription", post(handlers::update_subscription))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::admin_auth_middleware,
        ));

    let app = Router::new()
        .route("/", get(handlers::index))
        .route("/favicon.ico", get(handlers::favicon))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/session", get(handlers::get_session).post(handlers::post_session))
        .route("/reset-password", post(handlers::reset_password))
        .route("/payment_webhook", post(handlers::payment_webhook))
        .merge(signin_route)
        .merge(signup_route)
        .merge(forgot_password_route)
        .merge(generate_route)
        .merge(protected_routes)
        .merge(media_routes)
        .merge(admin_routes)
        .with_state(state.clone())
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    version = ?request.version(),
                    user_id = tracing::field::Empty,
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config.security.allowed_origins));

    Ok(app)
}
