use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct GenvideoConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub limits: LimitsConfig,
    pub media: MediaConfig,
    pub smtp: SmtpConfig,
    pub urls: UrlConfig,
    pub cashfree: CashfreeConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: Secret<String>,
    /// Session token lifetime
    pub expiration_seconds: i64,
    pub reset_token_expiry_hours: i64,
}

#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub max_videos_per_user: i64,
    /// Length of the free tier granted on signup
    pub trial_days: i64,
    /// Upper bound for a `/generate_video` request body, in bytes
    pub max_content_length: usize,
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub output_base_folder: PathBuf,
    pub work_folder: PathBuf,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub render_timeout_seconds: u64,
    pub max_concurrent_renders: usize,
    pub video_width: u32,
    pub video_height: u32,
    pub video_fps: u32,
    pub caption_font_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Secret<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct UrlConfig {
    /// Where password-reset and payment-return links point
    pub frontend_url: String,
    /// Externally reachable base URL of this service, used for the gateway notify URL
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct CashfreeConfig {
    pub app_id: String,
    pub secret_key: Secret<String>,
    pub base_url: String,
    pub checkout_url: String,
    pub api_version: String,
    pub verify_webhooks: bool,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub admin_api_key: Secret<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub signin_attempts: u32,
    pub signin_window_seconds: u64,
    pub signup_attempts: u32,
    pub signup_window_seconds: u64,
    pub password_reset_attempts: u32,
    pub password_reset_window_seconds: u64,
}

impl GenvideoConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let frontend_url = match env::var("FRONTEND_URL") {
            Ok(url) => url,
            Err(_) => get_env("NEXT_PUBLIC_API_URL", Some("http://localhost:3000"), is_prod)?,
        };

        let default_public_url = format!("http://localhost:{}", common_config.port);

        let config = GenvideoConfig {
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("genvideo-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: Secret::new(get_env("DATABASE_URL", None, is_prod)?),
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
            },
            jwt: JwtConfig {
                secret: Secret::new(get_env("JWT_SECRET_KEY", None, is_prod)?),
                expiration_seconds: parse_env("JWT_EXPIRATION", "86400", is_prod)?,
                reset_token_expiry_hours: parse_env("RESET_TOKEN_EXPIRY_HOURS", "1", is_prod)?,
            },
            limits: LimitsConfig {
                max_videos_per_user: parse_env("MAX_VIDEOS_PER_USER", "10", is_prod)?,
                trial_days: parse_env("TRIAL_DAYS", "30", is_prod)?,
                max_content_length: parse_env("MAX_CONTENT_LENGTH", "33554432", is_prod)?,
            },
            media: MediaConfig {
                output_base_folder: get_env("OUTPUT_BASE_FOLDER", Some("new_output"), is_prod)?
                    .into(),
                work_folder: get_env("WORK_FOLDER", Some("media/work"), is_prod)?.into(),
                ffmpeg_path: get_env("FFMPEG_PATH", Some("ffmpeg"), is_prod)?,
                ffprobe_path: get_env("FFPROBE_PATH", Some("ffprobe"), is_prod)?,
                render_timeout_seconds: parse_env("RENDER_TIMEOUT_SECONDS", "600", is_prod)?,
                max_concurrent_renders: parse_env("MAX_CONCURRENT_RENDERS", "2", is_prod)?,
                video_width: parse_env("VIDEO_WIDTH", "1280", is_prod)?,
                video_height: parse_env("VIDEO_HEIGHT", "720", is_prod)?,
                video_fps: parse_env("VIDEO_FPS", "24", is_prod)?,
                caption_font_file: env::var("CAPTION_FONT_FILE").ok().filter(|s| !s.is_empty()),
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("localhost"), is_prod)?,
                port: parse_env("SMTP_PORT", "587", is_prod)?,
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: Secret::new(get_env("SMTP_PASSWORD", Some(""), is_prod)?),
                from: get_env("SMTP_FROM", Some("no-reply@localhost"), is_prod)?,
            },
            urls: UrlConfig {
                frontend_url: frontend_url.trim_end_matches('/').to_string(),
                public_base_url: get_env(
                    "PUBLIC_BASE_URL",
                    Some(default_public_url.as_str()),
                    is_prod,
                )?
                .trim_end_matches('/')
                .to_string(),
            },
            cashfree: CashfreeConfig {
                app_id: get_env("CASHFREE_APP_ID", Some(""), is_prod)?,
                secret_key: Secret::new(get_env("CASHFREE_SECRET_KEY", Some(""), is_prod)?),
                base_url: get_env(
                    "CASHFREE_BASE_URL",
                    Some("https://sandbox.cashfree.com/pg"),
                    is_prod,
                )?
                .trim_end_matches('/')
                .to_string(),
                checkout_url: get_env(
                    "CASHFREE_CHECKOUT_URL",
                    Some("https://payments.cashfree.com/order/#"),
                    is_prod,
                )?
                .trim_end_matches('/')
                .to_string(),
                api_version: get_env("CASHFREE_API_VERSION", Some("2022-09-01"), is_prod)?,
                verify_webhooks: parse_env("CASHFREE_VERIFY_WEBHOOKS", "false", is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("*"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                // Empty outside prod: the admin endpoint then rejects every request
                admin_api_key: Secret::new(get_env(
                    "ADMIN_API_KEY",
                    (!is_prod).then_some(""),
                    is_prod,
                )?),
            },
            rate_limit: RateLimitConfig {
                signin_attempts: parse_env("RATE_LIMIT_SIGNIN_ATTEMPTS", "10", is_prod)?,
                signin_window_seconds: parse_env("RATE_LIMIT_SIGNIN_WINDOW_SECONDS", "900", is_prod)?,
                signup_attempts: parse_env("RATE_LIMIT_SIGNUP_ATTEMPTS", "5", is_prod)?,
                signup_window_seconds: parse_env("RATE_LIMIT_SIGNUP_WINDOW_SECONDS", "3600", is_prod)?,
                password_reset_attempts: parse_env(
                    "RATE_LIMIT_PASSWORD_RESET_ATTEMPTS",
                    "3",
                    is_prod,
                )?,
                password_reset_window_seconds: parse_env(
                    "RATE_LIMIT_PASSWORD_RESET_WINDOW_SECONDS",
                    "3600",
                    is_prod,
                )?,
            },
            common: common_config,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.expiration_seconds <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_EXPIRATION must be positive"
            )));
        }

        if self.jwt.reset_token_expiry_hours <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RESET_TOKEN_EXPIRY_HOURS must be positive"
            )));
        }

        if self.limits.max_videos_per_user <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MAX_VIDEOS_PER_USER must be positive"
            )));
        }

        if self.media.video_width == 0 || self.media.video_height == 0 || self.media.video_fps == 0
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "VIDEO_WIDTH, VIDEO_HEIGHT and VIDEO_FPS must be positive"
            )));
        }

        if self.media.max_concurrent_renders == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MAX_CONCURRENT_RENDERS must be positive"
            )));
        }

        // In production, ensure stricter validation
        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.jwt.secret.expose_secret().len() < 32 {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT_SECRET_KEY must be at least 32 bytes in production"
                )));
            }

            if !self.cashfree.verify_webhooks {
                tracing::warn!("Cashfree webhook signature verification is disabled in production");
            }
        }

        Ok(())
    }
}

/// Read `key`, falling back to `default`. Keys without a default are required.
fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => match default {
            Some(def) => Ok(def.to_string()),
            None if is_prod => Err(AppError::ConfigError(anyhow::anyhow!(format!(
                "{} is required in production but not set",
                key
            )))),
            None => Err(AppError::ConfigError(anyhow::anyhow!(format!(
                "{} is required but not set",
                key
            )))),
        },
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key, Some(default), is_prod)?;
    raw.trim().parse::<T>().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("Invalid value for {}: '{}' ({})", key, raw, e))
    })
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
