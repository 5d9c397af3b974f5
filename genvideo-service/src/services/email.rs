use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::SmtpConfig;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_welcome_email(&self, to_email: &str, name: &str) -> Result<(), AppError>;

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_url: &str,
    ) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct EmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl EmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let mut builder = SmtpTransport::starttls_relay(&config.host)
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid SMTP relay: {}", e)))?
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)));

        if !config.user.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.user.clone(),
                config.password.expose_secret().clone(),
            ));
        }

        tracing::info!(host = %config.host, port = config.port, "Email service initialized");

        Ok(Self {
            mailer: builder.build(),
            from_email: config.from.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: &str,
        html_body: Option<&str>,
    ) -> Result<(), AppError> {
        let builder = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| AppError::EmailError(e.to_string()))?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| AppError::EmailError(e.to_string()))?)
            .subject(subject);

        let email = match html_body {
            Some(html) => builder.multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html.to_string()),
                    ),
            ),
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(plain_body.to_string()),
        }
        .map_err(|e| AppError::EmailError(e.to_string()))?;

        // SmtpTransport is blocking
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent successfully");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, to = %to_email, "Failed to send email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl EmailProvider for EmailService {
    async fn send_welcome_email(&self, to_email: &str, name: &str) -> Result<(), AppError> {
        let html_body = format!(
            r###"<html>
    <body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
        <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
            <div style="background-color: #4a86e8; color: white; padding: 10px 20px; text-align: center;">
                <h1>Welcome to GEN VIDEO AI</h1>
            </div>
            <div style="padding: 20px; background-color: #f9f9f9;">
                <h2>Hello {name},</h2>
                <p>Thank you for signing up with us! Your account has been created.</p>
                <p>Upgrade to Pro to keep generating videos after your trial ends.</p>
                <p>Best regards,<br>The Team</p>
            </div>
            <p style="text-align: center; font-size: 12px; color: #777;">
                This is an automated message. Please do not reply to this email.
            </p>
        </div>
    </body>
</html>"###,
            name = name
        );

        self.send_email(
            to_email,
            "Welcome to Our Platform! GEN VIDEO AI",
            "Thank you for signing up to our platform!",
            Some(&html_body),
        )
        .await
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_url: &str,
    ) -> Result<(), AppError> {
        let plain_body = format!("Click the link to reset your password: {}", reset_url);
        self.send_email(to_email, "Password Reset Request", &plain_body, None)
            .await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SentEmail {
    Welcome { to: String, name: String },
    PasswordReset { to: String, reset_url: String },
}

/// Records messages instead of sending them. `failing()` makes every send fail.
#[derive(Clone, Default)]
pub struct MockEmailService {
    sent: Arc<Mutex<Vec<SentEmail>>>,
    fail: bool,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Arc::default(),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// URL from the most recent reset email sent to `to`.
    pub fn last_reset_url(&self, to: &str) -> Option<String> {
        self.sent().into_iter().rev().find_map(|email| match email {
            SentEmail::PasswordReset { to: t, reset_url } if t == to => Some(reset_url),
            _ => None,
        })
    }

    fn record(&self, email: SentEmail) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::EmailError("mock SMTP relay unavailable".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email);
        }
        Ok(())
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_welcome_email(&self, to_email: &str, name: &str) -> Result<(), AppError> {
        self.record(SentEmail::Welcome {
            to: to_email.to_string(),
            name: name.to_string(),
        })
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_url: &str,
    ) -> Result<(), AppError> {
        self.record(SentEmail::PasswordReset {
            to: to_email.to_string(),
            reset_url: reset_url.to_string(),
        })
    }
}
