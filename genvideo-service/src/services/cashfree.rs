//! Cashfree payment gateway client.
//!
//! Covers the Orders API (create, fetch, list payments) and webhook
//! signature verification. Credentials travel as `x-client-id` and
//! `x-client-secret` headers.

use crate::config::CashfreeConfig;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use service_core::error::AppError;
use sha2::Sha256;
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Order status Cashfree reports once the customer has paid.
pub const ORDER_STATUS_PAID: &str = "PAID";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Payment gateway credentials not configured")]
    NotConfigured,

    #[error("Payment gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Payment gateway returned {status}: {body}")]
    Rejected { status: u16, body: Value },

    #[error("Unexpected payment gateway response: {0}")]
    Malformed(String),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotConfigured => AppError::ServiceUnavailable(err.to_string()),
            GatewayError::Rejected { body, .. } => AppError::BadGateway(body.to_string()),
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    pub order_id: String,
    pub order_amount: f64,
    pub order_currency: String,
    pub order_note: String,
    pub customer_details: CustomerDetails,
    pub order_meta: OrderMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerDetails {
    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderMeta {
    pub return_url: String,
    pub notify_url: String,
}

/// Order as reported by the gateway. `raw` keeps the full payload for auditing.
#[derive(Debug, Clone)]
pub struct GatewayOrder {
    pub cf_order_id: Option<String>,
    pub order_status: Option<String>,
    pub payment_session_id: Option<String>,
    pub order_expiry_time: Option<String>,
    pub raw: Value,
}

impl GatewayOrder {
    pub fn from_value(raw: Value) -> Self {
        Self {
            cf_order_id: string_field(&raw, "cf_order_id"),
            order_status: string_field(&raw, "order_status"),
            payment_session_id: string_field(&raw, "payment_session_id"),
            order_expiry_time: string_field(&raw, "order_expiry_time"),
            raw,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.order_status.as_deref() == Some(ORDER_STATUS_PAID)
    }
}

/// A payment attempt against an order.
#[derive(Debug, Clone)]
pub struct GatewayPayment {
    pub cf_payment_id: Option<String>,
    pub payment_status: Option<String>,
    pub payment_group: Option<String>,
}

impl GatewayPayment {
    pub fn from_value(raw: &Value) -> Self {
        Self {
            cf_payment_id: string_field(raw, "cf_payment_id"),
            payment_status: string_field(raw, "payment_status"),
            payment_group: string_field(raw, "payment_group"),
        }
    }

    pub fn is_success(&self) -> bool {
        self.payment_status.as_deref() == Some("SUCCESS")
    }
}

/// Cashfree sends some identifiers as numbers and some as strings.
fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Clone)]
pub struct CashfreeClient {
    client: Client,
    config: CashfreeConfig,
}

impl CashfreeClient {
    pub fn new(config: CashfreeConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn is_configured(&self) -> bool {
        !self.config.app_id.is_empty() && !self.config.secret_key.expose_secret().is_empty()
    }

    pub fn verify_webhooks(&self) -> bool {
        self.config.verify_webhooks
    }

    /// Hosted checkout page for a gateway order.
    pub fn checkout_link(&self, cf_order_id: &str) -> String {
        format!("{}/{}", self.config.checkout_url, cf_order_id)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-client-id", &self.config.app_id)
            .header("x-client-secret", self.config.secret_key.expose_secret())
            .header("x-api-version", &self.config.api_version)
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<Value, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let response = self.authorized(builder).send().await?;
        let status = response.status();
        let text = response.text().await?;
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

        if status.is_success() {
            Ok(body)
        } else {
            tracing::error!(status = %status, body = %body, "Cashfree request rejected");
            Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }

    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn create_order(
        &self,
        request: &CreateOrderRequest,
    ) -> Result<GatewayOrder, GatewayError> {
        let url = format!("{}/orders", self.config.base_url);
        let body = self.send(self.client.post(&url).json(request)).await?;
        let order = GatewayOrder::from_value(body);

        tracing::info!(
            cf_order_id = ?order.cf_order_id,
            order_status = ?order.order_status,
            "Cashfree order created"
        );
        Ok(order)
    }

    pub async fn get_order(&self, order_id: &str) -> Result<GatewayOrder, GatewayError> {
        let url = format!("{}/orders/{}", self.config.base_url, order_id);
        let body = self.send(self.client.get(&url)).await?;
        Ok(GatewayOrder::from_value(body))
    }

    pub async fn get_order_payments(
        &self,
        order_id: &str,
    ) -> Result<Vec<GatewayPayment>, GatewayError> {
        let url = format!("{}/orders/{}/payments", self.config.base_url, order_id);
        let body = self.send(self.client.get(&url)).await?;

        body.as_array()
            .map(|payments| payments.iter().map(GatewayPayment::from_value).collect())
            .ok_or_else(|| GatewayError::Malformed("payments list is not an array".to_string()))
    }

    /// Check `x-webhook-signature` = base64(HMAC-SHA256(timestamp + body, secret)).
    pub fn verify_webhook_signature(&self, timestamp: &str, body: &[u8], signature: &str) -> bool {
        let expected = match self.compute_signature(timestamp, body) {
            Some(sig) => sig,
            None => return false,
        };

        let is_valid: bool = expected.as_bytes().ct_eq(signature.trim().as_bytes()).into();
        if !is_valid {
            tracing::warn!("Webhook signature verification failed");
        }
        is_valid
    }

    fn compute_signature(&self, timestamp: &str, body: &[u8]) -> Option<String> {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac =
            HmacSha256::new_from_slice(self.config.secret_key.expose_secret().as_bytes()).ok()?;
        mac.update(timestamp.as_bytes());
        mac.update(body);
        Some(BASE64.encode(mac.finalize().into_bytes()))
    }
}
