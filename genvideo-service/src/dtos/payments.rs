use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_DURATION_DAYS: i32 = 30;
/// Ten years; longer periods are rejected at order creation.
pub const MAX_DURATION_DAYS: i32 = 3650;
pub const DEFAULT_CURRENCY: &str = "INR";

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: Option<f64>,
    pub subscription_type: Option<String>,
    pub duration_days: Option<i32>,
    pub phone_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    pub status: String,
    pub order_id: String,
    pub cf_order_id: String,
    pub payment_session_id: Option<String>,
    pub payment_link: String,
    pub amount: f64,
    pub currency: String,
    pub order_status: Option<String>,
    pub order_expiry: Option<String>,
    pub order_details: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentSuccessQuery {
    pub order_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentSuccessResponse {
    pub status: String,
    pub order_id: String,
    pub order_status: Option<String>,
    /// True only for the call that credited the subscription
    pub processed: bool,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_status: Option<String>,
}

/// `data.order.order_id` of a gateway notification.
pub fn webhook_order_id(payload: &Value) -> Option<&str> {
    payload
        .get("data")?
        .get("order")?
        .get("order_id")?
        .as_str()
        .filter(|id| !id.is_empty())
}
