use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusResponse {
    pub is_pro: bool,
    pub subscription: SubscriptionInfo,
    pub latest_payment: Option<LatestPayment>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub expiry_date: Option<String>,
    pub is_expired: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestPayment {
    pub order_id: String,
    pub status: String,
    pub date: String,
}

/// Body of the 403 returned by the subscription gate.
#[derive(Debug, Serialize)]
pub struct SubscriptionExpired {
    pub message: String,
    pub subscription_expired: bool,
    pub subscription_expiry: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSubscriptionRequest {
    pub user_id: i64,
    #[validate(length(min = 1, max = 50, message = "Subscription is required"))]
    pub subscription: String,
    /// `YYYY-MM-DD`
    pub expiry: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateSubscriptionResponse {
    pub message: String,
    pub subscription: String,
    pub expiry: String,
}
