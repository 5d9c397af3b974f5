use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Initiated,
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Initiated => "INITIATED",
            OrderStatus::Completed => "COMPLETED",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIATED" => Ok(OrderStatus::Initiated),
            "COMPLETED" => Ok(OrderStatus::Completed),
            other => Err(format!("Unknown order status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentOrder {
    pub order_id: String,
    pub cf_order_id: Option<String>,
    pub user_id: i64,
    pub amount: f64,
    pub currency: String,
    pub subscription_type: String,
    pub duration_days: i32,
    pub status: String,
    pub payment_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PaymentOrder {
    pub fn is_completed(&self) -> bool {
        self.status == OrderStatus::Completed.as_str()
    }
}

#[derive(Debug, Clone)]
pub struct NewPaymentOrder {
    pub order_id: String,
    pub cf_order_id: String,
    pub user_id: i64,
    pub amount: f64,
    pub currency: String,
    pub subscription_type: String,
    pub duration_days: i32,
    pub gateway_response: serde_json::Value,
}

/// Ledger row written once per completed order.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Payment {
    pub id: i64,
    pub order_id: String,
    pub user_id: i64,
    pub amount: f64,
    pub payment_status: String,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
    pub payment_date: DateTime<Utc>,
}

/// Everything needed to mark an order paid and credit the subscription.
#[derive(Debug, Clone)]
pub struct OrderCompletion {
    pub order_id: String,
    pub payment_status: String,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
    pub gateway_response: serde_json::Value,
    /// Day the new subscription period starts from
    pub completed_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    Completed {
        user_id: i64,
        subscription: String,
        subscription_expiry: NaiveDate,
    },
    AlreadyCompleted,
}

/// Expiry granted by an order completed on `completed_on`.
pub fn subscription_expiry_for(
    completed_on: NaiveDate,
    duration_days: i32,
) -> Result<NaiveDate, AppError> {
    completed_on
        .checked_add_signed(chrono::Duration::days(i64::from(duration_days)))
        .ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Subscription of {} days from {} is out of range",
                duration_days,
                completed_on
            ))
        })
}
