use axum::{extract::State, Json};
use chrono::{NaiveDate, Utc};

use crate::{
    dtos::subscription::{
        LatestPayment, SubscriptionInfo, SubscriptionStatusResponse, UpdateSubscriptionRequest,
        UpdateSubscriptionResponse,
    },
    middleware::CurrentUser,
    utils::ValidatedJson,
    AppState,
};
use service_core::error::AppError;

/// GET /check_subscription
pub async fn check_subscription(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<SubscriptionStatusResponse>, AppError> {
    let today = Utc::now().date_naive();
    let latest_payment = state
        .payments
        .latest_order_for_user(user.id)
        .await?
        .map(|order| LatestPayment {
            order_id: order.order_id,
            status: order.status,
            date: order.created_at.to_rfc3339(),
        });

    Ok(Json(SubscriptionStatusResponse {
        is_pro: user.is_pro(today),
        subscription: SubscriptionInfo {
            kind: user.subscription.clone(),
            expiry_date: user.subscription_expiry.map(|d| d.to_string()),
            is_expired: user.is_subscription_expired(today),
        },
        latest_payment,
    }))
}

/// POST /update-subscription (admin key required)
pub async fn update_subscription(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<UpdateSubscriptionRequest>,
) -> Result<Json<UpdateSubscriptionResponse>, AppError> {
    let expiry = NaiveDate::parse_from_str(req.expiry.trim(), "%Y-%m-%d").map_err(|_| {
        AppError::BadRequest(anyhow::anyhow!("Invalid expiry date, expected YYYY-MM-DD"))
    })?;

    if !state
        .users
        .update_subscription(req.user_id, &req.subscription, expiry)
        .await?
    {
        return Err(AppError::NotFound(anyhow::anyhow!("User not found")));
    }

    tracing::info!(
        user_id = req.user_id,
        subscription = %req.subscription,
        expiry = %expiry,
        "Subscription updated by admin"
    );

    Ok(Json(UpdateSubscriptionResponse {
        message: "Subscription updated successfully".to_string(),
        subscription: req.subscription,
        expiry: expiry.to_string(),
    }))
}
