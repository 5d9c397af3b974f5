//! Cashfree checkout: order creation, return-page polling and the webhook.
//!
//! Polling and the webhook both end in `PaymentRepository::complete_order`,
//! which credits a subscription at most once per order.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    dtos::payments::{
        webhook_order_id, CreatePaymentRequest, CreatePaymentResponse, PaymentSuccessQuery,
        PaymentSuccessResponse, WebhookResponse, DEFAULT_CURRENCY, DEFAULT_DURATION_DAYS,
        MAX_DURATION_DAYS,
    },
    middleware::CurrentUser,
    models::{CompletionOutcome, NewPaymentOrder, OrderCompletion, PaymentOrder},
    services::{
        cashfree::{CreateOrderRequest, CustomerDetails, GatewayOrder, OrderMeta},
        metrics,
    },
    AppState,
};
use service_core::error::AppError;

pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const WEBHOOK_TIMESTAMP_HEADER: &str = "x-webhook-timestamp";

fn generate_order_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("order_{}_{}", Utc::now().timestamp(), &suffix[..8])
}

/// POST /create_payment
pub async fn create_payment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<Json<CreatePaymentResponse>, AppError> {
    let amount = req
        .amount
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("amount is required")))?;
    let subscription_type = req
        .subscription_type
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("subscription_type is required")))?;
    let phone_number = req
        .phone_number
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("phone_number is required")))?;
    let duration_days = req.duration_days.unwrap_or(DEFAULT_DURATION_DAYS);

    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "amount must be greater than 0"
        )));
    }
    if duration_days <= 0 {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "duration_days must be greater than 0"
        )));
    }
    if duration_days > MAX_DURATION_DAYS {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "duration_days cannot exceed {}",
            MAX_DURATION_DAYS
        )));
    }

    let order_id = generate_order_id();
    let urls = &state.config.urls;

    let request = CreateOrderRequest {
        order_id: order_id.clone(),
        order_amount: amount,
        order_currency: DEFAULT_CURRENCY.to_string(),
        order_note: format!("{} subscription for {} days", subscription_type, duration_days),
        customer_details: CustomerDetails {
            customer_id: format!("user_{}", user.id),
            customer_name: user.name.clone(),
            customer_email: user.email.clone(),
            customer_phone: phone_number,
        },
        order_meta: OrderMeta {
            return_url: format!("{}/payment_success?order_id={}", urls.frontend_url, order_id),
            notify_url: format!("{}/payment_webhook", urls.public_base_url),
        },
    };

    let gateway_order = state.cashfree.create_order(&request).await?;
    let cf_order_id = gateway_order.cf_order_id.clone().ok_or_else(|| {
        AppError::BadGateway("Gateway response did not include cf_order_id".to_string())
    })?;

    state
        .payments
        .create_order(&NewPaymentOrder {
            order_id: order_id.clone(),
            cf_order_id: cf_order_id.clone(),
            user_id: user.id,
            amount,
            currency: DEFAULT_CURRENCY.to_string(),
            subscription_type,
            duration_days,
            gateway_response: gateway_order.raw.clone(),
        })
        .await?;

    tracing::info!(user_id = user.id, order_id = %order_id, cf_order_id = %cf_order_id, "Payment order created");

    Ok(Json(CreatePaymentResponse {
        status: "success".to_string(),
        payment_link: state.cashfree.checkout_link(&cf_order_id),
        order_id,
        cf_order_id,
        payment_session_id: gateway_order.payment_session_id,
        amount,
        currency: DEFAULT_CURRENCY.to_string(),
        order_status: gateway_order.order_status,
        order_expiry: gateway_order.order_expiry_time,
        order_details: gateway_order.raw,
    }))
}

/// Credit the order from a paid gateway order. Returns whether this call did the crediting.
async fn complete_paid_order(
    state: &AppState,
    order: &PaymentOrder,
    gateway_order: &GatewayOrder,
    trigger: &'static str,
) -> Result<bool, AppError> {
    let payment = match state.cashfree.get_order_payments(&order.order_id).await {
        Ok(payments) => payments
            .iter()
            .find(|p| p.is_success())
            .or(payments.first())
            .cloned(),
        Err(e) => {
            tracing::warn!(order_id = %order.order_id, error = %e, "Could not fetch payment details");
            None
        }
    };

    let completion = OrderCompletion {
        order_id: order.order_id.clone(),
        payment_status: gateway_order
            .order_status
            .clone()
            .unwrap_or_else(|| "PAID".to_string()),
        payment_method: payment.as_ref().and_then(|p| p.payment_group.clone()),
        transaction_id: payment.as_ref().and_then(|p| p.cf_payment_id.clone()),
        gateway_response: gateway_order.raw.clone(),
        completed_on: Utc::now().date_naive(),
    };

    match state.payments.complete_order(&completion).await? {
        CompletionOutcome::Completed {
            user_id,
            subscription,
            subscription_expiry,
        } => {
            metrics::record_payment_completed(trigger, &subscription);
            tracing::info!(
                order_id = %order.order_id,
                user_id,
                subscription = %subscription,
                subscription_expiry = %subscription_expiry,
                trigger,
                "Subscription credited"
            );
            Ok(true)
        }
        CompletionOutcome::AlreadyCompleted => {
            tracing::info!(order_id = %order.order_id, trigger, "Order already completed");
            Ok(false)
        }
    }
}

/// GET /payment_success?order_id=
pub async fn payment_success(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PaymentSuccessQuery>,
) -> Result<Json<PaymentSuccessResponse>, AppError> {
    let order_id = query
        .order_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("order_id is required")))?;

    let order = state
        .payments
        .find_order(&order_id)
        .await?
        .filter(|order| order.user_id == user.id)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;

    let gateway_order = state.cashfree.get_order(&order_id).await.map_err(|e| {
        tracing::error!(order_id = %order_id, error = %e, "Payment verification failed");
        AppError::BadGateway("Failed to verify payment".to_string())
    })?;

    let processed = if gateway_order.is_paid() {
        complete_paid_order(&state, &order, &gateway_order, "poll").await?
    } else {
        false
    };

    Ok(Json(PaymentSuccessResponse {
        status: "success".to_string(),
        order_id,
        order_status: gateway_order.order_status,
        processed,
    }))
}

/// POST /payment_webhook
///
/// The body is read raw so the signature covers exactly what was sent.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    if state.cashfree.verify_webhooks() {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        let verified = match (header(WEBHOOK_TIMESTAMP_HEADER), header(WEBHOOK_SIGNATURE_HEADER)) {
            (Some(timestamp), Some(signature)) => {
                state
                    .cashfree
                    .verify_webhook_signature(timestamp, &body, signature)
            }
            _ => false,
        };
        if !verified {
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "Invalid webhook signature"
            )));
        }
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid webhook payload: {}", e)))?;

    let order_id = webhook_order_id(&payload)
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing order_id in webhook")))?
        .to_string();

    tracing::info!(
        order_id = %order_id,
        event = %payload.get("type").unwrap_or(&json!(null)),
        "Payment webhook received"
    );

    let order = state
        .payments
        .find_order(&order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Order not found")))?;

    if order.is_completed() {
        return Ok(Json(already_processed()));
    }

    let gateway_order = state.cashfree.get_order(&order_id).await?;

    if !gateway_order.is_paid() {
        return Ok(Json(WebhookResponse {
            status: "pending".to_string(),
            message: "Payment not completed yet".to_string(),
            order_status: gateway_order.order_status,
        }));
    }

    if complete_paid_order(&state, &order, &gateway_order, "webhook").await? {
        Ok(Json(WebhookResponse {
            status: "success".to_string(),
            message: "Payment processed successfully".to_string(),
            order_status: gateway_order.order_status,
        }))
    } else {
        Ok(Json(already_processed()))
    }
}

fn already_processed() -> WebhookResponse {
    WebhookResponse {
        status: "success".to_string(),
        message: "Payment already processed".to_string(),
        order_status: None,
    }
}
