use axum::{
    extract::{FromRequestParts, Query, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use subtle::ConstantTimeEq;

use crate::{
    dtos::{subscription::SubscriptionExpired, videos::MediaTokenQuery},
    models::User,
    services::TokenPurpose,
    AppState,
};

/// The authenticated user, placed in request extensions by `auth_middleware`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolve a session token to its user. The token must still be the one
/// stored for the user; logging out or signing in elsewhere ends it.
async fn authenticate(state: &AppState, token: &str) -> Result<User, AppError> {
    let claims = state
        .jwt
        .verify(token, TokenPurpose::Session)
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid token")))?;

    let user = state
        .users
        .find_user_by_id(claims.user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("User not found")))?;

    let is_current = user
        .auth_key
        .as_deref()
        .map(|stored| bool::from(stored.as_bytes().ct_eq(token.as_bytes())))
        .unwrap_or(false);

    if !is_current {
        tracing::debug!(user_id = user.id, "Rejected superseded session token");
        return Err(AppError::Unauthorized(anyhow::anyhow!("Session has ended")));
    }

    Ok(user)
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Token is missing")))?
        .to_string();

    let user = authenticate(&state, &token).await?;
    tracing::Span::current().record("user_id", user.id);
    req.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(req).await)
}

/// Like `auth_middleware`, but also accepts `?token=` so `<video src>` can authenticate.
pub async fn media_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = match bearer_token(req.headers()) {
        Some(token) => token.to_string(),
        None => Query::<MediaTokenQuery>::try_from_uri(req.uri())
            .ok()
            .and_then(|Query(q)| q.token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Token is missing")))?,
    };

    let user = authenticate(&state, &token).await?;
    req.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(req).await)
}

/// Must run after `auth_middleware`.
pub async fn subscription_middleware(req: Request, next: Next) -> Response {
    let Some(CurrentUser(user)) = req.extensions().get::<CurrentUser>() else {
        return AppError::InternalError(anyhow::anyhow!("Subscription check without auth"))
            .into_response();
    };

    if user.is_subscription_expired(Utc::now().date_naive()) {
        tracing::info!(user_id = user.id, "Blocked request from expired subscription");
        let body = SubscriptionExpired {
            message: "Subscription expired".to_string(),
            subscription_expired: true,
            subscription_expiry: user.subscription_expiry.map(|d| d.to_string()),
        };
        return (StatusCode::FORBIDDEN, Json(body)).into_response();
    }

    next.run(req).await
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "Current user missing from request extensions"
                ))
            })
    }
}
