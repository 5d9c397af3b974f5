use axum::{extract::State, Json};
use chrono::Utc;
use subtle::ConstantTimeEq;

use crate::{
    dtos::{
        auth::{ForgotPasswordRequest, ResetPasswordRequest},
        MessageResponse,
    },
    services::{TokenError, TokenPurpose},
    utils::{hash_password, Password, ValidatedJson},
    AppState,
};
use service_core::error::AppError;

const RESET_REQUESTED_MESSAGE: &str = "If the email exists, a reset link will be sent";

fn token_expired() -> AppError {
    AppError::BadRequest(anyhow::anyhow!("Token expired"))
}

fn invalid_token() -> AppError {
    AppError::BadRequest(anyhow::anyhow!("Invalid token"))
}

/// POST /forgot-password
///
/// Answers the same way for known and unknown addresses.
pub async fn forgot_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let email = req.email.trim();
    if email.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("Email is required")));
    }

    let Some(user) = state.users.find_user_by_email(email).await? else {
        tracing::debug!("Password reset requested for unknown email");
        return Ok(Json(MessageResponse::new(RESET_REQUESTED_MESSAGE)));
    };

    let token = state.jwt.generate_reset_token(user.id)?;
    let expires_at = Utc::now() + state.jwt.reset_expiry();
    state
        .users
        .set_reset_token(user.id, &token, expires_at)
        .await?;

    let reset_url = format!(
        "{}/reset-password?token={}",
        state.config.urls.frontend_url, token
    );
    state
        .email
        .send_password_reset_email(&user.email, &reset_url)
        .await?;

    tracing::info!(user_id = user.id, "Password reset email sent");

    Ok(Json(MessageResponse::new(RESET_REQUESTED_MESSAGE)))
}

/// POST /reset-password
pub async fn reset_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    if req.token.is_empty() || req.new_password.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Token and new password are required"
        )));
    }

    let claims = state
        .jwt
        .verify(&req.token, TokenPurpose::Reset)
        .map_err(|e| match e {
            TokenError::Expired => token_expired(),
            TokenError::Invalid => invalid_token(),
        })?;

    let user = state
        .users
        .find_user_by_id(claims.user_id)
        .await?
        .ok_or_else(invalid_token)?;

    let matches_stored = user
        .reset_token
        .as_deref()
        .map(|stored| bool::from(stored.as_bytes().ct_eq(req.token.as_bytes())))
        .unwrap_or(false);
    if !matches_stored {
        return Err(invalid_token());
    }

    if user
        .reset_token_expiry
        .map(|expiry| expiry < Utc::now())
        .unwrap_or(true)
    {
        return Err(token_expired());
    }

    let password_hash = hash_password(&Password::new(req.new_password))?;
    state
        .users
        .complete_password_reset(user.id, password_hash.as_str())
        .await?;

    tracing::info!(user_id = user.id, "Password reset completed");

    Ok(Json(MessageResponse::new(
        "Password has been reset successfully",
    )))
}
