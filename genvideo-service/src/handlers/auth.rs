//! Signup, signin, logout and the session probe.
//!
//! A user holds at most one live session: the last issued token is stored as
//! `auth_key`, and the guard only accepts that exact token.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use subtle::ConstantTimeEq;

use crate::{
    dtos::auth::{
        LogoutResponse, SessionQuery, SessionRequest, SessionResponse, SigninFailure,
        SigninRequest, SigninResponse, SignupRequest, SignupResponse,
    },
    middleware::{bearer_token, CurrentUser},
    models::{NewUser, User, DEFAULT_SUBSCRIPTION},
    services::{TokenError, TokenPurpose},
    utils::{hash_password, verify_password, Password, PasswordHashString, ValidatedJson},
    AppState,
};
use service_core::error::AppError;

pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// POST /signup
pub async fn signup(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), AppError> {
    if req.password != req.confirm_password {
        return Err(AppError::BadRequest(anyhow::anyhow!("Passwords do not match")));
    }

    let email = req.email.trim().to_string();
    if state.users.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(anyhow::anyhow!("User already exists")));
    }

    let password_hash = hash_password(&Password::new(req.password))?;
    let today = Utc::now().date_naive();

    let new_user = NewUser {
        email,
        password_hash: password_hash.into_string(),
        name: req.name.trim().to_string(),
        subscription: DEFAULT_SUBSCRIPTION.to_string(),
        subscription_expiry: today + Duration::days(state.config.limits.trial_days),
    };

    let user = state.users.create_user(&new_user).await.map_err(|e| match e {
        AppError::Conflict(_) => AppError::Conflict(anyhow::anyhow!("User already exists")),
        other => other,
    })?;

    let token = state.jwt.generate_session_token(user.id)?;
    state.users.set_auth_key(user.id, Some(&token)).await?;

    let email = state.email.clone();
    let (to, name) = (user.email.clone(), user.name.clone());
    tokio::spawn(async move {
        if let Err(e) = email.send_welcome_email(&to, &name).await {
            tracing::warn!(error = %e, "Failed to send welcome email");
        }
    });

    tracing::info!(user_id = user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "User created successfully".to_string(),
            token,
            user: user.sanitized(today),
        }),
    ))
}

/// POST /signin
pub async fn signin(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SigninRequest>,
) -> Result<Response, AppError> {
    let email = req.email.trim();
    if email.is_empty() || req.password.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Email and password are required"
        )));
    }

    let Some(user) = state.users.find_user_by_email(email).await? else {
        return Ok(signin_failure(StatusCode::NOT_FOUND, "User not found", Some(true)));
    };

    if !verify_password(
        &Password::new(req.password),
        &PasswordHashString::new(user.password.clone()),
    ) {
        tracing::info!(user_id = user.id, "Sign-in rejected: wrong password");
        return Ok(signin_failure(StatusCode::UNAUTHORIZED, "Invalid password", None));
    }

    let token = state.jwt.generate_session_token(user.id)?;
    state.users.set_auth_key(user.id, Some(&token)).await?;

    tracing::info!(user_id = user.id, "User signed in");

    Ok(Json(SigninResponse {
        success: true,
        message: "Login successful".to_string(),
        token,
        user: user.sanitized(Utc::now().date_naive()),
    })
    .into_response())
}

fn signin_failure(status: StatusCode, message: &str, needs_signup: Option<bool>) -> Response {
    (
        status,
        Json(SigninFailure {
            success: false,
            message: message.to_string(),
            needs_signup,
        }),
    )
        .into_response()
}

/// POST /logout
pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<LogoutResponse>, AppError> {
    state.users.set_auth_key(user.id, None).await?;
    tracing::info!(user_id = user.id, "User logged out");

    Ok(Json(LogoutResponse {
        success: true,
        message: "Logged out successfully".to_string(),
    }))
}

/// GET /session?email=, or the `X-User-Email` header
pub async fn get_session(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> Result<Json<SessionResponse>, AppError> {
    let email = query.email.or_else(|| {
        headers
            .get(USER_EMAIL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });
    probe_session(&state, email, &headers).await
}

/// POST /session
pub async fn post_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SessionRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    probe_session(&state, req.email, &headers).await
}

async fn probe_session(
    state: &AppState,
    email: Option<String>,
    headers: &HeaderMap,
) -> Result<Json<SessionResponse>, AppError> {
    let email = email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Email is required")))?;

    let user = state
        .users
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    let Some(token) = current_session_token(state, &user, bearer_token(headers)).await? else {
        return Ok(Json(SessionResponse::logged_out()));
    };

    Ok(Json(SessionResponse {
        user: Some(user.sanitized(Utc::now().date_naive())),
        token: Some(token),
        logged_in: true,
    }))
}

/// The caller's token if it is the stored session. An expired but otherwise
/// valid stored token is replaced with a fresh one.
async fn current_session_token(
    state: &AppState,
    user: &User,
    presented: Option<&str>,
) -> Result<Option<String>, AppError> {
    let (Some(stored), Some(presented)) = (user.auth_key.as_deref(), presented) else {
        return Ok(None);
    };

    if !bool::from(stored.as_bytes().ct_eq(presented.as_bytes())) {
        return Ok(None);
    }

    match state.jwt.verify(presented, TokenPurpose::Session) {
        Ok(_) => Ok(Some(presented.to_string())),
        Err(TokenError::Expired) => {
            let claims = match state.jwt.decode_allow_expired(presented) {
                Ok(claims) => claims,
                Err(_) => return Ok(None),
            };
            if claims.user_id != user.id || claims.purpose != TokenPurpose::Session {
                return Ok(None);
            }

            let fresh = state.jwt.generate_session_token(user.id)?;
            state.users.set_auth_key(user.id, Some(&fresh)).await?;
            tracing::info!(user_id = user.id, "Reissued expired session token");
            Ok(Some(fresh))
        }
        Err(TokenError::Invalid) => Ok(None),
    }
}
