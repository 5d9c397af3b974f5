use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::SanitizedUser;

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,

    #[serde(rename = "confirmPassword")]
    pub confirm_password: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub message: String,
    pub token: String,
    pub user: SanitizedUser,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SigninResponse {
    pub success: bool,
    pub message: String,
    pub token: String,
    pub user: SanitizedUser,
}

/// Body of a rejected sign-in; `needsSignup` tells the client to offer registration.
#[derive(Debug, Serialize)]
pub struct SigninFailure {
    pub success: bool,
    pub message: String,
    #[serde(rename = "needsSignup", skip_serializing_if = "Option::is_none")]
    pub needs_signup: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionRequest {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: Option<SanitizedUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub logged_in: bool,
}

impl SessionResponse {
    pub fn logged_out() -> Self {
        Self {
            user: None,
            token: None,
            logged_in: false,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}
