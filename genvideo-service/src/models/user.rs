use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Tier assigned on signup.
pub const DEFAULT_SUBSCRIPTION: &str = "free";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    /// Argon2 PHC string, never the plaintext
    pub password: String,
    pub name: String,
    pub subscription: String,
    pub subscription_expiry: Option<NaiveDate>,
    pub auth_key: Option<String>,
    pub reset_token: Option<String>,
    pub reset_token_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// A subscription without an expiry date never lapses.
    pub fn is_subscription_expired(&self, today: NaiveDate) -> bool {
        self.subscription_expiry
            .map(|expiry| expiry < today)
            .unwrap_or(false)
    }

    /// Paid tier that has not lapsed.
    pub fn is_pro(&self, today: NaiveDate) -> bool {
        self.subscription_expiry.is_some()
            && !self.is_subscription_expired(today)
            && self.subscription != DEFAULT_SUBSCRIPTION
    }

    pub fn sanitized(&self, today: NaiveDate) -> SanitizedUser {
        SanitizedUser {
            id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
            subscription: self.subscription.clone(),
            subscription_expiry: self.subscription_expiry.map(|d| d.to_string()),
            subscription_expired: self.is_subscription_expired(today),
        }
    }
}

/// Public view of a user as returned by the auth endpoints.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SanitizedUser {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub subscription: String,
    pub subscription_expiry: Option<String>,
    pub subscription_expired: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub subscription: String,
    pub subscription_expiry: NaiveDate,
}
