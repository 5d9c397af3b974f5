use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::config::JwtConfig;
use crate::services::ServiceError;

/// What a token may be used for. A reset token never opens a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenPurpose {
    Session,
    Reset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    pub purpose: TokenPurpose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    Expired,
    Invalid,
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ServiceError::TokenExpired,
            TokenError::Invalid => ServiceError::InvalidToken,
        }
    }
}

/// HS256 token issuer for sessions and password resets
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    session_expiry_seconds: i64,
    reset_expiry_hours: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();

        tracing::info!("JWT service initialized with HS256 secret");

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            session_expiry_seconds: config.expiration_seconds,
            reset_expiry_hours: config.reset_token_expiry_hours,
        }
    }

    pub fn reset_expiry(&self) -> Duration {
        Duration::hours(self.reset_expiry_hours)
    }

    pub fn generate_session_token(&self, user_id: i64) -> Result<String, ServiceError> {
        self.issue(
            user_id,
            TokenPurpose::Session,
            Duration::seconds(self.session_expiry_seconds),
        )
    }

    pub fn generate_reset_token(&self, user_id: i64) -> Result<String, ServiceError> {
        self.issue(user_id, TokenPurpose::Reset, self.reset_expiry())
    }

    fn issue(
        &self,
        user_id: i64,
        purpose: TokenPurpose,
        lifetime: Duration,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = Claims {
            user_id,
            exp: (now + lifetime).timestamp(),
            iat: now.timestamp(),
            purpose,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to encode token: {}", e)))
    }

    /// Decode a token and check both its signature and its purpose.
    pub fn verify(&self, token: &str, purpose: TokenPurpose) -> Result<Claims, TokenError> {
        let claims = self.decode(token, true)?;
        if claims.purpose != purpose {
            return Err(TokenError::Invalid);
        }
        Ok(claims)
    }

    /// Decode a correctly signed token even if it has expired.
    pub fn decode_allow_expired(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode(token, false)
    }

    fn decode(&self, token: &str, validate_exp: bool) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = validate_exp;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn service(expiration_seconds: i64) -> JwtService {
        JwtService::new(&JwtConfig {
            secret: Secret::new("test-secret-key-that-is-long-enough".to_string()),
            expiration_seconds,
            reset_token_expiry_hours: 1,
        })
    }

    #[test]
    fn test_session_token_lifetime_matches_config() {
        let jwt = service(3600);
        let token = jwt.generate_session_token(7).unwrap();
        let claims = jwt.verify(&token, TokenPurpose::Session).unwrap();

        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_reset_token_is_not_a_session_token() {
        let jwt = service(3600);
        let token = jwt.generate_reset_token(7).unwrap();

        assert_eq!(
            jwt.verify(&token, TokenPurpose::Session).unwrap_err(),
            TokenError::Invalid
        );
        let claims = jwt.verify(&token, TokenPurpose::Reset).unwrap();
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_expired_token() {
        let jwt = service(-10);
        let token = jwt.generate_session_token(1).unwrap();

        assert_eq!(
            jwt.verify(&token, TokenPurpose::Session).unwrap_err(),
            TokenError::Expired
        );
        assert_eq!(jwt.decode_allow_expired(&token).unwrap().user_id, 1);
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let token = service(60).generate_session_token(1).unwrap();
        let other = JwtService::new(&JwtConfig {
            secret: Secret::new("a-completely-different-secret-value".to_string()),
            expiration_seconds: 60,
            reset_token_expiry_hours: 1,
        });

        assert_eq!(
            other.verify(&token, TokenPurpose::Session).unwrap_err(),
            TokenError::Invalid
        );
        assert_eq!(
            other.verify("not-a-jwt", TokenPurpose::Session).unwrap_err(),
            TokenError::Invalid
        );
    }
}
