//! JWT access tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::models::{Role, User};

/// Issuer written into and required on every token.
pub const TOKEN_ISSUER: &str = "taskforge";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("failed to encode token: {0}")]
    Encoding(String),
    #[error("invalid or expired token")]
    Invalid,
}

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    pub role: Role,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and validates access tokens with one HMAC secret.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_hours: i64,
}

impl std::fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKeys")
            .field("ttl_hours", &self.ttl_hours)
            .finish_non_exhaustive()
    }
}

impl TokenKeys {
    pub fn new(secret: &[u8], ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_hours,
        }
    }

    /// Issue an access token for `user`.
    pub fn issue(&self, user: &User) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            role: user.role,
            iss: TOKEN_ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(self.ttl_hours)).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    /// Validate signature, issuer and expiry.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[TOKEN_ISSUER]);

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("token rejected: {}", e);
                TokenError::Invalid
            })
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_hours * 3600
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: "u-1".into(),
            email: "dev@example.com".into(),
            first_name: "Dana".into(),
            last_name: "Dev".into(),
            role: Role::Developer,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_issue_and_validate() {
        let keys = TokenKeys::new(b"test-secret-key-long-enough", 24);
        let token = keys.issue(&user()).unwrap();

        let claims = keys.validate(&token).unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.role, Role::Developer);
        assert_eq!(claims.iss, TOKEN_ISSUER);
        assert_eq!(claims.exp - claims.iat, keys.ttl_seconds());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = TokenKeys::new(b"secret-one", 1).issue(&user()).unwrap();
        assert!(TokenKeys::new(b"secret-two", 1).validate(&token).is_err());
    }

    #[test]
    fn test_garbage_is_rejected() {
        let keys = TokenKeys::new(b"secret", 1);
        assert!(matches!(keys.validate("not-a-jwt"), Err(TokenError::Invalid)));
    }
}
