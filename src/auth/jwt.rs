//! HS256 session tokens.
//!
//! Access tokens are short lived and accepted by the identity extractor;
//! refresh tokens only by `/api/auth/refresh`. The `type` claim keeps the
//! two from being swapped.

use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_seconds: i64,
    refresh_seconds: i64,
}

impl TokenService {
    pub fn new(secret: &str, access_minutes: i64, refresh_days: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_seconds: access_minutes * 60,
            refresh_seconds: refresh_days * 24 * 60 * 60,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            config.access_token_minutes,
            config.refresh_token_days,
        )
    }

    fn issue(&self, user_id: &str, email: Option<&str>, token_type: TokenType) -> Result<String> {
        let now = Utc::now().timestamp();
        let ttl = match token_type {
            TokenType::Access => self.access_seconds,
            TokenType::Refresh => self.refresh_seconds,
        };
        let claims = Claims {
            user_id: user_id.to_string(),
            email: email.map(str::to_string),
            token_type,
            iat: now,
            exp: now + ttl,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {e}")))
    }

    pub fn issue_access(&self, user_id: &str, email: Option<&str>) -> Result<String> {
        self.issue(user_id, email, TokenType::Access)
    }

    pub fn issue_pair(&self, user_id: &str, email: Option<&str>) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access(user_id, email)?,
            refresh_token: self.issue(user_id, email, TokenType::Refresh)?,
            token_type: "bearer",
            expires_in: self.access_seconds,
        })
    }

    /// Decodes `token` and checks its signature, expiry and type.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default()).map_err(|err| {
            let message = match err.kind() {
                ErrorKind::ExpiredSignature => "Token expired",
                ErrorKind::InvalidSignature => "Invalid token signature",
                _ => "Invalid token",
            };
            AppError::Unauthorized(message.to_string())
        })?;
        if data.claims.token_type != expected {
            return Err(AppError::Unauthorized("Invalid token type".to_string()));
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("test-secret-with-enough-length-1234", 30, 7)
    }

    #[test]
    fn access_token_round_trip() {
        let tokens = service();
        let pair = tokens.issue_pair("user-1", Some("a@b.c")).unwrap();
        let claims = tokens.verify(&pair.access_token, TokenType::Access).unwrap();
        assert_eq!(claims.user_id, "user-1");
        assert_eq!(claims.email.as_deref(), Some("a@b.c"));
        assert_eq!(claims.exp - claims.iat, 30 * 60);
        assert_eq!(pair.expires_in, 1800);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let tokens = service();
        let pair = tokens.issue_pair("user-1", None).unwrap();
        assert!(tokens.verify(&pair.refresh_token, TokenType::Access).is_err());
        let claims = tokens.verify(&pair.refresh_token, TokenType::Refresh).unwrap();
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 3600);
    }

    #[test]
    fn rejects_foreign_signature() {
        let pair = service().issue_pair("user-1", None).unwrap();
        let other = TokenService::new("a-completely-different-secret-value", 30, 7);
        let err = other.verify(&pair.access_token, TokenType::Access).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn rejects_expired_token() {
        let tokens = TokenService::new("test-secret-with-enough-length-1234", -10, 7);
        let pair = tokens.issue_pair("user-1", None).unwrap();
        let err = tokens.verify(&pair.access_token, TokenType::Access).unwrap_err();
        assert_eq!(err.to_string(), "Token expired");
    }

    #[test]
    fn rejects_garbage() {
        assert!(service().verify("not.a.jwt", TokenType::Access).is_err());
    }
}
