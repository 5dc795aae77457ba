//! Request identity.
//!
//! The frontend proxy forwards the signed-in user as `x-user-id`; direct
//! clients send `Authorization: Bearer <access token>`.

pub mod jwt;
pub mod password;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderMap};

use crate::error::AppError;
use crate::server::AppState;

pub use jwt::{Claims, TokenPair, TokenService, TokenType};
pub use password::{hash_password, verify_password};

pub const USER_ID_HEADER: &str = "x-user-id";

/// Id of the user making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub String);

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves the caller from headers: forwarded id first, then a bearer access token.
pub fn resolve_user(headers: &HeaderMap, tokens: &TokenService, trust_header: bool) -> Result<String, AppError> {
    if trust_header {
        if let Some(id) = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return Ok(id.to_string());
        }
    }
    if let Some(token) = bearer_token(headers) {
        let claims = tokens.verify(token, TokenType::Access)?;
        return Ok(claims.user_id);
    }
    Err(AppError::Unauthorized(
        "인증이 필요합니다. Authorization 헤더 또는 x-user-id를 제공해주세요.".to_string(),
    ))
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        resolve_user(
            &parts.headers,
            &state.tokens,
            state.config.auth.trust_user_id_header,
        )
        .map(CurrentUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn tokens() -> TokenService {
        TokenService::new("extractor-test-secret-0123456789", 30, 7)
    }

    #[test]
    fn forwarded_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("u-42"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer junk"));
        assert_eq!(resolve_user(&headers, &tokens(), true).unwrap(), "u-42");
    }

    #[test]
    fn untrusted_header_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("u-42"));
        let err = resolve_user(&headers, &tokens(), false).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn bearer_access_token_resolves() {
        let service = tokens();
        let pair = service.issue_pair("u-7", None).unwrap();
        let mut headers = HeaderMap::new();
        let value = format!("Bearer {}", pair.access_token);
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        assert_eq!(resolve_user(&headers, &service, true).unwrap(), "u-7");

        let value = format!("Bearer {}", pair.refresh_token);
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        assert!(resolve_user(&headers, &service, true).is_err());
    }

    #[test]
    fn missing_credentials_are_unauthorized() {
        let err = resolve_user(&HeaderMap::new(), &tokens(), true).unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
    }
}
