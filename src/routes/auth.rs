//! Account registration and token exchange.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::auth::{hash_password, verify_password, CurrentUser, TokenType};
use crate::db::{schema, Query};
use crate::envelope::{Envelope, EnvelopeResult};
use crate::error::AppError;
use crate::routes::str_field;
use crate::server::AppState;

const BAD_CREDENTIALS: &str = "이메일 또는 비밀번호가 올바르지 않습니다.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh", post(refresh))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub university: Option<String>,
    #[serde(default)]
    pub major: Option<String>,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub target_job: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub name: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
}

fn check_email(email: &str) -> Result<(), AppError> {
    let valid = email
        .split_once('@')
        .map_or(false, |(local, domain)| !local.is_empty() && domain.contains('.'));
    if valid {
        Ok(())
    } else {
        Err(AppError::validation("INVALID_EMAIL", "올바른 이메일 형식이 아닙니다."))
    }
}

fn session(state: &AppState, user: &Value) -> Result<Session, AppError> {
    let user_id = str_field(user, "id")
        .ok_or_else(|| AppError::Internal("user row without id".to_string()))?
        .to_string();
    let email = str_field(user, "email").unwrap_or_default().to_string();
    let pair = state.tokens.issue_pair(&user_id, Some(&email))?;
    Ok(Session {
        user_id,
        email,
        name: str_field(user, "name").map(str::to_string),
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    })
}

#[instrument(skip(state, req), fields(email = %req.email))]
async fn register(State(state): State<AppState>, Json(req): Json<RegisterRequest>) -> EnvelopeResult<Session> {
    check_email(&req.email)?;
    let existing = state
        .db
        .select_one(&Query::table(schema::USERS).select(&["id"]).eq("email", req.email.as_str()))
        .await?;
    if existing.is_some() {
        return Err(AppError::rejected(
            StatusCode::CONFLICT,
            "EMAIL_ALREADY_EXISTS",
            "이미 존재하는 이메일입니다.",
        )
        .into());
    }

    let user = state
        .db
        .insert_one(
            schema::USERS,
            json!({
                "email": req.email,
                "password_hash": hash_password(&req.password)?,
                "name": req.name,
                "university": req.university,
                "major": req.major,
                "student_id": req.student_id,
                "target_job": req.target_job,
            }),
        )
        .await?;
    let session = session(&state, &user)?;
    info!(user_id = %session.user_id, "Registered user");
    Ok(Envelope::ok(session))
}

#[instrument(skip(state, req), fields(email = %req.email))]
async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> EnvelopeResult<Session> {
    let rejected = || AppError::rejected(StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS", BAD_CREDENTIALS);
    let user = state
        .db
        .select_one(&Query::table(schema::USERS).eq("email", req.email.as_str()))
        .await?
        .ok_or_else(rejected)?;
    let hash = str_field(&user, "password_hash").ok_or_else(rejected)?;
    if !verify_password(&req.password, hash)? {
        return Err(rejected().into());
    }
    Ok(Envelope::ok(session(&state, &user)?))
}

/// Tokens are stateless; the client discards them.
async fn logout(user: Result<CurrentUser, AppError>) -> EnvelopeResult<Value> {
    let CurrentUser(user_id) = user?;
    info!(%user_id, "User logged out");
    Ok(Envelope {
        success: true,
        data: None,
        error: None,
    })
}

async fn refresh(State(state): State<AppState>, Json(req): Json<RefreshRequest>) -> EnvelopeResult<Value> {
    let claims = state
        .tokens
        .verify(&req.refresh_token, TokenType::Refresh)
        .map_err(|_| {
            AppError::rejected(StatusCode::UNAUTHORIZED, "INVALID_TOKEN", "유효하지 않은 토큰입니다.")
        })?;
    let user = state
        .db
        .select_one(&Query::table(schema::USERS).select(&["email"]).eq("id", claims.user_id.as_str()))
        .await?
        .ok_or_else(|| {
            AppError::rejected(StatusCode::NOT_FOUND, "USER_NOT_FOUND", "사용자를 찾을 수 없습니다.")
        })?;
    let access = state
        .tokens
        .issue_access(&claims.user_id, str_field(&user, "email"))?;
    Ok(Envelope::ok(json!({ "accessToken": access })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape_is_checked() {
        assert!(check_email("kim@proof.kr").is_ok());
        assert!(check_email("kim@localhost").is_err());
        assert!(check_email("@proof.kr").is_err());
        assert!(check_email("proof.kr").is_err());
    }

    #[test]
    fn register_accepts_camel_case() {
        let req: RegisterRequest = serde_json::from_value(json!({
            "email": "a@b.co",
            "password": "pw",
            "name": "Kim",
            "studentId": "2020",
        }))
        .unwrap();
        assert_eq!(req.student_id.as_deref(), Some("2020"));
        assert!(req.university.is_none());
    }
}
