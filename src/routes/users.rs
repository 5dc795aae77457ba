use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::Value;

use crate::auth::CurrentUser;
use crate::db::{schema, Database, Query};
use crate::error::{AppError, Result};
use crate::routes::{first_row, object};
use crate::server::AppState;

/// Columns a client may never read back or write directly.
const PROTECTED_COLUMNS: &[&str] = &["id", "password", "password_hash", "created_at"];

pub fn router() -> Router<AppState> {
    Router::new().route("/me", get(get_me).patch(update_me))
}

fn without_secrets(mut user: Value) -> Value {
    if let Value::Object(map) = &mut user {
        map.remove("password_hash");
        map.remove("password");
    }
    user
}

async fn get_me(State(state): State<AppState>, CurrentUser(user_id): CurrentUser) -> Result<Json<Value>> {
    let user = state
        .db
        .select_one(&Query::table(schema::USERS).eq("id", user_id.as_str()))
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    Ok(Json(without_secrets(user)))
}

/// 409 when another account already uses `email`.
async fn ensure_email_free(db: &dyn Database, email: &str, user_id: &str) -> Result<()> {
    let taken = db
        .select_one(
            &Query::table(schema::USERS)
                .select(&["id"])
                .eq("email", email)
                .neq("id", user_id),
        )
        .await?;
    if taken.is_some() {
        return Err(AppError::rejected(
            StatusCode::CONFLICT,
            "EMAIL_ALREADY_EXISTS",
            "이미 존재하는 이메일입니다.",
        ));
    }
    Ok(())
}

async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let mut patch = object(body)?;
    for column in PROTECTED_COLUMNS {
        patch.remove(*column);
    }
    if let Some(email) = patch.get("email").and_then(Value::as_str) {
        ensure_email_free(state.db.as_ref(), email, &user_id).await?;
    }
    let rows = state
        .db
        .update(&Query::table(schema::USERS).eq("id", user_id.as_str()), Value::Object(patch))
        .await?;
    Ok(Json(without_secrets(first_row(rows, "User")?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn secrets_are_stripped() {
        let user = without_secrets(json!({"id": "u", "email": "a@b.c", "password_hash": "$argon2"}));
        assert!(user.get("password_hash").is_none());
        assert_eq!(user["email"], "a@b.c");
    }
}
