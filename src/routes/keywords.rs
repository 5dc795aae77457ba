use axum::{
    extract::{Path, State},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};

use crate::auth::CurrentUser;
use crate::db::{schema, Database, Embed, Query};
use crate::envelope::SuccessResponse;
use crate::error::{AppError, Result};
use crate::routes::{first_row, user_row};
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_keywords))
        .route("/user", get(user_keywords))
        .route("/user/:keyword_id", post(add_user_keyword).delete(remove_user_keyword))
        .route("/log/:log_id", get(log_keywords))
        .route("/log/:log_id/:keyword_id", post(add_log_keyword))
}

fn keyword_embed() -> Embed {
    Embed::new(schema::KEYWORDS, "keyword_id").columns(&["id", "name", "category"])
}

async fn require_keyword(db: &dyn Database, keyword_id: &str) -> Result<()> {
    db.select_one(&Query::table(schema::KEYWORDS).select(&["id"]).eq("id", keyword_id))
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::not_found("Keyword"))
}

async fn list_keywords(State(state): State<AppState>) -> Result<SuccessResponse<Value>> {
    let rows = state
        .db
        .select(&Query::table(schema::KEYWORDS).order_asc("name"))
        .await?;
    Ok(SuccessResponse::new(json!({ "keywords": rows.rows })))
}

async fn user_keywords(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<SuccessResponse<Value>> {
    let query = Query::table(schema::USER_KEYWORDS)
        .embed(keyword_embed())
        .eq("user_id", user_id.as_str())
        .order_desc("experience_count");
    let rows = state.db.select(&query).await?;
    Ok(SuccessResponse::new(json!({ "user_keywords": rows.rows })))
}

/// Bumps the experience count, creating the pair with a count of one.
pub async fn record_user_keyword(db: &dyn Database, user_id: &str, keyword_id: &str) -> Result<Value> {
    let pair = Query::table(schema::USER_KEYWORDS)
        .eq("user_id", user_id)
        .eq("keyword_id", keyword_id);
    match db.select_one(&pair).await? {
        Some(existing) => {
            let count = existing.get("experience_count").and_then(Value::as_i64).unwrap_or(0);
            let rows = db.update(&pair, json!({ "experience_count": count + 1 })).await?;
            first_row(rows, "User keyword")
        }
        None => {
            db.insert_one(
                schema::USER_KEYWORDS,
                json!({ "user_id": user_id, "keyword_id": keyword_id, "experience_count": 1 }),
            )
            .await
        }
    }
}

async fn add_user_keyword(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(keyword_id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    require_keyword(state.db.as_ref(), &keyword_id).await?;
    let row = record_user_keyword(state.db.as_ref(), &user_id, &keyword_id).await?;
    Ok(SuccessResponse::with_message(
        json!({ "user_keyword": row }),
        "Keyword added successfully",
    ))
}

async fn remove_user_keyword(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(keyword_id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    let removed = state
        .db
        .delete(
            &Query::table(schema::USER_KEYWORDS)
                .eq("user_id", user_id.as_str())
                .eq("keyword_id", keyword_id.as_str()),
        )
        .await?;
    if removed.is_empty() {
        return Err(AppError::not_found("User keyword"));
    }
    Ok(SuccessResponse::with_message(Value::Null, "Keyword removed successfully"))
}

async fn log_keywords(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(log_id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    user_row(state.db.as_ref(), schema::LOGS, &log_id, &user_id, "Log").await?;
    let query = Query::table(schema::LOG_KEYWORDS)
        .embed(keyword_embed())
        .eq("log_id", log_id.as_str());
    let rows = state.db.select(&query).await?;
    Ok(SuccessResponse::new(json!({ "log_keywords": rows.rows })))
}

async fn add_log_keyword(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path((log_id, keyword_id)): Path<(String, String)>,
) -> Result<SuccessResponse<Value>> {
    let db = state.db.as_ref();
    user_row(db, schema::LOGS, &log_id, &user_id, "Log").await?;
    require_keyword(db, &keyword_id).await?;
    let row = db
        .insert_one(
            schema::LOG_KEYWORDS,
            json!({ "log_id": log_id, "keyword_id": keyword_id }),
        )
        .await?;
    Ok(SuccessResponse::with_message(
        json!({ "log_keyword": row }),
        "Keyword added to log successfully",
    ))
}
