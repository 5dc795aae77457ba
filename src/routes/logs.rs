//! Experience logs attached to projects.

use axum::{
    extract::{Path, Query as QueryParams, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::auth::CurrentUser;
use crate::db::{schema, Query};
use crate::envelope::SuccessResponse;
use crate::error::{AppError, Result};
use crate::routes::{first_row, user_row, PageParams};
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_logs).post(create_log))
        .route("/:id", get(get_log).patch(update_log).delete(delete_log))
}

#[derive(Debug, Deserialize)]
pub struct LogCreate {
    #[serde(default)]
    pub project_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reflection: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LogUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct LogFilter {
    pub project_id: Option<String>,
    pub period: Option<String>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_page() -> usize {
    1
}

fn default_limit() -> usize {
    10
}

async fn create_log(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(log): Json<LogCreate>,
) -> Result<SuccessResponse<Value>> {
    let row = json!({
        "user_id": user_id,
        "project_id": log.project_id,
        "title": log.title,
        "content": log.content,
        "reflection": log.reflection,
        "date": log.date.map(|d| d.to_string()),
        "period": log.period,
        "tags": log.tags,
    });
    let saved = state.db.insert_one(schema::LOGS, row).await?;
    Ok(SuccessResponse::with_message(json!({ "log": saved }), "Log created successfully"))
}

async fn list_logs(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    QueryParams(filter): QueryParams<LogFilter>,
) -> Result<SuccessResponse<Value>> {
    if filter.page == 0 || filter.limit == 0 || filter.limit > 100 {
        return Err(AppError::BadRequest("page must be >= 1 and limit 1..=100".to_string()));
    }
    let page = PageParams {
        page: filter.page,
        limit: filter.limit,
    };
    let mut query = Query::table(schema::LOGS)
        .eq("user_id", user_id.as_str())
        .with_count();
    if let Some(project_id) = filter.project_id {
        query = query.eq("project_id", project_id);
    }
    if let Some(period) = filter.period {
        query = query.eq("period", period);
    }
    let rows = state
        .db
        .select(&query.order_desc("created_at").range(page.offset(), page.limit))
        .await?;
    Ok(SuccessResponse::new(json!({
        "logs": rows.rows,
        "total": rows.count.unwrap_or(0),
        "page": page.page,
        "limit": page.limit,
    })))
}

async fn get_log(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    let log = user_row(state.db.as_ref(), schema::LOGS, &id, &user_id, "Log").await?;
    Ok(SuccessResponse::new(json!({ "log": log })))
}

async fn update_log(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    Json(update): Json<LogUpdate>,
) -> Result<SuccessResponse<Value>> {
    let patch = serde_json::to_value(&update)?;
    if patch.as_object().map_or(true, Map::is_empty) {
        return Err(AppError::BadRequest("nothing to update".to_string()));
    }
    let rows = state
        .db
        .update(
            &Query::table(schema::LOGS)
                .eq("id", id.as_str())
                .eq("user_id", user_id.as_str()),
            patch,
        )
        .await?;
    Ok(SuccessResponse::with_message(
        json!({ "log": first_row(rows, "Log")? }),
        "Log updated successfully",
    ))
}

async fn delete_log(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    let rows = state
        .db
        .delete(
            &Query::table(schema::LOGS)
                .eq("id", id.as_str())
                .eq("user_id", user_id.as_str()),
        )
        .await?;
    first_row(rows, "Log")?;
    Ok(SuccessResponse::with_message(Value::Null, "Log deleted successfully"))
}
