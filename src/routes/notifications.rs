use axum::{
    extract::{Path, Query as QueryParams, State},
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::CurrentUser;
use crate::db::{schema, Database, Query};
use crate::envelope::SuccessResponse;
use crate::error::{AppError, Result};
use crate::metrics::{self, MetricName};
use crate::routes::{first_row, now};
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications).post(create_notification))
        .route("/unread-count", get(unread_count))
        .route("/:id/read", patch(mark_read))
}

#[derive(Debug, Deserialize)]
pub struct NotificationFilter {
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Deserialize)]
pub struct NotificationCreate {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

/// Inserts a notification row; shared with the reminder job.
pub async fn notify(db: &dyn Database, user_id: &str, notification: &NotificationCreate) -> Result<Value> {
    let row = db
        .insert_one(
            schema::NOTIFICATIONS,
            json!({
                "user_id": user_id,
                "type": notification.kind,
                "title": notification.title,
                "content": notification.content,
                "link": notification.link,
            }),
        )
        .await?;
    metrics::increment(MetricName::NotificationsCreated, 1);
    Ok(row)
}

async fn list_notifications(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    QueryParams(filter): QueryParams<NotificationFilter>,
) -> Result<SuccessResponse<Value>> {
    if filter.limit == 0 || filter.limit > 100 {
        return Err(AppError::BadRequest("limit must be between 1 and 100".to_string()));
    }
    let mut query = Query::table(schema::NOTIFICATIONS).eq("user_id", user_id.as_str());
    if filter.unread_only {
        query = query.is_null("read_at");
    }
    let rows = state
        .db
        .select(&query.order_desc("created_at").limit(filter.limit))
        .await?;
    Ok(SuccessResponse::new(Value::Array(rows.rows)))
}

async fn unread_count(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<SuccessResponse<Value>> {
    let count = state
        .db
        .count(
            &Query::table(schema::NOTIFICATIONS)
                .eq("user_id", user_id.as_str())
                .is_null("read_at"),
        )
        .await?;
    Ok(SuccessResponse::new(json!({ "count": count })))
}

async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    let rows = state
        .db
        .update(
            &Query::table(schema::NOTIFICATIONS)
                .eq("id", id.as_str())
                .eq("user_id", user_id.as_str()),
            json!({ "read_at": now() }),
        )
        .await?;
    first_row(rows, "Notification")?;
    Ok(SuccessResponse::with_message(json!({}), "알림을 읽음 처리했습니다"))
}

async fn create_notification(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<NotificationCreate>,
) -> Result<SuccessResponse<Value>> {
    let saved = notify(state.db.as_ref(), &user_id, &req).await?;
    Ok(SuccessResponse::with_message(
        json!({ "notification": saved }),
        "알림이 생성되었습니다",
    ))
}
