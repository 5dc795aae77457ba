//! HTTP handlers, one module per route family, all mounted under `/api`.

pub mod activities;
pub mod ai;
pub mod auth;
pub mod dashboard;
pub mod endorsements;
pub mod evidence;
pub mod health_check;
pub mod keywords;
pub mod logs;
pub mod notifications;
pub mod portfolios;
pub mod projects;
pub mod recommendations;
pub mod reflections;
pub mod search;
pub mod spaces;
pub mod templates;
pub mod users;

use axum::Router;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::db::{Database, Query};
use crate::error::{AppError, Result};
use crate::server::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/spaces", spaces::router())
        .nest("/reflections", reflections::router())
        .nest("/templates", templates::router())
        .nest("/activities", activities::router())
        .nest("/recommendations", recommendations::router())
        .nest("/keywords", keywords::router())
        .nest("/logs", logs::router())
        .nest("/projects", projects::router())
        .nest("/notifications", notifications::router())
        .nest("/dashboard", dashboard::router())
        .nest("/portfolios", portfolios::router())
        .nest("/evidence", evidence::router())
        .nest("/endorsements", endorsements::router())
        .nest("/search", search::router())
        .nest("/ai", ai::router())
        .merge(health_check::router())
}

/// `page`/`limit` query pair used by the list endpoints.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub limit: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

impl PageParams {
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) * self.limit
    }
}

pub(crate) fn now() -> String {
    Utc::now().to_rfc3339()
}

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub(crate) fn str_field<'a>(row: &'a Value, key: &str) -> Option<&'a str> {
    row.get(key).and_then(Value::as_str)
}

/// Takes a JSON body as an object; anything else is a 400.
pub(crate) fn object(body: Value) -> Result<Map<String, Value>> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::BadRequest("request body must be a JSON object".to_string())),
    }
}

/// Row `id` from `table`: 404 when missing, 403 when `owner_column` names someone else.
pub(crate) async fn owned_row(
    db: &dyn Database,
    table: &str,
    id: &str,
    owner_column: &str,
    user_id: &str,
    what: &str,
) -> Result<Value> {
    let row = db
        .select_one(&Query::table(table).eq("id", id))
        .await?
        .ok_or_else(|| AppError::not_found(what))?;
    if str_field(&row, owner_column) != Some(user_id) {
        return Err(AppError::Forbidden(format!("{what} belongs to another user")));
    }
    Ok(row)
}

/// Row `id` scoped to `user_id`; anything else reads as missing.
pub(crate) async fn user_row(
    db: &dyn Database,
    table: &str,
    id: &str,
    user_id: &str,
    what: &str,
) -> Result<Value> {
    db.select_one(&Query::table(table).eq("id", id).eq("user_id", user_id))
        .await?
        .ok_or_else(|| AppError::not_found(what))
}

pub(crate) fn first_row(rows: Vec<Value>, what: &str) -> Result<Value> {
    rows.into_iter().next().ok_or_else(|| AppError::not_found(what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_offsets() {
        let p = PageParams { page: 3, limit: 20 };
        assert_eq!(p.offset(), 40);
        let p = PageParams { page: 0, limit: 20 };
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn non_object_body_is_rejected() {
        assert!(object(json!([1, 2])).is_err());
        assert_eq!(object(json!({"a": 1})).unwrap().len(), 1);
    }
}
