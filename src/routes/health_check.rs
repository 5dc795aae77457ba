//! Daily condition check-ins on a 0..=100 scale, one per user and day.

use axum::{
    extract::{Query as QueryParams, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::CurrentUser;
use crate::db::{schema, Query};
use crate::error::{AppError, Result};
use crate::routes::{now, today};
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health-check", post(record))
        .route("/health-check/latest", get(latest))
        .route("/health-check/history", get(history))
}

#[derive(Debug, Deserialize)]
pub struct HealthCheckCreate {
    pub health_score: i64,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl HealthCheckCreate {
    pub fn validate(&self) -> Result<()> {
        if !(0..=100).contains(&self.health_score) {
            return Err(AppError::BadRequest(
                "health_score must be between 0 and 100".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_history")]
    pub limit: usize,
}

fn default_history() -> usize {
    30
}

async fn record(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<HealthCheckCreate>,
) -> Result<Json<Value>> {
    req.validate()?;
    let date = req.date.unwrap_or_else(today);
    let rows = state
        .db
        .upsert(
            schema::HEALTH_CHECKS,
            vec![json!({
                "user_id": user_id,
                "health_score": req.health_score,
                "date": date.to_string(),
                "notes": req.notes,
                "updated_at": now(),
            })],
            &["user_id", "date"],
        )
        .await?;
    let saved = rows
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Database("health check upsert returned no rows".to_string()))?;
    Ok(Json(json!({ "success": true, "data": saved })))
}

fn by_date(user_id: &str) -> Query {
    Query::table(schema::HEALTH_CHECKS)
        .eq("user_id", user_id)
        .order_desc("date")
}

async fn latest(State(state): State<AppState>, CurrentUser(user_id): CurrentUser) -> Result<Json<Value>> {
    let row = state.db.select_one(&by_date(&user_id)).await?;
    Ok(Json(json!({ "success": true, "data": row })))
}

async fn history(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    QueryParams(params): QueryParams<HistoryParams>,
) -> Result<Json<Value>> {
    if params.limit == 0 || params.limit > 365 {
        return Err(AppError::BadRequest("limit must be between 1 and 365".to_string()));
    }
    let rows = state.db.select(&by_date(&user_id).limit(params.limit)).await?;
    Ok(Json(json!({ "success": true, "data": rows.rows })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_bounds_are_inclusive() {
        let check = |score| HealthCheckCreate {
            health_score: score,
            date: None,
            notes: None,
        };
        assert!(check(0).validate().is_ok());
        assert!(check(100).validate().is_ok());
        assert!(check(-1).validate().is_err());
        assert!(check(101).validate().is_err());
    }
}
