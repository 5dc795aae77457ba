//! Public activity catalogue and the profile-based recommendation list.

use axum::{
    extract::{Path, Query as QueryParams, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::CurrentUser;
use crate::db::{schema, Query};
use crate::error::{AppError, Result};
use crate::insights;
use crate::server::AppState;

/// Upper bound on activities scored per recommendation request.
const RECOMMEND_POOL: usize = 100;
const MAX_PAGE: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_activities))
        .route("/recommend", get(recommend_activities))
        .route("/:id", get(get_activity))
        .route("/:id/view", post(increment_view))
}

#[derive(Debug, Deserialize)]
pub struct ActivityFilter {
    pub category: Option<String>,
    pub field: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Deserialize)]
pub struct RecommendParams {
    #[serde(default = "default_recommend_limit")]
    pub limit: usize,
}

fn default_recommend_limit() -> usize {
    10
}

/// `field` and `required_skills` always come back as arrays.
pub fn normalize_activity(mut activity: Value) -> Value {
    if let Value::Object(map) = &mut activity {
        for key in ["field", "required_skills"] {
            let list = insights::string_list(map.get(key));
            map.insert(key.to_string(), json!(list));
        }
    }
    activity
}

async fn list_activities(
    State(state): State<AppState>,
    QueryParams(filter): QueryParams<ActivityFilter>,
) -> Result<Json<Value>> {
    let mut query = Query::table(schema::ACTIVITIES);
    if let Some(category) = filter.category {
        query = query.eq("category", category);
    }
    if let Some(field) = filter.field {
        query = query.contains("field", [field]);
    }
    if let Some(search) = filter.search.filter(|s| !s.trim().is_empty()) {
        query = query.ilike("title", format!("%{}%", search.trim()));
    }
    query = match filter.sort.as_deref() {
        Some("deadline") => query.order_asc("application_end_date"),
        Some("popular") => query.order_desc("view_count"),
        _ => query.order_desc("created_at"),
    };
    let rows = state
        .db
        .select(&query.range(filter.offset, filter.limit.clamp(1, MAX_PAGE)))
        .await?;
    let activities: Vec<Value> = rows.rows.into_iter().map(normalize_activity).collect();
    Ok(Json(Value::Array(activities)))
}

async fn get_activity(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    let activity = state
        .db
        .select_one(&Query::table(schema::ACTIVITIES).eq("id", id.as_str()))
        .await?
        .ok_or_else(|| AppError::not_found("Activity"))?;
    Ok(Json(normalize_activity(activity)))
}

async fn recommend_activities(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    QueryParams(params): QueryParams<RecommendParams>,
) -> Result<Json<Value>> {
    let profile = state
        .db
        .select_one(
            &Query::table(schema::USERS)
                .select(&["interests", "skills"])
                .eq("id", user_id.as_str()),
        )
        .await?;
    let interests = insights::string_list(profile.as_ref().and_then(|p| p.get("interests")));
    let skills = insights::string_list(profile.as_ref().and_then(|p| p.get("skills")));

    let pool = state
        .db
        .select(&Query::table(schema::ACTIVITIES).limit(RECOMMEND_POOL))
        .await?
        .rows;
    let mut ranked = insights::recommend_for_profile(&interests, &skills, pool);
    ranked.truncate(params.limit.clamp(1, MAX_PAGE));
    Ok(Json(Value::Array(ranked)))
}

async fn increment_view(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>> {
    let activity = state
        .db
        .select_one(
            &Query::table(schema::ACTIVITIES)
                .select(&["id", "view_count"])
                .eq("id", id.as_str()),
        )
        .await?
        .ok_or_else(|| AppError::not_found("Activity"))?;
    let views = activity.get("view_count").and_then(Value::as_i64).unwrap_or(0) + 1;
    state
        .db
        .update(
            &Query::table(schema::ACTIVITIES).eq("id", id.as_str()),
            json!({ "view_count": views }),
        )
        .await?;
    Ok(Json(json!({ "view_count": views })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_columns_become_lists() {
        let activity = normalize_activity(json!({"field": "IT", "required_skills": null}));
        assert_eq!(activity["field"], json!(["IT"]));
        assert_eq!(activity["required_skills"], json!([]));
    }
}
