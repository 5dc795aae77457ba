//! Reflection spaces: containers that collect reflections on a cadence.

use axum::{
    extract::{Path, Query as QueryParams, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::info;

use crate::auth::CurrentUser;
use crate::cadence::{self, ReflectionCycle};
use crate::db::{schema, Query};
use crate::error::{AppError, Result};
use crate::routes::{first_row, object, str_field, today, user_row};
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_spaces).post(create_space))
        .route("/recommend-cycle", post(recommend_cycle))
        .route("/:id", get(get_space).patch(update_space).delete(complete_space))
        .route("/:id/stats", get(space_stats))
        .route("/:id/members", get(list_members).post(add_member))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateSpace {
    pub name: String,
    #[serde(rename = "type")]
    pub space_type: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reflection_cycle: String,
    #[serde(default = "default_true")]
    pub reminder_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct SpaceFilter {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub space_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CycleRequest {
    #[serde(rename = "type")]
    pub space_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct NewMember {
    pub user_id: String,
    #[serde(default)]
    pub role: Option<String>,
}

async fn create_space(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<CreateSpace>,
) -> Result<Json<Value>> {
    if req.end_date < req.start_date {
        return Err(AppError::validation(
            "INVALID_DATE_RANGE",
            "종료일은 시작일 이후여야 합니다",
        ));
    }
    let cycle: ReflectionCycle = req.reflection_cycle.parse()?;
    let next = cadence::next_reflection_date(req.start_date, cycle, today());
    let expected = cadence::expected_reflections(req.start_date, req.end_date, cycle);

    let row = json!({
        "user_id": user_id,
        "name": req.name,
        "type": req.space_type,
        "description": req.description,
        "start_date": req.start_date.to_string(),
        "end_date": req.end_date.to_string(),
        "reflection_cycle": cycle.as_str(),
        "reminder_enabled": req.reminder_enabled,
        "next_reflection_date": next.to_string(),
        "expected_reflections": expected,
        "total_reflections": 0,
        "status": "active",
    });
    let space = state.db.insert_one(schema::REFLECTION_SPACES, row).await?;
    info!(user_id = %user_id, cycle = %cycle, "Created reflection space");
    Ok(Json(space))
}

async fn list_spaces(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    QueryParams(filter): QueryParams<SpaceFilter>,
) -> Result<Json<Value>> {
    let mut query = Query::table(schema::REFLECTION_SPACES).eq("user_id", user_id.as_str());
    if let Some(status) = filter.status {
        query = query.eq("status", status);
    }
    if let Some(space_type) = filter.space_type {
        query = query.eq("type", space_type);
    }
    let rows = state.db.select(&query.order_desc("created_at")).await?;
    Ok(Json(Value::Array(rows.rows)))
}

async fn get_space(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let space = user_row(state.db.as_ref(), schema::REFLECTION_SPACES, &id, &user_id, "Space").await?;
    Ok(Json(space))
}

/// Strips columns a client may not set and recomputes the due date when the cycle changes.
fn space_patch(space: &Value, body: Value) -> Result<Map<String, Value>> {
    let mut patch = object(body)?;
    for column in ["id", "user_id", "created_at"] {
        patch.remove(column);
    }
    if let Some(cycle) = patch.get("reflection_cycle").and_then(Value::as_str) {
        let cycle: ReflectionCycle = cycle.parse()?;
        let start = str_field(space, "start_date")
            .and_then(cadence::parse_day)
            .unwrap_or_else(today);
        let next = cadence::next_reflection_date(start, cycle, today());
        patch.insert("next_reflection_date".into(), json!(next.to_string()));
    }
    Ok(patch)
}

async fn update_space(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let space = user_row(state.db.as_ref(), schema::REFLECTION_SPACES, &id, &user_id, "Space").await?;
    let patch = space_patch(&space, body)?;
    let rows = state
        .db
        .update(
            &Query::table(schema::REFLECTION_SPACES)
                .eq("id", id.as_str())
                .eq("user_id", user_id.as_str()),
            Value::Object(patch),
        )
        .await?;
    Ok(Json(first_row(rows, "Space")?))
}

/// Spaces are never hard-deleted; they are marked completed.
async fn complete_space(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let rows = state
        .db
        .update(
            &Query::table(schema::REFLECTION_SPACES)
                .eq("id", id.as_str())
                .eq("user_id", user_id.as_str()),
            json!({ "status": "completed" }),
        )
        .await?;
    first_row(rows, "Space")?;
    Ok(Json(json!({ "message": "스페이스가 완료 처리되었습니다" })))
}

async fn recommend_cycle(CurrentUser(_): CurrentUser, Json(req): Json<CycleRequest>) -> Result<Json<Value>> {
    let cycle = cadence::recommend_cycle(&req.space_type, req.start_date, req.end_date);
    let expected = cadence::expected_reflections(req.start_date, req.end_date, cycle);
    Ok(Json(json!({
        "recommended_cycle": cycle.as_str(),
        "expected_reflections": expected,
        "reason": format!("{} 활동에 최적화된 주기입니다", req.space_type),
    })))
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Completion and mood statistics over the reflections filed in a space.
pub fn space_statistics(space: &Value, reflections: &[Value]) -> Value {
    let expected_raw = space.get("expected_reflections").and_then(Value::as_i64).unwrap_or(0);
    if reflections.is_empty() {
        return json!({
            "total_reflections": 0,
            "expected_reflections": expected_raw,
            "completion_rate": 0,
            "avg_progress_score": 0,
            "mood_distribution": {},
            "avg_sentiment": 0,
        });
    }

    let total = reflections.len();
    let expected = if expected_raw > 0 { expected_raw } else { 1 };
    let completion_rate = ((total as f64 / expected as f64) * 100.0) as i64;

    let progress_sum: f64 = reflections
        .iter()
        .filter_map(|r| r.get("progress_score").and_then(Value::as_f64))
        .sum();

    let mut moods: BTreeMap<String, usize> = BTreeMap::new();
    for r in reflections {
        let mood = str_field(r, "mood").unwrap_or("unknown").to_string();
        *moods.entry(mood).or_default() += 1;
    }

    let sentiments: Vec<f64> = reflections
        .iter()
        .filter_map(|r| r.get("ai_sentiment_score").and_then(Value::as_f64))
        .filter(|s| *s != 0.0)
        .collect();
    let avg_sentiment = if sentiments.is_empty() {
        0.0
    } else {
        sentiments.iter().sum::<f64>() / sentiments.len() as f64
    };

    json!({
        "total_reflections": total,
        "expected_reflections": expected,
        "completion_rate": completion_rate.min(100),
        "avg_progress_score": round2(progress_sum / total as f64),
        "mood_distribution": moods,
        "avg_sentiment": round2(avg_sentiment),
    })
}

async fn space_stats(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let space = user_row(state.db.as_ref(), schema::REFLECTION_SPACES, &id, &user_id, "Space").await?;
    let reflections = state
        .db
        .select(
            &Query::table(schema::REFLECTIONS)
                .select(&["mood", "progress_score", "ai_sentiment_score"])
                .eq("space_id", id.as_str()),
        )
        .await?;
    Ok(Json(space_statistics(&space, &reflections.rows)))
}

async fn list_members(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let space = state
        .db
        .select_one(&Query::table(schema::REFLECTION_SPACES).eq("id", id.as_str()))
        .await?
        .ok_or_else(|| AppError::not_found("Space"))?;
    let members = state
        .db
        .select(&Query::table(schema::SPACE_MEMBERS).eq("space_id", id.as_str()).order_asc("created_at"))
        .await?
        .rows;

    let is_owner = str_field(&space, "user_id") == Some(user_id.as_str());
    let is_member = members.iter().any(|m| str_field(m, "user_id") == Some(user_id.as_str()));
    if !is_owner && !is_member {
        return Err(AppError::Forbidden("Not a member of this space".to_string()));
    }
    Ok(Json(Value::Array(members)))
}

async fn add_member(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<NewMember>,
) -> Result<Json<Value>> {
    user_row(state.db.as_ref(), schema::REFLECTION_SPACES, &id, &user_id, "Space").await?;
    let member = state
        .db
        .insert_one(
            schema::SPACE_MEMBERS,
            json!({
                "space_id": id,
                "user_id": req.user_id,
                "role": req.role.unwrap_or_else(|| "member".to_string()),
            }),
        )
        .await?;
    Ok(Json(member))
}
