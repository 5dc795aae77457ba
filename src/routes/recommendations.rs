//! Personalised activity recommendations, bookmarks, applications and preferences.

use axum::{
    extract::{Path, Query as QueryParams, State},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use tracing::info;

use crate::auth::CurrentUser;
use crate::cadence;
use crate::db::{schema, Database, Embed, Query};
use crate::envelope::SuccessResponse;
use crate::error::{AppError, Result};
use crate::insights::{self, MatchProfile};
use crate::routes::{first_row, now, str_field, today, PageParams};
use crate::server::AppState;

const MAX_PAGE: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/activities", get(list_recommended))
        .route("/activities/:id", get(activity_detail))
        .route("/activities/:id/bookmark", post(add_bookmark).delete(remove_bookmark))
        .route("/activities/:id/apply", post(apply))
        .route("/bookmarks", get(list_bookmarks))
        .route("/my-applications", get(list_applications))
        .route("/my-applications/:id", patch(update_application))
        .route("/preferences", get(get_preferences).post(save_preferences))
        .route("/trending", get(trending))
        .route("/deadline-soon", get(deadline_soon))
}

#[derive(Debug, Deserialize)]
pub struct RecommendationFilter {
    pub category: Option<String>,
    /// Comma separated.
    pub fields: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default = "default_sort")]
    pub sort: String,
}

fn default_limit() -> usize {
    20
}

fn default_page() -> usize {
    1
}

fn default_status() -> String {
    "active".to_string()
}

fn default_sort() -> String {
    "recommended".to_string()
}

fn check_page(limit: usize, page: usize) -> Result<PageParams> {
    if limit == 0 || limit > MAX_PAGE || page == 0 {
        return Err(AppError::BadRequest(
            "limit must be 1..=100 and page at least 1".to_string(),
        ));
    }
    Ok(PageParams { page, limit })
}

fn days_left(activity: &Value) -> i64 {
    let deadline = str_field(activity, "application_end_date").and_then(cadence::parse_day);
    cadence::days_left(deadline, today())
}

fn set(activity: &mut Value, key: &str, value: Value) {
    if let Value::Object(map) = activity {
        map.insert(key.to_string(), value);
    }
}

fn with_days_left(mut activity: Value) -> Value {
    let left = days_left(&activity);
    set(&mut activity, "days_left", json!(left));
    activity
}

/// Major from the user row plus the stored preferences.
async fn match_profile(db: &dyn Database, user_id: &str) -> Result<MatchProfile> {
    let user = db
        .select_one(&Query::table(schema::USERS).select(&["major"]).eq("id", user_id))
        .await?;
    let prefs = db
        .select_one(&Query::table(schema::USER_PREFERENCES).eq("user_id", user_id))
        .await?;
    let prefs = prefs.as_ref();
    Ok(MatchProfile {
        major: user.as_ref().and_then(|u| str_field(u, "major")).map(str::to_string),
        skill_keywords: insights::string_list(prefs.and_then(|p| p.get("skill_keywords"))),
        interested_fields: insights::string_list(prefs.and_then(|p| p.get("interested_fields"))),
        preferred_difficulty: prefs
            .and_then(|p| str_field(p, "preferred_difficulty"))
            .map(str::to_string),
    })
}

async fn activity_ids_in(
    db: &dyn Database,
    table: &str,
    user_id: &str,
    activity_ids: &[Value],
) -> Result<HashSet<String>> {
    let query = Query::table(table)
        .select(&["activity_id"])
        .eq("user_id", user_id)
        .in_list("activity_id", activity_ids.iter().cloned());
    Ok(db
        .select(&query)
        .await?
        .rows
        .iter()
        .filter_map(|r| str_field(r, "activity_id").map(str::to_string))
        .collect())
}

/// Orders scored activities by the requested key. Unknown keys keep fetch order.
pub fn sort_scored(activities: &mut [Value], sort: &str) {
    let number = |a: &Value, key: &str| a.get(key).and_then(Value::as_f64).unwrap_or(0.0);
    match sort {
        "recommended" => activities.sort_by(|a, b| number(b, "match_score").total_cmp(&number(a, "match_score"))),
        "deadline" => activities.sort_by(|a, b| number(a, "days_left").total_cmp(&number(b, "days_left"))),
        "popular" => {
            activities.sort_by(|a, b| number(b, "bookmark_count").total_cmp(&number(a, "bookmark_count")))
        }
        _ => {}
    }
}

async fn list_recommended(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    QueryParams(filter): QueryParams<RecommendationFilter>,
) -> Result<SuccessResponse<Value>> {
    let page = check_page(filter.limit, filter.page)?;
    let profile = match_profile(state.db.as_ref(), &user_id).await?;

    let mut query = Query::table(schema::ACTIVITIES)
        .eq("status", filter.status.as_str())
        .gte("application_end_date", today().to_string());
    if let Some(category) = filter.category {
        query = query.eq("category", category);
    }
    if let Some(fields) = filter.fields.as_deref().filter(|f| !f.is_empty()) {
        query = query.overlaps("fields", fields.split(',').map(|f| f.trim().to_string()));
    }
    let activities = state
        .db
        .select(&query.range(page.offset(), page.limit))
        .await?
        .rows;

    let mut scored: Vec<Value> = activities
        .into_iter()
        .map(|activity| {
            let result = insights::match_score(&profile, &activity);
            let mut activity = with_days_left(activity);
            set(&mut activity, "match_score", json!(result.score));
            set(&mut activity, "match_reasons", json!(result.reasons));
            activity
        })
        .collect();
    sort_scored(&mut scored, &filter.sort);

    if !scored.is_empty() {
        let ids: Vec<Value> = scored.iter().filter_map(|a| a.get("id").cloned()).collect();
        let bookmarked = activity_ids_in(state.db.as_ref(), schema::USER_BOOKMARKS, &user_id, &ids).await?;
        let applied = activity_ids_in(state.db.as_ref(), schema::USER_APPLICATIONS, &user_id, &ids).await?;
        for activity in &mut scored {
            let id = str_field(activity, "id").unwrap_or_default().to_string();
            set(activity, "is_bookmarked", json!(bookmarked.contains(&id)));
            set(activity, "has_applied", json!(applied.contains(&id)));
        }
    }

    Ok(SuccessResponse::new(json!({
        "total": scored.len(),
        "activities": scored,
        "page": page.page,
        "per_page": page.limit,
    })))
}

async fn load_activity(db: &dyn Database, id: &str) -> Result<Value> {
    db.select_one(&Query::table(schema::ACTIVITIES).eq("id", id))
        .await?
        .ok_or_else(|| AppError::not_found("Activity"))
}

async fn user_has(db: &dyn Database, table: &str, user_id: &str, activity_id: &str) -> Result<bool> {
    let query = Query::table(table)
        .select(&["id"])
        .eq("user_id", user_id)
        .eq("activity_id", activity_id);
    Ok(db.select_one(&query).await?.is_some())
}

async fn activity_detail(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    let db = state.db.as_ref();
    let mut activity = load_activity(db, &id).await?;
    let views = activity.get("view_count").and_then(Value::as_i64).unwrap_or(0) + 1;
    db.update(
        &Query::table(schema::ACTIVITIES).eq("id", id.as_str()),
        json!({ "view_count": views }),
    )
    .await?;

    set(&mut activity, "view_count", json!(views));
    let bookmarked = user_has(db, schema::USER_BOOKMARKS, &user_id, &id).await?;
    let applied = user_has(db, schema::USER_APPLICATIONS, &user_id, &id).await?;
    set(&mut activity, "is_bookmarked", json!(bookmarked));
    set(&mut activity, "has_applied", json!(applied));
    Ok(SuccessResponse::new(json!({ "activity": with_days_left(activity) })))
}

async fn adjust_bookmark_count(db: &dyn Database, activity: &Value, delta: i64) -> Result<()> {
    let Some(id) = str_field(activity, "id") else {
        return Ok(());
    };
    let count = activity.get("bookmark_count").and_then(Value::as_i64).unwrap_or(0);
    db.update(
        &Query::table(schema::ACTIVITIES).eq("id", id),
        json!({ "bookmark_count": (count + delta).max(0) }),
    )
    .await?;
    Ok(())
}

async fn add_bookmark(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    let db = state.db.as_ref();
    let activity = load_activity(db, &id).await?;
    if user_has(db, schema::USER_BOOKMARKS, &user_id, &id).await? {
        return Err(AppError::Conflict("이미 북마크한 활동입니다".to_string()));
    }
    let bookmark = db
        .insert_one(schema::USER_BOOKMARKS, json!({ "user_id": user_id, "activity_id": id }))
        .await?;
    adjust_bookmark_count(db, &activity, 1).await?;
    Ok(SuccessResponse::with_message(
        json!({ "bookmark": bookmark }),
        "북마크가 추가되었습니다",
    ))
}

async fn remove_bookmark(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    let db = state.db.as_ref();
    let removed = db
        .delete(
            &Query::table(schema::USER_BOOKMARKS)
                .eq("user_id", user_id.as_str())
                .eq("activity_id", id.as_str()),
        )
        .await?;
    if removed.is_empty() {
        return Err(AppError::not_found("Bookmark"));
    }
    if let Some(activity) = db
        .select_one(&Query::table(schema::ACTIVITIES).eq("id", id.as_str()))
        .await?
    {
        adjust_bookmark_count(db, &activity, -1).await?;
    }
    Ok(SuccessResponse::with_message(json!({}), "북마크가 제거되었습니다"))
}

async fn list_bookmarks(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    QueryParams(params): QueryParams<PageParams>,
) -> Result<SuccessResponse<Value>> {
    let page = check_page(params.limit, params.page)?;
    let query = Query::table(schema::USER_BOOKMARKS)
        .embed(Embed::new(schema::ACTIVITIES, "activity_id"))
        .eq("user_id", user_id.as_str())
        .order_desc("created_at")
        .range(page.offset(), page.limit);
    let mut bookmarks = state.db.select(&query).await?.rows;
    for bookmark in &mut bookmarks {
        if let Some(activity) = bookmark.get_mut(schema::ACTIVITIES).filter(|a| a.is_object()) {
            let left = days_left(activity);
            set(activity, "days_left", json!(left));
            set(activity, "is_bookmarked", json!(true));
        }
    }
    Ok(SuccessResponse::new(json!({
        "total": bookmarks.len(),
        "bookmarks": bookmarks,
        "page": page.page,
        "per_page": page.limit,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ApplicationCreate {
    #[serde(default)]
    pub notes: Option<String>,
}

async fn apply(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    body: Option<Json<ApplicationCreate>>,
) -> Result<SuccessResponse<Value>> {
    let db = state.db.as_ref();
    load_activity(db, &id).await?;
    if user_has(db, schema::USER_APPLICATIONS, &user_id, &id).await? {
        return Err(AppError::Conflict("이미 지원한 활동입니다".to_string()));
    }
    let notes = body.and_then(|Json(b)| b.notes);
    let application = db
        .insert_one(
            schema::USER_APPLICATIONS,
            json!({
                "user_id": user_id,
                "activity_id": id,
                "notes": notes,
                "status": "applied",
                "applied_at": now(),
            }),
        )
        .await?;
    info!(user_id = %user_id, activity_id = %id, "Recorded application");
    Ok(SuccessResponse::with_message(
        json!({ "application": application }),
        "지원이 완료되었습니다",
    ))
}

#[derive(Debug, Deserialize)]
pub struct ApplicationFilter {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_page")]
    pub page: usize,
}

async fn list_applications(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    QueryParams(filter): QueryParams<ApplicationFilter>,
) -> Result<SuccessResponse<Value>> {
    let page = check_page(filter.limit, filter.page)?;
    let mut query = Query::table(schema::USER_APPLICATIONS)
        .embed(Embed::new(schema::ACTIVITIES, "activity_id"))
        .eq("user_id", user_id.as_str());
    if let Some(status) = filter.status {
        query = query.eq("status", status);
    }
    let query = query.order_desc("applied_at").range(page.offset(), page.limit);
    let mut applications = state.db.select(&query).await?.rows;
    for application in &mut applications {
        if let Some(activity) = application.get_mut(schema::ACTIVITIES).filter(|a| a.is_object()) {
            let left = days_left(activity);
            set(activity, "days_left", json!(left));
        }
    }
    Ok(SuccessResponse::new(json!({
        "total": applications.len(),
        "applications": applications,
        "page": page.page,
        "per_page": page.limit,
    })))
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ApplicationUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

async fn update_application(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    Json(update): Json<ApplicationUpdate>,
) -> Result<SuccessResponse<Value>> {
    let patch = serde_json::to_value(&update)?;
    if patch.as_object().map_or(true, Map::is_empty) {
        return Err(AppError::BadRequest("nothing to update".to_string()));
    }
    let rows = state
        .db
        .update(
            &Query::table(schema::USER_APPLICATIONS)
                .eq("id", id.as_str())
                .eq("user_id", user_id.as_str()),
            patch,
        )
        .await?;
    Ok(SuccessResponse::with_message(
        json!({ "application": first_row(rows, "Application")? }),
        "지원 내역이 수정되었습니다",
    ))
}

fn default_true() -> bool {
    true
}

fn default_frequency() -> String {
    "weekly".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Preferences {
    #[serde(default)]
    pub interested_fields: Vec<String>,
    #[serde(default)]
    pub interested_categories: Vec<String>,
    #[serde(default)]
    pub skill_keywords: Vec<String>,
    #[serde(default)]
    pub exclude_categories: Vec<String>,
    #[serde(default)]
    pub preferred_difficulty: Option<String>,
    #[serde(default = "default_true")]
    pub notification_enabled: bool,
    #[serde(default = "default_frequency")]
    pub notification_frequency: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            interested_fields: Vec::new(),
            interested_categories: Vec::new(),
            skill_keywords: Vec::new(),
            exclude_categories: Vec::new(),
            preferred_difficulty: None,
            notification_enabled: true,
            notification_frequency: default_frequency(),
        }
    }
}

async fn get_preferences(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<SuccessResponse<Value>> {
    let stored = state
        .db
        .select_one(&Query::table(schema::USER_PREFERENCES).eq("user_id", user_id.as_str()))
        .await?;
    let preferences = match stored {
        Some(row) => row,
        None => {
            let mut defaults = serde_json::to_value(Preferences::default())?;
            set(&mut defaults, "user_id", json!(user_id));
            defaults
        }
    };
    Ok(SuccessResponse::new(json!({ "preferences": preferences })))
}

async fn save_preferences(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(prefs): Json<Preferences>,
) -> Result<SuccessResponse<Value>> {
    let mut row = serde_json::to_value(&prefs)?;
    set(&mut row, "user_id", json!(user_id));
    let rows = state
        .db
        .upsert(schema::USER_PREFERENCES, vec![row], &["user_id"])
        .await?;
    Ok(SuccessResponse::with_message(
        json!({ "preferences": first_row(rows, "Preferences")? }),
        "설정이 저장되었습니다",
    ))
}

#[derive(Debug, Deserialize)]
pub struct TrendingParams {
    #[serde(default = "default_short_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct DeadlineParams {
    #[serde(default = "default_deadline_days")]
    pub days: i64,
    #[serde(default = "default_short_limit")]
    pub limit: usize,
}

fn default_short_limit() -> usize {
    10
}

fn default_deadline_days() -> i64 {
    7
}

fn open_activities() -> Query {
    Query::table(schema::ACTIVITIES)
        .eq("status", "active")
        .gte("application_end_date", today().to_string())
}

async fn trending(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    QueryParams(params): QueryParams<TrendingParams>,
) -> Result<SuccessResponse<Value>> {
    let query = open_activities()
        .order_desc("bookmark_count")
        .limit(params.limit.clamp(1, 50));
    let activities: Vec<Value> = state
        .db
        .select(&query)
        .await?
        .rows
        .into_iter()
        .map(with_days_left)
        .collect();
    Ok(SuccessResponse::new(json!({ "activities": activities })))
}

async fn deadline_soon(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    QueryParams(params): QueryParams<DeadlineParams>,
) -> Result<SuccessResponse<Value>> {
    if !(1..=30).contains(&params.days) {
        return Err(AppError::BadRequest("days must be between 1 and 30".to_string()));
    }
    let deadline = today() + Duration::days(params.days);
    let query = open_activities()
        .lte("application_end_date", deadline.to_string())
        .order_asc("application_end_date")
        .limit(params.limit.clamp(1, 50));
    let activities: Vec<Value> = state
        .db
        .select(&query)
        .await?
        .rows
        .into_iter()
        .map(with_days_left)
        .collect();
    Ok(SuccessResponse::new(json!({ "activities": activities })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_by_requested_key() {
        let mut items = vec![
            json!({"id": "a", "match_score": 0.2, "days_left": 3, "bookmark_count": 9}),
            json!({"id": "b", "match_score": 0.9, "days_left": 10, "bookmark_count": 1}),
        ];
        sort_scored(&mut items, "recommended");
        assert_eq!(items[0]["id"], "b");
        sort_scored(&mut items, "deadline");
        assert_eq!(items[0]["id"], "a");
        sort_scored(&mut items, "popular");
        assert_eq!(items[0]["id"], "a");
    }

    #[test]
    fn default_preferences() {
        let prefs = Preferences::default();
        assert!(prefs.notification_enabled);
        assert_eq!(prefs.notification_frequency, "weekly");
    }

    #[test]
    fn missing_deadline_reads_as_far_away() {
        assert_eq!(days_left(&json!({})), cadence::NO_DEADLINE_DAYS);
    }
}
