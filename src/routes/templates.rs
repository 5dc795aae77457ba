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

/// Served when the recommended template is missing from the table.
const FALLBACK_TEMPLATE: &str = "kpt";

const CATEGORIES: &[(&str, &str)] = &[
    ("기본", "기본 회고"),
    ("심화", "심화 회고"),
    ("감정", "감정 회고"),
    ("분석", "분석 회고"),
    ("정기", "정기 회고"),
];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_templates))
        .route("/categories", get(list_categories))
        .route("/popular", get(popular_templates))
        .route("/recommend", post(recommend_template))
        .route("/:id", get(get_template))
}

#[derive(Debug, Deserialize)]
pub struct CategoryFilter {
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    #[serde(default)]
    pub recent_moods: Vec<String>,
    #[serde(default)]
    pub space_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    #[serde(default = "default_popular")]
    pub limit: usize,
}

fn default_popular() -> usize {
    3
}

async fn list_templates(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    QueryParams(filter): QueryParams<CategoryFilter>,
) -> Result<Json<Value>> {
    let mut query = Query::table(schema::REFLECTION_TEMPLATES).eq("is_active", true);
    if let Some(category) = filter.category {
        query = query.eq("category", category);
    }
    let rows = state.db.select(&query.order_desc("usage_count")).await?;
    Ok(Json(Value::Array(rows.rows)))
}

async fn get_template(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let template = state
        .db
        .select_one(
            &Query::table(schema::REFLECTION_TEMPLATES)
                .eq("id", id.as_str())
                .eq("is_active", true),
        )
        .await?
        .ok_or_else(|| AppError::not_found("Template"))?;
    Ok(Json(template))
}

async fn recommend_template(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    Json(req): Json<RecommendRequest>,
) -> Result<Json<Value>> {
    let template_id = insights::recommend_template(&req.recent_moods, req.space_type.as_deref());
    let mut template = None;
    for id in [template_id, FALLBACK_TEMPLATE] {
        template = state
            .db
            .select_one(&Query::table(schema::REFLECTION_TEMPLATES).eq("id", id))
            .await?;
        if template.is_some() {
            break;
        }
    }
    let mut template = template.ok_or_else(|| AppError::not_found("Template"))?;
    if let Value::Object(map) = &mut template {
        map.insert("is_ai_recommended".into(), json!(true));
    }
    Ok(Json(template))
}

async fn list_categories(CurrentUser(_): CurrentUser) -> Json<Value> {
    let categories: Vec<Value> = CATEGORIES
        .iter()
        .map(|(id, name)| json!({ "id": id, "name": name }))
        .collect();
    Json(json!({ "categories": categories }))
}

async fn popular_templates(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    QueryParams(params): QueryParams<LimitParams>,
) -> Result<Json<Value>> {
    let query = Query::table(schema::REFLECTION_TEMPLATES)
        .select(&["id", "name", "category", "usage_count"])
        .eq("is_active", true)
        .order_desc("usage_count")
        .limit(params.limit);
    let rows = state.db.select(&query).await?;
    Ok(Json(json!({ "templates": rows.rows })))
}
