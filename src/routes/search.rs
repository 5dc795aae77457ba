use axum::{
    extract::{Query as QueryParams, State},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::auth::CurrentUser;
use crate::db::{schema, Filter, Query};
use crate::envelope::SuccessResponse;
use crate::error::{AppError, Result};
use crate::routes::str_field;
use crate::server::AppState;

pub const SEARCH_TYPES: &[&str] = &["logs", "projects", "keywords", "reflections", "spaces", "templates"];

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(search))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    #[serde(rename = "type", default = "default_type")]
    pub kind: String,
}

fn default_type() -> String {
    "all".to_string()
}

/// First hundred characters followed by an ellipsis, empty when there is no text.
pub fn snippet(text: Option<&str>) -> String {
    match text.filter(|t| !t.is_empty()) {
        Some(t) => format!("{}...", t.chars().take(100).collect::<String>()),
        None => String::new(),
    }
}

fn pick(row: &Value, keys: &[&str]) -> Value {
    let map: Map<String, Value> = keys
        .iter()
        .map(|k| (k.to_string(), row.get(*k).cloned().unwrap_or(Value::Null)))
        .collect();
    Value::Object(map)
}

async fn search(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    QueryParams(params): QueryParams<SearchParams>,
) -> Result<SuccessResponse<Value>> {
    let q = params.q.trim();
    if q.is_empty() {
        return Err(AppError::BadRequest("q must not be empty".to_string()));
    }
    let kind = params.kind.as_str();
    if kind != "all" && !SEARCH_TYPES.contains(&kind) {
        return Err(AppError::BadRequest(format!("unknown search type: {kind}")));
    }
    let wants = |t: &str| kind == "all" || kind == t;
    let pattern = format!("%{q}%");
    let uid = user_id.as_str();
    let db = state.db.as_ref();

    let mut results: Map<String, Value> = SEARCH_TYPES
        .iter()
        .map(|t| (t.to_string(), Value::Array(Vec::new())))
        .collect();

    if wants("logs") {
        let rows = db
            .select(
                &Query::table(schema::LOGS)
                    .select(&["id", "title", "content"])
                    .eq("user_id", uid)
                    .ilike("title", pattern.as_str()),
            )
            .await?
            .rows;
        let logs = rows
            .iter()
            .map(|log| {
                json!({
                    "id": log.get("id"),
                    "title": log.get("title"),
                    "snippet": snippet(str_field(log, "content")),
                })
            })
            .collect();
        results.insert("logs".into(), Value::Array(logs));
    }

    if wants("projects") {
        let rows = db
            .select(
                &Query::table(schema::PROJECTS)
                    .select(&["id", "name"])
                    .eq("user_id", uid)
                    .ilike("name", pattern.as_str()),
            )
            .await?
            .rows;
        results.insert("projects".into(), Value::Array(rows.iter().map(|r| pick(r, &["id", "name"])).collect()));
    }

    if wants("keywords") {
        let rows = db
            .select(
                &Query::table(schema::KEYWORDS)
                    .select(&["id", "name"])
                    .ilike("name", pattern.as_str()),
            )
            .await?
            .rows;
        results.insert("keywords".into(), Value::Array(rows.iter().map(|r| pick(r, &["id", "name"])).collect()));
    }

    if wants("reflections") {
        let rows = db
            .select(
                &Query::table(schema::REFLECTIONS)
                    .select(&["id", "space_id", "ai_feedback", "reflection_date", "mood"])
                    .eq("user_id", uid)
                    .ilike("ai_feedback", pattern.as_str())
                    .limit(10),
            )
            .await?
            .rows;
        let reflections = rows
            .iter()
            .map(|r| {
                json!({
                    "id": r.get("id"),
                    "space_id": r.get("space_id"),
                    "snippet": snippet(str_field(r, "ai_feedback")),
                    "date": r.get("reflection_date"),
                    "mood": r.get("mood"),
                })
            })
            .collect();
        results.insert("reflections".into(), Value::Array(reflections));
    }

    if wants("spaces") {
        let rows = db
            .select(
                &Query::table(schema::REFLECTION_SPACES)
                    .select(&["id", "name", "type", "status"])
                    .eq("user_id", uid)
                    .ilike("name", pattern.as_str()),
            )
            .await?
            .rows;
        results.insert(
            "spaces".into(),
            Value::Array(rows.iter().map(|r| pick(r, &["id", "name", "type", "status"])).collect()),
        );
    }

    if wants("templates") {
        let rows = db
            .select(
                &Query::table(schema::REFLECTION_TEMPLATES)
                    .select(&["id", "name", "category", "description"])
                    .eq("is_active", true)
                    .or(vec![
                        Filter::ILike("name".to_string(), pattern.clone()),
                        Filter::ILike("description".to_string(), pattern.clone()),
                    ]),
            )
            .await?
            .rows;
        results.insert(
            "templates".into(),
            Value::Array(
                rows.iter()
                    .map(|r| pick(r, &["id", "name", "category", "description"]))
                    .collect(),
            ),
        );
    }

    Ok(SuccessResponse::new(Value::Object(results)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_truncates_by_characters() {
        let long = "회".repeat(150);
        let s = snippet(Some(&long));
        assert_eq!(s.chars().count(), 103);
        assert!(s.ends_with("..."));
        assert_eq!(snippet(None), "");
        assert_eq!(snippet(Some("")), "");
    }

    #[test]
    fn pick_fills_missing_keys() {
        let row = json!({ "id": "1", "name": "PROOF", "extra": true });
        assert_eq!(pick(&row, &["id", "name", "type"]), json!({ "id": "1", "name": "PROOF", "type": null }));
    }
}
