//! Micro logs, template reflections and the views built on top of them.
//!
//! Every handler here answers with the `{success, data, error}` envelope.

use axum::{
    extract::{Path, Query as QueryParams, State},
    routing::{delete, get},
    Json, Router,
};
use chrono::{Duration, NaiveDate};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::{info, instrument};

use crate::auth::CurrentUser;
use crate::cadence::{self, ReflectionCycle};
use crate::db::{schema, Database, Query};
use crate::envelope::{Envelope, EnvelopeResult};
use crate::error::{AppError, Result};
use crate::insights::{self, ACTIVITY_TYPES, MOOD_COMPARES};
use crate::routes::{owned_row, str_field, today};
use crate::server::AppState;

const MAX_MEMO_CHARS: usize = 500;
const MAX_PAGE: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_reflections).post(create_reflection))
        .route("/micro", get(list_micro_logs).post(create_micro_log))
        .route("/micro/:id", delete(delete_micro_log))
        .route("/stats", get(micro_log_stats))
        .route("/story", get(micro_log_story))
        .route("/growth-stats", get(growth_stats))
        .route("/:id", delete(delete_reflection))
}

#[derive(Debug, Clone, Deserialize)]
pub struct MicroLogCreate {
    pub activity_type: String,
    #[serde(default)]
    pub memo: Option<String>,
    pub mood_compare: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    pub date: NaiveDate,
    #[serde(default)]
    pub space_id: Option<String>,
}

impl MicroLogCreate {
    /// Checks run in a fixed order so clients always see the first problem.
    pub fn validate(&self) -> Result<()> {
        if !ACTIVITY_TYPES.contains(&self.activity_type.as_str()) {
            return Err(AppError::validation("INVALID_ACTIVITY_TYPE", "잘못된 활동 유형입니다"));
        }
        if !MOOD_COMPARES.contains(&self.mood_compare.as_str()) {
            return Err(AppError::validation("INVALID_MOOD_COMPARE", "잘못된 기분 비교값입니다"));
        }
        let has_reason = self.reason.as_deref().map_or(false, |r| !r.is_empty());
        if self.mood_compare != "same" && !has_reason {
            return Err(AppError::validation("REASON_REQUIRED", "기분 이유를 선택해주세요"));
        }
        if self.memo.as_deref().map_or(0, |m| m.chars().count()) > MAX_MEMO_CHARS {
            return Err(AppError::validation("MEMO_TOO_LONG", "메모는 500자 이내로 작성해주세요"));
        }
        Ok(())
    }
}

#[instrument(skip(state, log), fields(activity_type = %log.activity_type))]
async fn create_micro_log(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(log): Json<MicroLogCreate>,
) -> EnvelopeResult<Value> {
    log.validate()?;
    let row = json!({
        "user_id": user_id,
        "activity_type": log.activity_type,
        "memo": log.memo,
        "mood_compare": log.mood_compare,
        "reason": log.reason,
        "tags": log.tags.unwrap_or_default(),
        "date": log.date.to_string(),
        "space_id": log.space_id,
    });
    let saved = state.db.insert_one(schema::MICRO_LOGS, row).await?;
    let data = json!({
        "id": saved.get("id"),
        "user_id": saved.get("user_id"),
        "activity_type": saved.get("activity_type"),
        "memo": saved.get("memo"),
        "mood_compare": saved.get("mood_compare"),
        "reason": saved.get("reason"),
        "tags": saved.get("tags"),
        "date": saved.get("date"),
        "created_at": saved.get("created_at"),
    });
    Ok(Envelope::ok(data))
}

#[derive(Debug, Deserialize)]
pub struct MicroLogFilter {
    #[serde(default = "default_micro_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub activity_type: Option<String>,
}

fn default_micro_limit() -> usize {
    20
}

async fn list_micro_logs(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    QueryParams(filter): QueryParams<MicroLogFilter>,
) -> EnvelopeResult<Value> {
    if filter.limit == 0 || filter.limit > MAX_PAGE {
        return Err(AppError::validation("INVALID_LIMIT", "limit must be between 1 and 100").into());
    }
    let mut query = Query::table(schema::MICRO_LOGS)
        .eq("user_id", user_id.as_str())
        .with_count();
    if let Some(from) = filter.date_from {
        query = query.gte("date", from.to_string());
    }
    if let Some(to) = filter.date_to {
        query = query.lte("date", to.to_string());
    }
    if let Some(activity_type) = filter.activity_type {
        query = query.eq("activity_type", activity_type);
    }
    let query = query
        .order_desc("date")
        .order_desc("created_at")
        .range(filter.offset, filter.limit);

    let rows = state.db.select(&query).await?;
    Ok(Envelope::ok(json!({
        "logs": rows.rows,
        "total": rows.count.unwrap_or(0),
        "limit": filter.limit,
        "offset": filter.offset,
    })))
}

async fn delete_micro_log(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> EnvelopeResult<Value> {
    owned_row(state.db.as_ref(), schema::MICRO_LOGS, &id, "user_id", &user_id, "Micro log").await?;
    state
        .db
        .delete(
            &Query::table(schema::MICRO_LOGS)
                .eq("id", id.as_str())
                .eq("user_id", user_id.as_str()),
        )
        .await?;
    Ok(Envelope::ok(json!({ "id": id })))
}

#[derive(Debug, Deserialize)]
pub struct PeriodParams {
    #[serde(default = "default_period")]
    pub period: String,
}

fn default_period() -> String {
    "week".to_string()
}

fn invalid_period(allowed: &str) -> AppError {
    AppError::validation("INVALID_PERIOD", format!("period must be one of {allowed}"))
}

async fn logs_since(db: &dyn Database, user_id: &str, since: NaiveDate) -> Result<Vec<Value>> {
    let query = Query::table(schema::MICRO_LOGS)
        .eq("user_id", user_id)
        .gte("date", since.to_string())
        .order_asc("date");
    Ok(db.select(&query).await?.rows)
}

fn count_by<'a>(logs: impl Iterator<Item = &'a Value>, key: &str) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for log in logs {
        if let Some(v) = str_field(log, key).filter(|v| !v.is_empty()) {
            *counts.entry(v.to_string()).or_default() += 1;
        }
    }
    counts
}

fn tag_counts<'a>(logs: impl Iterator<Item = &'a Value>) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for log in logs {
        for tag in insights::string_list(log.get("tags")) {
            *counts.entry(tag).or_default() += 1;
        }
    }
    counts
}

fn with_mood<'a>(logs: &'a [Value], mood: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
    logs.iter().filter(move |l| str_field(l, "mood_compare") == Some(mood))
}

/// Mood balance, activity mix and top tags over a window of micro logs.
pub fn summarize_logs(period: &str, logs: &[Value]) -> Value {
    let total = logs.len();
    if total == 0 {
        return json!({
            "period": period,
            "total_logs": 0,
            "positive_logs": 0,
            "neutral_logs": 0,
            "negative_logs": 0,
            "growth_trend": 0,
            "most_active_type": null,
            "activity_distribution": {},
            "top_tags": [],
        });
    }

    let positive = with_mood(logs, "better").count();
    let neutral = with_mood(logs, "same").count();
    let negative = with_mood(logs, "worse").count();
    let trend = (positive as f64 - negative as f64) / total as f64 * 100.0;
    let growth_trend = (trend * 10.0).round() / 10.0;

    let distribution = count_by(logs.iter(), "activity_type");
    let most_active = insights::most_common(distribution.clone(), 1)
        .into_iter()
        .next()
        .map(|(t, _)| t);
    let top_tags: Vec<Value> = insights::most_common(tag_counts(logs.iter()), 5)
        .into_iter()
        .map(|(tag, count)| json!({ "tag": tag, "count": count }))
        .collect();

    json!({
        "period": period,
        "total_logs": total,
        "positive_logs": positive,
        "neutral_logs": neutral,
        "negative_logs": negative,
        "growth_trend": growth_trend,
        "most_active_type": most_active,
        "activity_distribution": distribution,
        "top_tags": top_tags,
    })
}

async fn micro_log_stats(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    QueryParams(params): QueryParams<PeriodParams>,
) -> EnvelopeResult<Value> {
    let days = match params.period.as_str() {
        "week" => 7,
        "month" => 30,
        _ => return Err(invalid_period("week, month").into()),
    };
    let logs = logs_since(state.db.as_ref(), &user_id, today() - Duration::days(days)).await?;
    Ok(Envelope::ok(summarize_logs(&params.period, &logs)))
}

/// Narrative view: what the user did, what lifted or drained them, where they are strong.
pub fn story_view(period_label: &str, days: i64, logs: &[Value]) -> Value {
    if logs.is_empty() {
        return json!({
            "period_label": period_label,
            "total_days": days,
            "activity_summary": [],
            "positive_patterns": [],
            "negative_patterns": [],
            "strength_analysis": "아직 기록이 부족해요. 더 많은 경험을 기록해보세요!",
            "suggested_tracks": [],
            "next_suggestion": null,
        });
    }

    let activity_counts = count_by(logs.iter(), "activity_type");
    let activity_summary: Vec<Value> = insights::most_common(activity_counts, usize::MAX)
        .into_iter()
        .map(|(kind, count)| {
            json!({
                "type": kind,
                "count": count,
                "icon": insights::activity_icon(&kind),
                "label": insights::activity_label(&kind),
            })
        })
        .collect();

    let positive_patterns: Vec<&str> = insights::most_common(count_by(with_mood(logs, "better"), "reason"), 3)
        .iter()
        .map(|(code, _)| insights::positive_reason_text(code))
        .collect();
    let negative_patterns: Vec<&str> = insights::most_common(count_by(with_mood(logs, "worse"), "reason"), 2)
        .iter()
        .map(|(code, _)| insights::negative_reason_text(code))
        .collect();

    let strengths: Vec<String> = insights::most_common(tag_counts(with_mood(logs, "better")), 3)
        .into_iter()
        .map(|(tag, _)| tag)
        .collect();
    let strength_analysis = if strengths.is_empty() {
        "아직 패턴이 명확하지 않아요. 더 많은 경험을 기록해보세요!".to_string()
    } else {
        format!("**{}** 분야에서 강점을 보이고 있어요.", strengths.join(", "))
    };

    json!({
        "period_label": period_label,
        "total_days": days,
        "activity_summary": activity_summary,
        "positive_patterns": positive_patterns,
        "negative_patterns": negative_patterns,
        "strength_analysis": strength_analysis,
        "suggested_tracks": [
            { "track": "기획/전략", "score": 75, "reason": "체계적인 활동 기록과 분석 능력" }
        ],
        "next_suggestion": {
            "title": "더 다양한 경험 쌓기",
            "description": "지금까지의 경험을 바탕으로, 새로운 분야에도 도전해보세요.",
            "action": "추천 활동 보러가기",
            "recommended_activities": [],
        },
    })
}

async fn micro_log_story(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    QueryParams(params): QueryParams<PeriodParams>,
) -> EnvelopeResult<Value> {
    let (days, label) = match params.period.as_str() {
        "week" => (7, "이번 주"),
        "month" => (30, "이번 달"),
        "quarter" => (90, "이번 분기"),
        _ => return Err(invalid_period("week, month, quarter").into()),
    };
    let logs = logs_since(state.db.as_ref(), &user_id, today() - Duration::days(days)).await?;
    Ok(Envelope::ok(story_view(label, days, &logs)))
}

#[derive(Debug, Deserialize)]
pub struct ReflectionCreate {
    pub template_id: String,
    pub template_name: String,
    #[serde(default)]
    pub answers: Map<String, Value>,
    #[serde(default)]
    pub competencies: Vec<String>,
    #[serde(default)]
    pub competency_scores: Map<String, Value>,
    #[serde(default)]
    pub competency_analysis: Map<String, Value>,
    #[serde(default)]
    pub space_id: Option<String>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub progress_score: Option<i64>,
    #[serde(default)]
    pub reflection_date: Option<NaiveDate>,
}

/// Free text of every answer, in field order, for keyword feedback.
pub(crate) fn answer_text(answers: &Map<String, Value>) -> String {
    answers
        .values()
        .filter_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Counts a new reflection against its space and moves the due date forward.
async fn advance_space(db: &dyn Database, space: &Value) -> Result<()> {
    let Some(space_id) = str_field(space, "id") else {
        return Ok(());
    };
    let total = space.get("total_reflections").and_then(Value::as_i64).unwrap_or(0) + 1;
    let mut patch = json!({ "total_reflections": total });

    let cycle = str_field(space, "reflection_cycle").and_then(|c| c.parse::<ReflectionCycle>().ok());
    let start = str_field(space, "start_date").and_then(cadence::parse_day);
    if let (Some(cycle), Some(start)) = (cycle, start) {
        let next = cadence::next_reflection_date(start, cycle, today());
        patch["next_reflection_date"] = json!(next.to_string());
    }
    db.update(&Query::table(schema::REFLECTION_SPACES).eq("id", space_id), patch)
        .await?;
    Ok(())
}

#[instrument(skip(state, req), fields(template_id = %req.template_id))]
async fn create_reflection(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<ReflectionCreate>,
) -> EnvelopeResult<Value> {
    let space = match req.space_id.as_deref() {
        Some(space_id) => Some(
            owned_row(state.db.as_ref(), schema::REFLECTION_SPACES, space_id, "user_id", &user_id, "Space")
                .await?,
        ),
        None => None,
    };

    let feedback = insights::reflection_feedback(&answer_text(&req.answers));
    let row = json!({
        "user_id": user_id,
        "space_id": req.space_id,
        "template_id": req.template_id,
        "template_name": req.template_name,
        "answers": req.answers,
        "competencies": req.competencies,
        "competency_scores": req.competency_scores,
        "competency_analysis": req.competency_analysis,
        "mood": req.mood,
        "progress_score": req.progress_score,
        "reflection_date": req.reflection_date.unwrap_or_else(today).to_string(),
        "ai_feedback": feedback.feedback,
        "ai_sentiment_score": feedback.sentiment_score,
        "ai_keywords": feedback.matched_categories(),
    });
    let saved = state.db.insert_one(schema::REFLECTIONS, row).await?;

    if let Some(space) = &space {
        advance_space(state.db.as_ref(), space).await?;
    }
    info!(user_id = %user_id, "Saved reflection");

    Ok(Envelope::ok(json!({
        "id": saved.get("id"),
        "user_id": saved.get("user_id"),
        "template_id": saved.get("template_id"),
        "template_name": saved.get("template_name"),
        "space_id": saved.get("space_id"),
        "created_at": saved.get("created_at"),
        "feedback": feedback,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ReflectionFilter {
    #[serde(default = "default_reflection_limit")]
    pub limit: usize,
    pub template_id: Option<String>,
}

fn default_reflection_limit() -> usize {
    50
}

async fn list_reflections(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    QueryParams(filter): QueryParams<ReflectionFilter>,
) -> EnvelopeResult<Value> {
    let mut query = Query::table(schema::REFLECTIONS).eq("user_id", user_id.as_str());
    if let Some(template_id) = filter.template_id {
        query = query.eq("template_id", template_id);
    }
    let query = query.order_desc("created_at").limit(filter.limit.clamp(1, MAX_PAGE));
    let rows = state.db.select(&query).await?;
    Ok(Envelope::ok(json!({ "reflections": rows.rows })))
}

async fn delete_reflection(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> EnvelopeResult<Value> {
    owned_row(state.db.as_ref(), schema::REFLECTIONS, &id, "user_id", &user_id, "Reflection").await?;
    state
        .db
        .delete(
            &Query::table(schema::REFLECTIONS)
                .eq("id", id.as_str())
                .eq("user_id", user_id.as_str()),
        )
        .await?;
    Ok(Envelope::ok(json!({ "id": id })))
}

async fn growth_stats(State(state): State<AppState>, CurrentUser(user_id): CurrentUser) -> EnvelopeResult<Value> {
    let latest = state
        .db
        .select_one(
            &Query::table(schema::GROWTH_METRICS)
                .eq("user_id", user_id.as_str())
                .order_desc("date"),
        )
        .await?;
    let metric = |key: &str| -> Value {
        latest
            .as_ref()
            .and_then(|row| row.get(key))
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or(json!(0))
    };
    Ok(Envelope::ok(json!({
        "avg_progress": metric("avg_progress_score"),
        "completion_rate": metric("completion_rate"),
        "keyword_count": metric("keyword_count"),
        "project_completion": metric("project_completion_count"),
        "date": latest.as_ref().and_then(|row| row.get("date")).cloned(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn micro(activity: &str, mood: &str, reason: Option<&str>, memo: Option<String>) -> MicroLogCreate {
        MicroLogCreate {
            activity_type: activity.to_string(),
            memo,
            mood_compare: mood.to_string(),
            reason: reason.map(str::to_string),
            tags: None,
            date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            space_id: None,
        }
    }

    fn code(log: &MicroLogCreate) -> Option<&'static str> {
        log.validate().err().map(|e| e.code())
    }

    #[test]
    fn validation_order() {
        assert_eq!(code(&micro("party", "nope", None, None)), Some("INVALID_ACTIVITY_TYPE"));
        assert_eq!(code(&micro("club", "nope", None, None)), Some("INVALID_MOOD_COMPARE"));
        assert_eq!(code(&micro("club", "better", None, None)), Some("REASON_REQUIRED"));
        assert_eq!(code(&micro("club", "better", Some(""), None)), Some("REASON_REQUIRED"));
        assert_eq!(code(&micro("club", "same", None, Some("가".repeat(501)))), Some("MEMO_TOO_LONG"));
        assert_eq!(code(&micro("club", "same", None, Some("가".repeat(500)))), None);
        assert_eq!(code(&micro("study", "worse", Some("negative_003"), None)), None);
    }

    #[test]
    fn stats_growth_trend() {
        let logs = vec![
            json!({"mood_compare": "better", "activity_type": "club", "tags": ["협업", "리더십"]}),
            json!({"mood_compare": "better", "activity_type": "club", "tags": ["협업"]}),
            json!({"mood_compare": "worse", "activity_type": "study", "tags": []}),
        ];
        let stats = summarize_logs("week", &logs);
        assert_eq!(stats["total_logs"], 3);
        assert_eq!(stats["growth_trend"], 33.3);
        assert_eq!(stats["most_active_type"], "club");
        assert_eq!(stats["top_tags"][0]["tag"], "협업");
        assert_eq!(stats["top_tags"][0]["count"], 2);
    }

    #[test]
    fn empty_stats_have_null_type() {
        let stats = summarize_logs("month", &[]);
        assert!(stats["most_active_type"].is_null());
        assert_eq!(stats["growth_trend"], 0);
    }

    #[test]
    fn story_patterns_and_strengths() {
        let logs = vec![
            json!({"mood_compare": "better", "activity_type": "project", "reason": "positive_002", "tags": ["개발"]}),
            json!({"mood_compare": "better", "activity_type": "project", "reason": "positive_002", "tags": ["개발", "기획"]}),
            json!({"mood_compare": "worse", "activity_type": "club", "reason": "negative_002", "tags": ["협업"]}),
        ];
        let story = story_view("이번 주", 7, &logs);
        assert_eq!(story["activity_summary"][0]["type"], "project");
        assert_eq!(story["activity_summary"][0]["icon"], "💼");
        assert_eq!(story["positive_patterns"][0], "새로운 것을 배우는 과정을 즐겨요");
        assert_eq!(story["negative_patterns"][0], "사람들과 의견이 안 맞을 때 어려움을 느껴요");
        assert_eq!(story["strength_analysis"], "**개발, 기획** 분야에서 강점을 보이고 있어요.");
    }

    #[test]
    fn answers_flatten_to_text() {
        let answers: Map<String, Value> = serde_json::from_value(json!({
            "situation": "팀 프로젝트",
            "action": ["계획", "실행"],
            "score": 3,
        }))
        .unwrap();
        let text = answer_text(&answers);
        assert!(text.contains("팀 프로젝트"));
        assert!(text.contains("계획 실행"));
    }
}
