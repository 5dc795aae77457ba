//! Keyword-heuristic "AI" endpoints.
//!
//! Tag suggestion answers in the envelope family; the rest use `SuccessResponse`.

use axum::{
    extract::{Query as QueryParams, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Duration;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::auth::CurrentUser;
use crate::db::{schema, Query};
use crate::envelope::{Envelope, EnvelopeResult, SuccessResponse};
use crate::error::{AppError, Result};
use crate::insights;
use crate::routes::reflections::answer_text;
use crate::routes::{str_field, today};
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/suggest-tags", post(suggest_tags))
        .route("/micro-log-tags", post(micro_log_tags))
        .route("/generate-feedback", post(generate_feedback))
        .route("/extract-keywords", post(extract_keywords))
        .route("/growth-story", get(growth_story))
}

#[derive(Debug, Deserialize)]
pub struct TagRequest {
    pub activity_type: String,
    #[serde(default)]
    pub memo: String,
}

#[derive(Debug, Deserialize)]
pub struct MicroLogTagRequest {
    pub content: String,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub reflection_content: String,
    #[serde(default)]
    pub progress_score: Option<i64>,
    #[serde(default)]
    pub mood: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct KeywordRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct StoryParams {
    #[serde(default = "default_period")]
    pub period: String,
}

fn default_period() -> String {
    "month".to_string()
}

/// Days covered by a growth-story period.
pub fn period_days(period: &str) -> Option<i64> {
    match period {
        "week" => Some(7),
        "month" => Some(30),
        "quarter" => Some(90),
        "year" => Some(365),
        _ => None,
    }
}

const TAG_COLORS: &[&str] = &["blue", "purple", "yellow", "green", "red"];

async fn suggest_tags(
    user: std::result::Result<CurrentUser, AppError>,
    Json(req): Json<TagRequest>,
) -> EnvelopeResult<Value> {
    user?;
    let tags = insights::suggest_tags(&req.activity_type, &req.memo);
    Ok(Envelope::ok(json!({ "tags": tags })))
}

async fn micro_log_tags(
    user: std::result::Result<CurrentUser, AppError>,
    Json(req): Json<MicroLogTagRequest>,
) -> EnvelopeResult<Value> {
    user?;
    if req.content.trim().is_empty() {
        return Err(AppError::validation("CONTENT_REQUIRED", "content is required").into());
    }
    let tags = insights::micro_log_tags(&req.content, req.context.as_deref());
    Ok(Envelope::ok(json!({ "tags": tags })))
}

async fn generate_feedback(
    CurrentUser(_): CurrentUser,
    Json(req): Json<FeedbackRequest>,
) -> Result<SuccessResponse<Value>> {
    let feedback = insights::reflection_feedback(&req.reflection_content);
    let strengths: Vec<String> = feedback
        .matched_categories()
        .into_iter()
        .filter(|c| c != "부정")
        .map(|c| format!("{c} 표현이 드러납니다"))
        .collect();
    let improvement_areas: Vec<&str> = if feedback.action_score == 0 {
        vec!["다음에 실행할 구체적인 행동을 적어보세요"]
    } else {
        Vec::new()
    };
    Ok(SuccessResponse::new(json!({
        "feedback": feedback.feedback,
        "suggestions": feedback.suggestions,
        "improvement_areas": improvement_areas,
        "strengths": strengths,
        "sentiment_score": feedback.sentiment_score,
        "action_score": feedback.action_score,
        "mood": req.mood,
        "progress_score": req.progress_score,
    })))
}

async fn extract_keywords(
    CurrentUser(_): CurrentUser,
    Json(req): Json<KeywordRequest>,
) -> Result<SuccessResponse<Value>> {
    let competencies = insights::extract_competencies(&req.content);
    let keywords: Vec<Value> = competencies
        .iter()
        .zip(TAG_COLORS.iter().cycle())
        .map(|(c, color)| json!({ "text": c.text, "color": color, "confidence": c.confidence }))
        .collect();
    let suggested: Vec<Value> = insights::micro_log_tags(&req.content, None)
        .into_iter()
        .filter(|t| t != insights::DEFAULT_TAG)
        .map(|t| json!({ "text": t, "bgColor": "#DDF3EB", "textColor": "#186D50" }))
        .collect();
    Ok(SuccessResponse::new(json!({
        "keywords": keywords,
        "suggestedTags": suggested,
    })))
}

fn reflection_text(row: &Value) -> String {
    let answers = row
        .get("answers")
        .and_then(Value::as_object)
        .map(answer_text)
        .unwrap_or_default();
    if answers.is_empty() {
        str_field(row, "ai_feedback").unwrap_or_default().to_string()
    } else {
        answers
    }
}

async fn growth_story(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    QueryParams(params): QueryParams<StoryParams>,
) -> Result<SuccessResponse<Value>> {
    let days = period_days(&params.period).ok_or_else(|| {
        AppError::validation("INVALID_PERIOD", "period must be one of week, month, quarter, year")
    })?;
    let since = today() - Duration::days(days);
    let rows = state
        .db
        .select(
            &Query::table(schema::REFLECTIONS)
                .select(&["answers", "ai_feedback", "reflection_date"])
                .eq("user_id", user_id.as_str())
                .gte("reflection_date", since.to_string())
                .order_asc("reflection_date"),
        )
        .await?
        .rows;
    let contents: Vec<String> = rows
        .iter()
        .map(reflection_text)
        .filter(|t| !t.is_empty())
        .collect();
    Ok(SuccessResponse::new(insights::growth_story(&contents, &params.period)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn periods_map_to_days() {
        assert_eq!(period_days("week"), Some(7));
        assert_eq!(period_days("quarter"), Some(90));
        assert_eq!(period_days("decade"), None);
    }

    #[test]
    fn answers_win_over_feedback() {
        let mut answers = Map::new();
        answers.insert("keep".into(), json!("팀 회의가 좋았다"));
        let row = json!({ "answers": answers, "ai_feedback": "피드백" });
        assert_eq!(reflection_text(&row), "팀 회의가 좋았다");

        let row = json!({ "answers": {}, "ai_feedback": "피드백" });
        assert_eq!(reflection_text(&row), "피드백");
    }
}
