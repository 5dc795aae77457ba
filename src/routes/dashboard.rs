use axum::{extract::State, routing::get, Router};
use chrono::{Duration, NaiveDate, Utc};
use serde_json::{json, Value};

use crate::auth::CurrentUser;
use crate::cadence::{self, parse_day};
use crate::db::{schema, Database, Embed, Query};
use crate::envelope::SuccessResponse;
use crate::error::Result;
use crate::routes::{str_field, today};
use crate::server::AppState;

const UNKNOWN: &str = "알 수 없음";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/recent-activity", get(recent_activity))
        .route("/reflection-overview", get(reflection_overview))
}

fn owned(table: &str, user_id: &str) -> Query {
    Query::table(table).select(&["id"]).eq("user_id", user_id)
}

async fn stats(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<SuccessResponse<Value>> {
    let db = state.db.as_ref();
    let uid = user_id.as_str();
    let now = Utc::now();
    let today = today();
    let week_ago = now - Duration::days(7);
    let month_ago = now - Duration::days(30);

    let total_logs = db.count(&owned(schema::LOGS, uid)).await?;
    let total_projects = db.count(&owned(schema::PROJECTS, uid)).await?;
    let total_keywords = db.count(&owned(schema::USER_KEYWORDS, uid)).await?;
    let total_reflections = db.count(&owned(schema::REFLECTIONS, uid)).await?;
    let active_spaces = db
        .count(&owned(schema::REFLECTION_SPACES, uid).eq("status", "active"))
        .await?;
    let active_projects = db
        .count(&owned(schema::PROJECTS, uid).eq("status", "active"))
        .await?;

    let week_logs = db
        .count(&owned(schema::LOGS, uid).gte("created_at", week_ago.to_rfc3339()))
        .await?;
    let week_reflections = db
        .count(&owned(schema::REFLECTIONS, uid).gte("reflection_date", (today - Duration::days(7)).to_string()))
        .await?;
    let month_logs = db
        .count(&owned(schema::LOGS, uid).gte("created_at", month_ago.to_rfc3339()))
        .await?;
    let month_reflections = db
        .count(&owned(schema::REFLECTIONS, uid).gte("reflection_date", (today - Duration::days(30)).to_string()))
        .await?;

    let scores = db
        .select(
            &Query::table(schema::REFLECTIONS)
                .select(&["progress_score"])
                .eq("user_id", uid),
        )
        .await?
        .rows;
    let avg_progress = average_progress(&scores);

    let recent = db
        .select(
            &Query::table(schema::REFLECTIONS)
                .select(&["reflection_date"])
                .eq("user_id", uid)
                .order_desc("reflection_date")
                .limit(30),
        )
        .await?
        .rows;
    let dates: Vec<NaiveDate> = recent
        .iter()
        .filter_map(|r| str_field(r, "reflection_date").and_then(parse_day))
        .collect();
    let streak = cadence::reflection_streak(&dates, today);

    Ok(SuccessResponse::new(json!({
        "total_logs": total_logs,
        "total_projects": total_projects,
        "total_keywords": total_keywords,
        "total_reflections": total_reflections,
        "active_projects": active_projects,
        "active_spaces": active_spaces,
        "reflection_streak": streak,
        "avg_progress_score": avg_progress,
        "this_week": { "logs": week_logs, "reflections": week_reflections },
        "this_month": { "logs": month_logs, "reflections": month_reflections },
    })))
}

/// Mean of the non-zero progress scores, two decimals.
pub fn average_progress(rows: &[Value]) -> f64 {
    let scores: Vec<f64> = rows
        .iter()
        .filter_map(|r| r.get("progress_score").and_then(Value::as_f64))
        .filter(|s| *s != 0.0)
        .collect();
    if scores.is_empty() {
        return 0.0;
    }
    let avg = scores.iter().sum::<f64>() / scores.len() as f64;
    (avg * 100.0).round() / 100.0
}

fn embedded_name<'a>(row: &'a Value, table: &str) -> &'a str {
    row.get(table)
        .and_then(|t| str_field(t, "name"))
        .unwrap_or(UNKNOWN)
}

/// Logs and reflections as one feed, newest first, at most ten entries.
pub fn merge_recent(logs: &[Value], reflections: &[Value]) -> Vec<Value> {
    let mut feed: Vec<Value> = logs
        .iter()
        .map(|log| {
            json!({
                "type": "log",
                "title": log.get("title").cloned().unwrap_or(Value::Null),
                "project_name": embedded_name(log, schema::PROJECTS),
                "created_at": log.get("created_at").cloned().unwrap_or(Value::Null),
            })
        })
        .collect();
    feed.extend(reflections.iter().map(|r| {
        let snippet = match str_field(r, "ai_feedback").filter(|f| !f.is_empty()) {
            Some(feedback) => format!("{}...", feedback.chars().take(50).collect::<String>()),
            None => "회고 작성".to_string(),
        };
        json!({
            "type": "reflection",
            "title": format!("{} 회고", embedded_name(r, schema::REFLECTION_SPACES)),
            "snippet": snippet,
            "mood": r.get("mood").cloned().unwrap_or(Value::Null),
            "reflection_date": r.get("reflection_date").cloned().unwrap_or(Value::Null),
            "created_at": r.get("created_at").cloned().unwrap_or(Value::Null),
        })
    }));
    feed.sort_by(|a, b| {
        let a = str_field(a, "created_at").unwrap_or_default();
        let b = str_field(b, "created_at").unwrap_or_default();
        b.cmp(a)
    });
    feed.truncate(10);
    feed
}

async fn recent_activity(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<SuccessResponse<Value>> {
    let db = state.db.as_ref();
    let logs = db
        .select(
            &Query::table(schema::LOGS)
                .select(&["id", "title", "created_at"])
                .embed(Embed::new(schema::PROJECTS, "project_id").columns(&["name"]))
                .eq("user_id", user_id.as_str())
                .order_desc("created_at")
                .limit(5),
        )
        .await?
        .rows;
    let reflections = db
        .select(
            &Query::table(schema::REFLECTIONS)
                .select(&["id", "ai_feedback", "mood", "reflection_date", "created_at"])
                .embed(Embed::new(schema::REFLECTION_SPACES, "space_id").columns(&["name"]))
                .eq("user_id", user_id.as_str())
                .order_desc("created_at")
                .limit(5),
        )
        .await?
        .rows;
    Ok(SuccessResponse::new(Value::Array(merge_recent(&logs, &reflections))))
}

/// Spaces whose next reflection date is today or already past.
pub fn due_spaces(spaces: &[Value], today: NaiveDate) -> Vec<Value> {
    spaces
        .iter()
        .filter(|s| {
            str_field(s, "next_reflection_date")
                .and_then(parse_day)
                .map_or(false, |d| d <= today)
        })
        .cloned()
        .collect()
}

async fn reflection_overview(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<SuccessResponse<Value>> {
    let db: &dyn Database = state.db.as_ref();
    let spaces = db
        .select(
            &Query::table(schema::REFLECTION_SPACES)
                .select(&[
                    "id",
                    "name",
                    "type",
                    "total_reflections",
                    "expected_reflections",
                    "next_reflection_date",
                ])
                .eq("user_id", user_id.as_str())
                .eq("status", "active")
                .order_asc("next_reflection_date")
                .limit(5),
        )
        .await?
        .rows;
    let recent = db
        .select(
            &Query::table(schema::REFLECTIONS)
                .select(&["id", "mood", "progress_score", "reflection_date"])
                .embed(Embed::new(schema::REFLECTION_SPACES, "space_id").columns(&["name"]))
                .eq("user_id", user_id.as_str())
                .order_desc("reflection_date")
                .limit(5),
        )
        .await?
        .rows;
    let due = due_spaces(&spaces, today());
    Ok(SuccessResponse::new(json!({
        "active_spaces": spaces,
        "recent_reflections": recent,
        "due_today_count": due.len(),
        "due_today": due,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_skips_missing_scores() {
        let rows = vec![
            json!({ "progress_score": 3 }),
            json!({ "progress_score": null }),
            json!({ "progress_score": 4 }),
            json!({}),
        ];
        assert_eq!(average_progress(&rows), 3.5);
        assert_eq!(average_progress(&[]), 0.0);
    }

    #[test]
    fn feed_is_newest_first_and_labelled() {
        let logs = vec![json!({
            "title": "API 설계",
            "created_at": "2024-05-02T10:00:00Z",
            "projects": { "name": "PROOF" },
        })];
        let reflections = vec![json!({
            "ai_feedback": null,
            "mood": "good",
            "reflection_date": "2024-05-03",
            "created_at": "2024-05-03T09:00:00Z",
            "reflection_spaces": null,
        })];
        let feed = merge_recent(&logs, &reflections);
        assert_eq!(feed[0]["type"], "reflection");
        assert_eq!(feed[0]["title"], "알 수 없음 회고");
        assert_eq!(feed[0]["snippet"], "회고 작성");
        assert_eq!(feed[1]["project_name"], "PROOF");
    }

    #[test]
    fn due_includes_overdue() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let spaces = vec![
            json!({ "id": "a", "next_reflection_date": "2024-05-09" }),
            json!({ "id": "b", "next_reflection_date": "2024-05-10" }),
            json!({ "id": "c", "next_reflection_date": "2024-05-11" }),
            json!({ "id": "d", "next_reflection_date": null }),
        ];
        let due: Vec<_> = due_spaces(&spaces, today).into_iter().map(|s| s["id"].clone()).collect();
        assert_eq!(due, vec![json!("a"), json!("b")]);
    }
}
