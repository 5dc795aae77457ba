use chrono::{Duration, NaiveDate, Utc};
use serde_json::json;

use proof_api::batch::{self, Job};
use proof_api::db::{schema, InMemoryDatabase};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

#[tokio::test]
async fn reminders_go_to_spaces_due_today() {
    let db = InMemoryDatabase::new();
    let today = d(2024, 5, 10);
    db.seed(
        schema::REFLECTION_SPACES,
        vec![
            json!({ "id": "due", "user_id": "u1", "name": "동아리", "status": "active",
                    "reminder_enabled": true, "next_reflection_date": "2024-05-10" }),
            json!({ "id": "muted", "user_id": "u1", "name": "스터디", "status": "active",
                    "reminder_enabled": false, "next_reflection_date": "2024-05-10" }),
            json!({ "id": "later", "user_id": "u2", "name": "인턴", "status": "active",
                    "reminder_enabled": true, "next_reflection_date": "2024-05-11" }),
            json!({ "id": "done", "user_id": "u2", "name": "공모전", "status": "completed",
                    "reminder_enabled": true, "next_reflection_date": "2024-05-10" }),
        ],
    )
    .unwrap();

    let reports = batch::run(&db, Job::SendReminders, today).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].job, "send-reminders");
    assert_eq!(reports[0].affected, 1);

    let notifications = db.rows(schema::NOTIFICATIONS);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["user_id"], "u1");
    assert_eq!(notifications[0]["type"], "reminder");
    assert_eq!(notifications[0]["link"], "/spaces/due/reflect");
}

#[tokio::test]
async fn daily_run_computes_cleans_and_completes() {
    let db = InMemoryDatabase::new();
    let today = d(2024, 5, 10);
    db.seed(schema::USERS, vec![json!({ "id": "u1", "email": "a@proof.kr" })])
        .unwrap();
    db.seed(
        schema::REFLECTIONS,
        vec![
            json!({ "user_id": "u1", "reflection_date": "2024-05-08", "progress_score": 4, "ai_keywords": ["성장"] }),
            json!({ "user_id": "u1", "reflection_date": "2024-05-10", "progress_score": 1, "ai_keywords": [] }),
        ],
    )
    .unwrap();
    db.seed(
        schema::REFLECTION_SPACES,
        vec![
            json!({ "id": "old", "user_id": "u1", "status": "active", "end_date": "2024-05-01",
                    "total_reflections": 1, "expected_reflections": 2 }),
            json!({ "id": "current", "user_id": "u1", "status": "active", "end_date": "2024-06-01",
                    "total_reflections": 1, "expected_reflections": 4 }),
        ],
    )
    .unwrap();
    let expired = (Utc::now() - Duration::hours(1)).to_rfc3339();
    let fresh = (Utc::now() + Duration::days(7)).to_rfc3339();
    db.seed(
        schema::REFLECTION_AI_ANALYSIS,
        vec![
            json!({ "reflection_id": "r1", "expires_at": expired }),
            json!({ "reflection_id": "r2", "expires_at": fresh }),
        ],
    )
    .unwrap();

    let reports = batch::run(&db, Job::RunAllDaily, today).await.unwrap();
    let jobs: Vec<&str> = reports.iter().map(|r| r.job.as_str()).collect();
    assert_eq!(jobs, ["calculate-daily-metrics", "cleanup-cache", "update-status"]);

    let metrics = db.rows(schema::GROWTH_METRICS);
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0]["date"], "2024-05-09");
    assert_eq!(metrics[0]["total_reflections"], 1);
    assert_eq!(metrics[0]["avg_progress_score"], 4.0);
    assert_eq!(metrics[0]["completion_rate"], 33);

    let cache = db.rows(schema::REFLECTION_AI_ANALYSIS);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache[0]["reflection_id"], "r2");

    let spaces = db.rows(schema::REFLECTION_SPACES);
    let status = |id: &str| spaces.iter().find(|s| s["id"] == id).unwrap()["status"].clone();
    assert_eq!(status("old"), "completed");
    assert_eq!(status("current"), "active");
}

#[tokio::test]
async fn rerunning_metrics_keeps_one_row_per_day() {
    let db = InMemoryDatabase::new();
    db.seed(schema::USERS, vec![json!({ "id": "u1" })]).unwrap();
    db.seed(
        schema::REFLECTIONS,
        vec![json!({ "user_id": "u1", "reflection_date": "2024-05-01", "progress_score": 3 })],
    )
    .unwrap();

    for _ in 0..2 {
        batch::run(&db, Job::CalculateDailyMetrics, d(2024, 5, 10)).await.unwrap();
    }
    assert_eq!(db.rows(schema::GROWTH_METRICS).len(), 1);
}
