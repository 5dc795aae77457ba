//! Scheduled maintenance jobs: reminders, daily growth metrics, cache and
//! space-status housekeeping.
//!
//! Every job takes the reference date explicitly so a run can be replayed.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

use crate::db::{schema, Database, Query};
use crate::error::Result;
use crate::metrics::{self, MetricName};
use crate::routes::notifications::{notify, NotificationCreate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Job {
    SendReminders,
    CalculateDailyMetrics,
    CleanupCache,
    UpdateStatus,
    RunAllDaily,
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::SendReminders => "send-reminders",
            Job::CalculateDailyMetrics => "calculate-daily-metrics",
            Job::CleanupCache => "cleanup-cache",
            Job::UpdateStatus => "update-status",
            Job::RunAllDaily => "run-all-daily",
        }
    }
}

/// Outcome of one job run.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct JobReport {
    pub job: String,
    /// Rows examined.
    pub scanned: usize,
    /// Rows written or deleted.
    pub affected: usize,
    pub errors: Vec<String>,
}

impl JobReport {
    fn new(job: Job) -> Self {
        Self {
            job: job.name().to_string(),
            ..Self::default()
        }
    }
}

/// Runs `job` against `db`; `run-all-daily` yields one report per step.
pub async fn run(db: &dyn Database, job: Job, today: NaiveDate) -> Result<Vec<JobReport>> {
    let steps: &[Job] = match job {
        Job::RunAllDaily => &[Job::CalculateDailyMetrics, Job::CleanupCache, Job::UpdateStatus],
        _ => std::slice::from_ref(&job),
    };
    let mut reports = Vec::with_capacity(steps.len());
    for step in steps {
        let outcome = match step {
            Job::SendReminders => send_reminders(db, today).await,
            Job::CalculateDailyMetrics => calculate_daily_metrics(db, today).await,
            Job::CleanupCache => cleanup_cache(db).await,
            Job::UpdateStatus => update_status(db, today).await,
            Job::RunAllDaily => continue,
        };
        metrics::increment_labeled(MetricName::BatchJobRuns, "job", step.name().to_string());
        match outcome {
            Ok(report) => reports.push(report),
            Err(e) => {
                error!(job = step.name(), error = %e, "Batch job failed");
                metrics::increment_labeled(MetricName::BatchJobFailures, "job", step.name().to_string());
                return Err(e);
            }
        }
    }
    Ok(reports)
}

/// Notifies owners of active, reminder-enabled spaces that are due today.
#[instrument(skip(db))]
pub async fn send_reminders(db: &dyn Database, today: NaiveDate) -> Result<JobReport> {
    let mut report = JobReport::new(Job::SendReminders);
    let tomorrow = today + Duration::days(1);
    let spaces = db
        .select(
            &Query::table(schema::REFLECTION_SPACES)
                .eq("status", "active")
                .eq("reminder_enabled", true)
                .gte("next_reflection_date", today.to_string())
                .lt("next_reflection_date", tomorrow.to_string()),
        )
        .await?
        .rows;
    report.scanned = spaces.len();
    if spaces.is_empty() {
        info!("No reminders to send");
        return Ok(report);
    }

    for space in &spaces {
        let (Some(user_id), Some(space_id)) = (
            space.get("user_id").and_then(Value::as_str),
            space.get("id").and_then(Value::as_str),
        ) else {
            warn!("Skipping space row without user_id or id");
            continue;
        };
        let name = space.get("name").and_then(Value::as_str).unwrap_or_default();
        let notification = NotificationCreate {
            kind: "reminder".to_string(),
            title: "회고 작성 시간입니다".to_string(),
            content: Some(format!("'{name}' 스페이스의 회고를 작성해주세요")),
            link: Some(format!("/spaces/{space_id}/reflect")),
        };
        match notify(db, user_id, &notification).await {
            Ok(_) => report.affected += 1,
            Err(e) => {
                warn!(%space_id, error = %e, "Failed to create reminder");
                report.errors.push(format!("{space_id}: {e}"));
            }
        }
    }
    info!(sent = report.affected, "Reminders sent");
    Ok(report)
}

/// Growth metrics for one user as of `date`, or `None` without reflections.
pub fn daily_metric(
    user_id: &str,
    date: NaiveDate,
    reflections: &[Value],
    active_spaces: &[Value],
    completed_spaces: usize,
) -> Option<Value> {
    if reflections.is_empty() {
        return None;
    }
    let scores: Vec<f64> = reflections
        .iter()
        .filter_map(|r| r.get("progress_score").and_then(Value::as_f64))
        .filter(|s| *s != 0.0)
        .collect();
    let avg = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };

    let keywords: HashSet<&str> = reflections
        .iter()
        .filter_map(|r| r.get("ai_keywords").and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_str)
        .collect();

    let actual: i64 = active_spaces
        .iter()
        .map(|s| s.get("total_reflections").and_then(Value::as_i64).unwrap_or(0))
        .sum();
    let expected: i64 = active_spaces
        .iter()
        .map(|s| s.get("expected_reflections").and_then(Value::as_i64).unwrap_or(1))
        .sum();
    let completion = if expected > 0 { actual * 100 / expected } else { 0 };

    Some(json!({
        "user_id": user_id,
        "date": date.to_string(),
        "avg_progress_score": (avg * 100.0).round() / 100.0,
        "total_reflections": reflections.len(),
        "keyword_count": keywords.len(),
        "completion_rate": completion.min(100),
        "project_completion_count": completed_spaces,
    }))
}

/// Upserts yesterday's growth metrics for every user with reflections.
#[instrument(skip(db))]
pub async fn calculate_daily_metrics(db: &dyn Database, today: NaiveDate) -> Result<JobReport> {
    let mut report = JobReport::new(Job::CalculateDailyMetrics);
    let yesterday = today - Duration::days(1);
    let users = db.select(&Query::table(schema::USERS).select(&["id"])).await?.rows;
    info!(users = users.len(), "Calculating daily metrics");

    for user in &users {
        let Some(user_id) = user.get("id").and_then(Value::as_str) else {
            continue;
        };
        report.scanned += 1;
        let reflections = db
            .select(
                &Query::table(schema::REFLECTIONS)
                    .select(&["progress_score", "ai_keywords"])
                    .eq("user_id", user_id)
                    .lte("reflection_date", yesterday.to_string()),
            )
            .await?
            .rows;
        if reflections.is_empty() {
            continue;
        }
        let active = db
            .select(
                &Query::table(schema::REFLECTION_SPACES)
                    .select(&["total_reflections", "expected_reflections"])
                    .eq("user_id", user_id)
                    .eq("status", "active"),
            )
            .await?
            .rows;
        let completed = db
            .count(
                &Query::table(schema::REFLECTION_SPACES)
                    .select(&["id"])
                    .eq("user_id", user_id)
                    .eq("status", "completed"),
            )
            .await?;

        let Some(metric) = daily_metric(user_id, yesterday, &reflections, &active, completed) else {
            continue;
        };
        match db.upsert(schema::GROWTH_METRICS, vec![metric], &["user_id", "date"]).await {
            Ok(_) => report.affected += 1,
            Err(e) => {
                warn!(%user_id, error = %e, "Failed to store growth metrics");
                report.errors.push(format!("{user_id}: {e}"));
            }
        }
    }
    info!(stored = report.affected, "Daily metrics calculated");
    Ok(report)
}

/// Deletes AI analysis rows whose `expires_at` has passed.
#[instrument(skip(db))]
pub async fn cleanup_cache(db: &dyn Database) -> Result<JobReport> {
    let mut report = JobReport::new(Job::CleanupCache);
    let deleted = db
        .delete(&Query::table(schema::REFLECTION_AI_ANALYSIS).lt("expires_at", Utc::now().to_rfc3339()))
        .await?;
    report.scanned = deleted.len();
    report.affected = deleted.len();
    info!(deleted = deleted.len(), "Expired analysis cache removed");
    Ok(report)
}

/// Marks active spaces whose end date has passed as completed.
#[instrument(skip(db))]
pub async fn update_status(db: &dyn Database, today: NaiveDate) -> Result<JobReport> {
    let mut report = JobReport::new(Job::UpdateStatus);
    let updated = db
        .update(
            &Query::table(schema::REFLECTION_SPACES)
                .eq("status", "active")
                .lt("end_date", today.to_string()),
            json!({ "status": "completed" }),
        )
        .await?;
    report.scanned = updated.len();
    report.affected = updated.len();
    info!(completed = updated.len(), "Space statuses updated");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn metric_aggregates_reflections_and_spaces() {
        let reflections = vec![
            json!({ "progress_score": 4, "ai_keywords": ["긍정", "행동"] }),
            json!({ "progress_score": 5, "ai_keywords": ["긍정"] }),
            json!({ "progress_score": null, "ai_keywords": null }),
        ];
        let spaces = vec![
            json!({ "total_reflections": 3, "expected_reflections": 4 }),
            json!({ "total_reflections": 5, "expected_reflections": 4 }),
        ];
        let metric = daily_metric("u1", d(2024, 5, 9), &reflections, &spaces, 2).unwrap();
        assert_eq!(metric["avg_progress_score"], 4.5);
        assert_eq!(metric["total_reflections"], 3);
        assert_eq!(metric["keyword_count"], 2);
        assert_eq!(metric["completion_rate"], 100);
        assert_eq!(metric["project_completion_count"], 2);
        assert_eq!(metric["date"], "2024-05-09");
    }

    #[test]
    fn no_reflections_means_no_metric() {
        assert!(daily_metric("u1", d(2024, 5, 9), &[], &[], 0).is_none());
    }

    #[test]
    fn completion_without_spaces_is_zero() {
        let metric = daily_metric("u1", d(2024, 5, 9), &[json!({ "progress_score": 3 })], &[], 0).unwrap();
        assert_eq!(metric["completion_rate"], 0);
    }

    #[test]
    fn job_names_are_kebab_case() {
        assert_eq!(Job::RunAllDaily.name(), "run-all-daily");
        assert_eq!(Job::SendReminders.name(), "send-reminders");
    }
}
