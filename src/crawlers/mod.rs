//! Activity crawler: collects listings from each source concurrently,
//! enriches them and stores them deduplicated by URL.

pub mod enrich;
pub mod sources;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::db::{schema, Database, Query};
use crate::error::Result;
use crate::metrics::{self, MetricName};

/// A listing as a source reports it, before enrichment.
#[derive(Debug, Clone, PartialEq)]
pub struct RawListing {
    pub title: String,
    pub organization: String,
    pub category: String,
    pub kind: String,
    pub description: String,
    pub application_end_date: Option<NaiveDate>,
    pub fields: Vec<String>,
    pub prize_money: i64,
    pub url: String,
    pub difficulty_level: String,
}

#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Stored as the activity's `source`.
    fn source_name(&self) -> &'static str;

    async fn fetch_activities(&self, today: NaiveDate) -> Result<Vec<RawListing>>;
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CrawlReport {
    pub collected: usize,
    pub saved: usize,
    pub updated: usize,
    pub errors: Vec<String>,
}

/// Activity row for a listing: keywords, tags and majors derived from its fields.
pub fn to_activity(source: &str, listing: &RawListing) -> Value {
    let text = format!("{} {}", listing.title, listing.description);
    let fields = if listing.fields.is_empty() {
        enrich::extract_fields(&text)
    } else {
        listing.fields.clone()
    };
    json!({
        "title": listing.title,
        "organization": listing.organization,
        "category": listing.category,
        "type": listing.kind,
        "description": listing.description,
        "application_end_date": listing.application_end_date.map(|d| d.to_string()),
        "field": fields,
        "keywords": enrich::extract_keywords(&text, &fields),
        "tags": fields,
        "prize_money": listing.prize_money,
        "url": listing.url,
        "source": source,
        "status": "active",
        "crawled_at": Utc::now().to_rfc3339(),
        "difficulty_level": listing.difficulty_level,
        "recommended_majors": enrich::recommended_majors(&fields),
    })
}

/// Inserts a new activity or updates the one already stored under its URL.
/// Returns `true` for an insert.
pub async fn save_activity(db: &dyn Database, activity: Value) -> Result<bool> {
    let url = activity.get("url").and_then(Value::as_str).unwrap_or_default().to_string();
    let existing = db
        .select_one(&Query::table(schema::ACTIVITIES).select(&["id"]).eq("url", url.as_str()))
        .await?;
    match existing.as_ref().and_then(|row| row.get("id")).cloned() {
        Some(id) => {
            db.update(&Query::table(schema::ACTIVITIES).eq("id", id), activity).await?;
            Ok(false)
        }
        None => {
            db.insert_one(schema::ACTIVITIES, activity).await?;
            Ok(true)
        }
    }
}

/// Fetches every source in parallel, then stores what was collected.
/// A failing source is logged and skipped.
pub async fn run_crawl(
    db: &dyn Database,
    sources: Vec<Box<dyn ActivitySource>>,
    today: NaiveDate,
) -> Result<CrawlReport> {
    let mut report = CrawlReport::default();
    let mut tasks = JoinSet::new();
    for source in sources {
        tasks.spawn(async move {
            let name = source.source_name();
            (name, source.fetch_activities(today).await)
        });
    }

    let mut activities = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((name, Ok(listings))) => {
                info!(source = name, count = listings.len(), "Source crawled");
                activities.extend(listings.iter().map(|l| to_activity(name, l)));
            }
            Ok((name, Err(e))) => {
                error!(source = name, error = %e, "Source failed");
                metrics::increment_labeled(MetricName::CrawlerErrors, "source", name.to_string());
                report.errors.push(format!("{name}: {e}"));
            }
            Err(e) => {
                error!(error = %e, "Crawl task panicked");
                report.errors.push(format!("task: {e}"));
            }
        }
    }
    report.collected = activities.len();
    info!(collected = report.collected, "Saving crawled activities");

    for activity in activities {
        let title = activity.get("title").and_then(Value::as_str).unwrap_or_default().to_string();
        match save_activity(db, activity).await {
            Ok(true) => {
                report.saved += 1;
                metrics::increment(MetricName::ActivitiesSaved, 1);
            }
            Ok(false) => {
                report.updated += 1;
                metrics::increment(MetricName::ActivitiesUpdated, 1);
            }
            Err(e) => {
                warn!(%title, error = %e, "Failed to store activity");
                report.errors.push(format!("{title}: {e}"));
            }
        }
    }
    info!(
        saved = report.saved,
        updated = report.updated,
        errors = report.errors.len(),
        "Crawl finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(fields: &[&str]) -> RawListing {
        RawListing {
            title: "React 웹개발 해커톤".to_string(),
            organization: "PROOF".to_string(),
            category: "contest".to_string(),
            kind: "해커톤".to_string(),
            description: "대학생 온라인 참가".to_string(),
            application_end_date: NaiveDate::from_ymd_opt(2025, 2, 1),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            prize_money: 0,
            url: "https://example.org/1".to_string(),
            difficulty_level: "beginner".to_string(),
        }
    }

    #[test]
    fn listing_fields_are_kept() {
        let row = to_activity("wevity", &listing(&["디자인"]));
        assert_eq!(row["field"], json!(["디자인"]));
        assert_eq!(row["source"], "wevity");
        assert_eq!(row["application_end_date"], "2025-02-01");
        assert_eq!(row["recommended_majors"][0], enrich::ANY_MAJOR);
    }

    #[test]
    fn missing_fields_are_detected() {
        let row = to_activity("wevity", &listing(&[]));
        assert_eq!(row["field"], json!(["IT"]));
        assert_eq!(row["keywords"], json!(["React", "웹개발", "대학생", "온라인"]));
    }
}
