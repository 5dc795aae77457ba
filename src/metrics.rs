//! Prometheus metrics for the API, batch jobs and crawler.
//!
//! The recorder is installed once per process. The server renders the handle
//! at `/metrics`; short-lived CLI runs simply record into it.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricName {
    HttpRequests,
    ActivitiesSaved,
    ActivitiesUpdated,
    CrawlerErrors,
    BatchJobRuns,
    BatchJobFailures,
    NotificationsCreated,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::HttpRequests => "proof_http_requests_total",
            MetricName::ActivitiesSaved => "proof_crawler_activities_saved_total",
            MetricName::ActivitiesUpdated => "proof_crawler_activities_updated_total",
            MetricName::CrawlerErrors => "proof_crawler_errors_total",
            MetricName::BatchJobRuns => "proof_batch_job_runs_total",
            MetricName::BatchJobFailures => "proof_batch_job_failures_total",
            MetricName::NotificationsCreated => "proof_notifications_created_total",
        }
    }
}

/// Installs the Prometheus recorder. Idempotent; returns the shared handle when available.
pub fn init() -> Option<&'static PrometheusHandle> {
    if let Some(handle) = HANDLE.get() {
        return Some(handle);
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("Prometheus recorder installed");
            let _ = HANDLE.set(handle);
        }
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    }
    HANDLE.get()
}

/// Text exposition of every recorded metric, empty when no recorder is installed.
pub fn render() -> String {
    HANDLE.get().map(|h| h.render()).unwrap_or_default()
}

pub fn increment(name: MetricName, value: u64) {
    ::metrics::counter!(name.as_str()).increment(value);
}

pub fn increment_labeled(name: MetricName, label: &'static str, value: String) {
    ::metrics::counter!(name.as_str(), label => value).increment(1);
}
