pub mod auth;
pub mod batch;
pub mod cadence;
pub mod config;
pub mod crawlers;
pub mod db;
pub mod envelope;
pub mod error;
pub mod insights;
pub mod logging;
pub mod metrics;
pub mod routes;
pub mod server;
