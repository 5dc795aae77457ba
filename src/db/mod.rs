//! Row-level access to the hosted relational store.
//!
//! Handlers build a [`Query`] and hand it to a [`Database`]. The production
//! backend talks PostgREST; the in-memory backend mirrors its semantics for
//! tests and local runs.

pub mod memory;
pub mod postgrest;
pub mod query;
pub mod schema;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, DatabaseBackend};
use crate::error::{AppError, Result};

pub use memory::InMemoryDatabase;
pub use postgrest::SupabaseClient;
pub use query::{Embed, Filter, Order, Query};

#[derive(Debug, Clone, Default)]
pub struct Rows {
    pub rows: Vec<Value>,
    /// Total matching rows, present when the query asked for a count.
    pub count: Option<usize>,
}

#[async_trait]
pub trait Database: Send + Sync {
    async fn select(&self, query: &Query) -> Result<Rows>;

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>>;

    /// Insert, or merge into the row that matches on every `on_conflict` column.
    async fn upsert(&self, table: &str, rows: Vec<Value>, on_conflict: &[&str]) -> Result<Vec<Value>>;

    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>>;

    async fn delete(&self, query: &Query) -> Result<Vec<Value>>;

    async fn select_one(&self, query: &Query) -> Result<Option<Value>> {
        let query = query.clone().limit(1);
        Ok(self.select(&query).await?.rows.into_iter().next())
    }

    async fn count(&self, query: &Query) -> Result<usize> {
        let mut query = query.clone().with_count();
        query.limit = Some(0);
        let rows = self.select(&query).await?;
        Ok(rows.count.unwrap_or(rows.rows.len()))
    }

    async fn insert_one(&self, table: &str, row: Value) -> Result<Value> {
        self.insert(table, vec![row])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Database(format!("insert into {table} returned no rows")))
    }
}

static SHARED: OnceCell<Arc<dyn Database>> = OnceCell::new();

/// Builds a fresh client for the configured backend.
pub fn connect(config: &Config) -> Result<Arc<dyn Database>> {
    match config.database.backend {
        DatabaseBackend::Supabase => {
            let client = SupabaseClient::from_config(&config.database)?;
            info!("Using Supabase backend at {}", client.base_url());
            Ok(Arc::new(client))
        }
        DatabaseBackend::Memory => {
            info!("Using in-memory database backend");
            Ok(Arc::new(InMemoryDatabase::new()))
        }
    }
}

/// Process-wide client, built on first use and reused afterwards.
pub fn shared(config: &Config) -> Result<Arc<dyn Database>> {
    SHARED.get_or_try_init(|| connect(config)).cloned()
}
