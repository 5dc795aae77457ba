use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use super::query::{Embed, Filter, Order, Query};
use super::schema;
use super::{Database, Rows};
use crate::error::{AppError, Result};

/// In-memory tables of JSON rows for development and tests.
#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    tables: Arc<Mutex<HashMap<String, Vec<Value>>>>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts rows directly, bypassing unique checks. Missing ids are generated.
    pub fn seed(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>> {
        let mut tables = self.lock()?;
        let stored: Vec<Value> = rows.into_iter().map(with_defaults).collect::<Result<_>>()?;
        tables
            .entry(table.to_string())
            .or_default()
            .extend(stored.iter().cloned());
        Ok(stored)
    }

    /// Snapshot of a table, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.lock()
            .map(|t| t.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<Value>>>> {
        self.tables
            .lock()
            .map_err(|_| AppError::Internal("in-memory database lock poisoned".to_string()))
    }
}

#[async_trait]
impl Database for InMemoryDatabase {
    async fn select(&self, query: &Query) -> Result<Rows> {
        let tables = self.lock()?;
        let source = tables.get(&query.table).map(Vec::as_slice).unwrap_or(&[]);

        let mut matched: Vec<Value> = source
            .iter()
            .filter(|row| query.filters.iter().all(|f| matches_filter(row, f)))
            .cloned()
            .collect();
        sort_rows(&mut matched, &query.order);

        let count = query.count.then_some(matched.len());
        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        let rows = matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| {
                let row = resolve_embeds(row, &query.embeds, &tables);
                project(row, &query.columns, &query.embeds)
            })
            .collect();

        debug!(table = %query.table, "in-memory select");
        Ok(Rows { rows, count })
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>> {
        let mut tables = self.lock()?;
        let existing = tables.entry(table.to_string()).or_default();

        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            let row = with_defaults(row)?;
            if let Some(cols) = violated_key(table, existing, &row, None) {
                return Err(AppError::Conflict(format!(
                    "duplicate key value violates unique constraint on {}({})",
                    table,
                    cols.join(", ")
                )));
            }
            existing.push(row.clone());
            inserted.push(row);
        }
        debug!(table, count = inserted.len(), "in-memory insert");
        Ok(inserted)
    }

    async fn upsert(&self, table: &str, rows: Vec<Value>, on_conflict: &[&str]) -> Result<Vec<Value>> {
        let mut tables = self.lock()?;
        let existing = tables.entry(table.to_string()).or_default();

        let mut written = Vec::with_capacity(rows.len());
        for row in rows {
            let position = existing.iter().position(|current| {
                on_conflict
                    .iter()
                    .all(|col| loose_eq(field(current, col), field(&row, col)))
            });
            let (candidate, skip) = match position {
                Some(idx) => {
                    let mut merged = existing[idx].clone();
                    merge(&mut merged, &row);
                    (merged, Some(idx))
                }
                None => (with_defaults(row)?, None),
            };
            if let Some(cols) = violated_key(table, existing, &candidate, skip) {
                return Err(AppError::Conflict(format!(
                    "duplicate key value violates unique constraint on {}({})",
                    table,
                    cols.join(", ")
                )));
            }
            match skip {
                Some(idx) => existing[idx] = candidate.clone(),
                None => existing.push(candidate.clone()),
            }
            written.push(candidate);
        }
        Ok(written)
    }

    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>> {
        if query.filters.is_empty() {
            return Err(AppError::Internal(format!(
                "unfiltered update on {} rejected",
                query.table
            )));
        }
        let mut tables = self.lock()?;
        let Some(rows) = tables.get_mut(&query.table) else {
            return Ok(Vec::new());
        };
        let matched: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| query.filters.iter().all(|f| matches_filter(row, f)))
            .map(|(idx, _)| idx)
            .collect();

        // Apply to a copy so a conflicting patch leaves the table untouched.
        let mut next = rows.clone();
        for &idx in &matched {
            merge(&mut next[idx], &patch);
        }
        for &idx in &matched {
            if let Some(cols) = violated_key(&query.table, &next, &next[idx], Some(idx)) {
                return Err(AppError::Conflict(format!(
                    "duplicate key value violates unique constraint on {}({})",
                    query.table,
                    cols.join(", ")
                )));
            }
        }
        let updated = matched.iter().map(|&idx| next[idx].clone()).collect();
        *rows = next;
        Ok(updated)
    }

    async fn delete(&self, query: &Query) -> Result<Vec<Value>> {
        if query.filters.is_empty() {
            return Err(AppError::Internal(format!(
                "unfiltered delete on {} rejected",
                query.table
            )));
        }
        let mut tables = self.lock()?;
        let Some(rows) = tables.get_mut(&query.table) else {
            return Ok(Vec::new());
        };
        let (removed, kept): (Vec<Value>, Vec<Value>) = rows
            .drain(..)
            .partition(|row| query.filters.iter().all(|f| matches_filter(row, f)));
        *rows = kept;
        Ok(removed)
    }
}

fn with_defaults(row: Value) -> Result<Value> {
    let Value::Object(mut map) = row else {
        return Err(AppError::BadRequest("row must be a JSON object".to_string()));
    };
    if map.get("id").map_or(true, Value::is_null) {
        map.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
    }
    if map.get("created_at").map_or(true, Value::is_null) {
        map.insert("created_at".into(), Value::String(Utc::now().to_rfc3339()));
    }
    Ok(Value::Object(map))
}

/// First unique key `row` shares with a row of `existing`, ignoring the row at `skip`.
fn violated_key(
    table: &str,
    existing: &[Value],
    row: &Value,
    skip: Option<usize>,
) -> Option<&'static [&'static str]> {
    schema::unique_keys(table).find(|cols| {
        // NULLs never collide, as in SQL.
        if cols.iter().any(|c| field(row, c).is_null()) {
            return false;
        }
        existing
            .iter()
            .enumerate()
            .filter(|(idx, _)| Some(*idx) != skip)
            .any(|(_, other)| cols.iter().all(|c| loose_eq(field(other, c), field(row, c))))
    })
}

fn merge(target: &mut Value, patch: &Value) {
    if let (Value::Object(target), Value::Object(patch)) = (target, patch) {
        for (k, v) in patch {
            target.insert(k.clone(), v.clone());
        }
    }
}

fn field<'a>(row: &'a Value, column: &str) -> &'a Value {
    row.get(column).unwrap_or(&Value::Null)
}

/// Equality that treats `1`, `1.0` and `"1"` alike, the way PostgREST's text filters do.
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::String(s), other) | (other, Value::String(s)) if !other.is_string() => {
            scalar_text(other).map_or(false, |t| &t == s)
        }
        _ => a == b,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::String(y)) => x.as_f64()?.partial_cmp(&y.parse::<f64>().ok()?),
        (Value::String(x), Value::Number(y)) => x.parse::<f64>().ok()?.partial_cmp(&y.as_f64()?),
        _ => None,
    }
}

fn like_to_regex(pattern: &str) -> Option<Regex> {
    let mut expr = String::from("(?is)^");
    let mut literal = String::new();
    for ch in pattern.chars() {
        match ch {
            '%' | '*' | '_' => {
                expr.push_str(&regex::escape(&literal));
                literal.clear();
                expr.push_str(if ch == '_' { "." } else { ".*" });
            }
            other => literal.push(other),
        }
    }
    expr.push_str(&regex::escape(&literal));
    expr.push('$');
    Regex::new(&expr).ok()
}

fn array_items(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or(&[])
}

pub(crate) fn matches_filter(row: &Value, filter: &Filter) -> bool {
    match filter {
        Filter::Eq(col, v) => loose_eq(field(row, col), v),
        Filter::Neq(col, v) => {
            let current = field(row, col);
            !current.is_null() && !loose_eq(current, v)
        }
        Filter::Gt(col, v) => compare(field(row, col), v) == Some(Ordering::Greater),
        Filter::Gte(col, v) => matches!(
            compare(field(row, col), v),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Filter::Lt(col, v) => compare(field(row, col), v) == Some(Ordering::Less),
        Filter::Lte(col, v) => matches!(
            compare(field(row, col), v),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Filter::ILike(col, pattern) => match (field(row, col).as_str(), like_to_regex(pattern)) {
            (Some(text), Some(re)) => re.is_match(text),
            _ => false,
        },
        Filter::IsNull(col) => field(row, col).is_null(),
        Filter::NotNull(col) => !field(row, col).is_null(),
        Filter::In(col, values) => values.iter().any(|v| loose_eq(field(row, col), v)),
        Filter::Contains(col, values) => {
            let items = array_items(field(row, col));
            values.iter().all(|v| items.iter().any(|i| loose_eq(i, v)))
        }
        Filter::Overlaps(col, values) => {
            let items = array_items(field(row, col));
            values.iter().any(|v| items.iter().any(|i| loose_eq(i, v)))
        }
        Filter::Or(filters) => filters.iter().any(|f| matches_filter(row, f)),
    }
}

/// Ascending puts NULLs last and descending puts them first, as Postgres does.
fn sort_rows(rows: &mut [Value], order: &[Order]) {
    if order.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for o in order {
            let (x, y) = (field(a, &o.column), field(b, &o.column));
            let ord = match (x.is_null(), y.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => compare(x, y).unwrap_or(Ordering::Equal),
            };
            let ord = if o.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn resolve_embeds(mut row: Value, embeds: &[Embed], tables: &HashMap<String, Vec<Value>>) -> Value {
    for embed in embeds {
        let target = field(&row, &embed.foreign_key).clone();
        let joined = tables
            .get(&embed.table)
            .and_then(|rows| rows.iter().find(|r| loose_eq(field(r, "id"), &target)))
            .map(|r| project(r.clone(), &embed.columns, &[]))
            .unwrap_or(Value::Null);
        if let Value::Object(map) = &mut row {
            map.insert(embed.table.clone(), joined);
        }
    }
    row
}

fn project(row: Value, columns: &[String], embeds: &[Embed]) -> Value {
    if columns.is_empty() || columns.iter().any(|c| c == "*") {
        return row;
    }
    let Value::Object(map) = row else {
        return row;
    };
    let mut out = Map::new();
    for (k, v) in map {
        if columns.contains(&k) || embeds.iter().any(|e| e.table == k) {
            out.insert(k, v);
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn db_with_logs() -> InMemoryDatabase {
        let db = InMemoryDatabase::new();
        db.seed(
            "micro_logs",
            vec![
                json!({"id": "a", "user_id": "u1", "date": "2024-03-01", "tags": ["개발", "협업"], "memo": "API 설계"}),
                json!({"id": "b", "user_id": "u1", "date": "2024-03-03", "tags": ["공부"], "memo": null}),
                json!({"id": "c", "user_id": "u2", "date": "2024-03-02", "tags": [], "memo": "회의"}),
            ],
        )
        .unwrap();
        db
    }

    #[tokio::test]
    async fn filters_sorts_and_counts() {
        let db = db_with_logs();
        let query = Query::table("micro_logs")
            .eq("user_id", "u1")
            .order_desc("date")
            .range(0, 1)
            .with_count();
        let result = db.select(&query).await.unwrap();
        assert_eq!(result.count, Some(2));
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0]["id"], "b");
    }

    #[tokio::test]
    async fn date_range_and_array_filters() {
        let db = db_with_logs();
        let in_range = db
            .select(&Query::table("micro_logs").gte("date", "2024-03-02").lte("date", "2024-03-03"))
            .await
            .unwrap();
        assert_eq!(in_range.rows.len(), 2);

        let tagged = db
            .select(&Query::table("micro_logs").contains("tags", ["개발"]))
            .await
            .unwrap();
        assert_eq!(tagged.rows.len(), 1);

        let any_tag = db
            .select(&Query::table("micro_logs").overlaps("tags", ["공부", "협업"]))
            .await
            .unwrap();
        assert_eq!(any_tag.rows.len(), 2);
    }

    #[tokio::test]
    async fn ilike_is_case_insensitive_and_skips_nulls() {
        let db = db_with_logs();
        let rows = db
            .select(&Query::table("micro_logs").ilike("memo", "%api%"))
            .await
            .unwrap();
        assert_eq!(rows.rows.len(), 1);
        assert_eq!(rows.rows[0]["id"], "a");
    }

    #[tokio::test]
    async fn or_filter_matches_any_branch() {
        let db = db_with_logs();
        let rows = db
            .select(&Query::table("micro_logs").or(vec![
                Filter::Eq("id".into(), json!("a")),
                Filter::Eq("user_id".into(), json!("u2")),
            ]))
            .await
            .unwrap();
        assert_eq!(rows.rows.len(), 2);
    }

    #[tokio::test]
    async fn nulls_sort_last_ascending() {
        let db = db_with_logs();
        let rows = db
            .select(&Query::table("micro_logs").order_asc("memo"))
            .await
            .unwrap();
        assert_eq!(rows.rows.last().unwrap()["id"], "b");
    }

    #[tokio::test]
    async fn unique_key_rejects_duplicate_insert() {
        let db = InMemoryDatabase::new();
        db.insert("user_bookmarks", vec![json!({"user_id": "u1", "activity_id": "x"})])
            .await
            .unwrap();
        let err = db
            .insert("user_bookmarks", vec![json!({"user_id": "u1", "activity_id": "x"})])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_cannot_duplicate_unique_key() {
        let db = InMemoryDatabase::new();
        db.insert(
            "users",
            vec![
                json!({"id": "a", "email": "a@x.com"}),
                json!({"id": "b", "email": "b@x.com"}),
            ],
        )
        .await
        .unwrap();

        let err = db
            .update(&Query::table("users").eq("id", "b"), json!({"email": "a@x.com"}))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let same = db.select(&Query::table("users").eq("email", "a@x.com")).await.unwrap();
        assert_eq!(same.rows.len(), 1);
        assert_eq!(db.rows("users")[1]["email"], "b@x.com");

        // Rewriting a row's own key is not a collision.
        let kept = db
            .update(&Query::table("users").eq("id", "b"), json!({"email": "b@x.com", "name": "B"}))
            .await
            .unwrap();
        assert_eq!(kept[0]["name"], "B");
    }

    #[tokio::test]
    async fn upsert_merges_on_conflict_columns() {
        let db = InMemoryDatabase::new();
        db.upsert(
            "health_checks",
            vec![json!({"user_id": "u1", "date": "2024-03-01", "health_score": 40})],
            &["user_id", "date"],
        )
        .await
        .unwrap();
        let rows = db
            .upsert(
                "health_checks",
                vec![json!({"user_id": "u1", "date": "2024-03-01", "health_score": 80})],
                &["user_id", "date"],
            )
            .await
            .unwrap();
        assert_eq!(rows[0]["health_score"], 80);
        assert_eq!(db.rows("health_checks").len(), 1);
    }

    #[tokio::test]
    async fn embeds_resolve_foreign_keys() {
        let db = InMemoryDatabase::new();
        db.seed("keywords", vec![json!({"id": "k1", "name": "리더십", "category": "soft"})])
            .unwrap();
        db.seed("user_keywords", vec![json!({"user_id": "u1", "keyword_id": "k1", "experience_count": 2})])
            .unwrap();
        let rows = db
            .select(
                &Query::table("user_keywords")
                    .select(&["experience_count"])
                    .embed(Embed::new("keywords", "keyword_id").columns(&["name"])),
            )
            .await
            .unwrap();
        assert_eq!(rows.rows[0], json!({"experience_count": 2, "keywords": {"name": "리더십"}}));
    }

    #[tokio::test]
    async fn update_and_delete_require_filters() {
        let db = db_with_logs();
        assert!(db.update(&Query::table("micro_logs"), json!({"memo": "x"})).await.is_err());

        let removed = db.delete(&Query::table("micro_logs").eq("user_id", "u2")).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(db.rows("micro_logs").len(), 2);
    }

    #[test]
    fn numbers_and_text_compare_loosely() {
        assert!(loose_eq(&json!(3), &json!("3")));
        assert!(loose_eq(&json!(true), &json!("true")));
        assert!(!loose_eq(&json!(null), &json!(null)));
    }
}
