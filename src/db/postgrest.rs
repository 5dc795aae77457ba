use async_trait::async_trait;
use reqwest::{header, Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::query::{Filter, Query};
use super::{Database, Rows};
use crate::config::DatabaseConfig;
use crate::error::{AppError, Result};

const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// PostgREST client for a Supabase project (`{url}/rest/v1/{table}`).
#[derive(Clone)]
pub struct SupabaseClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SupabaseClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let url = config
            .supabase_url
            .as_deref()
            .ok_or_else(|| AppError::Config("SUPABASE_URL is not set".to_string()))?;
        let key = config
            .supabase_key
            .as_deref()
            .ok_or_else(|| AppError::Config("SUPABASE_SERVICE_KEY is not set".to_string()))?;
        let timeout = Duration::from_secs(config.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS));
        Self::new(url, key, timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let endpoint = format!("{}/rest/v1/{}", self.base_url, table);
        self.client
            .request(method, endpoint)
            .header("apikey", &self.api_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
    }

    async fn rows(response: Response) -> Result<Vec<Value>> {
        let response = check_status(response).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&text)? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    warn!(%status, %message, "PostgREST request failed");
    Err(match status {
        StatusCode::NOT_FOUND => AppError::NotFound(message),
        StatusCode::CONFLICT => AppError::Conflict(message),
        _ => AppError::Database(format!("{status}: {message}")),
    })
}

/// Text form of a filter value as PostgREST expects it after the operator.
fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Double-quoted PostgREST literal with `\` and `"` escaped.
fn quoted(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Items inside `in.(...)`, `cs.{...}` and `ov.{...}` lists; reserved characters force quoting.
fn list_item(value: &Value) -> String {
    let text = literal(value);
    if text.contains([',', '(', ')', '{', '}', '"', '\\', ' ']) {
        quoted(&text)
    } else {
        text
    }
}

fn join_list(values: &[Value]) -> String {
    values.iter().map(list_item).collect::<Vec<_>>().join(",")
}

/// `op.value` for one filter, without the column.
fn operator(filter: &Filter) -> Option<(String, String)> {
    let pair = match filter {
        Filter::Eq(c, v) => (c.clone(), format!("eq.{}", literal(v))),
        Filter::Neq(c, v) => (c.clone(), format!("neq.{}", literal(v))),
        Filter::Gt(c, v) => (c.clone(), format!("gt.{}", literal(v))),
        Filter::Gte(c, v) => (c.clone(), format!("gte.{}", literal(v))),
        Filter::Lt(c, v) => (c.clone(), format!("lt.{}", literal(v))),
        Filter::Lte(c, v) => (c.clone(), format!("lte.{}", literal(v))),
        Filter::ILike(c, p) => (c.clone(), format!("ilike.{}", p.replace('%', "*"))),
        Filter::IsNull(c) => (c.clone(), "is.null".to_string()),
        Filter::NotNull(c) => (c.clone(), "not.is.null".to_string()),
        Filter::In(c, vs) => (c.clone(), format!("in.({})", join_list(vs))),
        Filter::Contains(c, vs) => (c.clone(), format!("cs.{{{}}}", join_list(vs))),
        Filter::Overlaps(c, vs) => (c.clone(), format!("ov.{{{}}}", join_list(vs))),
        Filter::Or(_) => return None,
    };
    Some(pair)
}

/// One `col.op.value` member of an `or=(...)` group. Scalar values are always
/// quoted so commas and parentheses in user input stay inside the condition.
fn or_condition(filter: &Filter) -> Option<String> {
    let scalar = |c: &str, op: &str, text: String| Some(format!("{c}.{op}.{}", quoted(&text)));
    match filter {
        Filter::Eq(c, v) => scalar(c, "eq", literal(v)),
        Filter::Neq(c, v) => scalar(c, "neq", literal(v)),
        Filter::Gt(c, v) => scalar(c, "gt", literal(v)),
        Filter::Gte(c, v) => scalar(c, "gte", literal(v)),
        Filter::Lt(c, v) => scalar(c, "lt", literal(v)),
        Filter::Lte(c, v) => scalar(c, "lte", literal(v)),
        Filter::ILike(c, p) => scalar(c, "ilike", p.replace('%', "*")),
        other => operator(other).map(|(col, op)| format!("{col}.{op}")),
    }
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    let mut params = Vec::new();
    for filter in filters {
        match filter {
            Filter::Or(branches) => {
                let inner: Vec<String> = branches.iter().filter_map(or_condition).collect();
                params.push(("or".to_string(), format!("({})", inner.join(","))));
            }
            other => {
                if let Some(pair) = operator(other) {
                    params.push(pair);
                }
            }
        }
    }
    params
}

/// Renders a query into PostgREST URL parameters.
pub fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut select = if query.columns.is_empty() {
        vec!["*".to_string()]
    } else {
        query.columns.clone()
    };
    for embed in &query.embeds {
        let cols = if embed.columns.is_empty() {
            "*".to_string()
        } else {
            embed.columns.join(",")
        };
        select.push(format!("{}!{}({})", embed.table, embed.foreign_key, cols));
    }

    let mut params = vec![("select".to_string(), select.join(","))];
    params.extend(filter_params(&query.filters));

    if !query.order.is_empty() {
        let order = query
            .order
            .iter()
            .map(|o| format!("{}.{}", o.column, if o.descending { "desc" } else { "asc" }))
            .collect::<Vec<_>>()
            .join(",");
        params.push(("order".to_string(), order));
    }
    if let Some(offset) = query.offset.filter(|o| *o > 0) {
        params.push(("offset".to_string(), offset.to_string()));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

/// Total from a `Content-Range` header such as `0-19/57` or `*/0`.
pub fn parse_content_range(value: &str) -> Option<usize> {
    value.rsplit('/').next()?.trim().parse().ok()
}

#[async_trait]
impl Database for SupabaseClient {
    #[instrument(skip(self, query), fields(table = %query.table))]
    async fn select(&self, query: &Query) -> Result<Rows> {
        let mut request = self.request(Method::GET, &query.table).query(&query_params(query));
        if query.count {
            request = request.header("Prefer", "count=exact");
        }
        let response = check_status(request.send().await?).await?;
        let count = response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);
        let rows = Self::rows(response).await?;
        debug!(rows = rows.len(), ?count, "select finished");
        Ok(Rows {
            rows,
            count: if query.count { count } else { None },
        })
    }

    #[instrument(skip(self, rows))]
    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>> {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&rows)
            .send()
            .await?;
        Self::rows(response).await
    }

    #[instrument(skip(self, rows))]
    async fn upsert(&self, table: &str, rows: Vec<Value>, on_conflict: &[&str]) -> Result<Vec<Value>> {
        let response = self
            .request(Method::POST, table)
            .query(&[("on_conflict", on_conflict.join(","))])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&rows)
            .send()
            .await?;
        Self::rows(response).await
    }

    #[instrument(skip(self, query, patch), fields(table = %query.table))]
    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>> {
        if query.filters.is_empty() {
            return Err(AppError::Internal(format!(
                "unfiltered update on {} rejected",
                query.table
            )));
        }
        let response = self
            .request(Method::PATCH, &query.table)
            .query(&filter_params(&query.filters))
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        Self::rows(response).await
    }

    #[instrument(skip(self, query), fields(table = %query.table))]
    async fn delete(&self, query: &Query) -> Result<Vec<Value>> {
        if query.filters.is_empty() {
            return Err(AppError::Internal(format!(
                "unfiltered delete on {} rejected",
                query.table
            )));
        }
        let response = self
            .request(Method::DELETE, &query.table)
            .query(&filter_params(&query.filters))
            .header("Prefer", "return=representation")
            .send()
            .await?;
        Self::rows(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::query::Embed;
    use serde_json::json;

    fn param<'a>(params: &'a [(String, String)], key: &str) -> Vec<&'a str> {
        params
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    #[test]
    fn renders_filters_order_and_range() {
        let query = Query::table("micro_logs")
            .eq("user_id", "u1")
            .gte("date", "2024-03-01")
            .order_desc("date")
            .order_desc("created_at")
            .range(20, 10);
        let params = query_params(&query);
        assert_eq!(param(&params, "select"), vec!["*"]);
        assert_eq!(param(&params, "user_id"), vec!["eq.u1"]);
        assert_eq!(param(&params, "date"), vec!["gte.2024-03-01"]);
        assert_eq!(param(&params, "order"), vec!["date.desc,created_at.desc"]);
        assert_eq!(param(&params, "offset"), vec!["20"]);
        assert_eq!(param(&params, "limit"), vec!["10"]);
    }

    #[test]
    fn renders_embeds_and_columns() {
        let query = Query::table("user_keywords")
            .select(&["id", "experience_count"])
            .embed(Embed::new("keywords", "keyword_id").columns(&["name", "category"]));
        let params = query_params(&query);
        assert_eq!(
            param(&params, "select"),
            vec!["id,experience_count,keywords!keyword_id(name,category)"]
        );
    }

    #[test]
    fn renders_list_operators() {
        let query = Query::table("activities")
            .in_list("category", ["공모전", "대외 활동"])
            .overlaps("fields", ["IT"])
            .contains("tags", ["a,b"])
            .ilike("title", "%해커톤%")
            .is_null("deleted_at")
            .eq("is_active", true);
        let params = query_params(&query);
        assert_eq!(param(&params, "category"), vec!["in.(공모전,\"대외 활동\")"]);
        assert_eq!(param(&params, "fields"), vec!["ov.{IT}"]);
        assert_eq!(param(&params, "tags"), vec!["cs.{\"a,b\"}"]);
        assert_eq!(param(&params, "title"), vec!["ilike.*해커톤*"]);
        assert_eq!(param(&params, "deleted_at"), vec!["is.null"]);
        assert_eq!(param(&params, "is_active"), vec!["eq.true"]);
    }

    #[test]
    fn renders_or_group() {
        let query = Query::table("logs").or(vec![
            Filter::ILike("title".into(), "%rust%".into()),
            Filter::ILike("content".into(), "%rust%".into()),
        ]);
        let params = query_params(&query);
        assert_eq!(param(&params, "or"), vec![r#"(title.ilike."*rust*",content.ilike."*rust*")"#]);
    }

    #[test]
    fn or_group_keeps_reserved_characters_inside_values() {
        let query = Query::table("reflection_templates").or(vec![
            Filter::ILike("name".into(), "%a,b(c)%".into()),
            Filter::Eq("description".into(), json!(r#"say "hi" \ bye"#)),
        ]);
        let params = query_params(&query);
        assert_eq!(
            param(&params, "or"),
            vec![r#"(name.ilike."*a,b(c)*",description.eq."say \"hi\" \\ bye")"#]
        );
    }

    #[test]
    fn zero_offset_is_omitted() {
        let params = query_params(&Query::table("logs").range(0, 5).eq("n", json!(3)));
        assert!(param(&params, "offset").is_empty());
        assert_eq!(param(&params, "n"), vec!["eq.3"]);
    }

    #[test]
    fn content_range_totals() {
        assert_eq!(parse_content_range("0-19/57"), Some(57));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("0-9/*"), None);
    }
}
