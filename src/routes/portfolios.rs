use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::auth::CurrentUser;
use crate::db::{schema, Embed, Query};
use crate::envelope::SuccessResponse;
use crate::error::{AppError, Result};
use crate::routes::{first_row, now, object, str_field, user_row};
use crate::server::AppState;

const FIXED_COLUMNS: &[&str] = &["id", "user_id", "created_at", "generated_at"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_portfolios).post(create_portfolio))
        .route("/:id", get(get_portfolio).patch(update_portfolio).delete(delete_portfolio))
        .route("/:id/projects", get(portfolio_projects))
        .route("/:id/generate", post(generate_portfolio))
}

#[derive(Debug, Deserialize)]
pub struct PortfolioCreate {
    pub title: String,
    #[serde(default)]
    pub target_job: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default)]
    pub project_ids: Vec<String>,
}

/// Link rows in the order the projects were listed.
pub fn project_links(portfolio_id: &str, project_ids: &[String]) -> Vec<Value> {
    project_ids
        .iter()
        .enumerate()
        .map(|(order, project_id)| {
            json!({
                "portfolio_id": portfolio_id,
                "project_id": project_id,
                "display_order": order,
            })
        })
        .collect()
}

/// Published locations for a portfolio under the public base URL.
pub fn published_urls(base_url: &str, portfolio_id: &str) -> (String, String) {
    let web = format!("{}/portfolios/{}", base_url.trim_end_matches('/'), portfolio_id);
    (format!("{web}.pdf"), web)
}

async fn create_portfolio(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<PortfolioCreate>,
) -> Result<SuccessResponse<Value>> {
    let portfolio = state
        .db
        .insert_one(
            schema::PORTFOLIOS,
            json!({
                "user_id": user_id,
                "title": req.title,
                "target_job": req.target_job,
                "template": req.template,
                "settings": req.settings,
                "status": "draft",
            }),
        )
        .await?;
    let portfolio_id = str_field(&portfolio, "id")
        .ok_or_else(|| AppError::Internal("portfolio row without id".to_string()))?;
    if !req.project_ids.is_empty() {
        state
            .db
            .insert(schema::PORTFOLIO_PROJECTS, project_links(portfolio_id, &req.project_ids))
            .await?;
    }
    Ok(SuccessResponse::with_message(
        json!({ "portfolio": portfolio }),
        "Portfolio created successfully",
    ))
}

async fn list_portfolios(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<SuccessResponse<Value>> {
    let rows = state
        .db
        .select(
            &Query::table(schema::PORTFOLIOS)
                .eq("user_id", user_id.as_str())
                .order_desc("created_at"),
        )
        .await?;
    Ok(SuccessResponse::new(json!({ "portfolios": rows.rows })))
}

async fn get_portfolio(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    let portfolio = user_row(state.db.as_ref(), schema::PORTFOLIOS, &id, &user_id, "Portfolio").await?;
    Ok(SuccessResponse::new(json!({ "portfolio": portfolio })))
}

fn scoped(id: &str, user_id: &str) -> Query {
    Query::table(schema::PORTFOLIOS).eq("id", id).eq("user_id", user_id)
}

async fn update_portfolio(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<SuccessResponse<Value>> {
    let mut patch = object(body)?;
    for column in FIXED_COLUMNS {
        patch.remove(*column);
    }
    if patch.is_empty() {
        return Err(AppError::BadRequest("nothing to update".to_string()));
    }
    let rows = state.db.update(&scoped(&id, &user_id), Value::Object(patch)).await?;
    Ok(SuccessResponse::with_message(
        json!({ "portfolio": first_row(rows, "Portfolio")? }),
        "Portfolio updated successfully",
    ))
}

async fn delete_portfolio(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    let rows = state.db.delete(&scoped(&id, &user_id)).await?;
    first_row(rows, "Portfolio")?;
    Ok(SuccessResponse::with_message(Value::Null, "Portfolio deleted successfully"))
}

async fn portfolio_projects(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    user_row(state.db.as_ref(), schema::PORTFOLIOS, &id, &user_id, "Portfolio").await?;
    let projects = Embed::new(schema::PROJECTS, "project_id").columns(&[
        "id",
        "name",
        "description",
        "start_date",
        "end_date",
        "status",
        "tags",
        "thumbnail_url",
    ]);
    let rows = state
        .db
        .select(
            &Query::table(schema::PORTFOLIO_PROJECTS)
                .embed(projects)
                .eq("portfolio_id", id.as_str())
                .order_asc("display_order"),
        )
        .await?;
    Ok(SuccessResponse::new(json!({ "projects": rows.rows })))
}

async fn generate_portfolio(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    let (pdf_url, web_url) = published_urls(&state.config.server.public_base_url, &id);
    let rows = state
        .db
        .update(
            &scoped(&id, &user_id),
            json!({
                "pdf_url": pdf_url,
                "web_url": web_url,
                "status": "published",
                "generated_at": now(),
            }),
        )
        .await?;
    let portfolio = first_row(rows, "Portfolio")?;
    info!(portfolio_id = %id, "Published portfolio");
    Ok(SuccessResponse::with_message(
        json!({ "portfolio": portfolio }),
        "Portfolio generated successfully",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_keep_listing_order() {
        let links = project_links("pf", &["p2".to_string(), "p1".to_string()]);
        assert_eq!(links[0]["project_id"], "p2");
        assert_eq!(links[0]["display_order"], 0);
        assert_eq!(links[1]["display_order"], 1);
    }

    #[test]
    fn urls_ignore_trailing_slash() {
        let (pdf, web) = published_urls("https://proof.app/", "42");
        assert_eq!(web, "https://proof.app/portfolios/42");
        assert_eq!(pdf, "https://proof.app/portfolios/42.pdf");
    }
}
