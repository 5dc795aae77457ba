//! Projects, their team members and the keyword summary over their logs.

use axum::{
    extract::{Path, Query as QueryParams, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::auth::CurrentUser;
use crate::db::{schema, Database, Query};
use crate::envelope::SuccessResponse;
use crate::error::{AppError, Result};
use crate::insights;
use crate::routes::{first_row, str_field, user_row, PageParams};
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route("/simple-list", get(simple_list))
        .route("/:id", get(get_project).patch(update_project).delete(delete_project))
        .route("/:id/logs", get(project_logs))
        .route("/:id/members", get(list_members).post(add_member))
        .route("/:id/analyze", post(analyze_project))
}

fn default_status() -> String {
    "active".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ProjectCreate {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ProjectUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectFilter {
    pub status: Option<String>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_page() -> usize {
    1
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct TeamMemberCreate {
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_leader: bool,
}

/// The caller's project, or 403 when it is missing or someone else's.
async fn require_owner(db: &dyn Database, project_id: &str, user_id: &str) -> Result<Value> {
    db.select_one(
        &Query::table(schema::PROJECTS)
            .eq("id", project_id)
            .eq("user_id", user_id),
    )
    .await?
    .ok_or_else(|| AppError::Forbidden("권한이 없습니다".to_string()))
}

async fn create_project(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(project): Json<ProjectCreate>,
) -> Result<SuccessResponse<Value>> {
    let row = json!({
        "user_id": user_id,
        "name": project.name,
        "description": project.description,
        "start_date": project.start_date.map(|d| d.to_string()),
        "end_date": project.end_date.map(|d| d.to_string()),
        "status": project.status,
        "tags": project.tags,
        "thumbnail_url": project.thumbnail_url,
    });
    let saved = state.db.insert_one(schema::PROJECTS, row).await?;
    Ok(SuccessResponse::with_message(
        json!({ "project": saved }),
        "Project created successfully",
    ))
}

async fn list_projects(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    QueryParams(filter): QueryParams<ProjectFilter>,
) -> Result<SuccessResponse<Value>> {
    if filter.page == 0 || filter.limit == 0 || filter.limit > 100 {
        return Err(AppError::BadRequest("page must be >= 1 and limit 1..=100".to_string()));
    }
    let page = PageParams {
        page: filter.page,
        limit: filter.limit,
    };
    let mut query = Query::table(schema::PROJECTS)
        .eq("user_id", user_id.as_str())
        .with_count();
    if let Some(status) = filter.status {
        query = query.eq("status", status);
    }
    let rows = state
        .db
        .select(&query.order_desc("created_at").range(page.offset(), page.limit))
        .await?;
    Ok(SuccessResponse::new(json!({
        "projects": rows.rows,
        "total": rows.count.unwrap_or(0),
        "page": page.page,
        "limit": page.limit,
    })))
}

async fn simple_list(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<SuccessResponse<Value>> {
    let query = Query::table(schema::PROJECTS)
        .select(&["id", "name"])
        .eq("user_id", user_id.as_str())
        .eq("status", "active")
        .order_asc("name");
    let rows = state.db.select(&query).await?;
    Ok(SuccessResponse::new(Value::Array(rows.rows)))
}

async fn get_project(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    let project = user_row(state.db.as_ref(), schema::PROJECTS, &id, &user_id, "Project").await?;
    Ok(SuccessResponse::new(json!({ "project": project })))
}

async fn update_project(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    Json(update): Json<ProjectUpdate>,
) -> Result<SuccessResponse<Value>> {
    let patch = serde_json::to_value(&update)?;
    if patch.as_object().map_or(true, Map::is_empty) {
        return Err(AppError::BadRequest("nothing to update".to_string()));
    }
    let rows = state
        .db
        .update(
            &Query::table(schema::PROJECTS)
                .eq("id", id.as_str())
                .eq("user_id", user_id.as_str()),
            patch,
        )
        .await?;
    Ok(SuccessResponse::with_message(
        json!({ "project": first_row(rows, "Project")? }),
        "Project updated successfully",
    ))
}

async fn delete_project(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    let rows = state
        .db
        .delete(
            &Query::table(schema::PROJECTS)
                .eq("id", id.as_str())
                .eq("user_id", user_id.as_str()),
        )
        .await?;
    first_row(rows, "Project")?;
    Ok(SuccessResponse::with_message(Value::Null, "Project deleted successfully"))
}

async fn project_logs(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    let query = Query::table(schema::LOGS)
        .eq("project_id", id.as_str())
        .eq("user_id", user_id.as_str())
        .order_desc("created_at");
    let rows = state.db.select(&query).await?;
    Ok(SuccessResponse::new(json!({ "logs": rows.rows })))
}

async fn list_members(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    require_owner(state.db.as_ref(), &id, &user_id).await?;
    let rows = state
        .db
        .select(&Query::table(schema::TEAM_MEMBERS).eq("project_id", id.as_str()))
        .await?;
    Ok(SuccessResponse::new(json!({ "members": rows.rows })))
}

async fn add_member(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
    Json(member): Json<TeamMemberCreate>,
) -> Result<SuccessResponse<Value>> {
    require_owner(state.db.as_ref(), &id, &user_id).await?;
    let saved = state
        .db
        .insert_one(
            schema::TEAM_MEMBERS,
            json!({
                "project_id": id,
                "name": member.name,
                "role": member.role,
                "email": member.email,
                "is_leader": member.is_leader,
            }),
        )
        .await?;
    Ok(SuccessResponse::with_message(
        json!({ "member": saved }),
        "팀원이 추가되었습니다",
    ))
}

async fn analyze_project(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    let db = state.db.as_ref();
    user_row(db, schema::PROJECTS, &id, &user_id, "Project").await?;
    let logs = db
        .select(&Query::table(schema::LOGS).eq("project_id", id.as_str()))
        .await?
        .rows;
    let contents: Vec<String> = logs
        .iter()
        .map(|log| {
            [str_field(log, "title"), str_field(log, "content"), str_field(log, "reflection")]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();
    let (summary, themes) = insights::project_summary(&contents);

    db.update(
        &Query::table(schema::PROJECTS).eq("id", id.as_str()),
        json!({ "ai_summary": summary }),
    )
    .await?;
    info!(project_id = %id, logs = logs.len(), "Stored project summary");

    Ok(SuccessResponse::new(json!({
        "ai_summary": summary,
        "total_logs": logs.len(),
        "key_achievements": themes,
    })))
}
