use axum::{
    extract::{Path, Query as QueryParams, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::CurrentUser;
use crate::db::{schema, Query};
use crate::envelope::SuccessResponse;
use crate::error::Result;
use crate::routes::{first_row, now, user_row};
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_evidence).post(create_evidence))
        .route("/:id", get(get_evidence).delete(delete_evidence))
        .route("/:id/verify", post(verify_evidence))
}

/// File metadata; the file itself is uploaded to storage beforehand.
#[derive(Debug, Deserialize)]
pub struct EvidenceCreate {
    #[serde(rename = "type")]
    pub kind: String,
    pub file_name: String,
    pub file_url: String,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EvidenceFilter {
    pub project_id: Option<String>,
}

fn scoped(id: &str, user_id: &str) -> Query {
    Query::table(schema::EVIDENCE).eq("id", id).eq("user_id", user_id)
}

async fn create_evidence(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<EvidenceCreate>,
) -> Result<SuccessResponse<Value>> {
    let saved = state
        .db
        .insert_one(
            schema::EVIDENCE,
            json!({
                "user_id": user_id,
                "type": req.kind,
                "file_name": req.file_name,
                "file_url": req.file_url,
                "file_size": req.file_size,
                "mime_type": req.mime_type,
                "project_id": req.project_id,
            }),
        )
        .await?;
    Ok(SuccessResponse::with_message(
        json!({ "evidence": saved }),
        "Evidence created successfully",
    ))
}

async fn list_evidence(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    QueryParams(filter): QueryParams<EvidenceFilter>,
) -> Result<SuccessResponse<Value>> {
    let mut query = Query::table(schema::EVIDENCE).eq("user_id", user_id.as_str());
    if let Some(project_id) = filter.project_id {
        query = query.eq("project_id", project_id);
    }
    let rows = state.db.select(&query.order_desc("created_at")).await?;
    Ok(SuccessResponse::new(json!({ "evidence": rows.rows })))
}

async fn get_evidence(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    let evidence = user_row(state.db.as_ref(), schema::EVIDENCE, &id, &user_id, "Evidence").await?;
    Ok(SuccessResponse::new(json!({ "evidence": evidence })))
}

async fn delete_evidence(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    let rows = state.db.delete(&scoped(&id, &user_id)).await?;
    first_row(rows, "Evidence")?;
    Ok(SuccessResponse::with_message(Value::Null, "Evidence deleted successfully"))
}

async fn verify_evidence(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    let rows = state
        .db
        .update(&scoped(&id, &user_id), json!({ "verified_at": now() }))
        .await?;
    Ok(SuccessResponse::with_message(
        json!({ "evidence": first_row(rows, "Evidence")? }),
        "Evidence verified successfully",
    ))
}
