//! Peer endorsements: one user vouches for another's role on a project.
//!
//! Requests start `pending`; only the recipient may approve or reject them.

use axum::{
    extract::{Path, State},
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::auth::CurrentUser;
use crate::db::{schema, Embed, Query};
use crate::envelope::SuccessResponse;
use crate::error::{AppError, Result};
use crate::routes::{first_row, now, owned_row, str_field};
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", axum::routing::post(create_endorsement))
        .route("/sent", get(sent))
        .route("/received", get(received))
        .route("/:id/approve", patch(approve))
        .route("/:id/reject", patch(reject))
        .route("/:id/keywords", get(endorsement_keywords))
}

#[derive(Debug, Deserialize)]
pub struct EndorsementCreate {
    pub to_user_id: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub keyword_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn status(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Decision::Approved => "Endorsement approved successfully",
            Decision::Rejected => "Endorsement rejected",
        }
    }
}

async fn create_endorsement(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<EndorsementCreate>,
) -> Result<SuccessResponse<Value>> {
    if req.to_user_id == user_id {
        return Err(AppError::BadRequest("cannot endorse yourself".to_string()));
    }
    let endorsement = state
        .db
        .insert_one(
            schema::PEER_ENDORSEMENTS,
            json!({
                "from_user_id": user_id,
                "to_user_id": req.to_user_id,
                "project_id": req.project_id,
                "role": req.role,
                "comment": req.comment,
                "status": "pending",
            }),
        )
        .await?;
    let endorsement_id = str_field(&endorsement, "id")
        .ok_or_else(|| AppError::Internal("endorsement row without id".to_string()))?;
    if !req.keyword_ids.is_empty() {
        let links: Vec<Value> = req
            .keyword_ids
            .iter()
            .map(|keyword_id| json!({ "endorsement_id": endorsement_id, "keyword_id": keyword_id }))
            .collect();
        state.db.insert(schema::ENDORSEMENT_KEYWORDS, links).await?;
    }
    Ok(SuccessResponse::with_message(
        json!({ "endorsement": endorsement }),
        "Endorsement request created successfully",
    ))
}

async fn list_by(state: &AppState, column: &str, user_id: &str) -> Result<SuccessResponse<Value>> {
    let rows = state
        .db
        .select(
            &Query::table(schema::PEER_ENDORSEMENTS)
                .eq(column, user_id)
                .order_desc("created_at"),
        )
        .await?;
    Ok(SuccessResponse::new(json!({ "endorsements": rows.rows })))
}

async fn sent(State(state): State<AppState>, CurrentUser(user_id): CurrentUser) -> Result<SuccessResponse<Value>> {
    list_by(&state, "from_user_id", &user_id).await
}

async fn received(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<SuccessResponse<Value>> {
    list_by(&state, "to_user_id", &user_id).await
}

async fn respond(state: &AppState, id: &str, user_id: &str, decision: Decision) -> Result<SuccessResponse<Value>> {
    let row = owned_row(state.db.as_ref(), schema::PEER_ENDORSEMENTS, id, "to_user_id", user_id, "Endorsement").await?;
    if str_field(&row, "status") != Some("pending") {
        return Err(AppError::Conflict("Endorsement has already been answered".into()));
    }
    let rows = state
        .db
        .update(
            &Query::table(schema::PEER_ENDORSEMENTS)
                .eq("id", id)
                .eq("to_user_id", user_id)
                .eq("status", "pending"),
            json!({ "status": decision.status(), "responded_at": now() }),
        )
        .await?;
    info!(endorsement_id = %id, status = decision.status(), "Endorsement answered");
    Ok(SuccessResponse::with_message(
        json!({ "endorsement": first_row(rows, "Endorsement")? }),
        decision.message(),
    ))
}

async fn approve(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    respond(&state, &id, &user_id, Decision::Approved).await
}

async fn reject(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    respond(&state, &id, &user_id, Decision::Rejected).await
}

async fn endorsement_keywords(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<SuccessResponse<Value>> {
    let rows = state
        .db
        .select(
            &Query::table(schema::ENDORSEMENT_KEYWORDS)
                .embed(Embed::new(schema::KEYWORDS, "keyword_id").columns(&["id", "name", "category"]))
                .eq("endorsement_id", id.as_str()),
        )
        .await?;
    Ok(SuccessResponse::new(json!({ "keywords": rows.rows })))
}
