//! Case discussion endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::endpoints::connect;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, SessionContext};
use crate::db::repository as repo;
use crate::lifecycle::{self, can_view_case};
use crate::models::CaseMessage;

/// `GET /api/cases/:id/messages` — the case's visible messages, oldest
/// first. Internal notes never leave the database.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(case_id): Path<Uuid>,
) -> Result<Json<Vec<CaseMessage>>, ApiError> {
    let conn = connect(&ctx)?;
    let case = repo::get_case(&conn, &case_id)?
        .ok_or_else(|| ApiError::NotFound("Case not found".into()))?;
    if !can_view_case(&case, &session.actor()) {
        return Err(ApiError::Forbidden);
    }
    Ok(Json(repo::list_case_messages(&conn, &case_id)?))
}

#[derive(Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

/// `POST /api/cases/:id/messages` — append a chat message.
pub async fn post(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(case_id): Path<Uuid>,
    Json(payload): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<CaseMessage>), ApiError> {
    let conn = connect(&ctx)?;
    let message = lifecycle::post_message(&conn, &session.actor(), &case_id, &payload.content)?;
    Ok((StatusCode::CREATED, Json(message)))
}
