//! Identity hand-off endpoints.
//!
//! Credentials and login flows live with the external identity
//! collaborator. It pushes verified users into this service (profile
//! provisioning) and exchanges a verified login for a bearer session,
//! both guarded by a shared provisioning key.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::endpoints::connect;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::repository as repo;
use crate::models::enums::UserRole;
use crate::models::Profile;

fn require_provisioning_key(ctx: &ApiContext, headers: &HeaderMap) -> Result<(), ApiError> {
    let presented = headers
        .get("X-Provisioning-Key")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    if presented != ctx.config.provisioning_key {
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct ProvisionRequest {
    /// Identity collaborator's stable user id.
    pub user_id: Uuid,
    pub role: UserRole,
    pub full_name: String,
    pub email: String,
    pub specialty: Option<String>,
    pub clinic_name: Option<String>,
}

/// `POST /api/auth/provision` — upsert a verified user's profile.
pub async fn provision(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    Json(payload): Json<ProvisionRequest>,
) -> Result<Json<Profile>, ApiError> {
    require_provisioning_key(&ctx, &headers)?;

    if payload.full_name.trim().is_empty() || payload.email.trim().is_empty() {
        return Err(ApiError::BadRequest("full_name and email are required".into()));
    }
    if payload.role == UserRole::Specialist
        && payload.specialty.as_deref().map_or(true, |s| s.trim().is_empty())
    {
        return Err(ApiError::BadRequest("specialists require a specialty".into()));
    }

    let conn = connect(&ctx)?;
    if let Some(existing) = repo::get_profile(&conn, &payload.user_id)? {
        // Provisioning is idempotent for an already-known user.
        return Ok(Json(existing));
    }

    let profile = Profile {
        id: payload.user_id,
        role: payload.role,
        full_name: payload.full_name,
        email: payload.email,
        specialty: payload.specialty,
        clinic_name: payload.clinic_name,
        created_at: Utc::now(),
    };
    repo::insert_profile(&conn, &profile)?;
    tracing::info!(user_id = %profile.id, role = %profile.role, "Profile provisioned");
    Ok(Json(profile))
}

#[derive(Deserialize)]
pub struct SessionRequest {
    pub user_id: Uuid,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user_id: Uuid,
    pub role: UserRole,
}

/// `POST /api/auth/session` — exchange a verified login for a bearer token.
pub async fn session(
    State(ctx): State<ApiContext>,
    headers: HeaderMap,
    Json(payload): Json<SessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    require_provisioning_key(&ctx, &headers)?;

    let conn = connect(&ctx)?;
    let profile = repo::get_profile(&conn, &payload.user_id)?
        .ok_or_else(|| ApiError::NotFound("Unknown user".into()))?;

    let token = {
        let mut sessions = ctx
            .sessions
            .lock()
            .map_err(|_| ApiError::Internal("session lock".into()))?;
        sessions.issue(profile.id, profile.role)
    };
    Ok(Json(SessionResponse {
        token,
        user_id: profile.id,
        role: profile.role,
    }))
}
