//! Case endpoints — draft CRUD, lifecycle transitions, timeline, bundling.

use axum::extract::{Path, State};
use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::endpoints::{connect, dispatch_notifications};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, SessionContext};
use crate::bundle;
use crate::db::repository as repo;
use crate::lifecycle::{self, SubmitOutcome};
use crate::models::enums::UserRole;
use crate::models::{Case, CaseDraftFields, Phase2Report};
use crate::timeline::{build_timeline, TimelineEntry};

// ── Listing and detail ───────────────────────────────────────

/// `GET /api/cases` — the caller's work queue. GPs see their own cases;
/// specialists see their assignments plus unassigned cases in their
/// specialty.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
) -> Result<Json<Vec<Case>>, ApiError> {
    let conn = connect(&ctx)?;
    let cases = match session.role {
        UserRole::Gp => repo::list_cases_for_gp(&conn, &session.user_id)?,
        UserRole::Specialist => {
            let profile = repo::get_profile(&conn, &session.user_id)?
                .ok_or_else(|| ApiError::NotFound("Unknown user".into()))?;
            repo::list_cases_for_specialist(&conn, &session.user_id, profile.specialty.as_deref())?
        }
    };
    Ok(Json(cases))
}

#[derive(Serialize)]
pub struct CaseDetail {
    pub case: Case,
    pub timeline: Vec<TimelineEntry>,
}

/// `GET /api/cases/:id` — full case detail with the reconstructed timeline.
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(case_id): Path<Uuid>,
) -> Result<Json<CaseDetail>, ApiError> {
    let conn = connect(&ctx)?;
    let case = repo::get_case(&conn, &case_id)?
        .ok_or_else(|| ApiError::NotFound("Case not found".into()))?;
    if !lifecycle::can_view_case(&case, &session.actor()) {
        return Err(ApiError::Forbidden);
    }

    let messages = repo::list_case_messages(&conn, &case_id)?;
    let files = repo::list_case_files(&conn, &case_id)?;
    let timeline = build_timeline(case.submitted_at, messages, files);
    Ok(Json(CaseDetail { case, timeline }))
}

// ── Draft CRUD ───────────────────────────────────────────────

/// `POST /api/cases` — create a draft.
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Json(fields): Json<CaseDraftFields>,
) -> Result<(StatusCode, Json<Case>), ApiError> {
    let conn = connect(&ctx)?;
    let case = lifecycle::create_draft(&conn, &session.actor(), fields)?;
    Ok((StatusCode::CREATED, Json(case)))
}

/// `PUT /api/cases/:id` — edit a draft.
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(case_id): Path<Uuid>,
    Json(fields): Json<CaseDraftFields>,
) -> Result<Json<Case>, ApiError> {
    let conn = connect(&ctx)?;
    let case = lifecycle::update_draft(&conn, &session.actor(), &case_id, fields)?;
    Ok(Json(case))
}

/// `DELETE /api/cases/:id` — delete a draft and its stored objects.
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(case_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let conn = connect(&ctx)?;
    let paths = lifecycle::delete_draft(&conn, &session.actor(), &case_id)?;
    for path in paths {
        if let Err(e) = ctx.store.delete(&path) {
            tracing::warn!(case_id = %case_id, path, error = %e, "Orphaned object after draft delete");
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

// ── Lifecycle transitions ────────────────────────────────────

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmitResponse {
    Submitted { case: Case },
    PaymentRequired { checkout_url: String },
}

/// `POST /api/cases/:id/submit` — submit a draft; first case is waived,
/// later cases get a checkout redirect.
pub async fn submit(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(case_id): Path<Uuid>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let conn = connect(&ctx)?;
    let (outcome, notifications) =
        lifecycle::submit_case(&conn, &session.actor(), &case_id, ctx.gateway.as_ref())?;
    dispatch_notifications(&ctx, notifications);

    match outcome {
        SubmitOutcome::Submitted => {
            let case = repo::get_case(&conn, &case_id)?
                .ok_or_else(|| ApiError::NotFound("Case not found".into()))?;
            Ok(Json(SubmitResponse::Submitted { case }))
        }
        SubmitOutcome::PaymentRequired { checkout_url } => {
            Ok(Json(SubmitResponse::PaymentRequired { checkout_url }))
        }
    }
}

#[derive(Serialize)]
pub struct ConfirmPaymentResponse {
    pub already_processed: bool,
    pub case: Case,
}

/// `POST /api/cases/:id/confirm-payment` — success callback from the
/// checkout flow. Safe to call repeatedly.
pub async fn confirm_payment(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(case_id): Path<Uuid>,
) -> Result<Json<ConfirmPaymentResponse>, ApiError> {
    let conn = connect(&ctx)?;
    let (confirmation, notifications) =
        lifecycle::confirm_payment(&conn, &session.actor(), &case_id)?;
    dispatch_notifications(&ctx, notifications);

    let case = repo::get_case(&conn, &case_id)?
        .ok_or_else(|| ApiError::NotFound("Case not found".into()))?;
    Ok(Json(ConfirmPaymentResponse {
        already_processed: confirmation.already_processed,
        case,
    }))
}

/// `POST /api/cases/:id/claim` — specialist takes an unassigned case.
pub async fn claim(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(case_id): Path<Uuid>,
) -> Result<Json<Case>, ApiError> {
    let conn = connect(&ctx)?;
    let case = lifecycle::claim_case(&conn, &session.actor(), &case_id)?;
    Ok(Json(case))
}

#[derive(Deserialize)]
pub struct Phase1Request {
    pub plan_text: String,
}

/// `POST /api/cases/:id/phase1` — specialist posts the diagnostic plan.
pub async fn phase1(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(case_id): Path<Uuid>,
    Json(payload): Json<Phase1Request>,
) -> Result<Json<Case>, ApiError> {
    let conn = connect(&ctx)?;
    let case = lifecycle::submit_phase1(&conn, &session.actor(), &case_id, &payload.plan_text)?;
    Ok(Json(case))
}

#[derive(Deserialize, Default)]
pub struct DiagnosticsRequest {
    pub notes: Option<String>,
}

/// `POST /api/cases/:id/diagnostics` — GP marks the diagnostics round done.
pub async fn diagnostics(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(case_id): Path<Uuid>,
    payload: Option<Json<DiagnosticsRequest>>,
) -> Result<Json<Case>, ApiError> {
    let notes = payload.and_then(|Json(p)| p.notes);
    let conn = connect(&ctx)?;
    let (case, notifications) =
        lifecycle::submit_diagnostics(&conn, &session.actor(), &case_id, notes.as_deref())?;
    dispatch_notifications(&ctx, notifications);
    Ok(Json(case))
}

#[derive(Deserialize)]
pub struct Phase2Request {
    pub assessment: String,
    pub treatment_plan: String,
    pub prognosis: String,
    pub client_summary: String,
    /// Optional previously uploaded report document to attach.
    pub final_report_file_id: Option<Uuid>,
}

/// `POST /api/cases/:id/phase2` — specialist posts the treatment report.
pub async fn phase2(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(case_id): Path<Uuid>,
    Json(payload): Json<Phase2Request>,
) -> Result<Json<Case>, ApiError> {
    let conn = connect(&ctx)?;

    let final_report_path = match payload.final_report_file_id {
        Some(file_id) => {
            let file = repo::get_case_file(&conn, &file_id)?
                .filter(|f| f.case_id == case_id)
                .ok_or_else(|| {
                    ApiError::BadRequest("final_report_file_id does not belong to this case".into())
                })?;
            Some(file.storage_path)
        }
        None => None,
    };

    let report = Phase2Report {
        assessment: payload.assessment,
        treatment_plan: payload.treatment_plan,
        prognosis: payload.prognosis,
        client_summary: payload.client_summary,
    };
    let (case, notifications) = lifecycle::submit_phase2(
        &conn,
        &session.actor(),
        &case_id,
        &report,
        final_report_path.as_deref(),
    )?;
    dispatch_notifications(&ctx, notifications);
    Ok(Json(case))
}

// ── Bundling ─────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct BundleRequest {
    /// Whose uploads to bundle (the client downloads one batch at a time).
    pub uploader_id: Uuid,
    /// Restrict the archive to these stored objects.
    pub storage_paths: Option<Vec<String>>,
}

/// `POST /api/cases/:id/bundle` — assemble and stream a zip of one
/// uploader's files on the case. Files that fail to download are skipped
/// and counted in the `X-Skipped-Files` header.
pub async fn bundle(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(case_id): Path<Uuid>,
    Json(payload): Json<BundleRequest>,
) -> Result<Response, ApiError> {
    let conn = connect(&ctx)?;
    let bundle = bundle::bundle_case_files(
        &conn,
        ctx.store.as_ref(),
        &session.actor(),
        &case_id,
        &payload.uploader_id,
        payload.storage_paths.as_deref(),
    )?;

    let disposition = format!("attachment; filename=\"{}\"", bundle.archive_name);
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (
                HeaderName::from_static("x-skipped-files"),
                bundle.skipped.len().to_string(),
            ),
        ],
        bundle.bytes,
    )
        .into_response())
}
