//! File endpoints — JSON base64 upload, single-file download, draft delete.
//!
//! Which phase an upload lands in is derived from who is uploading and
//! where the case sits, never from client input. GP uploads to a draft
//! stay hidden (`is_draft`) until submission publishes them.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::endpoints::connect;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, SessionContext};
use crate::config::{MAX_FILES_PER_UPLOAD, MAX_FILE_BYTES};
use crate::db::repository as repo;
use crate::lifecycle::can_view_case;
use crate::models::enums::{CaseStatus, UploadPhase};
use crate::models::{Actor, Case, CaseFile};
use crate::storage::storage_path_for;

#[derive(Deserialize)]
pub struct UploadRequest {
    pub files: Vec<UploadFile>,
}

#[derive(Deserialize)]
pub struct UploadFile {
    pub name: String,
    pub content_type: Option<String>,
    /// Base64 payload, optionally a `data:` URL.
    pub data: String,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub uploaded: Vec<CaseFile>,
    pub rejected: Vec<RejectedFile>,
}

#[derive(Serialize)]
pub struct RejectedFile {
    pub name: String,
    pub reason: String,
}

/// Which slot this actor may upload into right now.
fn upload_slot(case: &Case, actor: &Actor) -> Result<(UploadPhase, bool), ApiError> {
    if case.gp_id == actor.id {
        return match case.status {
            CaseStatus::Draft => Ok((UploadPhase::InitialSubmission, true)),
            CaseStatus::AwaitingDiagnostics => Ok((UploadPhase::DiagnosticResults, false)),
            _ => Err(ApiError::Conflict(format!(
                "uploads not accepted from the GP while case is {}",
                case.status
            ))),
        };
    }
    if case.specialist_id == Some(actor.id) {
        return match case.status {
            CaseStatus::AwaitingPhase1 | CaseStatus::AwaitingPhase2 => {
                Ok((UploadPhase::SpecialistReport, false))
            }
            _ => Err(ApiError::Conflict(format!(
                "uploads not accepted from the specialist while case is {}",
                case.status
            ))),
        };
    }
    Err(ApiError::Forbidden)
}

/// `POST /api/cases/:id/files` — upload a batch of files.
///
/// Per-file failures (bad base64, oversize) reject that file and continue;
/// the response reports both lists so the client can retry selectively.
pub async fn upload(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(case_id): Path<Uuid>,
    Json(payload): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, ApiError> {
    if payload.files.is_empty() {
        return Err(ApiError::BadRequest("No files in upload".into()));
    }
    if payload.files.len() > MAX_FILES_PER_UPLOAD {
        return Err(ApiError::BadRequest(format!(
            "Maximum {MAX_FILES_PER_UPLOAD} files per upload"
        )));
    }

    let conn = connect(&ctx)?;
    let actor = session.actor();
    let case = repo::get_case(&conn, &case_id)?
        .ok_or_else(|| ApiError::NotFound("Case not found".into()))?;
    let (phase, is_draft) = upload_slot(&case, &actor)?;

    let mut uploaded = Vec::new();
    let mut rejected = Vec::new();
    for file in &payload.files {
        let bytes = match decode_payload(&file.data) {
            Ok(bytes) => bytes,
            Err(reason) => {
                rejected.push(RejectedFile { name: file.name.clone(), reason });
                continue;
            }
        };
        if bytes.len() > MAX_FILE_BYTES {
            rejected.push(RejectedFile {
                name: file.name.clone(),
                reason: format!("exceeds {MAX_FILE_BYTES} byte limit"),
            });
            continue;
        }

        let storage_path = storage_path_for(&case_id, &file.name);
        if let Err(e) = ctx.store.put(&storage_path, &bytes) {
            tracing::warn!(case_id = %case_id, name = %file.name, error = %e, "Upload store write failed");
            rejected.push(RejectedFile {
                name: file.name.clone(),
                reason: "storage write failed".into(),
            });
            continue;
        }

        let record = CaseFile {
            id: Uuid::new_v4(),
            case_id,
            uploader_id: actor.id,
            file_name: file.name.clone(),
            content_type: file
                .content_type
                .clone()
                .or_else(|| guess_content_type(&file.name)),
            storage_path,
            upload_phase: Some(phase),
            is_draft,
            uploaded_at: Utc::now(),
        };
        repo::insert_case_file(&conn, &record)?;
        uploaded.push(record);
    }

    tracing::info!(
        case_id = %case_id,
        uploaded = uploaded.len(),
        rejected = rejected.len(),
        "Upload batch processed"
    );
    Ok(Json(UploadResponse { uploaded, rejected }))
}

/// `GET /api/files/:id` — download one file's bytes.
pub async fn download(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(file_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let conn = connect(&ctx)?;
    let actor = session.actor();
    let file = repo::get_case_file(&conn, &file_id)?
        .ok_or_else(|| ApiError::NotFound("File not found".into()))?;
    let case = repo::get_case(&conn, &file.case_id)?
        .ok_or_else(|| ApiError::NotFound("Case not found".into()))?;
    if !can_view_case(&case, &actor) {
        return Err(ApiError::Forbidden);
    }
    // Draft files are visible only to their uploader.
    if file.is_draft && file.uploader_id != actor.id {
        return Err(ApiError::NotFound("File not found".into()));
    }

    let bytes = ctx.store.fetch(&file.storage_path)?;
    let content_type = file
        .content_type
        .clone()
        .or_else(|| guess_content_type(&file.file_name))
        .unwrap_or_else(|| "application/octet-stream".into());
    let disposition = format!("attachment; filename=\"{}\"", file.file_name.replace('"', "_"));
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// `DELETE /api/files/:id` — remove an uploaded file.
///
/// Only the uploader may remove a file, and only while the case is still a
/// draft; after submission the record is part of the case history.
pub async fn remove(
    State(ctx): State<ApiContext>,
    Extension(session): Extension<SessionContext>,
    Path(file_id): Path<Uuid>,
) -> Result<axum::http::StatusCode, ApiError> {
    let conn = connect(&ctx)?;
    let file = repo::get_case_file(&conn, &file_id)?
        .ok_or_else(|| ApiError::NotFound("File not found".into()))?;
    if file.uploader_id != session.user_id {
        return Err(ApiError::Forbidden);
    }
    let case = repo::get_case(&conn, &file.case_id)?
        .ok_or_else(|| ApiError::NotFound("Case not found".into()))?;
    if case.status != CaseStatus::Draft {
        return Err(ApiError::Conflict(
            "Files cannot be removed after submission".into(),
        ));
    }

    repo::delete_case_file(&conn, &file_id)?;
    if let Err(e) = ctx.store.delete(&file.storage_path) {
        tracing::warn!(file_id = %file_id, error = %e, "Orphaned object after file delete");
    }
    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Decode a base64 payload, accepting both `data:` URLs and bare base64.
fn decode_payload(data: &str) -> Result<Vec<u8>, String> {
    let base64_data = match data.find(',') {
        Some(idx) => &data[idx + 1..],
        None => data,
    };
    base64::engine::general_purpose::STANDARD
        .decode(base64_data)
        .map_err(|e| format!("base64 decode failed: {e}"))
}

fn guess_content_type(file_name: &str) -> Option<String> {
    mime_guess::from_path(file_name)
        .first_raw()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_payload_accepts_data_urls_and_bare_base64() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"hello");
        assert_eq!(decode_payload(&encoded).unwrap(), b"hello");
        assert_eq!(
            decode_payload(&format!("data:image/jpeg;base64,{encoded}")).unwrap(),
            b"hello"
        );
        assert!(decode_payload("!!not base64!!").is_err());
    }

    #[test]
    fn content_type_guessed_from_extension() {
        assert_eq!(guess_content_type("rads.jpg").as_deref(), Some("image/jpeg"));
        assert_eq!(
            guess_content_type("report.pdf").as_deref(),
            Some("application/pdf")
        );
        assert_eq!(guess_content_type("no_extension"), None);
    }

    #[test]
    fn upload_slot_tracks_actor_and_status() {
        use crate::db::repository::case::tests::draft_case;
        let gp_id = Uuid::new_v4();
        let spec_id = Uuid::new_v4();
        let gp = Actor::gp(gp_id);
        let spec = Actor::specialist(spec_id);

        let mut case = draft_case(gp_id);
        assert_eq!(
            upload_slot(&case, &gp).unwrap(),
            (UploadPhase::InitialSubmission, true)
        );
        assert!(matches!(upload_slot(&case, &spec), Err(ApiError::Forbidden)));

        case.status = CaseStatus::AwaitingDiagnostics;
        case.specialist_id = Some(spec_id);
        assert_eq!(
            upload_slot(&case, &gp).unwrap(),
            (UploadPhase::DiagnosticResults, false)
        );

        case.status = CaseStatus::AwaitingPhase2;
        assert_eq!(
            upload_slot(&case, &spec).unwrap(),
            (UploadPhase::SpecialistReport, false)
        );
        assert!(matches!(upload_slot(&case, &gp), Err(ApiError::Conflict(_))));
    }
}
