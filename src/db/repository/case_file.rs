use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::UploadPhase;
use crate::models::CaseFile;

const FILE_COLUMNS: &str = "id, case_id, uploader_id, file_name, content_type,
     storage_path, upload_phase, is_draft, uploaded_at";

pub fn insert_case_file(conn: &Connection, file: &CaseFile) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO case_files (id, case_id, uploader_id, file_name, content_type,
             storage_path, upload_phase, is_draft, uploaded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            file.id.to_string(),
            file.case_id.to_string(),
            file.uploader_id.to_string(),
            file.file_name,
            file.content_type,
            file.storage_path,
            file.upload_phase.map(|p| p.as_str()),
            file.is_draft as i32,
            file.uploaded_at,
        ],
    )?;
    Ok(())
}

pub fn get_case_file(conn: &Connection, id: &Uuid) -> Result<Option<CaseFile>, DatabaseError> {
    let sql = format!("SELECT {FILE_COLUMNS} FROM case_files WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;

    let result = stmt.query_row(params![id.to_string()], file_row);
    match result {
        Ok(row) => Ok(Some(file_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// All non-draft files for a case, upload order. Timeline input.
pub fn list_case_files(conn: &Connection, case_id: &Uuid) -> Result<Vec<CaseFile>, DatabaseError> {
    let sql = format!(
        "SELECT {FILE_COLUMNS} FROM case_files
         WHERE case_id = ?1 AND is_draft = 0
         ORDER BY uploaded_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![case_id.to_string()], file_row)?;
    rows.collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(file_from_row)
        .collect()
}

/// Every file row for a case, drafts included. Used when tearing a draft
/// case down so its stored objects can be removed too.
pub fn list_all_case_files(
    conn: &Connection,
    case_id: &Uuid,
) -> Result<Vec<CaseFile>, DatabaseError> {
    let sql = format!(
        "SELECT {FILE_COLUMNS} FROM case_files
         WHERE case_id = ?1
         ORDER BY uploaded_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![case_id.to_string()], file_row)?;
    rows.collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(file_from_row)
        .collect()
}

/// Count of files uploaded for one phase of a case. Used to check that a
/// diagnostics round actually carries files before advancing.
pub fn count_files_for_phase(
    conn: &Connection,
    case_id: &Uuid,
    phase: UploadPhase,
) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM case_files
         WHERE case_id = ?1 AND upload_phase = ?2 AND is_draft = 0",
        params![case_id.to_string(), phase.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Flip a case's draft files live when the case is submitted.
pub fn publish_draft_files(
    conn: &Connection,
    case_id: &Uuid,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE case_files SET is_draft = 0 WHERE case_id = ?1 AND is_draft = 1",
        params![case_id.to_string()],
    )?;
    Ok(changed)
}

pub fn delete_case_file(conn: &Connection, id: &Uuid) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM case_files WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(changed)
}

// Internal row type for CaseFile mapping
struct CaseFileRow {
    id: String,
    case_id: String,
    uploader_id: String,
    file_name: String,
    content_type: Option<String>,
    storage_path: String,
    upload_phase: Option<String>,
    is_draft: i32,
    uploaded_at: DateTime<Utc>,
}

fn file_row(row: &Row<'_>) -> rusqlite::Result<CaseFileRow> {
    Ok(CaseFileRow {
        id: row.get("id")?,
        case_id: row.get("case_id")?,
        uploader_id: row.get("uploader_id")?,
        file_name: row.get("file_name")?,
        content_type: row.get("content_type")?,
        storage_path: row.get("storage_path")?,
        upload_phase: row.get("upload_phase")?,
        is_draft: row.get("is_draft")?,
        uploaded_at: row.get("uploaded_at")?,
    })
}

fn file_from_row(row: CaseFileRow) -> Result<CaseFile, DatabaseError> {
    let parse_id = |s: &str| {
        Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
    };
    Ok(CaseFile {
        id: parse_id(&row.id)?,
        case_id: parse_id(&row.case_id)?,
        uploader_id: parse_id(&row.uploader_id)?,
        file_name: row.file_name,
        content_type: row.content_type,
        storage_path: row.storage_path,
        upload_phase: row.upload_phase.as_deref().map(UploadPhase::from_str).transpose()?,
        is_draft: row.is_draft != 0,
        uploaded_at: row.uploaded_at,
    })
}
