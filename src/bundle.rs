//! Zip-on-demand bundling of a case's files.
//!
//! Archives are never persisted: each download assembles the zip in memory
//! from the object store and streams it out. Individual files that fail to
//! download are skipped with a warning so one corrupt object cannot hold
//! the rest of the case hostage; only a total failure is an error.

use std::collections::HashMap;
use std::io::{Cursor, Write};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use thiserror::Error;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::db::repository as repo;
use crate::db::DatabaseError;
use crate::lifecycle::can_view_case;
use crate::models::{Actor, Case, CaseFile};
use crate::storage::{FileStore, LocalFileStore};

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("Not permitted for this case")]
    NotAuthorized,

    #[error("Case not found")]
    NotFound,

    #[error("No files to bundle")]
    NoFiles,

    #[error("Every file download failed")]
    AllDownloadsFailed,

    #[error("Archive assembly failed: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// An assembled archive ready to stream to the client.
pub struct CaseBundle {
    pub archive_name: String,
    pub bytes: Vec<u8>,
    /// Names of files that were selected but could not be downloaded.
    pub skipped: Vec<String>,
}

/// Assemble a zip of one uploader's published files on a case.
///
/// Bundles are scoped to a single uploader because the client downloads a
/// batch at a time; `storage_paths`, when present, narrows the selection
/// further to that subset. Authorization matches case visibility: the
/// owning GP, the assigned specialist, or any specialist while the case is
/// unassigned.
pub fn bundle_case_files(
    conn: &Connection,
    store: &dyn FileStore,
    actor: &Actor,
    case_id: &Uuid,
    uploader_id: &Uuid,
    storage_paths: Option<&[String]>,
) -> Result<CaseBundle, BundleError> {
    let case = repo::get_case(conn, case_id)?.ok_or(BundleError::NotFound)?;
    if !can_view_case(&case, actor) {
        return Err(BundleError::NotAuthorized);
    }

    let mut files = repo::list_case_files(conn, case_id)?;
    files.retain(|f| f.uploader_id == *uploader_id);
    if let Some(paths) = storage_paths {
        files.retain(|f| paths.contains(&f.storage_path));
    }
    if files.is_empty() {
        return Err(BundleError::NoFiles);
    }

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut names: HashMap<String, usize> = HashMap::new();
    let mut written = 0usize;
    let mut skipped = Vec::new();

    for file in &files {
        let bytes = match download(store, file) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    case_id = %case_id,
                    file_id = %file.id,
                    error = %e,
                    "Skipping file that failed to download"
                );
                skipped.push(file.file_name.clone());
                continue;
            }
        };
        zip.start_file(entry_name(&mut names, &file.file_name), options)?;
        zip.write_all(&bytes)?;
        written += 1;
    }

    if written == 0 {
        return Err(BundleError::AllDownloadsFailed);
    }

    let bytes = zip.finish()?.into_inner();
    tracing::info!(case_id = %case_id, files = written, skipped = skipped.len(), "Bundle assembled");
    Ok(CaseBundle {
        archive_name: archive_name(Utc::now(), &case),
        bytes,
        skipped,
    })
}

/// Each file is pulled through a fresh single-use signed token rather than a
/// raw fetch, so bundling exercises the same retrieval path external
/// downloads use.
fn download(store: &dyn FileStore, file: &CaseFile) -> Result<Vec<u8>, crate::storage::StorageError> {
    let token = store.issue_token(&file.storage_path, LocalFileStore::default_ttl())?;
    store.redeem(&token)
}

/// Duplicate file names within one archive get a numeric suffix before the
/// extension: `rads.jpg`, `rads (2).jpg`, `rads (3).jpg`.
fn entry_name(names: &mut HashMap<String, usize>, file_name: &str) -> String {
    let seen = names.entry(file_name.to_string()).or_insert(0);
    *seen += 1;
    if *seen == 1 {
        return file_name.to_string();
    }
    match file_name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem} ({seen}).{ext}", seen = *seen),
        None => format!("{file_name} ({seen})", seen = *seen),
    }
}

/// Download file name: timestamp, patient, species, short case reference.
/// Colons are stripped from the timestamp and free-text fields are reduced
/// to `[A-Za-z0-9_]` so the name survives every client filesystem.
pub fn archive_name(now: DateTime<Utc>, case: &Case) -> String {
    let stamp = now
        .to_rfc3339_opts(SecondsFormat::Secs, true)
        .replace(':', "");
    let id = case.id.to_string();
    let short_ref = &id[..6];
    format!(
        "{stamp}_{}_{}_Case-{short_ref}.zip",
        sanitize(&case.patient.patient_name),
        sanitize(&case.patient.species),
    )
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::db::repository::case::tests::{draft_case, seed_profile};
    use crate::models::enums::{UploadPhase, UserRole};
    use zip::ZipArchive;

    fn seed_file(conn: &Connection, case_id: Uuid, uploader_id: Uuid, name: &str) -> CaseFile {
        let file = CaseFile {
            id: Uuid::new_v4(),
            case_id,
            uploader_id,
            file_name: name.into(),
            content_type: None,
            storage_path: format!("cases/{case_id}/{}_{name}", Uuid::new_v4()),
            upload_phase: Some(UploadPhase::InitialSubmission),
            is_draft: false,
            uploaded_at: Utc::now(),
        };
        repo::insert_case_file(conn, &file).unwrap();
        file
    }

    fn setup() -> (Connection, LocalFileStore, tempfile::TempDir, Case, Actor) {
        let conn = open_memory_database().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(tmp.path().to_path_buf());

        let gp = Actor::gp(seed_profile(&conn, UserRole::Gp, None));
        let case = draft_case(gp.id);
        repo::insert_case(&conn, &case).unwrap();
        (conn, store, tmp, case, gp)
    }

    fn entry_names(bundle: &CaseBundle) -> Vec<String> {
        let mut archive = ZipArchive::new(Cursor::new(bundle.bytes.clone())).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn bundles_every_stored_file() {
        let (conn, store, _tmp, case, gp) = setup();
        for name in ["rads.jpg", "bloods.pdf"] {
            let file = seed_file(&conn, case.id, gp.id, name);
            store.put(&file.storage_path, name.as_bytes()).unwrap();
        }

        let bundle = bundle_case_files(&conn, &store, &gp, &case.id, &gp.id, None).unwrap();
        assert!(bundle.skipped.is_empty());
        let names = entry_names(&bundle);
        assert!(names.contains(&"rads.jpg".to_string()));
        assert!(names.contains(&"bloods.pdf".to_string()));
    }

    #[test]
    fn other_uploaders_files_are_excluded() {
        let (conn, store, _tmp, case, gp) = setup();
        let mine = seed_file(&conn, case.id, gp.id, "mine.jpg");
        store.put(&mine.storage_path, b"bytes").unwrap();

        let specialist = seed_profile(&conn, UserRole::Specialist, Some("Cardiology"));
        let theirs = seed_file(&conn, case.id, specialist, "theirs.jpg");
        store.put(&theirs.storage_path, b"bytes").unwrap();

        let bundle = bundle_case_files(&conn, &store, &gp, &case.id, &gp.id, None).unwrap();
        assert_eq!(entry_names(&bundle), vec!["mine.jpg".to_string()]);
    }

    #[test]
    fn missing_objects_are_skipped_not_fatal() {
        let (conn, store, _tmp, case, gp) = setup();
        for name in ["a.jpg", "b.jpg"] {
            let file = seed_file(&conn, case.id, gp.id, name);
            store.put(&file.storage_path, b"bytes").unwrap();
        }
        // Row exists, object does not.
        seed_file(&conn, case.id, gp.id, "lost.jpg");

        let bundle = bundle_case_files(&conn, &store, &gp, &case.id, &gp.id, None).unwrap();
        assert_eq!(bundle.skipped, vec!["lost.jpg".to_string()]);
        assert_eq!(entry_names(&bundle).len(), 2);
    }

    #[test]
    fn total_download_failure_is_an_error() {
        let (conn, store, _tmp, case, gp) = setup();
        seed_file(&conn, case.id, gp.id, "lost.jpg");
        assert!(matches!(
            bundle_case_files(&conn, &store, &gp, &case.id, &gp.id, None),
            Err(BundleError::AllDownloadsFailed)
        ));
    }

    #[test]
    fn empty_selection_is_no_files() {
        let (conn, store, _tmp, case, gp) = setup();
        assert!(matches!(
            bundle_case_files(&conn, &store, &gp, &case.id, &gp.id, None),
            Err(BundleError::NoFiles)
        ));

        let file = seed_file(&conn, case.id, gp.id, "a.jpg");
        store.put(&file.storage_path, b"bytes").unwrap();
        let unmatched = vec!["cases/nowhere/nothing.jpg".to_string()];
        assert!(matches!(
            bundle_case_files(&conn, &store, &gp, &case.id, &gp.id, Some(&unmatched)),
            Err(BundleError::NoFiles)
        ));
    }

    #[test]
    fn storage_path_filter_restricts_the_bundle() {
        let (conn, store, _tmp, case, gp) = setup();
        let keep = seed_file(&conn, case.id, gp.id, "keep.jpg");
        let drop = seed_file(&conn, case.id, gp.id, "drop.jpg");
        store.put(&keep.storage_path, b"keep").unwrap();
        store.put(&drop.storage_path, b"drop").unwrap();

        let only = vec![keep.storage_path.clone()];
        let bundle =
            bundle_case_files(&conn, &store, &gp, &case.id, &gp.id, Some(&only)).unwrap();
        assert_eq!(entry_names(&bundle), vec!["keep.jpg".to_string()]);
    }

    #[test]
    fn strangers_are_refused() {
        let (conn, store, _tmp, case, gp) = setup();
        let file = seed_file(&conn, case.id, gp.id, "a.jpg");
        store.put(&file.storage_path, b"bytes").unwrap();

        let other_gp = Actor::gp(seed_profile(&conn, UserRole::Gp, None));
        assert!(matches!(
            bundle_case_files(&conn, &store, &other_gp, &case.id, &gp.id, None),
            Err(BundleError::NotAuthorized)
        ));
        assert!(matches!(
            bundle_case_files(&conn, &store, &gp, &Uuid::new_v4(), &gp.id, None),
            Err(BundleError::NotFound)
        ));
    }

    #[test]
    fn duplicate_names_get_numeric_suffixes() {
        let (conn, store, _tmp, case, gp) = setup();
        for _ in 0..3 {
            let file = seed_file(&conn, case.id, gp.id, "rads.jpg");
            store.put(&file.storage_path, b"bytes").unwrap();
        }

        let bundle = bundle_case_files(&conn, &store, &gp, &case.id, &gp.id, None).unwrap();
        let mut names = entry_names(&bundle);
        names.sort();
        assert_eq!(names, vec!["rads (2).jpg", "rads (3).jpg", "rads.jpg"]);
    }

    #[test]
    fn archive_name_is_filesystem_safe() {
        let gp_id = Uuid::new_v4();
        let mut case = draft_case(gp_id);
        case.patient.patient_name = "Bella & Co./2".into();
        case.patient.species = "Feline!".into();

        let at: DateTime<Utc> = "2026-03-01T09:30:00Z".parse().unwrap();
        let name = archive_name(at, &case);

        assert!(name.starts_with("2026-03-01T093000Z_Bella___Co__2_Feline__Case-"));
        assert!(name.ends_with(".zip"));
        assert!(!name.contains(':'));
        assert!(name.contains(&case.id.to_string()[..6]));
    }
}
