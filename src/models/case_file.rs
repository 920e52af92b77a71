use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::UploadPhase;

/// One uploaded artifact. The row carries no bytes — `storage_path` is the
/// only handle by which the object store retrieves them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseFile {
    pub id: Uuid,
    pub case_id: Uuid,
    pub uploader_id: Uuid,
    pub file_name: String,
    pub content_type: Option<String>,
    pub storage_path: String,
    pub upload_phase: Option<UploadPhase>,
    pub is_draft: bool,
    pub uploaded_at: DateTime<Utc>,
}
