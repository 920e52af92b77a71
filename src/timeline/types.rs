use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CaseFile, CaseMessage};

/// One entry on the merged case timeline — reconstructed on every read,
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineEntry {
    /// Marks the point at which the GP submitted the case.
    CaseSubmission { at: DateTime<Utc> },
    Message(CaseMessage),
    Files(FileBatch),
}

impl TimelineEntry {
    /// Representative timestamp used for the chronological merge.
    pub fn sort_key(&self) -> DateTime<Utc> {
        match self {
            TimelineEntry::CaseSubmission { at } => *at,
            TimelineEntry::Message(msg) => msg.created_at,
            TimelineEntry::Files(batch) => batch.started_at,
        }
    }
}

/// Files uploaded by one actor within the batching window, grouped for
/// display and bulk download.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileBatch {
    pub uploader_id: Uuid,
    /// First file's upload time — the batch's reference timestamp.
    pub started_at: DateTime<Utc>,
    pub files: Vec<CaseFile>,
}

/// Consumer-facing render classification: images get thumbnail + lightbox
/// treatment, documents get a clickable download row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Image,
    Document,
}

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

impl FileKind {
    pub fn classify(file_name: &str, content_type: Option<&str>) -> Self {
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());

        // DICOM studies often carry an image/* content type but are not
        // browser-renderable, so they always get document treatment.
        if ext.as_deref() == Some("dcm") {
            return FileKind::Document;
        }
        if let Some(ext) = &ext {
            if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                return FileKind::Image;
            }
        }
        if content_type.is_some_and(|ct| ct.contains("image")) {
            return FileKind::Image;
        }
        FileKind::Document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_extensions_classified_as_images() {
        for name in ["rads.jpg", "photo.JPEG", "scan.png", "clip.gif", "pic.webp"] {
            assert_eq!(FileKind::classify(name, None), FileKind::Image, "{name}");
        }
    }

    #[test]
    fn dicom_is_never_an_image() {
        assert_eq!(FileKind::classify("study.dcm", None), FileKind::Document);
        assert_eq!(
            FileKind::classify("study.dcm", Some("image/dicom")),
            FileKind::Document
        );
    }

    #[test]
    fn mime_fallback_when_extension_unknown() {
        assert_eq!(
            FileKind::classify("upload.bin", Some("image/heic")),
            FileKind::Image
        );
        assert_eq!(
            FileKind::classify("report.pdf", Some("application/pdf")),
            FileKind::Document
        );
        assert_eq!(FileKind::classify("notes.txt", None), FileKind::Document);
    }
}
