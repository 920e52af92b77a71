//! Timeline reconstruction — merges a case's messages and uploaded files
//! into one chronological feed, grouping files uploaded by the same actor
//! within a short window into a single batch.
//!
//! Pure functions over fetched rows: no I/O, deterministic for a fixed
//! input, callable from any layer and unit-testable in isolation.

pub mod types;

pub use types::*;

use chrono::{DateTime, Duration, Utc};

use crate::config::BATCH_WINDOW_SECS;
use crate::models::{CaseFile, CaseMessage};

/// Build the merged timeline for a case.
///
/// `messages` and `files` are the full row sets for the case; draft files
/// and internal messages are dropped here even if the caller pre-filtered.
/// Entries come out ascending by representative timestamp; ties keep input
/// order (stable merge). When `submitted_at` is present a submission marker
/// always leads the feed: initial files are uploaded while the case is
/// still a draft, so their timestamps predate the submission itself.
pub fn build_timeline(
    submitted_at: Option<DateTime<Utc>>,
    messages: Vec<CaseMessage>,
    files: Vec<CaseFile>,
) -> Vec<TimelineEntry> {
    let batches = batch_files(files);

    let mut messages: Vec<CaseMessage> =
        messages.into_iter().filter(|m| !m.is_internal).collect();
    messages.sort_by_key(|m| m.created_at);

    let mut entries: Vec<TimelineEntry> = Vec::with_capacity(messages.len() + batches.len() + 1);
    entries.extend(messages.into_iter().map(TimelineEntry::Message));
    entries.extend(batches.into_iter().map(TimelineEntry::Files));

    // Stable: equal timestamps preserve the message-before-files input order.
    entries.sort_by_key(|e| e.sort_key());

    if let Some(at) = submitted_at {
        entries.insert(0, TimelineEntry::CaseSubmission { at });
    }
    entries
}

/// Group non-draft files into uploader batches.
///
/// A new batch starts when the uploader changes or when the gap from the
/// batch's first file reaches the window. Two uploads by the same actor
/// 60.0s apart are deliberately split; 59.9s apart stay together.
pub fn batch_files(mut files: Vec<CaseFile>) -> Vec<FileBatch> {
    let window = Duration::seconds(BATCH_WINDOW_SECS);
    files.retain(|f| !f.is_draft);
    files.sort_by_key(|f| f.uploaded_at);

    let mut batches: Vec<FileBatch> = Vec::new();
    for file in files {
        match batches.last_mut() {
            Some(batch)
                if batch.uploader_id == file.uploader_id
                    && file.uploaded_at - batch.started_at < window =>
            {
                batch.files.push(file);
            }
            _ => batches.push(FileBatch {
                uploader_id: file.uploader_id,
                started_at: file.uploaded_at,
                files: vec![file],
            }),
        }
    }
    batches
}
