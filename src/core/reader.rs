//! On-demand reading of a single remote document.

use serde::Serialize;
use std::ops::RangeInclusive;
use tracing::warn;

use super::extractor;
use super::format::FileFormat;
use super::remote::{RemoteError, RemoteFile, RemoteStore};
use super::retry::{with_backoff, RetryPolicy};
use crate::error::Result;

/// Characters returned by a document read before truncation
pub const READ_CHAR_LIMIT: usize = 10_000;
pub const TRUNCATION_MARKER: &str = "... (truncated)";

#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub file: RemoteFile,
    pub text: String,
    pub truncated: bool,
}

/// Download and extract one file. `pages` only applies to PDFs.
pub async fn read_document(
    store: &dyn RemoteStore,
    file_id: &str,
    pages: Option<RangeInclusive<u32>>,
    policy: &RetryPolicy,
) -> Result<Document> {
    let file = with_backoff(policy, "file metadata", RemoteError::is_transient, || {
        store.file_metadata(file_id)
    })
    .await?;
    let blob = with_backoff(policy, "file download", RemoteError::is_transient, || {
        store.download(&file)
    })
    .await?;

    let text = match (file.format, pages) {
        (FileFormat::Pdf, pages) => extractor::extract_pdf(&blob, pages)?,
        (format, Some(_)) => {
            warn!("Page ranges only apply to PDFs; reading all of {}", file.name);
            extractor::extract(&blob, format)?
        }
        (format, None) => extractor::extract(&blob, format)?,
    };

    let (text, truncated) = truncate_chars(text, READ_CHAR_LIMIT);
    Ok(Document {
        file,
        text,
        truncated,
    })
}

/// Keep at most `limit` characters, appending the truncation marker when
/// anything was cut
#[must_use]
pub fn truncate_chars(text: String, limit: usize) -> (String, bool) {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => {
            let mut kept = text[..cut].to_string();
            kept.push_str(TRUNCATION_MARKER);
            (kept, true)
        }
        None => (text, false),
    }
}
