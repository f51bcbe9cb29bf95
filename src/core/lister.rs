//! Recursive enumeration of a remote folder tree.

use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::remote::{RemoteEntry, RemoteError, RemoteFile, RemoteStore};
use super::retry::{with_backoff, RetryPolicy};
use crate::error::{AppError, Result};

/// Files reachable from a root folder
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub files: Vec<RemoteFile>,
    /// Sub-folders whose listing failed; their files are missing from `files`
    pub failed_folders: Vec<String>,
}

impl Listing {
    /// True when every folder was listed to the last page
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed_folders.is_empty()
    }
}

/// List every non-folder descendant of `root_id` exactly once.
///
/// Folders are walked from an explicit stack. A failure on the root folder
/// aborts with [`AppError::Listing`]; a failure below the root only marks
/// the listing incomplete.
pub async fn list_all(
    store: &dyn RemoteStore,
    root_id: &str,
    policy: &RetryPolicy,
) -> Result<Listing> {
    let mut listing = Listing::default();
    let mut seen_files = HashSet::new();
    let mut seen_folders = HashSet::from([root_id.to_string()]);
    let mut pending = vec![root_id.to_string()];

    while let Some(folder_id) = pending.pop() {
        match list_folder(store, &folder_id, policy).await {
            Ok(entries) => {
                for entry in entries {
                    match entry {
                        RemoteEntry::Folder { id, name } => {
                            if seen_folders.insert(id.clone()) {
                                debug!("Descending into folder {name} ({id})");
                                pending.push(id);
                            }
                        }
                        RemoteEntry::File(file) => {
                            if seen_files.insert(file.id.clone()) {
                                listing.files.push(file);
                            }
                        }
                    }
                }
            }
            Err(e) if folder_id == root_id => {
                return Err(AppError::Listing(format!("root folder {root_id}: {e}")));
            }
            Err(e) => {
                warn!("Listing of folder {folder_id} failed: {e}");
                listing.failed_folders.push(folder_id);
            }
        }
    }

    info!(
        "Listed {} files under {root_id} ({} folders failed)",
        listing.files.len(),
        listing.failed_folders.len()
    );
    Ok(listing)
}

/// All entries of one folder, following page tokens until exhausted
async fn list_folder(
    store: &dyn RemoteStore,
    folder_id: &str,
    policy: &RetryPolicy,
) -> std::result::Result<Vec<RemoteEntry>, RemoteError> {
    let mut entries = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let token = page_token.as_deref();
        let page = with_backoff(policy, "folder listing", RemoteError::is_transient, || {
            store.list_children(folder_id, token)
        })
        .await?;

        entries.extend(page.entries);
        match page.next_page_token {
            Some(next) if !next.is_empty() => page_token = Some(next),
            _ => return Ok(entries),
        }
    }
}
