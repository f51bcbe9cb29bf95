//! Reconciles the remote folder with the local index state.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::chunker::chunk_text;
use super::embedder::{Embedder, TaskHint};
use super::extractor;
use super::lister::list_all;
use super::remote::{RemoteError, RemoteFile, RemoteStore};
use super::retry::{with_backoff, RetryPolicy};
use super::state::{FileRecord, FileStatus, IndexState};
use crate::config::Config;
use crate::error::{AppError, Result};

/// Knobs of a sync pass
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub root_folder_id: String,
    pub chunk_size: usize,
    pub chunk_stride: usize,
    pub embed_concurrency: usize,
    pub max_file_size_bytes: u64,
    pub retry: RetryPolicy,
}

impl SyncSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            root_folder_id: config.root_folder_id.clone(),
            chunk_size: config.chunk_size,
            chunk_stride: config.chunk_stride,
            embed_concurrency: config.embed_concurrency.max(1),
            max_file_size_bytes: config.max_file_size_bytes(),
            retry: config.retry_policy(),
        }
    }
}

/// Progress information for a sync pass
#[derive(Debug, Clone)]
pub struct SyncProgress {
    pub total: usize,
    pub processed: usize,
    pub current_file: String,
}

/// Outcome of one sync or rebuild pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub files_new: usize,
    pub files_updated: usize,
    pub files_deleted: usize,
    pub files_unchanged: usize,
    pub files_omitted: usize,
    pub files_no_text: usize,
    pub files_failed: usize,
    pub chunks_embedded: usize,
    pub chunks_dropped: usize,
    pub listing_complete: bool,
    /// False when the pass found nothing to do and wrote nothing
    pub changed: bool,
    pub elapsed_secs: f64,
}

/// Work derived from comparing known records with a listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    pub new: Vec<RemoteFile>,
    pub updated: Vec<RemoteFile>,
    pub deleted: Vec<String>,
    pub unchanged: usize,
}

impl SyncPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Compare known records with the current listing.
///
/// A file is updated when its stored timestamp differs from the listed one.
/// Deletions are only computed from a complete listing; a partial one says
/// nothing about files it did not reach.
#[must_use]
pub fn diff(
    known: &BTreeMap<String, FileRecord>,
    current: &[RemoteFile],
    listing_complete: bool,
) -> SyncPlan {
    let mut plan = SyncPlan::default();

    for file in current {
        match known.get(&file.id) {
            None => plan.new.push(file.clone()),
            Some(record) if record.modified_at != file.modified_at => {
                plan.updated.push(file.clone());
            }
            Some(_) => plan.unchanged += 1,
        }
    }

    if listing_complete {
        let current_ids: std::collections::HashSet<&str> =
            current.iter().map(|f| f.id.as_str()).collect();
        plan.deleted = known
            .keys()
            .filter(|id| !current_ids.contains(id.as_str()))
            .cloned()
            .collect();
    }

    plan
}

enum FileOutcome {
    Processed { embedded: usize, dropped: usize },
    NoText,
    Omitted,
    Vanished,
    Failed,
}

/// Sync engine: listing, diff, extraction, chunking, embedding, mutation
pub struct SyncEngine {
    remote: Arc<dyn RemoteStore>,
    embedder: Arc<Embedder>,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        embedder: Arc<Embedder>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            remote,
            embedder,
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    #[must_use]
    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    #[must_use]
    pub fn embedder(&self) -> &Arc<Embedder> {
        &self.embedder
    }

    /// Incremental pass over `state`.
    ///
    /// A listing failure returns before `state` is touched. When the listing
    /// matches the known records the report has `changed == false`.
    pub async fn sync<F>(&self, state: &mut IndexState, progress: F) -> Result<SyncReport>
    where
        F: Fn(&SyncProgress) + Send + Sync,
    {
        let start = Instant::now();
        self.check_model(state)?;

        let listing = list_all(
            self.remote.as_ref(),
            &self.settings.root_folder_id,
            &self.settings.retry,
        )
        .await?;
        let plan = diff(&state.files, &listing.files, listing.is_complete());

        let mut report = SyncReport {
            listing_complete: listing.is_complete(),
            files_unchanged: plan.unchanged,
            ..SyncReport::default()
        };
        if plan.is_empty() {
            info!("Index up to date ({} files)", plan.unchanged);
            report.elapsed_secs = start.elapsed().as_secs_f64();
            return Ok(report);
        }
        if !listing.is_complete() {
            warn!(
                "Listing incomplete ({} folders failed); deletions skipped this pass",
                listing.failed_folders.len()
            );
        }

        self.apply(state, plan, &mut report, &progress).await?;
        report.elapsed_secs = start.elapsed().as_secs_f64();
        Ok(report)
    }

    /// Discard `state` and process every listed file as new.
    ///
    /// The listing happens first; if it fails, or any sub-folder could not
    /// be listed, `state` is left as it was.
    pub async fn rebuild<F>(&self, state: &mut IndexState, progress: F) -> Result<SyncReport>
    where
        F: Fn(&SyncProgress) + Send + Sync,
    {
        let start = Instant::now();
        let listing = list_all(
            self.remote.as_ref(),
            &self.settings.root_folder_id,
            &self.settings.retry,
        )
        .await?;
        if !listing.is_complete() {
            return Err(AppError::Listing(format!(
                "rebuild needs a complete listing; {} folders failed: {}",
                listing.failed_folders.len(),
                listing.failed_folders.join(", ")
            )));
        }

        state.clear();
        let plan = diff(&state.files, &listing.files, true);
        let mut report = SyncReport {
            listing_complete: listing.is_complete(),
            ..SyncReport::default()
        };
        self.apply(state, plan, &mut report, &progress).await?;
        report.changed = true;
        report.elapsed_secs = start.elapsed().as_secs_f64();
        Ok(report)
    }

    fn check_model(&self, state: &IndexState) -> Result<()> {
        match state.embedding_model() {
            Some(stored) if stored != self.embedder.model_id() && state.chunk_count() > 0 => {
                Err(AppError::EmbeddingModelChanged {
                    stored: stored.to_string(),
                    configured: self.embedder.model_id().to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    async fn apply<F>(
        &self,
        state: &mut IndexState,
        plan: SyncPlan,
        report: &mut SyncReport,
        progress: &F,
    ) -> Result<()>
    where
        F: Fn(&SyncProgress) + Send + Sync,
    {
        report.changed = true;

        for file_id in &plan.deleted {
            debug!("Removing deleted file {file_id}");
            state.remove_file(file_id);
            report.files_deleted += 1;
        }

        let total = plan.new.len() + plan.updated.len();
        let new_count = plan.new.len();
        let work = plan.new.into_iter().chain(plan.updated);

        for (i, file) in work.enumerate() {
            progress(&SyncProgress {
                total,
                processed: i,
                current_file: file.name.clone(),
            });

            match self.process_file(state, &file).await? {
                FileOutcome::Processed { embedded, dropped } => {
                    report.chunks_embedded += embedded;
                    report.chunks_dropped += dropped;
                    if i < new_count {
                        report.files_new += 1;
                    } else {
                        report.files_updated += 1;
                    }
                }
                FileOutcome::NoText => report.files_no_text += 1,
                FileOutcome::Omitted => report.files_omitted += 1,
                FileOutcome::Vanished => report.files_deleted += 1,
                FileOutcome::Failed => report.files_failed += 1,
            }
        }

        progress(&SyncProgress {
            total,
            processed: total,
            current_file: String::new(),
        });

        state.set_embedding_model(self.embedder.model_id());
        info!(
            "Sync applied: {} new, {} updated, {} deleted, {} chunks embedded, {} dropped",
            report.files_new,
            report.files_updated,
            report.files_deleted,
            report.chunks_embedded,
            report.chunks_dropped
        );
        Ok(())
    }

    async fn process_file(&self, state: &mut IndexState, file: &RemoteFile) -> Result<FileOutcome> {
        let oversized = file
            .size_bytes
            .is_some_and(|size| size > self.settings.max_file_size_bytes);
        if !file.format.is_supported() || oversized {
            debug!("Omitting {} ({}, oversized: {oversized})", file.name, file.mime_type);
            state.purge_chunks(&file.id);
            state.put_record(record_for(file, FileStatus::Omitted, 0, 0));
            return Ok(FileOutcome::Omitted);
        }

        let blob = match with_backoff(
            &self.settings.retry,
            "file download",
            RemoteError::is_transient,
            || self.remote.download(file),
        )
        .await
        {
            Ok(blob) => blob,
            Err(RemoteError::NotFound(_)) => {
                info!("{} disappeared before download; treating as deleted", file.name);
                state.remove_file(&file.id);
                return Ok(FileOutcome::Vanished);
            }
            Err(e) => {
                warn!("Skipping {} this pass: {e}", file.name);
                return Ok(FileOutcome::Failed);
            }
        };

        let text = extractor::extract(&blob, file.format).unwrap_or_else(|e| {
            warn!("Could not extract text from {}: {e}", file.name);
            String::new()
        });
        if text.trim().is_empty() {
            state.purge_chunks(&file.id);
            state.put_record(record_for(file, FileStatus::NoText, 0, 0));
            return Ok(FileOutcome::NoText);
        }

        let chunks = chunk_text(&text, self.settings.chunk_size, self.settings.chunk_stride)?;
        let results: Vec<Result<Vec<f32>>> = stream::iter(chunks.clone())
            .map(|chunk| {
                let embedder = Arc::clone(&self.embedder);
                async move { embedder.embed(&chunk, TaskHint::Document).await }
            })
            .buffered(self.settings.embed_concurrency)
            .collect()
            .await;

        let mut kept_chunks = Vec::with_capacity(chunks.len());
        let mut kept_vectors = Vec::with_capacity(chunks.len());
        let mut dropped = 0;
        for (position, (chunk, result)) in chunks.into_iter().zip(results).enumerate() {
            match result {
                Ok(vector) => {
                    kept_chunks.push(chunk);
                    kept_vectors.push(vector);
                }
                Err(e) => {
                    warn!("Dropping chunk {position} of {}: {e}", file.name);
                    dropped += 1;
                }
            }
        }

        let embedded = kept_chunks.len();
        state.upsert_file(&file.id, kept_chunks, kept_vectors)?;
        state.put_record(record_for(file, FileStatus::Processed, embedded, dropped));
        debug!("Processed {}: {embedded} chunks, {dropped} dropped", file.name);
        Ok(FileOutcome::Processed { embedded, dropped })
    }
}

fn record_for(
    file: &RemoteFile,
    status: FileStatus,
    chunk_count: usize,
    dropped_chunks: usize,
) -> FileRecord {
    FileRecord {
        id: file.id.clone(),
        name: file.name.clone(),
        mime_type: file.mime_type.clone(),
        modified_at: file.modified_at,
        status,
        chunk_count,
        dropped_chunks,
    }
}
