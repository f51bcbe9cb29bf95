//! Operational surface shared by the CLI and any front end: trigger a sync
//! or rebuild in the background, poll status, and search.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{error, info};

use crate::core::{
    FileStatus, IndexState, SearchHit, SearchIndex, Searcher, SyncEngine, SyncProgress,
    SyncReport,
};
use crate::db::IndexStore;
use crate::error::{AppError, Result};

/// Answer to a trigger request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerAck {
    Started,
    /// Another run is in flight; this request was coalesced into it
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Sync,
    Rebuild,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum RunOutcome {
    Completed(SyncReport),
    Failed { error: String },
}

/// What happened in the most recent run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub kind: RunKind,
    pub finished_at: DateTime<Utc>,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct DegradedFile {
    pub id: String,
    pub name: String,
    pub chunk_count: usize,
    pub dropped_chunks: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Status {
    pub file_count: usize,
    pub chunk_count: usize,
    pub index_ready: bool,
    pub syncing: bool,
    pub processed: usize,
    pub no_text: usize,
    pub omitted: usize,
    pub degraded: Vec<DegradedFile>,
    pub embedding_model: Option<String>,
    pub dimension: Option<usize>,
    pub last_run: Option<RunSummary>,
}

impl Status {
    /// Counts over `state`; run fields are left empty
    #[must_use]
    pub fn from_state(state: &IndexState, index_ready: bool) -> Self {
        let count = |status: FileStatus| state.files.values().filter(|r| r.status == status).count();
        Self {
            file_count: state.files.len(),
            chunk_count: state.chunk_count(),
            index_ready,
            processed: count(FileStatus::Processed),
            no_text: count(FileStatus::NoText),
            omitted: count(FileStatus::Omitted),
            degraded: state
                .files
                .values()
                .filter(|r| r.is_degraded())
                .map(|r| DegradedFile {
                    id: r.id.clone(),
                    name: r.name.clone(),
                    chunk_count: r.chunk_count,
                    dropped_chunks: r.dropped_chunks,
                })
                .collect(),
            embedding_model: state.embedding_model().map(String::from),
            dimension: state.dimension(),
            ..Self::default()
        }
    }
}

/// Clears the running flag when a run ends, however it ends
struct RunGuard(Arc<AtomicBool>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the index state and publishes search structures.
///
/// The sync engine is the only writer. It works on a copy of the state and
/// the copy replaces the original only after it has been persisted; the
/// derived search structure is swapped in whole, so readers see either the
/// old or the new one.
pub struct IndexService {
    engine: SyncEngine,
    searcher: Searcher,
    store: IndexStore,
    state: tokio::sync::Mutex<IndexState>,
    published: RwLock<Option<Arc<SearchIndex>>>,
    snapshot: RwLock<Status>,
    running: Arc<AtomicBool>,
    last_run: Mutex<Option<RunSummary>>,
}

impl IndexService {
    /// Load persisted state and publish its search structure
    pub fn open(engine: SyncEngine, store: IndexStore) -> Result<Arc<Self>> {
        let state = store.load()?;
        let index = SearchIndex::from_state(&state)?.map(Arc::new);
        info!(
            "Loaded index: {} files, {} chunks",
            state.files.len(),
            state.chunk_count()
        );

        let searcher = Searcher::new(Arc::clone(engine.embedder()));
        Ok(Arc::new(Self {
            snapshot: RwLock::new(Status::from_state(&state, index.is_some())),
            published: RwLock::new(index),
            state: tokio::sync::Mutex::new(state),
            engine,
            searcher,
            store,
            running: Arc::new(AtomicBool::new(false)),
            last_run: Mutex::new(None),
        }))
    }

    /// Start a sync in the background
    pub fn trigger_sync(self: &Arc<Self>) -> TriggerAck {
        self.trigger(RunKind::Sync)
    }

    /// Start a forced rebuild in the background
    pub fn trigger_rebuild(self: &Arc<Self>) -> TriggerAck {
        self.trigger(RunKind::Rebuild)
    }

    fn trigger(self: &Arc<Self>, kind: RunKind) -> TriggerAck {
        let Some(guard) = self.begin() else {
            info!("{kind:?} requested while a run is in flight; coalesced");
            return TriggerAck::AlreadyRunning;
        };
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = service.run(kind, |_| {}).await {
                error!("Background {kind:?} failed: {e}");
            }
        });
        TriggerAck::Started
    }

    /// Run a sync on the current task and wait for it
    pub async fn sync_now<F>(&self, progress: F) -> Result<SyncReport>
    where
        F: Fn(&SyncProgress) + Send + Sync,
    {
        let _guard = self.begin().ok_or(AppError::SyncInProgress)?;
        self.run(RunKind::Sync, progress).await
    }

    /// Run a forced rebuild on the current task and wait for it
    pub async fn rebuild_now<F>(&self, progress: F) -> Result<SyncReport>
    where
        F: Fn(&SyncProgress) + Send + Sync,
    {
        let _guard = self.begin().ok_or(AppError::SyncInProgress)?;
        self.run(RunKind::Rebuild, progress).await
    }

    fn begin(&self) -> Option<RunGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(Arc::clone(&self.running)))
    }

    async fn run<F>(&self, kind: RunKind, progress: F) -> Result<SyncReport>
    where
        F: Fn(&SyncProgress) + Send + Sync,
    {
        let result = self.run_inner(kind, progress).await;
        let outcome = match &result {
            Ok(report) => RunOutcome::Completed(report.clone()),
            Err(e) => RunOutcome::Failed {
                error: e.to_string(),
            },
        };
        let mut last_run = self
            .last_run
            .lock()
            .map_err(|e| AppError::Other(e.to_string()))?;
        *last_run = Some(RunSummary {
            kind,
            finished_at: Utc::now(),
            outcome,
        });
        result
    }

    async fn run_inner<F>(&self, kind: RunKind, progress: F) -> Result<SyncReport>
    where
        F: Fn(&SyncProgress) + Send + Sync,
    {
        let mut state = self.state.lock().await;
        let mut working = state.clone();

        let report = match kind {
            RunKind::Sync => self.engine.sync(&mut working, progress).await?,
            RunKind::Rebuild => self.engine.rebuild(&mut working, progress).await?,
        };

        if report.changed {
            let index = SearchIndex::from_state(&working)?.map(Arc::new);
            self.store.save(&working)?;
            *state = working;
            self.publish(&state, index)?;
        } else if self.current_index()?.is_none() {
            let index = SearchIndex::from_state(&state)?.map(Arc::new);
            self.publish(&state, index)?;
        }
        Ok(report)
    }

    fn publish(&self, state: &IndexState, index: Option<Arc<SearchIndex>>) -> Result<()> {
        let snapshot = Status::from_state(state, index.is_some());
        {
            let mut published = self
                .published
                .write()
                .map_err(|e| AppError::Other(e.to_string()))?;
            *published = index;
        }
        let mut current = self
            .snapshot
            .write()
            .map_err(|e| AppError::Other(e.to_string()))?;
        *current = snapshot;
        Ok(())
    }

    /// The search structure queries currently run against
    pub fn current_index(&self) -> Result<Option<Arc<SearchIndex>>> {
        let published = self
            .published
            .read()
            .map_err(|e| AppError::Other(e.to_string()))?;
        Ok(published.clone())
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Wait until no sync or rebuild is in flight
    pub async fn wait_idle(&self) {
        while self.is_running() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Counts and readiness as of the last published state
    pub fn get_status(&self) -> Result<Status> {
        let mut status = self
            .snapshot
            .read()
            .map_err(|e| AppError::Other(e.to_string()))?
            .clone();
        status.syncing = self.is_running();
        status.last_run = self
            .last_run
            .lock()
            .map_err(|e| AppError::Other(e.to_string()))?
            .clone();
        Ok(status)
    }

    /// Nearest chunks for `query`, or [`AppError::IndexNotReady`]
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let index = self.current_index()?;
        self.searcher.search(index, query, k).await
    }

    /// Copy of the current state, for listings
    pub async fn state(&self) -> IndexState {
        self.state.lock().await.clone()
    }
}
