//! Sync engine and service scenarios against in-memory fakes of the remote
//! file store and the embedding provider.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use docsync::core::{
    read_document, Embedder, EmbeddingProvider, FileFormat, FileStatus, FolderPage,
    ProviderError, RemoteEntry, RemoteError, RemoteFile, RemoteStore, RetryPolicy, SyncEngine,
    SyncSettings, TaskHint,
};
use docsync::db::IndexStore;
use docsync::error::AppError;
use docsync::service::{IndexService, RunKind, RunOutcome, TriggerAck};

const PAGE_SIZE: usize = 2;

// =========================================================================
// Fakes
// =========================================================================

#[derive(Default)]
struct FakeDrive {
    folders: Mutex<HashMap<String, Vec<RemoteEntry>>>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    broken_folders: Mutex<HashSet<String>>,
    broken_files: Mutex<HashSet<String>>,
    downloads: AtomicUsize,
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

impl FakeDrive {
    fn new() -> Arc<Self> {
        let drive = Self::default();
        drive.folders.lock().unwrap().insert("root".into(), Vec::new());
        Arc::new(drive)
    }

    fn put_file(&self, folder: &str, id: &str, mime: &str, t: i64, content: &[u8]) {
        let file = RemoteFile {
            id: id.into(),
            name: format!("{id}.doc"),
            mime_type: mime.into(),
            format: FileFormat::from_mime(mime),
            modified_at: at(t),
            parent_id: folder.into(),
            size_bytes: Some(content.len() as u64),
        };
        let mut folders = self.folders.lock().unwrap();
        let entries = folders.entry(folder.into()).or_default();
        entries.retain(|e| !matches!(e, RemoteEntry::File(f) if f.id == id));
        entries.push(RemoteEntry::File(file));
        self.blobs.lock().unwrap().insert(id.into(), content.to_vec());
    }

    fn put_text(&self, id: &str, t: i64, content: &str) {
        self.put_file("root", id, "text/plain", t, content.as_bytes());
    }

    fn add_folder(&self, parent: &str, id: &str) {
        let mut folders = self.folders.lock().unwrap();
        folders.entry(parent.into()).or_default().push(RemoteEntry::Folder {
            id: id.into(),
            name: id.into(),
        });
        folders.entry(id.into()).or_default();
    }

    fn remove_file(&self, id: &str) {
        for entries in self.folders.lock().unwrap().values_mut() {
            entries.retain(|e| !matches!(e, RemoteEntry::File(f) if f.id == id));
        }
        self.blobs.lock().unwrap().remove(id);
    }

    /// Keep the listing entry but make the download 404
    fn drop_blob(&self, id: &str) {
        self.blobs.lock().unwrap().remove(id);
    }

    fn break_folder(&self, id: &str) {
        self.broken_folders.lock().unwrap().insert(id.into());
    }

    fn break_file(&self, id: &str) {
        self.broken_files.lock().unwrap().insert(id.into());
    }

    fn fix_file(&self, id: &str) {
        self.broken_files.lock().unwrap().remove(id);
    }

    fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for FakeDrive {
    async fn list_children(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<FolderPage, RemoteError> {
        if self.broken_folders.lock().unwrap().contains(folder_id) {
            return Err(RemoteError::Fatal(format!("folder {folder_id} unavailable")));
        }
        let folders = self.folders.lock().unwrap();
        let entries = folders
            .get(folder_id)
            .ok_or_else(|| RemoteError::NotFound(folder_id.into()))?;
        let start: usize = page_token.map_or(0, |t| t.parse().unwrap());
        let end = (start + PAGE_SIZE).min(entries.len());
        Ok(FolderPage {
            entries: entries[start..end].to_vec(),
            next_page_token: (end < entries.len()).then(|| end.to_string()),
        })
    }

    async fn download(&self, file: &RemoteFile) -> Result<Vec<u8>, RemoteError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.broken_files.lock().unwrap().contains(&file.id) {
            return Err(RemoteError::Fatal("permission denied".into()));
        }
        self.blobs
            .lock()
            .unwrap()
            .get(&file.id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(file.id.clone()))
    }

    async fn file_metadata(&self, file_id: &str) -> Result<RemoteFile, RemoteError> {
        self.folders
            .lock()
            .unwrap()
            .values()
            .flatten()
            .find_map(|e| match e {
                RemoteEntry::File(f) if f.id == file_id => Some(f.clone()),
                _ => None,
            })
            .ok_or_else(|| RemoteError::NotFound(file_id.into()))
    }
}

/// Maps keywords to axes so nearest neighbors are predictable
struct KeywordEmbeddings {
    model: String,
}

const AXES: [&str; 5] = ["alpha", "bravo", "charlie", "delta", "echo"];

#[async_trait]
impl EmbeddingProvider for KeywordEmbeddings {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str, _hint: TaskHint) -> Result<Vec<f32>, ProviderError> {
        tokio::task::yield_now().await;
        if text.contains("poison") {
            return Err(ProviderError::Fatal("content rejected".into()));
        }
        let mut vector = vec![0.0; AXES.len() + 1];
        match AXES.iter().position(|k| text.contains(k)) {
            Some(axis) => vector[axis] = 1.0,
            None => vector[AXES.len()] = 1.0,
        }
        Ok(vector)
    }
}

fn settings() -> SyncSettings {
    SyncSettings {
        root_folder_id: "root".into(),
        chunk_size: 20,
        chunk_stride: 20,
        embed_concurrency: 2,
        max_file_size_bytes: 1024,
        retry: RetryPolicy::none(),
    }
}

fn open_service(drive: &Arc<FakeDrive>, db_path: &Path, model: &str) -> Arc<IndexService> {
    let embedder = Arc::new(Embedder::new(
        Arc::new(KeywordEmbeddings {
            model: model.into(),
        }),
        RetryPolicy::none(),
    ));
    let engine = SyncEngine::new(drive.clone(), embedder, settings());
    let store = IndexStore::open_at(db_path, None).unwrap();
    IndexService::open(engine, store).unwrap()
}

fn seeded_drive() -> Arc<FakeDrive> {
    let drive = FakeDrive::new();
    drive.put_text("a", 1, "alpha notes");
    drive.put_text("b", 2, "bravo report");
    drive
}

// =========================================================================
// Scenarios
// =========================================================================

#[tokio::test]
async fn test_search_before_any_sync_is_not_ready() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&seeded_drive(), &dir.path().join("index.db"), "kw");

    let result = service.search("alpha", 3).await;
    assert!(matches!(result, Err(AppError::IndexNotReady)));
    assert!(!service.get_status().unwrap().index_ready);
}

#[tokio::test]
async fn test_first_sync_indexes_everything() {
    let dir = tempfile::tempdir().unwrap();
    let drive = seeded_drive();
    let service = open_service(&drive, &dir.path().join("index.db"), "kw");

    let report = service.sync_now(|_| {}).await.unwrap();
    assert_eq!(report.files_new, 2);
    assert_eq!(report.chunks_embedded, 2);
    assert!(report.changed);

    let status = service.get_status().unwrap();
    assert!(status.index_ready);
    assert_eq!(status.file_count, 2);
    assert_eq!(status.chunk_count, 2);

    let hits = service.search("alpha", 1).await.unwrap();
    assert_eq!(hits[0].file_id, "a");
    assert_eq!(hits[0].text, "alpha notes");
}

#[tokio::test]
async fn test_incremental_sync_applies_diff() {
    let dir = tempfile::tempdir().unwrap();
    let drive = seeded_drive();
    let service = open_service(&drive, &dir.path().join("index.db"), "kw");
    service.sync_now(|_| {}).await.unwrap();

    drive.put_text("b", 3, "bravo report v2");
    drive.put_text("c", 1, "charlie memo");
    let downloads_before = drive.downloads();

    let report = service.sync_now(|_| {}).await.unwrap();
    assert_eq!(report.files_new, 1);
    assert_eq!(report.files_updated, 1);
    assert_eq!(report.files_deleted, 0);
    assert_eq!(report.files_unchanged, 1);
    // Unchanged file "a" is not downloaded again
    assert_eq!(drive.downloads() - downloads_before, 2);

    let state = service.state().await;
    assert!(state.is_consistent());
    assert_eq!(state.chunks_of("b"), 1);
    assert_eq!(state.files["b"].modified_at, at(3));
    assert!(state.chunks().contains(&"bravo report v2".to_string()));
    assert!(!state.chunks().contains(&"bravo report".to_string()));
}

#[tokio::test]
async fn test_second_sync_without_changes_leaves_file_identical() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("index.db");
    let service = open_service(&seeded_drive(), &db_path, "kw");

    service.sync_now(|_| {}).await.unwrap();
    let first = std::fs::read(&db_path).unwrap();

    let report = service.sync_now(|_| {}).await.unwrap();
    assert!(!report.changed);
    assert_eq!(report.files_unchanged, 2);
    assert_eq!(std::fs::read(&db_path).unwrap(), first);
}

#[tokio::test]
async fn test_deleted_file_leaves_no_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let drive = seeded_drive();
    let service = open_service(&drive, &dir.path().join("index.db"), "kw");
    service.sync_now(|_| {}).await.unwrap();

    drive.remove_file("b");
    let report = service.sync_now(|_| {}).await.unwrap();
    assert_eq!(report.files_deleted, 1);

    let state = service.state().await;
    assert!(state.is_consistent());
    assert!(!state.owners().iter().any(|owner| owner == "b"));
    assert!(!state.files.contains_key("b"));

    let hits = service.search("bravo", 5).await.unwrap();
    assert!(hits.iter().all(|hit| hit.file_id != "b"));
}

#[tokio::test]
async fn test_failed_chunk_is_dropped_and_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let drive = FakeDrive::new();
    // Two 20-char chunks; the second one is rejected by the provider
    drive.put_text("mixed", 1, "alpha alpha alpha alpoison poison poison");
    let service = open_service(&drive, &dir.path().join("index.db"), "kw");

    let report = service.sync_now(|_| {}).await.unwrap();
    assert_eq!(report.chunks_embedded, 1);
    assert_eq!(report.chunks_dropped, 1);

    let state = service.state().await;
    let record = &state.files["mixed"];
    assert_eq!(record.status, FileStatus::Processed);
    assert_eq!(record.chunk_count, 1);
    assert_eq!(record.dropped_chunks, 1);
    assert_eq!(state.chunk_count(), 1);

    let status = service.get_status().unwrap();
    assert_eq!(status.degraded.len(), 1);
    assert_eq!(status.degraded[0].id, "mixed");
}

#[tokio::test]
async fn test_unsupported_and_oversized_files_are_omitted_once() {
    let dir = tempfile::tempdir().unwrap();
    let drive = seeded_drive();
    drive.put_file("root", "img", "image/png", 1, &[0x89, b'P', b'N', b'G']);
    drive.put_file("root", "huge", "text/plain", 1, &[b'x'; 4096]);
    let service = open_service(&drive, &dir.path().join("index.db"), "kw");

    let report = service.sync_now(|_| {}).await.unwrap();
    assert_eq!(report.files_omitted, 2);

    let state = service.state().await;
    assert_eq!(state.files["img"].status, FileStatus::Omitted);
    assert_eq!(state.files["huge"].status, FileStatus::Omitted);
    assert_eq!(state.chunks_of("img"), 0);

    let downloads = drive.downloads();
    let report = service.sync_now(|_| {}).await.unwrap();
    assert!(!report.changed);
    assert_eq!(drive.downloads(), downloads);
}

#[tokio::test]
async fn test_empty_text_is_no_text() {
    let dir = tempfile::tempdir().unwrap();
    let drive = FakeDrive::new();
    drive.put_text("blank", 1, "   \n  ");
    drive.put_file("root", "pdf", "application/pdf", 1, b"not really a pdf");
    let service = open_service(&drive, &dir.path().join("index.db"), "kw");

    let report = service.sync_now(|_| {}).await.unwrap();
    assert_eq!(report.files_no_text, 2);
    let state = service.state().await;
    assert_eq!(state.files["blank"].status, FileStatus::NoText);
    assert_eq!(state.files["pdf"].status, FileStatus::NoText);
    assert_eq!(state.chunk_count(), 0);
}

#[tokio::test]
async fn test_root_listing_failure_leaves_state_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("index.db");
    let drive = seeded_drive();
    let service = open_service(&drive, &db_path, "kw");
    service.sync_now(|_| {}).await.unwrap();
    let persisted = std::fs::read(&db_path).unwrap();
    let before = service.state().await;

    drive.break_folder("root");
    let result = service.sync_now(|_| {}).await;
    assert!(matches!(result, Err(AppError::Listing(_))));

    assert_eq!(service.state().await, before);
    assert_eq!(std::fs::read(&db_path).unwrap(), persisted);
    let status = service.get_status().unwrap();
    assert!(status.index_ready);
    assert!(matches!(
        status.last_run.unwrap().outcome,
        RunOutcome::Failed { .. }
    ));
}

#[tokio::test]
async fn test_rebuild_with_failed_listing_keeps_index() {
    let dir = tempfile::tempdir().unwrap();
    let drive = seeded_drive();
    let service = open_service(&drive, &dir.path().join("index.db"), "kw");
    service.sync_now(|_| {}).await.unwrap();

    drive.break_folder("root");
    assert!(service.rebuild_now(|_| {}).await.is_err());
    assert_eq!(service.get_status().unwrap().chunk_count, 2);
    assert!(service.search("alpha", 1).await.is_ok());
}

#[tokio::test]
async fn test_partial_listing_deletes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let drive = seeded_drive();
    drive.add_folder("root", "sub");
    drive.put_file("sub", "d", "text/plain", 1, b"delta plan");
    let service = open_service(&drive, &dir.path().join("index.db"), "kw");
    service.sync_now(|_| {}).await.unwrap();
    assert_eq!(service.get_status().unwrap().file_count, 3);

    drive.break_folder("sub");
    drive.put_text("e", 1, "echo log");
    let report = service.sync_now(|_| {}).await.unwrap();
    assert!(!report.listing_complete);
    assert_eq!(report.files_new, 1);
    assert_eq!(report.files_deleted, 0);

    let state = service.state().await;
    assert!(state.files.contains_key("d"));
    assert_eq!(state.chunks_of("d"), 1);
}

#[tokio::test]
async fn test_rebuild_with_partial_listing_keeps_unreached_files() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("index.db");
    let drive = seeded_drive();
    drive.add_folder("root", "sub");
    drive.put_file("sub", "d", "text/plain", 1, b"delta plan");
    let service = open_service(&drive, &db_path, "kw");
    service.sync_now(|_| {}).await.unwrap();
    let persisted = std::fs::read(&db_path).unwrap();

    drive.break_folder("sub");
    let result = service.rebuild_now(|_| {}).await;
    assert!(matches!(result, Err(AppError::Listing(_))));

    let state = service.state().await;
    assert!(state.files.contains_key("d"));
    assert_eq!(state.chunks_of("d"), 1);
    assert_eq!(std::fs::read(&db_path).unwrap(), persisted);
    let hits = service.search("delta", 1).await.unwrap();
    assert_eq!(hits[0].file_id, "d");
}

#[tokio::test]
async fn test_nested_folders_and_pagination_are_listed() {
    let dir = tempfile::tempdir().unwrap();
    let drive = FakeDrive::new();
    drive.add_folder("root", "sub");
    drive.add_folder("sub", "deeper");
    for (i, folder) in ["root", "root", "root", "sub", "sub", "deeper"].iter().enumerate() {
        drive.put_file(folder, &format!("f{i}"), "text/plain", 1, b"alpha");
    }
    let service = open_service(&drive, &dir.path().join("index.db"), "kw");

    let report = service.sync_now(|_| {}).await.unwrap();
    assert!(report.listing_complete);
    assert_eq!(report.files_new, 6);
}

#[tokio::test]
async fn test_file_missing_at_download_is_treated_as_deleted() {
    let dir = tempfile::tempdir().unwrap();
    let drive = seeded_drive();
    let service = open_service(&drive, &dir.path().join("index.db"), "kw");
    service.sync_now(|_| {}).await.unwrap();

    drive.put_text("b", 5, "bravo changed");
    drive.drop_blob("b");
    let report = service.sync_now(|_| {}).await.unwrap();
    assert_eq!(report.files_deleted, 1);

    let state = service.state().await;
    assert!(!state.files.contains_key("b"));
    assert_eq!(state.chunks_of("b"), 0);
}

#[tokio::test]
async fn test_failed_download_is_retried_next_sync() {
    let dir = tempfile::tempdir().unwrap();
    let drive = seeded_drive();
    drive.break_file("b");
    let service = open_service(&drive, &dir.path().join("index.db"), "kw");

    let report = service.sync_now(|_| {}).await.unwrap();
    assert_eq!(report.files_failed, 1);
    assert!(!service.state().await.files.contains_key("b"));

    drive.fix_file("b");
    let report = service.sync_now(|_| {}).await.unwrap();
    assert_eq!(report.files_new, 1);
    assert_eq!(service.state().await.files["b"].status, FileStatus::Processed);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("index.db");
    let drive = seeded_drive();
    open_service(&drive, &db_path, "kw")
        .sync_now(|_| {})
        .await
        .unwrap();

    let reopened = open_service(&drive, &db_path, "kw");
    assert!(reopened.get_status().unwrap().index_ready);
    let hits = reopened.search("bravo", 1).await.unwrap();
    assert_eq!(hits[0].file_id, "b");

    let report = reopened.sync_now(|_| {}).await.unwrap();
    assert!(!report.changed);
}

#[tokio::test]
async fn test_model_change_requires_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("index.db");
    let drive = seeded_drive();
    open_service(&drive, &db_path, "model-one")
        .sync_now(|_| {})
        .await
        .unwrap();

    let service = open_service(&drive, &db_path, "model-two");
    let result = service.sync_now(|_| {}).await;
    assert!(matches!(result, Err(AppError::EmbeddingModelChanged { .. })));

    let report = service.rebuild_now(|_| {}).await.unwrap();
    assert_eq!(report.files_new, 2);
    assert_eq!(
        service.get_status().unwrap().embedding_model.as_deref(),
        Some("model-two")
    );
}

#[tokio::test]
async fn test_search_refuses_index_from_other_model() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("index.db");
    let drive = seeded_drive();
    open_service(&drive, &db_path, "model-one")
        .sync_now(|_| {})
        .await
        .unwrap();

    let service = open_service(&drive, &db_path, "model-two");
    let err = service.search("alpha", 1).await.unwrap_err();
    assert!(matches!(err, AppError::EmbeddingModelChanged { .. }));
    assert!(err.is_unavailable());

    let store = IndexStore::open_at(&db_path, None).unwrap();
    let index = store.load_search_index().unwrap().unwrap();
    assert_eq!(index.embedding_model(), Some("model-one"));

    service.rebuild_now(|_| {}).await.unwrap();
    let hits = service.search("alpha", 1).await.unwrap();
    assert_eq!(hits[0].file_id, "a");
}

#[tokio::test]
async fn test_trigger_coalesces_concurrent_requests() {
    let dir = tempfile::tempdir().unwrap();
    let service = open_service(&seeded_drive(), &dir.path().join("index.db"), "kw");

    assert_eq!(service.trigger_sync(), TriggerAck::Started);
    assert_eq!(service.trigger_sync(), TriggerAck::AlreadyRunning);
    assert_eq!(service.trigger_rebuild(), TriggerAck::AlreadyRunning);
    assert!(service.get_status().unwrap().syncing);

    service.wait_idle().await;
    let status = service.get_status().unwrap();
    assert!(!status.syncing);
    assert_eq!(status.file_count, 2);
    assert!(matches!(
        status.last_run.unwrap().outcome,
        RunOutcome::Completed(_)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_runs_on_multi_thread_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let drive = seeded_drive();
    let service = open_service(&drive, &dir.path().join("index.db"), "kw");

    assert_eq!(service.trigger_sync(), TriggerAck::Started);
    service.wait_idle().await;
    let status = service.get_status().unwrap();
    assert_eq!(status.file_count, 2);
    assert!(status.index_ready);

    drive.put_text("c", 1, "charlie memo");
    assert_eq!(service.trigger_rebuild(), TriggerAck::Started);
    service.wait_idle().await;
    let status = service.get_status().unwrap();
    assert_eq!(status.file_count, 3);
    let last_run = status.last_run.unwrap();
    assert_eq!(last_run.kind, RunKind::Rebuild);
    assert!(matches!(last_run.outcome, RunOutcome::Completed(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_partial_index_during_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let drive = seeded_drive();
    drive.put_text("c", 1, "charlie memo");
    let service = open_service(&drive, &dir.path().join("index.db"), "kw");
    service.sync_now(|_| {}).await.unwrap();

    drive.put_text("d", 1, "delta plan");
    drive.put_text("e", 1, "echo log");

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..3)
        .map(|_| {
            let service = Arc::clone(&service);
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                let mut seen = HashSet::new();
                while !done.load(Ordering::SeqCst) {
                    let index = service.current_index().unwrap().unwrap();
                    assert_eq!(index.len(), index.vector_count());
                    seen.insert(index.len());
                    assert!(service.search("alpha", 3).await.is_ok());
                    tokio::task::yield_now().await;
                }
                seen
            })
        })
        .collect();

    service.rebuild_now(|_| {}).await.unwrap();
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        let seen = reader.await.unwrap();
        assert!(seen.iter().all(|len| *len == 3 || *len == 5), "{seen:?}");
    }
    assert_eq!(service.current_index().unwrap().unwrap().len(), 5);
}

#[tokio::test]
async fn test_read_document_truncates_long_text() {
    let drive = FakeDrive::new();
    drive.put_text("long", 1, &"a".repeat(12_000));
    drive.put_text("short", 1, "brief");

    let document = read_document(drive.as_ref(), "long", None, &RetryPolicy::none())
        .await
        .unwrap();
    assert!(document.truncated);
    let kept = document.text.strip_suffix("... (truncated)").unwrap();
    assert_eq!(kept, "a".repeat(10_000));

    let document = read_document(drive.as_ref(), "short", Some(1..=5), &RetryPolicy::none())
        .await
        .unwrap();
    assert!(!document.truncated);
    assert_eq!(document.text, "brief");

    let missing = read_document(drive.as_ref(), "nope", None, &RetryPolicy::none()).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}
