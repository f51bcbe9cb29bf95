use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::config::{Config, DATABASE_FILE_NAME};
use crate::core::{FileRecord, FileStatus, IndexState, SearchIndex};
use crate::error::{AppError, Result};

mod mirror;
mod schema;

pub use mirror::{BlobStore, DirBlobStore};

const META_EMBEDDING_MODEL: &str = "embedding_model";
const META_DIMENSION: &str = "dimension";

/// Durable index state backed by SQLite
#[derive(Clone)]
pub struct IndexStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
    mirror: Option<Arc<dyn BlobStore>>,
}

impl IndexStore {
    /// Open the store at the configured location, with the configured mirror
    pub fn open(config: &Config) -> Result<Self> {
        let mirror = config
            .mirror_dir
            .as_ref()
            .map(|dir| Arc::new(DirBlobStore::new(dir)) as Arc<dyn BlobStore>);
        Self::open_at(&Config::database_path()?, mirror)
    }

    /// Open or create the database at `db_path`.
    ///
    /// When the file is absent and a mirror holds a copy, the copy is
    /// restored first.
    pub fn open_at(db_path: &Path, mirror: Option<Arc<dyn BlobStore>>) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        if !db_path.exists() {
            if let Some(mirror) = &mirror {
                match mirror.download(DATABASE_FILE_NAME) {
                    Ok(Some(bytes)) => {
                        fs::write(db_path, bytes)?;
                        info!("Restored index from mirror");
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Ignoring mirror copy: {e}"),
                }
            }
        }

        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(db_path.to_path_buf()),
            mirror,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
            mirror: None,
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AppError::Other(e.to_string()))?;
        schema::initialize(&conn)?;
        Ok(())
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load the full index state; an empty database yields an empty state
    pub fn load(&self) -> Result<IndexState> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AppError::Other(e.to_string()))?;

        let mut stmt = conn.prepare(
            "SELECT id, name, mime_type, modified_at, status, chunk_count, dropped_chunks
             FROM files ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })?;

        let mut files = BTreeMap::new();
        for row in rows {
            let (id, name, mime_type, modified_at, status, chunk_count, dropped_chunks) = row?;
            let modified_at = DateTime::parse_from_rfc3339(&modified_at)
                .map_err(|e| AppError::Corrupt(format!("timestamp of {id}: {e}")))?
                .with_timezone(&Utc);
            let status = FileStatus::from_str(&status)
                .ok_or_else(|| AppError::Corrupt(format!("status of {id}: {status}")))?;
            files.insert(
                id.clone(),
                FileRecord {
                    id,
                    name,
                    mime_type,
                    modified_at,
                    status,
                    chunk_count: usize::try_from(chunk_count).unwrap_or(0),
                    dropped_chunks: usize::try_from(dropped_chunks).unwrap_or(0),
                },
            );
        }

        let (chunks, owners, vectors) = Self::read_chunks(&conn)?;
        let embedding_model = Self::read_meta(&conn, META_EMBEDDING_MODEL)?;
        debug!("Loaded {} files and {} chunks", files.len(), chunks.len());

        IndexState::from_parts(files, chunks, owners, vectors, embedding_model)
    }

    /// Build the search structure from chunk rows and the model id alone,
    /// without reading any file records
    pub fn load_search_index(&self) -> Result<Option<SearchIndex>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AppError::Other(e.to_string()))?;
        let (chunks, owners, vectors) = Self::read_chunks(&conn)?;
        let embedding_model = Self::read_meta(&conn, META_EMBEDDING_MODEL)?;
        Ok(SearchIndex::build(chunks, owners, &vectors)?
            .map(|index| index.with_model(embedding_model)))
    }

    /// Replace the persisted state with `state` in one transaction, then
    /// refresh the mirror copy
    pub fn save(&self, state: &IndexState) -> Result<()> {
        if !state.is_consistent() {
            return Err(AppError::Corrupt("refusing to save ragged state".into()));
        }

        {
            let mut conn = self
                .conn
                .lock()
                .map_err(|e| AppError::Other(e.to_string()))?;
            let tx = conn.transaction()?;

            tx.execute("DELETE FROM files", [])?;
            tx.execute("DELETE FROM chunks", [])?;
            tx.execute("DELETE FROM index_meta", [])?;

            {
                let mut insert_file = tx.prepare(
                    "INSERT INTO files (id, name, mime_type, modified_at, status, chunk_count, dropped_chunks)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )?;
                for record in state.files.values() {
                    #[allow(clippy::cast_possible_wrap)]
                    insert_file.execute(params![
                        record.id,
                        record.name,
                        record.mime_type,
                        record.modified_at.to_rfc3339(),
                        record.status.as_str(),
                        record.chunk_count as i64,
                        record.dropped_chunks as i64,
                    ])?;
                }

                let mut insert_chunk = tx.prepare(
                    "INSERT INTO chunks (position, file_id, text, embedding) VALUES (?1, ?2, ?3, ?4)",
                )?;
                for (position, ((text, owner), vector)) in state
                    .chunks()
                    .iter()
                    .zip(state.owners())
                    .zip(state.vectors())
                    .enumerate()
                {
                    // Serialize embedding as bytes (f32 little-endian)
                    let embedding_bytes: Vec<u8> =
                        vector.iter().flat_map(|f| f.to_le_bytes()).collect();
                    #[allow(clippy::cast_possible_wrap)]
                    insert_chunk.execute(params![position as i64, owner, text, embedding_bytes])?;
                }

                let mut insert_meta =
                    tx.prepare("INSERT INTO index_meta (key, value) VALUES (?1, ?2)")?;
                if let Some(model) = state.embedding_model() {
                    insert_meta.execute(params![META_EMBEDDING_MODEL, model])?;
                }
                if let Some(dimension) = state.dimension() {
                    insert_meta.execute(params![META_DIMENSION, dimension.to_string()])?;
                }
            }

            tx.commit()?;
        }
        info!(
            "Saved index: {} files, {} chunks",
            state.files.len(),
            state.chunk_count()
        );

        self.upload_mirror();
        Ok(())
    }

    fn upload_mirror(&self) {
        let (Some(mirror), Some(path)) = (&self.mirror, &self.path) else {
            return;
        };
        let result = fs::read(path)
            .map_err(AppError::from)
            .and_then(|bytes| mirror.upload(DATABASE_FILE_NAME, &bytes));
        if let Err(e) = result {
            warn!("Index saved locally but mirror upload failed: {e}");
        }
    }

    #[allow(clippy::type_complexity)]
    fn read_chunks(conn: &Connection) -> Result<(Vec<String>, Vec<String>, Vec<Vec<f32>>)> {
        let mut stmt =
            conn.prepare("SELECT file_id, text, embedding FROM chunks ORDER BY position")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
            ))
        })?;

        let mut chunks = Vec::new();
        let mut owners = Vec::new();
        let mut vectors = Vec::new();
        for row in rows {
            let (owner, text, embedding_bytes) = row?;
            vectors.push(decode_vector(&embedding_bytes)?);
            chunks.push(text);
            owners.push(owner);
        }
        Ok((chunks, owners, vectors))
    }

    fn read_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
        let result = conn.query_row(
            "SELECT value FROM index_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        );
        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(AppError::Corrupt(format!(
            "embedding blob of {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
