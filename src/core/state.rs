//! In-memory index state: file records plus the parallel chunk, owner and
//! vector lists.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{AppError, Result};

/// Processing outcome of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Processed,
    NoText,
    Omitted,
}

impl FileStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::NoText => "no_text",
            Self::Omitted => "omitted",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "processed" => Some(Self::Processed),
            "no_text" => Some(Self::NoText),
            "omitted" => Some(Self::Omitted),
            _ => None,
        }
    }
}

/// Persisted record of one known remote file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// Remote timestamp observed when the chunks were last computed
    pub modified_at: DateTime<Utc>,
    pub status: FileStatus,
    pub chunk_count: usize,
    /// Chunks whose embedding failed and were not stored
    pub dropped_chunks: usize,
}

impl FileRecord {
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.dropped_chunks > 0
    }
}

/// Durable aggregate of records, chunks and vectors.
///
/// `chunks`, `owners` and `vectors` are parallel: entry `i` of each belongs
/// together, and all three always have the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexState {
    pub files: BTreeMap<String, FileRecord>,
    chunks: Vec<String>,
    owners: Vec<String>,
    vectors: Vec<Vec<f32>>,
    dimension: Option<usize>,
    embedding_model: Option<String>,
}

impl IndexState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reassemble a state read back from storage, validating its shape
    pub fn from_parts(
        files: BTreeMap<String, FileRecord>,
        chunks: Vec<String>,
        owners: Vec<String>,
        vectors: Vec<Vec<f32>>,
        embedding_model: Option<String>,
    ) -> Result<Self> {
        let mut state = Self {
            files,
            embedding_model,
            ..Self::default()
        };
        if chunks.len() != owners.len() || chunks.len() != vectors.len() {
            return Err(AppError::Corrupt(format!(
                "{} chunks, {} owners, {} vectors",
                chunks.len(),
                owners.len(),
                vectors.len()
            )));
        }
        for vector in &vectors {
            state.check_dimension(vector.len())?;
        }
        state.chunks = chunks;
        state.owners = owners;
        state.vectors = vectors;
        Ok(state)
    }

    #[must_use]
    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    #[must_use]
    pub fn owners(&self) -> &[String] {
        &self.owners
    }

    #[must_use]
    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    #[must_use]
    pub fn embedding_model(&self) -> Option<&str> {
        self.embedding_model.as_deref()
    }

    pub fn set_embedding_model(&mut self, model: &str) {
        self.embedding_model = Some(model.to_string());
    }

    /// Replace every chunk and vector owned by `file_id`.
    ///
    /// Old entries are removed before the new ones are appended; on error the
    /// state is left as it was.
    pub fn upsert_file(
        &mut self,
        file_id: &str,
        chunks: Vec<String>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(AppError::Other(format!(
                "{} chunks but {} vectors for {file_id}",
                chunks.len(),
                vectors.len()
            )));
        }
        let mut dimension = self.dimension;
        for vector in &vectors {
            match dimension {
                Some(expected) if expected != vector.len() => {
                    return Err(AppError::DimensionMismatch {
                        expected,
                        actual: vector.len(),
                    });
                }
                Some(_) => {}
                None => dimension = Some(vector.len()),
            }
        }

        self.purge_chunks(file_id);
        self.dimension = dimension;
        self.owners
            .extend(std::iter::repeat_n(file_id.to_string(), chunks.len()));
        self.chunks.extend(chunks);
        self.vectors.extend(vectors);
        Ok(())
    }

    /// Purge the record and every chunk and vector of `file_id`
    pub fn remove_file(&mut self, file_id: &str) -> Option<FileRecord> {
        self.purge_chunks(file_id);
        self.files.remove(file_id)
    }

    /// Insert or replace the record for a file
    pub fn put_record(&mut self, record: FileRecord) {
        self.files.insert(record.id.clone(), record);
    }

    /// Drop all chunks of `file_id` while keeping its record
    pub fn purge_chunks(&mut self, file_id: &str) {
        if !self.owners.iter().any(|owner| owner == file_id) {
            return;
        }
        let keep: Vec<bool> = self.owners.iter().map(|owner| owner != file_id).collect();

        let mut flags = keep.iter().copied();
        self.chunks.retain(|_| flags.next().unwrap_or(true));
        let mut flags = keep.iter().copied();
        self.vectors.retain(|_| flags.next().unwrap_or(true));
        self.owners.retain(|owner| owner != file_id);

        if self.vectors.is_empty() {
            self.dimension = None;
        }
    }

    /// Forget everything, including the embedding model
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Chunks currently owned by `file_id`
    #[must_use]
    pub fn chunks_of(&self, file_id: &str) -> usize {
        self.owners.iter().filter(|owner| *owner == file_id).count()
    }

    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.chunks.len() == self.owners.len() && self.chunks.len() == self.vectors.len()
    }

    fn check_dimension(&mut self, len: usize) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != len => Err(AppError::DimensionMismatch {
                expected,
                actual: len,
            }),
            Some(_) => Ok(()),
            None => {
                self.dimension = Some(len);
                Ok(())
            }
        }
    }
}
