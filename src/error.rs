use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Remote listing failed: {0}")]
    Listing(String),

    #[error("Remote file store error: {0}")]
    Remote(String),

    #[error("Remote file not found: {0}")]
    NotFound(String),

    #[error("Text extraction failed: {0}")]
    Extraction(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Search index is not ready yet. Run a sync first.")]
    IndexNotReady,

    #[error("A sync or rebuild is already running")]
    SyncInProgress,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Embedding dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "Index was built with embedding model '{stored}' but '{configured}' is configured. Run `docsync rebuild`."
    )]
    EmbeddingModelChanged { stored: String, configured: String },

    #[error("Index state is inconsistent: {0}")]
    Corrupt(String),

    #[error("Mirror error: {0}")]
    Mirror(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Query-time conditions a caller should report as "unavailable"
    /// rather than as an empty result set.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::IndexNotReady | Self::Embedding(_) | Self::EmbeddingModelChanged { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
