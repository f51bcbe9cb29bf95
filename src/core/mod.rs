mod chunker;
pub mod embedder;
pub mod extractor;
pub mod format;
mod lister;
pub mod providers;
mod reader;
pub mod remote;
mod retry;
mod search_index;
mod searcher;
mod state;
pub mod sync;

pub use chunker::chunk_text;
pub use embedder::{Embedder, EmbeddingProvider, ProviderError, TaskHint};
pub use format::FileFormat;
pub use lister::{list_all, Listing};
pub use reader::{read_document, truncate_chars, Document, READ_CHAR_LIMIT};
pub use remote::{DriveClient, FolderPage, RemoteEntry, RemoteError, RemoteFile, RemoteStore};
pub use retry::{is_transient_status, is_transient_transport, with_backoff, RetryPolicy};
pub use search_index::{SearchHit, SearchIndex};
pub use searcher::Searcher;
pub use state::{FileRecord, FileStatus, IndexState};
pub use sync::{diff, SyncEngine, SyncPlan, SyncProgress, SyncReport, SyncSettings};
