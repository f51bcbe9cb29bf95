//! Durable copy of the index database outside the local config directory.

use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{AppError, Result};

/// Named blob storage used to survive the loss of local state
pub trait BlobStore: Send + Sync {
    /// Fetch a blob, `None` when it was never uploaded
    fn download(&self, name: &str) -> Result<Option<Vec<u8>>>;

    fn upload(&self, name: &str, bytes: &[u8]) -> Result<()>;
}

/// Blob store backed by a directory (a mounted volume or synced folder).
///
/// Each blob is written next to a `<name>.blake3` digest that is checked on
/// download.
pub struct DirBlobStore {
    root: PathBuf,
}

impl DirBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn digest_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.blake3"))
    }
}

impl BlobStore for DirBlobStore {
    fn download(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.root.join(name);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;

        let digest_path = self.digest_path(name);
        if digest_path.exists() {
            let expected = fs::read_to_string(&digest_path)?;
            let actual = blake3::hash(&bytes).to_hex();
            if expected.trim() != actual.as_str() {
                return Err(AppError::Mirror(format!(
                    "digest mismatch for {}",
                    path.display()
                )));
            }
        }
        debug!("Read {} bytes from mirror {}", bytes.len(), path.display());
        Ok(Some(bytes))
    }

    fn upload(&self, name: &str, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let path = self.root.join(name);
        let tmp = self.root.join(format!("{name}.tmp"));

        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        fs::write(self.digest_path(name), blake3::hash(bytes).to_hex().as_str())?;
        debug!("Mirrored {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}
