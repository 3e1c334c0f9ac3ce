//! Object store gateway.
//!
//! The [`ObjectStore`] trait is the narrow capability the intake and
//! reconciliation paths consume. Implementations must report a missing key
//! as [`Error::NotFound`](crate::error::Error::NotFound) and every other
//! failure as [`Error::Transport`](crate::error::Error::Transport), so
//! callers can map outcomes by kind.
//!
//! | Implementation | Backend |
//! |----------------|---------|
//! | [`s3::S3ObjectStore`] | S3 REST API with SigV4 (AWS, MinIO, LocalStack) |
//! | [`memory::MemoryObjectStore`] | In-process map, for tests and demos |

pub mod memory;
pub mod s3;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::models::ObjectStat;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `Ok(false)` for a missing key; errors are transport failures only.
    async fn exists(&self, key: &str) -> Result<bool> {
        match self.stat(key).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn stat(&self, key: &str) -> Result<ObjectStat>;

    /// Write the object's bytes to `dest`, replacing its contents.
    async fn fetch_to_local(&self, key: &str, dest: &Path) -> Result<()>;

    /// Every key currently in the container.
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Time-limited URL allowing a single PUT of `key`.
    async fn presign_put(&self, key: &str, ttl: Duration) -> Result<String>;

    /// Time-limited URL allowing GET of `key`.
    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String>;

    async fn ensure_container(&self) -> Result<()>;
}

/// Download `key` into a fresh temp file under `dir`.
///
/// The file is deleted when the returned handle drops, so every exit path
/// of the caller releases it.
pub async fn stage_object(
    store: &dyn ObjectStore,
    key: &str,
    dir: &Path,
) -> Result<tempfile::NamedTempFile> {
    let staged = tempfile::Builder::new()
        .prefix("fdx-stage-")
        .tempfile_in(dir)
        .map_err(|e| Error::processing(key, format!("cannot create temp file in {}: {}", dir.display(), e)))?;
    store.fetch_to_local(key, staged.path()).await?;
    Ok(staged)
}
