//! Upload intake.
//!
//! Clients upload straight to the object store through a presigned URL from
//! [`UploadIntake::begin_upload`], then call
//! [`UploadIntake::complete_upload`]. Completion re-reads the object's
//! attributes from the store rather than trusting the client, stages the
//! bytes locally and hands them to the [`ContentIndexer`].

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::indexer::{ContentIndexer, IndexOutcome, IndexRequest};
use crate::models::{DownloadTicket, UploadTicket};
use crate::storage::{stage_object, ObjectStore};

pub struct UploadIntake {
    store: Arc<dyn ObjectStore>,
    indexer: Arc<dyn ContentIndexer>,
    scratch_dir: PathBuf,
    url_ttl: Duration,
}

impl UploadIntake {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        indexer: Arc<dyn ContentIndexer>,
        scratch_dir: PathBuf,
        url_ttl: Duration,
    ) -> Self {
        Self {
            store,
            indexer,
            scratch_dir,
            url_ttl,
        }
    }

    /// Allocate a new `file_id` and a write URL scoped to it.
    ///
    /// Nothing is recorded; an unused ticket leaves no trace.
    pub async fn begin_upload(&self) -> Result<UploadTicket> {
        let file_id = Uuid::new_v4().to_string();
        let presigned_url = self.store.presign_put(&file_id, self.url_ttl).await?;
        tracing::debug!(file_id = %file_id, "issued upload ticket");
        Ok(UploadTicket {
            file_id,
            presigned_url,
        })
    }

    /// Index an object the client reports as uploaded.
    ///
    /// Fails with `NotFound` if the object is not in the store. Size comes
    /// from the store and the upload date is the indexing time. An object a
    /// concurrent reconciliation already indexed yields
    /// [`IndexOutcome::AlreadyIndexed`].
    pub async fn complete_upload(&self, file_id: &str, declared_name: &str) -> Result<IndexOutcome> {
        if file_id.trim().is_empty() {
            return Err(Error::not_found(file_id));
        }
        let name = match declared_name.trim() {
            "" => file_id,
            n => n,
        };

        let stat = self.store.stat(file_id).await?;
        let staged = stage_object(self.store.as_ref(), file_id, &self.scratch_dir).await?;

        let outcome = self
            .indexer
            .index(IndexRequest {
                local_path: staged.path(),
                file_id,
                name,
                size: stat.size,
                upload_date: Utc::now(),
            })
            .await;
        drop(staged);

        match &outcome {
            Ok(IndexOutcome::Indexed) => {
                tracing::info!(file_id, name, size = stat.size, "upload indexed")
            }
            Ok(IndexOutcome::AlreadyIndexed) => {
                tracing::info!(file_id, "upload was already indexed")
            }
            Err(e) => tracing::warn!(file_id, error = %e, "upload indexing failed"),
        }
        outcome
    }

    /// Read URL for an existing object.
    pub async fn begin_download(&self, file_id: &str) -> Result<DownloadTicket> {
        self.store.stat(file_id).await?;
        let presigned_url = self.store.presign_get(file_id, self.url_ttl).await?;
        Ok(DownloadTicket { presigned_url })
    }
}
