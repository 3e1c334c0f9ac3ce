//! Content indexer capability.
//!
//! Turns a staged local file plus its metadata into a durable
//! [`FileRecord`]. Safe to invoke more than once for the same `file_id`:
//! only the first successful call writes; later ones report
//! [`IndexOutcome::AlreadyIndexed`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::error::{Error, Result};
use crate::extract;
use crate::models::FileRecord;
use crate::repository::FileRepository;

/// Everything the indexer needs about one staged object.
#[derive(Debug, Clone)]
pub struct IndexRequest<'a> {
    pub local_path: &'a Path,
    pub file_id: &'a str,
    pub name: &'a str,
    pub size: i64,
    pub upload_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Indexed,
    /// Another writer got there first; nothing was written.
    AlreadyIndexed,
}

#[async_trait]
pub trait ContentIndexer: Send + Sync {
    async fn index(&self, req: IndexRequest<'_>) -> Result<IndexOutcome>;
}

/// Extracts text with [`extract`] and stores it through [`FileRepository`].
pub struct ExtractingIndexer {
    repo: FileRepository,
}

impl ExtractingIndexer {
    pub fn new(repo: FileRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl ContentIndexer for ExtractingIndexer {
    async fn index(&self, req: IndexRequest<'_>) -> Result<IndexOutcome> {
        if self.repo.exists(req.file_id).await? {
            return Ok(IndexOutcome::AlreadyIndexed);
        }

        let path = req.local_path.to_path_buf();
        let name = req.name.to_string();
        let content = tokio::task::spawn_blocking(move || extract::extract_file(&path, &name))
            .await
            .map_err(|e| Error::processing(req.file_id, format!("extraction task failed: {}", e)))?
            .map_err(|e| Error::processing(req.file_id, e))?;

        let record = FileRecord {
            file_id: req.file_id.to_string(),
            original_name: req.name.to_string(),
            size: req.size,
            content,
            upload_date: req.upload_date,
        };

        let inserted = self
            .repo
            .insert(&record)
            .await
            .map_err(|e| Error::processing(req.file_id, e))?;

        if inserted {
            tracing::debug!(file_id = req.file_id, name = req.name, "indexed");
            Ok(IndexOutcome::Indexed)
        } else {
            tracing::debug!(file_id = req.file_id, "lost indexing race; content discarded");
            Ok(IndexOutcome::AlreadyIndexed)
        }
    }
}
