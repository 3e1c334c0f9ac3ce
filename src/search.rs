//! File search with full-text ranking and substring fallback.
//!
//! A query is matched against file names (substring) and content (FTS5
//! prefix match). If the full-text index cannot answer, whatever the reason,
//! the same query is answered by a case-insensitive substring scan so
//! callers still get results, only less well ordered.
//!
//! No query (or a blank one) lists every record, newest upload first.

use crate::error::{ErrorKind, Result};
use crate::models::FileSummary;
use crate::repository::FileRepository;

#[derive(Clone)]
pub struct SearchService {
    repo: FileRepository,
}

impl SearchService {
    pub fn new(repo: FileRepository) -> Self {
        Self { repo }
    }

    pub async fn search(&self, query: Option<&str>) -> Result<Vec<FileSummary>> {
        let query = match query.map(str::trim) {
            Some(q) if !q.is_empty() => q,
            _ => return self.repo.list_recent().await,
        };

        match self.repo.search_ranked(query).await {
            Ok(hits) => Ok(hits),
            Err(e) if e.kind() == ErrorKind::IndexUnavailable => {
                tracing::warn!(query, error = %e, "full-text search failed; using substring match");
                self.repo.search_substring(query).await
            }
            Err(e) => Err(e),
        }
    }
}

/// Print search results for the CLI.
pub fn print_results(results: &[FileSummary]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }

    for (i, file) in results.iter().enumerate() {
        println!("{}. {}", i + 1, file.original_name);
        println!("    id: {}", file.file_id);
        println!("    size: {} bytes", file.size);
        println!("    uploaded: {}", file.upload_date);
        println!();
    }
}
