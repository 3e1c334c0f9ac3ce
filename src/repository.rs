//! SQLite-backed metadata store.
//!
//! Wraps a [`SqlitePool`] and owns every SQL statement that touches the
//! `files` table and its `files_fts` full-text companion. The `file_id`
//! primary key is the single source of truth for "already indexed".

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::{Error, Result};
use crate::models::{format_upload_date, parse_upload_date, FileRecord, FileSummary};

#[derive(Clone)]
pub struct FileRepository {
    pool: SqlitePool,
}

impl FileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn exists(&self, file_id: &str) -> Result<bool> {
        let found: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM files WHERE file_id = ?")
            .bind(file_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }

    /// Insert a record and its full-text row atomically.
    ///
    /// Returns `false` when a record with the same `file_id` already exists;
    /// the caller's content is discarded and nothing is written.
    pub async fn insert(&self, record: &FileRecord) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO files (file_id, original_name, size, upload_date, content)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(file_id) DO NOTHING
            "#,
        )
        .bind(&record.file_id)
        .bind(&record.original_name)
        .bind(record.size)
        .bind(format_upload_date(&record.upload_date))
        .bind(&record.content)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("INSERT INTO files_fts (file_id, content) VALUES (?, ?)")
            .bind(&record.file_id)
            .bind(&record.content)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn get(&self, file_id: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query(
            "SELECT file_id, original_name, size, upload_date, content FROM files WHERE file_id = ?",
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let raw_date: String = row.get("upload_date");
        let upload_date = parse_upload_date(&raw_date).ok_or_else(|| {
            Error::Database(sqlx::Error::Decode(
                format!("invalid upload_date '{}' for {}", raw_date, file_id).into(),
            ))
        })?;

        Ok(Some(FileRecord {
            file_id: row.get("file_id"),
            original_name: row.get("original_name"),
            size: row.get("size"),
            content: row.get("content"),
            upload_date,
        }))
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Every record, newest upload first.
    pub async fn list_recent(&self) -> Result<Vec<FileSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT file_id, original_name, size, upload_date
            FROM files
            ORDER BY upload_date DESC, file_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(summary_from_row).collect())
    }

    /// Name substring OR content full-text prefix match, best rank first.
    ///
    /// Name-only hits carry no rank and sort after content hits. Any failure
    /// of the FTS side (missing/corrupt index, query syntax FTS5 rejects) is
    /// reported as [`Error::IndexUnavailable`].
    pub async fn search_ranked(&self, query: &str) -> Result<Vec<FileSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT f.file_id, f.original_name, f.size, f.upload_date
            FROM files f
            LEFT JOIN (
                SELECT file_id, rank FROM files_fts WHERE files_fts MATCH ?
            ) m ON m.file_id = f.file_id
            WHERE f.original_name LIKE ? ESCAPE '\' OR m.file_id IS NOT NULL
            ORDER BY m.rank IS NULL, m.rank, f.upload_date DESC
            "#,
        )
        .bind(fts_prefix_query(query))
        .bind(like_pattern(query))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::IndexUnavailable(e.to_string()))?;

        Ok(rows.iter().map(summary_from_row).collect())
    }

    /// Case-insensitive substring match on name or content, newest first.
    pub async fn search_substring(&self, query: &str) -> Result<Vec<FileSummary>> {
        let pattern = like_pattern(query);
        let rows = sqlx::query(
            r#"
            SELECT file_id, original_name, size, upload_date
            FROM files
            WHERE original_name LIKE ?1 ESCAPE '\' OR content LIKE ?1 ESCAPE '\'
            ORDER BY upload_date DESC, file_id ASC
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(summary_from_row).collect())
    }

    /// Recreate the full-text index from the `files` table.
    pub async fn rebuild_fts(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DROP TABLE IF EXISTS files_fts")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "CREATE VIRTUAL TABLE files_fts USING fts5(file_id UNINDEXED, content, tokenize='unicode61')",
        )
        .execute(&mut *tx)
        .await?;
        let rows = sqlx::query("INSERT INTO files_fts (file_id, content) SELECT file_id, content FROM files")
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(rows)
    }
}

fn summary_from_row(row: &SqliteRow) -> FileSummary {
    FileSummary {
        file_id: row.get("file_id"),
        original_name: row.get("original_name"),
        size: row.get("size"),
        upload_date: row.get("upload_date"),
    }
}

/// `%query%` with LIKE wildcards in the query escaped.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// The query is passed through as FTS5 syntax with a trailing prefix marker.
fn fts_prefix_query(query: &str) -> String {
    format!("{}*", query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    async fn setup() -> (TempDir, FileRepository) {
        let tmp = TempDir::new().unwrap();
        let pool = crate::db::connect(&tmp.path().join("files.sqlite"))
            .await
            .unwrap();
        crate::migrate::run_migrations(&pool).await.unwrap();
        (tmp, FileRepository::new(pool))
    }

    fn record(id: &str, name: &str, content: &str, day: u32) -> FileRecord {
        FileRecord {
            file_id: id.to_string(),
            original_name: name.to_string(),
            size: content.len() as i64,
            content: content.to_string(),
            upload_date: Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("plain"), "%plain%");
    }

    #[tokio::test]
    async fn second_insert_of_same_id_is_rejected() {
        let (_tmp, repo) = setup().await;
        assert!(repo.insert(&record("a", "a.txt", "first", 1)).await.unwrap());
        assert!(!repo.insert(&record("a", "b.txt", "second", 2)).await.unwrap());

        let stored = repo.get("a").await.unwrap().unwrap();
        assert_eq!(stored.original_name, "a.txt");
        assert_eq!(stored.content, "first");
        assert_eq!(repo.count().await.unwrap(), 1);

        let fts_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files_fts")
            .fetch_one(repo.pool())
            .await
            .unwrap();
        assert_eq!(fts_rows, 1);
    }

    #[tokio::test]
    async fn list_recent_is_newest_first() {
        let (_tmp, repo) = setup().await;
        repo.insert(&record("old", "old.txt", "x", 1)).await.unwrap();
        repo.insert(&record("new", "new.txt", "x", 20)).await.unwrap();
        repo.insert(&record("mid", "mid.txt", "x", 10)).await.unwrap();

        let ids: Vec<String> = repo
            .list_recent()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.file_id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn ranked_search_puts_content_hits_before_name_only_hits() {
        let (_tmp, repo) = setup().await;
        repo.insert(&record("n", "budget-notes.txt", "nothing here", 20))
            .await
            .unwrap();
        repo.insert(&record("c", "misc.txt", "the budget for next year", 1))
            .await
            .unwrap();
        repo.insert(&record("z", "other.txt", "unrelated", 5))
            .await
            .unwrap();

        let ids: Vec<String> = repo
            .search_ranked("budget")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.file_id)
            .collect();
        assert_eq!(ids, vec!["c", "n"]);
    }

    #[tokio::test]
    async fn ranked_search_matches_prefix() {
        let (_tmp, repo) = setup().await;
        repo.insert(&record("q", "q.txt", "quarterly figures", 1))
            .await
            .unwrap();

        let hits = repo.search_ranked("quart").await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn ranked_search_reports_index_unavailable_on_bad_syntax() {
        let (_tmp, repo) = setup().await;
        repo.insert(&record("q", "q.txt", "quarterly", 1)).await.unwrap();

        let err = repo.search_ranked("\"unbalanced").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::IndexUnavailable);
    }

    #[tokio::test]
    async fn substring_search_is_case_insensitive() {
        let (_tmp, repo) = setup().await;
        repo.insert(&record("a", "Annual REPORT.pdf", "", 1)).await.unwrap();
        repo.insert(&record("b", "b.txt", "see the Report below", 2))
            .await
            .unwrap();
        repo.insert(&record("c", "c.txt", "nothing", 3)).await.unwrap();

        let ids: Vec<String> = repo
            .search_substring("report")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.file_id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn rebuild_fts_restores_dropped_index() {
        let (_tmp, repo) = setup().await;
        repo.insert(&record("a", "a.txt", "kubernetes", 1)).await.unwrap();
        sqlx::query("DROP TABLE files_fts")
            .execute(repo.pool())
            .await
            .unwrap();
        assert!(repo.search_ranked("kube").await.is_err());

        assert_eq!(repo.rebuild_fts().await.unwrap(), 1);
        assert_eq!(repo.search_ranked("kube").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_rejects_unparseable_upload_date() {
        let (_tmp, repo) = setup().await;
        sqlx::query(
            "INSERT INTO files (file_id, original_name, size, upload_date, content) VALUES ('odd', 'odd.txt', 1, 'yesterday', 'x')",
        )
        .execute(repo.pool())
        .await
        .unwrap();

        let err = repo.get("odd").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Database);
        assert!(err.to_string().contains("yesterday"));
        assert!(repo.get("missing").await.unwrap().is_none());
    }
}
