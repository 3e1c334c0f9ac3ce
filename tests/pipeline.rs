//! End-to-end behaviour of intake, reconciliation and search over an
//! in-memory bucket and a temporary SQLite database.

use chrono::{TimeZone, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use filedex::error::ErrorKind;
use filedex::indexer::IndexOutcome;
use filedex::service::Service;
use filedex::storage::memory::MemoryObjectStore;

struct Harness {
    _tmp: TempDir,
    scratch: std::path::PathBuf,
    store: Arc<MemoryObjectStore>,
    service: Service,
}

async fn harness() -> Harness {
    let tmp = TempDir::new().unwrap();
    let scratch = tmp.path().join("scratch");
    std::fs::create_dir_all(&scratch).unwrap();

    let pool = filedex::db::connect(&tmp.path().join("data/fdx.sqlite"))
        .await
        .unwrap();
    filedex::migrate::run_migrations(&pool).await.unwrap();

    let store = Arc::new(MemoryObjectStore::new());
    let service = Service::assemble(store.clone(), pool, scratch.clone(), Duration::from_secs(900));
    Harness {
        _tmp: tmp,
        scratch,
        store,
        service,
    }
}

fn scratch_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[tokio::test]
async fn second_reconcile_indexes_nothing() {
    let h = harness().await;
    h.store.put("one", "first object", Utc::now());
    h.store.put("two", "second object", Utc::now());

    let first = h.service.reconciler.try_run().await.unwrap().unwrap();
    assert_eq!(first.indexed.len(), 2);

    let second = h.service.reconciler.try_run().await.unwrap().unwrap();
    assert!(second.indexed.is_empty());
    assert_eq!(second.skipped, 2);
    assert_eq!(h.service.repo.count().await.unwrap(), 2);
}

#[tokio::test]
async fn reconcile_converges_missing_objects() {
    let h = harness().await;
    h.store.put("indexed-by-intake", "hello", Utc::now());
    h.service
        .intake
        .complete_upload("indexed-by-intake", "hello.txt")
        .await
        .unwrap();

    for i in 0..5 {
        h.store.put(&format!("orphan-{}", i), format!("orphan body {}", i), Utc::now());
    }

    let report = h.service.reconciler.try_run().await.unwrap().unwrap();
    assert_eq!(report.listed, 6);
    assert_eq!(report.indexed.len(), 5);
    assert_eq!(report.skipped, 1);
    assert_eq!(h.service.repo.count().await.unwrap(), 6);
    for i in 0..5 {
        assert!(h.service.repo.exists(&format!("orphan-{}", i)).await.unwrap());
    }
}

#[tokio::test]
async fn intake_and_reconcile_race_yields_one_record() {
    let h = harness().await;
    for round in 0..10 {
        let key = format!("race-{}", round);
        h.store.put(&key, "contended body", Utc::now());

        let (intake, reconcile) = tokio::join!(
            h.service.intake.complete_upload(&key, "contended.txt"),
            h.service.reconciler.try_run(),
        );

        let outcome = intake.unwrap();
        assert!(matches!(
            outcome,
            IndexOutcome::Indexed | IndexOutcome::AlreadyIndexed
        ));
        if let Some(report) = reconcile {
            let report = report.unwrap();
            assert!(report.failures.is_empty());
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files WHERE file_id = ?")
            .bind(&key)
            .fetch_one(h.service.repo.pool())
            .await
            .unwrap();
        assert_eq!(count, 1, "round {}", round);

        let fts_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files_fts WHERE file_id = ?")
            .bind(&key)
            .fetch_one(h.service.repo.pool())
            .await
            .unwrap();
        assert_eq!(fts_rows, 1, "round {}", round);
    }
}

#[tokio::test]
async fn search_falls_back_when_fulltext_fails() {
    let h = harness().await;
    let objects = [
        ("k1", "Annual REPORT 2023", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        ("k2", "nothing to see", Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()),
        ("k3", "the report is late", Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap()),
    ];
    for (key, body, ts) in objects {
        h.store.put(key, body, ts);
    }
    h.service.reconciler.try_run().await.unwrap().unwrap();

    sqlx::query("DROP TABLE files_fts")
        .execute(h.service.repo.pool())
        .await
        .unwrap();

    let hits = h.service.search.search(Some("report")).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|f| f.file_id.as_str()).collect();
    assert_eq!(ids, vec!["k3", "k1"]);
}

#[tokio::test]
async fn completing_an_upload_that_never_happened_is_not_found() {
    let h = harness().await;
    let ticket = h.service.intake.begin_upload().await.unwrap();

    let err = h
        .service
        .intake
        .complete_upload(&ticket.file_id, "x.txt")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.service.repo.count().await.unwrap(), 0);
}

#[tokio::test]
async fn reconciled_record_uses_key_size_and_mtime() {
    let h = harness().await;
    let mtime = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();
    h.store.put("abc", vec![b'a'; 200], mtime);

    h.service.reconciler.try_run().await.unwrap().unwrap();

    let record = h.service.repo.get("abc").await.unwrap().unwrap();
    assert_eq!(record.file_id, "abc");
    assert_eq!(record.original_name, "abc");
    assert_eq!(record.size, 200);
    assert_eq!(record.upload_date, mtime);

    let listed = h.service.search.search(None).await.unwrap();
    assert_eq!(listed, vec![record.summary()]);
    assert_eq!(listed[0].upload_date, "2023-11-14T22:13:20.000Z");
}

#[tokio::test]
async fn uploaded_file_is_searchable() {
    let h = harness().await;
    h.store.put(
        "old",
        "archived minutes",
        Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap(),
    );
    h.service.reconciler.try_run().await.unwrap().unwrap();

    h.store.put("abc", "the quarterly numbers look fine", Utc::now());
    let outcome = h
        .service
        .intake
        .complete_upload("abc", "report.txt")
        .await
        .unwrap();
    assert_eq!(outcome, IndexOutcome::Indexed);

    let hits = h.service.search.search(Some("quarterly")).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].file_id, "abc");
    assert_eq!(hits[0].original_name, "report.txt");

    let all = h.service.search.search(None).await.unwrap();
    let ids: Vec<&str> = all.iter().map(|f| f.file_id.as_str()).collect();
    assert_eq!(ids, vec!["abc", "old"]);
}

#[tokio::test]
async fn failed_indexing_leaves_no_staged_files() {
    let h = harness().await;
    h.store.put("broken", "this is not a pdf at all", Utc::now());

    let err = h
        .service
        .intake
        .complete_upload("broken", "scan.pdf")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProcessingFailed);
    assert!(scratch_is_empty(&h.scratch));
    assert!(!h.service.repo.exists("broken").await.unwrap());
}

#[tokio::test]
async fn failed_fetch_leaves_no_staged_files() {
    let h = harness().await;
    h.store.put("flaky", "body", Utc::now());
    h.store.put("fine", "body", Utc::now());
    h.store.break_key("flaky");

    let report = h.service.reconciler.try_run().await.unwrap().unwrap();
    assert_eq!(report.indexed, vec!["fine".to_string()]);
    assert_eq!(report.failures.len(), 1);
    assert!(scratch_is_empty(&h.scratch));
}

#[tokio::test]
async fn listing_failure_writes_nothing() {
    let h = harness().await;
    h.store.put("abc", "body", Utc::now());
    h.store.set_listing_failure(true);

    let err = h.service.reconciler.try_run().await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(h.service.repo.count().await.unwrap(), 0);

    h.store.set_listing_failure(false);
    let report = h.service.reconciler.try_run().await.unwrap().unwrap();
    assert_eq!(report.indexed, vec!["abc".to_string()]);
}

#[tokio::test]
async fn shutdown_signal_reaches_reconciler() {
    let h = harness().await;
    h.store.put("abc", "body", Utc::now());
    h.service.shutdown();

    let report = h.service.reconciler.try_run().await.unwrap().unwrap();
    assert!(report.cancelled);
    assert_eq!(h.service.repo.count().await.unwrap(), 0);
}
