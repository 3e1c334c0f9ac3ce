use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use filedex::error::Result;
use filedex::models::ObjectStat;
use filedex::service::Service;
use filedex::storage::memory::MemoryObjectStore;
use filedex::storage::ObjectStore;

struct TestServer {
    _tmp: TempDir,
    base: String,
    store: Arc<MemoryObjectStore>,
    client: reqwest::Client,
}

async fn start() -> TestServer {
    let store = Arc::new(MemoryObjectStore::new());
    start_with(store.clone(), store).await
}

/// Serve the router over `gateway`; `store` is the bucket tests seed.
async fn start_with(store: Arc<MemoryObjectStore>, gateway: Arc<dyn ObjectStore>) -> TestServer {
    let tmp = TempDir::new().unwrap();
    let pool = filedex::db::connect(&tmp.path().join("fdx.sqlite"))
        .await
        .unwrap();
    filedex::migrate::run_migrations(&pool).await.unwrap();

    let service = Service::assemble(
        gateway,
        pool,
        tmp.path().to_path_buf(),
        Duration::from_secs(300),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, filedex::server::router(service))
            .await
            .unwrap();
    });

    TestServer {
        _tmp: tmp,
        base: format!("http://{}", addr),
        store,
        client: reqwest::Client::new(),
    }
}

/// Memory store whose downloads take a while.
struct SlowStore {
    inner: Arc<MemoryObjectStore>,
    delay: Duration,
}

#[async_trait]
impl ObjectStore for SlowStore {
    async fn stat(&self, key: &str) -> Result<ObjectStat> {
        self.inner.stat(key).await
    }

    async fn fetch_to_local(&self, key: &str, dest: &Path) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch_to_local(key, dest).await
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        self.inner.list_keys().await
    }

    async fn presign_put(&self, key: &str, ttl: Duration) -> Result<String> {
        self.inner.presign_put(key, ttl).await
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String> {
        self.inner.presign_get(key, ttl).await
    }

    async fn ensure_container(&self) -> Result<()> {
        self.inner.ensure_container().await
    }
}

impl TestServer {
    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self
            .client
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

#[tokio::test]
async fn test_health() {
    let srv = start().await;
    let (status, body) = srv.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["reconciler"]["state"], "idle");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_upload_notify_search_download() {
    let srv = start().await;

    let (status, ticket) = srv.get("/upload").await;
    assert_eq!(status, 200);
    let file_id = ticket["file_id"].as_str().unwrap().to_string();
    assert!(ticket["presigned_url"].as_str().unwrap().contains(&file_id));

    srv.store.put(&file_id, "minutes of the steering meeting", Utc::now());

    let (status, body) = srv
        .post(
            "/notify-upload",
            serde_json::json!({ "file_id": file_id, "file_name": "minutes.txt" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "File processed successfully");

    let (status, again) = srv
        .post(
            "/notify-upload",
            serde_json::json!({ "file_id": file_id, "file_name": "minutes.txt" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(again["message"], "File already indexed");

    let (status, files) = srv.get("/files?context=steering").await;
    assert_eq!(status, 200);
    let files = files.as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["file_id"], file_id.as_str());
    assert_eq!(files[0]["original_name"], "minutes.txt");
    assert!(files[0].get("content").is_none());

    let (status, dl) = srv.get(&format!("/download/{}", file_id)).await;
    assert_eq!(status, 200);
    assert_eq!(
        dl["presigned_url"],
        format!("memory://get/{}?expires=300", file_id)
    );
}

#[tokio::test]
async fn test_notify_without_object_is_404() {
    let srv = start().await;
    let (status, body) = srv
        .post(
            "/notify-upload",
            serde_json::json!({ "file_id": "ghost", "file_name": "x.txt" }),
        )
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_download_missing_is_404() {
    let srv = start().await;
    let (status, body) = srv.get("/download/ghost").await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_processing_failure_is_500() {
    let srv = start().await;
    srv.store.put("bad", "not really a pdf", Utc::now());
    let (status, body) = srv
        .post(
            "/notify-upload",
            serde_json::json!({ "file_id": "bad", "file_name": "bad.pdf" }),
        )
        .await;
    assert_eq!(status, 500);
    assert_eq!(body["error"]["code"], "processing_failed");
}

#[tokio::test]
async fn test_sync_reports_indexed_keys() {
    let srv = start().await;
    srv.store.put("orphan", "left behind", Utc::now());

    let (status, report) = srv.post("/sync", serde_json::json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(report["indexed"], serde_json::json!(["orphan"]));
    assert_eq!(report["cancelled"], false);

    let (_, files) = srv.get("/files").await;
    assert_eq!(files.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_listing_failure_is_opaque_500() {
    let srv = start().await;
    srv.store.set_listing_failure(true);

    let (status, body) = srv.post("/sync", serde_json::json!({})).await;
    assert_eq!(status, 500);
    assert_eq!(body["error"]["code"], "internal");
    assert_eq!(body["error"]["message"], "internal error");
}

#[tokio::test]
async fn test_sync_survives_client_disconnect() {
    let store = Arc::new(MemoryObjectStore::new());
    let slow = Arc::new(SlowStore {
        inner: store.clone(),
        delay: Duration::from_millis(300),
    });
    let srv = start_with(store, slow).await;
    srv.store.put("late", "written after the client left", Utc::now());

    let impatient = reqwest::Client::builder()
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let sent = impatient
        .post(format!("{}/sync", srv.base))
        .json(&serde_json::json!({}))
        .send()
        .await;
    assert!(sent.is_err(), "request should time out before the run ends");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let (_, files) = srv.get("/files").await;
        let (_, health) = srv.get("/health").await;
        if files.as_array().unwrap().len() == 1 && health["reconciler"]["state"] == "idle" {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "run did not finish after the client disconnected"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    let (_, files) = srv.get("/files?context=client").await;
    assert_eq!(files[0]["file_id"], "late");
}
