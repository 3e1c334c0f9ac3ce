//! HTTP server.
//!
//! A thin JSON transport over [`Service`]: every handler forwards to one
//! operation and maps its [`Error`] kind onto a status code. The server also
//! owns the reconciliation scheduler's lifetime.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/upload` | New `file_id` and presigned PUT URL |
//! | `POST` | `/notify-upload` | Index an uploaded object |
//! | `GET`  | `/files?context=` | Search records (all records without `context`) |
//! | `GET`  | `/download/{file_id}` | Presigned GET URL |
//! | `POST` | `/sync` | Trigger a reconciliation run |
//! | `GET`  | `/health` | Status, version and reconciler phase |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "object not found: 3f0c..." } }
//! ```
//!
//! Error codes: `not_found` (404), `processing_failed` (500), `internal` (500).
//! Internal errors carry a generic message; the detail goes to the log.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser clients can
//! call the API directly.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::{Error, ErrorKind};
use crate::indexer::IndexOutcome;
use crate::models::{DownloadTicket, FileSummary, NotifyUploadRequest, StatusResponse, UploadTicket};
use crate::reconcile::{ReconcilePhase, ReconcileReport};
use crate::service::Service;

/// Start the service and serve HTTP until Ctrl-C.
///
/// Startup order: metadata store, object store (bucket must be reachable),
/// optional startup reconciliation, scheduler, listener. Any failure before
/// the listener binds aborts startup.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Service::start(config).await?;

    if config.sync.run_on_start {
        let reconciler = service.reconciler.clone();
        tokio::spawn(async move {
            if let Some(Err(e)) = reconciler.try_run().await {
                tracing::error!(error = %e, "startup reconciliation failed");
            }
        });
    }
    let scheduler = service
        .reconciler
        .clone()
        .spawn_scheduler(config.sync.interval(), service.shutdown_signal());

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("filedex listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(service.clone()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("shutting down");
    service.shutdown();
    let _ = scheduler.await;
    Ok(())
}

/// Routes with CORS, bound to `service`.
pub fn router(service: Service) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload", get(handle_upload))
        .route("/notify-upload", post(handle_notify_upload))
        .route("/files", get(handle_files))
        .route("/download/{file_id}", get(handle_download))
        .route("/sync", post(handle_sync))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(service)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        match err.kind() {
            ErrorKind::NotFound => AppError {
                status: StatusCode::NOT_FOUND,
                code: "not_found",
                message: err.to_string(),
            },
            ErrorKind::ProcessingFailed => {
                tracing::warn!(error = %err, "request failed during processing");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "processing_failed",
                    message: err.to_string(),
                }
            }
            _ => {
                tracing::error!(error = %err, "internal error");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message: "internal error".to_string(),
                }
            }
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        tracing::error!(error = %err, "background task failed");
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: "internal error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

// ============ Upload / download ============

async fn handle_upload(State(service): State<Service>) -> Result<Json<UploadTicket>, AppError> {
    Ok(Json(service.intake.begin_upload().await?))
}

async fn handle_notify_upload(
    State(service): State<Service>,
    Json(req): Json<NotifyUploadRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    let outcome = service
        .intake
        .complete_upload(&req.file_id, &req.file_name)
        .await?;
    let message = match outcome {
        IndexOutcome::Indexed => "File processed successfully",
        IndexOutcome::AlreadyIndexed => "File already indexed",
    };
    Ok(Json(StatusResponse {
        status: "success".to_string(),
        message: message.to_string(),
    }))
}

async fn handle_download(
    State(service): State<Service>,
    Path(file_id): Path<String>,
) -> Result<Json<DownloadTicket>, AppError> {
    Ok(Json(service.intake.begin_download(&file_id).await?))
}

// ============ GET /files ============

#[derive(Deserialize)]
struct FilesQuery {
    context: Option<String>,
}

async fn handle_files(
    State(service): State<Service>,
    Query(q): Query<FilesQuery>,
) -> Result<Json<Vec<FileSummary>>, AppError> {
    Ok(Json(service.search.search(q.context.as_deref()).await?))
}

// ============ POST /sync ============

/// The run is spawned so that a client hanging up does not cancel it
/// mid-key; the handler only waits for the outcome.
async fn handle_sync(State(service): State<Service>) -> Result<Response, AppError> {
    let reconciler = service.reconciler.clone();
    let run = tokio::spawn(async move { reconciler.try_run().await });

    match run.await? {
        Some(report) => {
            let report: ReconcileReport = report?;
            Ok(Json(report).into_response())
        }
        None => Ok((
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "status": "busy" })),
        )
            .into_response()),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    reconciler: ReconcilePhase,
}

async fn handle_health(State(service): State<Service>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        reconciler: service.reconciler.phase(),
    })
}
