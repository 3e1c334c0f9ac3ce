//! Wiring of stores, indexer and the three flows.
//!
//! [`Service::start`] brings up every collaborator from [`Config`] and fails
//! with [`Error::ConfigurationFatal`] if any required one is unavailable, so
//! nothing starts serving half-configured. [`Service::assemble`] takes
//! ready-made parts and is what tests use with an in-memory object store.

use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::Config;
use crate::db;
use crate::error::{Error, Result};
use crate::indexer::{ContentIndexer, ExtractingIndexer};
use crate::intake::UploadIntake;
use crate::migrate;
use crate::reconcile::Reconciler;
use crate::repository::FileRepository;
use crate::search::SearchService;
use crate::storage::s3::S3ObjectStore;
use crate::storage::ObjectStore;

#[derive(Clone)]
pub struct Service {
    pub repo: FileRepository,
    pub store: Arc<dyn ObjectStore>,
    pub intake: Arc<UploadIntake>,
    pub reconciler: Arc<Reconciler>,
    pub search: SearchService,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Service {
    pub async fn start(config: &Config) -> Result<Self> {
        let pool = db::connect(&config.db.path).await?;
        migrate::run_migrations(&pool).await?;

        let store = S3ObjectStore::new(&config.storage)?;
        store.ensure_container().await.map_err(|e| {
            Error::config(format!(
                "object store bucket '{}' unavailable: {}",
                config.storage.bucket, e
            ))
        })?;

        let scratch_dir = config.scratch.dir();
        std::fs::create_dir_all(&scratch_dir).map_err(|e| {
            Error::config(format!(
                "cannot create scratch directory {}: {}",
                scratch_dir.display(),
                e
            ))
        })?;

        tracing::info!(
            bucket = %config.storage.bucket,
            db = %config.db.path.display(),
            "service started"
        );
        Ok(Self::assemble(
            Arc::new(store),
            pool,
            scratch_dir,
            config.storage.url_ttl(),
        ))
    }

    pub fn assemble(
        store: Arc<dyn ObjectStore>,
        pool: SqlitePool,
        scratch_dir: PathBuf,
        url_ttl: Duration,
    ) -> Self {
        let repo = FileRepository::new(pool);
        let indexer: Arc<dyn ContentIndexer> = Arc::new(ExtractingIndexer::new(repo.clone()));
        let (shutdown, shutdown_rx) = watch::channel(false);

        let intake = UploadIntake::new(store.clone(), indexer.clone(), scratch_dir.clone(), url_ttl);
        let reconciler = Reconciler::new(store.clone(), repo.clone(), indexer, scratch_dir)
            .with_shutdown(shutdown_rx);

        Self {
            search: SearchService::new(repo.clone()),
            repo,
            store,
            intake: Arc::new(intake),
            reconciler: Arc::new(reconciler),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Receiver that flips to `true` once [`Service::shutdown`] is called.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Stop the scheduler and any in-flight reconciliation between keys.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
