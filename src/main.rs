//! # filedex CLI (`fdx`)
//!
//! Runs the upload/search service and its maintenance tasks.
//!
//! ## Usage
//!
//! ```bash
//! fdx --config ./config/fdx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fdx init` | Create the SQLite database and run schema migrations |
//! | `fdx serve` | Start the HTTP server and the reconciliation scheduler |
//! | `fdx sync` | Run one reconciliation pass against the bucket |
//! | `fdx search "<query>"` | Search indexed files |
//! | `fdx reindex-fts` | Rebuild the full-text index from stored records |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use filedex::{config, db, logging, migrate, repository::FileRepository, search, server, service::Service};

/// filedex: presigned uploads to S3-compatible storage with full-text search.
#[derive(Parser)]
#[command(name = "fdx", version, about = "filedex: object storage uploads with a searchable index")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/fdx.toml")]
    config: PathBuf,

    /// Log at debug level (overrides RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Start the HTTP server.
    ///
    /// Verifies the bucket, optionally reconciles once, then serves until
    /// Ctrl-C while reconciling on the configured interval.
    Serve,

    /// Index every object in the bucket that has no record yet.
    Sync,

    /// Search indexed files by name and content.
    ///
    /// Without a query, lists every file, newest first.
    Search {
        /// Search query.
        query: Option<String>,
    },

    /// Rebuild the full-text index from the stored records.
    ReindexFts,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Sync => {
            let service = Service::start(&cfg).await?;
            match service.reconciler.try_run().await {
                Some(report) => {
                    let report = report?;
                    println!(
                        "Sync complete: {} listed, {} indexed, {} already present, {} failed ({} ms)",
                        report.listed,
                        report.indexed.len(),
                        report.skipped,
                        report.failures.len(),
                        report.elapsed_ms
                    );
                    for failure in &report.failures {
                        println!("  failed: {} ({})", failure.key, failure.error);
                    }
                }
                None => println!("A sync is already running."),
            }
            service.repo.pool().close().await;
        }
        Commands::Search { query } => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            let results = search::SearchService::new(FileRepository::new(pool.clone()))
                .search(query.as_deref())
                .await?;
            search::print_results(&results);
            pool.close().await;
        }
        Commands::ReindexFts => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            let rows = FileRepository::new(pool.clone()).rebuild_fts().await?;
            pool.close().await;
            println!("Full-text index rebuilt: {} records.", rows);
        }
    }

    Ok(())
}
