//! # filedex
//!
//! Direct-to-storage file uploads with a searchable metadata index.
//!
//! Clients upload straight to an S3-compatible bucket through presigned
//! URLs, then notify the service, which extracts text from the object and
//! records it in SQLite with an FTS5 index. A background reconciler indexes
//! any object that reached the bucket without a successful notification.
//!
//! ## Architecture
//!
//! ```text
//!  client ──PUT (presigned)──▶ ┌──────────┐
//!     │                        │  Bucket  │◀── list ── Reconciler ──┐
//!     └── notify ──▶ Intake ──▶└──────────┘                         │
//!                      │          fetch                             │
//!                      ▼                                            ▼
//!                ┌─────────────┐   extract + insert   ┌──────────────────┐
//!                │  Indexer    │─────────────────────▶│ SQLite files+FTS │
//!                └─────────────┘                      └────────┬─────────┘
//!                                                              │
//!                                            Search ◀──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Error kinds shared by every component |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`models`] | Core data types |
//! | [`repository`] | Metadata store queries |
//! | [`storage`] | Object store gateway (S3, in-memory) |
//! | [`extract`] | Text extraction per file format |
//! | [`indexer`] | Staged file → stored record |
//! | [`intake`] | Upload and download tickets, upload completion |
//! | [`reconcile`] | Bucket ↔ index convergence and its scheduler |
//! | [`search`] | Ranked search with substring fallback |
//! | [`service`] | Wiring of the above |
//! | [`server`] | HTTP API |

pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod indexer;
pub mod intake;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod reconcile;
pub mod repository;
pub mod search;
pub mod server;
pub mod service;
pub mod storage;
