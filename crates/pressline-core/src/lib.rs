//! Workflow orchestration for Pressline environment pipelines.
//!
//! This crate ties together the data model, stores, transform engine, and
//! runtime collaborators into the `Engine`, the central API for creating,
//! syncing, promoting, comparing, and deleting content-site environments.
//! It also provides the per-environment lock manager, the database clone
//! coordinator, process-level store locking, and progress reporting.

pub mod clone;
pub mod concurrency;
pub mod engine;
pub mod locks;
pub mod progress;

pub use clone::{CloneCoordinator, CloneOptions, CloneReport};
pub use concurrency::{install_signal_handler, shutdown_requested, StoreLock};
pub use engine::{
    AttributeDiff, Backends, CompareReport, CreateOptions, CreateOutcome, Engine, ExtensionDiff,
    FullPromotionReport, PromoteOptions, StaleCleanupReport, SyncOptions, SyncReport,
};
pub use locks::LockManager;
pub use progress::ProgressObserver;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("schema error: {0}")]
    Schema(#[from] pressline_schema::SchemaError),
    #[error("transform error: {0}")]
    Transform(#[from] pressline_transform::TransformError),
    #[error("store error: {0}")]
    Store(#[from] pressline_store::StoreError),
    #[error("runtime error: {0}")]
    Runtime(#[from] pressline_runtime::RuntimeError),
    #[error("environment not found: {0}")]
    EnvNotFound(String),
    #[error("environment '{env_id}' is locked by {owner}: {reason}")]
    LockConflict {
        env_id: String,
        owner: String,
        reason: String,
    },
    /// Another engine process holds the store-wide lock.
    #[error("store is in use: {0}")]
    StoreBusy(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
