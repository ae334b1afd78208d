//! Persistent state for Pressline: environment/job metadata, snapshot
//! dumps, and the activity journal.
//!
//! All metadata is pretty-printed JSON with an embedded blake3 checksum,
//! written atomically (tempfile + rename + directory fsync). Snapshot
//! dumps are SQL text files, optionally gzip-compressed, under a single
//! shared directory.

pub mod environments;
pub mod jobs;
pub mod journal;
pub mod kv;
pub mod layout;
pub mod snapshots;

pub use environments::EnvironmentStore;
pub use jobs::JobStore;
pub use journal::ActivityJournal;
pub use layout::{StoreLayout, STORE_FORMAT_VERSION};
pub use snapshots::{CleanupReport, SnapshotOptions, SnapshotStore};

use std::path::Path;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// On Linux with ext4 `data=ordered` (the default), renames are usually
/// durable without an explicit dir fsync, but POSIX does not guarantee
/// this.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("integrity check failed for record '{id}': expected {expected}, got {actual}")]
    IntegrityFailure {
        id: String,
        expected: String,
        actual: String,
    },
    #[error("environment not found: {0}")]
    EnvNotFound(String),
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),
    #[error("job not found: {0}")]
    JobNotFound(String),
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("schema error: {0}")]
    Schema(#[from] pressline_schema::SchemaError),
    #[error("database error: {0}")]
    Database(#[from] pressline_runtime::RuntimeError),
}
