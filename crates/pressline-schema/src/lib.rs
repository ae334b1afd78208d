//! Data model and configuration schema for Pressline.
//!
//! This crate defines the domain records (`Environment`, `SnapshotRecord`,
//! `PromotionJob`, `ActivityRecord`), typed string identifiers, the stack
//! `.env` file reader/writer, and the engine configuration file
//! (`pressline.toml`).

pub mod config;
pub mod environment;
pub mod records;
pub mod stackenv;
pub mod types;

pub use config::{parse_config_file, parse_config_str, CreateDefaults, EngineConfig, SnapshotPolicy};
pub use environment::{
    validate_env_name, DbDescriptor, EnvStatus, Environment, LockState, SourceDescriptor,
    StackDescriptor,
};
pub use records::{
    ActivityRecord, ActivityStatus, PromotionJob, PromotionKind, JobStatus, SnapshotRecord,
    SnapshotStatus,
};
pub use stackenv::StackEnvFile;
pub use types::{EnvId, EnvKind, JobId, SnapshotId};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("invalid environment name: {0}")]
    InvalidName(String),
    #[error("invalid environment kind: '{0}', expected production|staging|development|multidev")]
    InvalidKind(String),
    #[error("environment '{0}' violates the production back-reference invariant")]
    ProductionInvariant(String),
    #[error("lock state for '{0}' is incomplete: reason, owner, and expiry must all be set")]
    IncompleteLockState(String),
    #[error("stack .env file is missing required key '{0}'")]
    MissingEnvKey(String),
}
