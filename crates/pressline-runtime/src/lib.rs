//! External collaborator interfaces for Pressline workflows.
//!
//! The orchestrator drives everything outside its own store through the
//! narrow traits defined here: `ContainerRuntime` (compose stacks),
//! `DatabaseServer` (dump/import/metadata), `FileSync` (tree mirroring),
//! `ProxyConfigurator` (domain routing), and `SourceControlProvider`
//! (branch listing, deploys). Host implementations shell out to the real
//! tools; `mock` provides deterministic in-memory implementations used by
//! the engine tests.

pub mod container;
pub mod database;
pub mod files;
pub mod mock;
pub mod process;
pub mod proxy;
pub mod scm;

pub use container::{ComposeRuntime, ContainerRuntime, ExecOutput, ServiceState};
pub use database::{DatabaseServer, DbMetadata, DumpOptions, MysqlServer};
pub use files::{FileSync, NativeFileSync, RsyncFileSync};
pub use mock::{MockDatabase, MockProxy, MockScm, MockStack};
pub use proxy::{FileProxyConfigurator, ProxyConfigurator};
pub use scm::{GitProvider, SourceControlProvider};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stack at '{0}' is not running")]
    StackNotRunning(String),
    #[error("database '{0}' not found")]
    DatabaseNotFound(String),
    #[error("database '{0}' already exists")]
    DatabaseExists(String),
    #[error("external command failed: {0}")]
    CommandFailed(String),
    #[error("external command timed out after {0}s")]
    CommandTimeout(u64),
    #[error("proxy configuration failed: {0}")]
    ProxyFailed(String),
    #[error("source control operation failed: {0}")]
    ScmFailed(String),
}
