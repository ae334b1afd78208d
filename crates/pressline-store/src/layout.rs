use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current store format version. Incremented on incompatible layout changes.
pub const STORE_FORMAT_VERSION: u32 = 1;
const VERSION_FILE: &str = "version";

/// Directory layout for the Pressline store.
///
/// Metadata, snapshot dumps, stack directories, environment file roots,
/// and the journal all live under one root. Subdirectories are created
/// lazily on [`initialize`](Self::initialize).
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreVersion {
    format_version: u32,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn environments_dir(&self) -> PathBuf {
        self.root.join("meta").join("environments")
    }

    #[inline]
    pub fn jobs_dir(&self) -> PathBuf {
        self.root.join("meta").join("jobs")
    }

    #[inline]
    pub fn snapshot_meta_dir(&self) -> PathBuf {
        self.root.join("meta").join("snapshots")
    }

    /// Shared directory holding the actual `.sql[.gz]` dump files.
    #[inline]
    pub fn snapshots_dir(&self) -> PathBuf {
        self.root.join("snapshots")
    }

    #[inline]
    pub fn journal_dir(&self) -> PathBuf {
        self.root.join("journal")
    }

    /// Per-environment compose stack directory (compose file + `.env`).
    #[inline]
    pub fn stack_dir(&self, env_id: &str) -> PathBuf {
        self.root.join("stacks").join(env_id)
    }

    /// Per-environment deployed file root.
    #[inline]
    pub fn files_dir(&self, env_id: &str) -> PathBuf {
        self.root.join("files").join(env_id)
    }

    /// Temporary dumps during clone/transform runs.
    #[inline]
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join("staging")
    }

    #[inline]
    pub fn proxy_dir(&self) -> PathBuf {
        self.root.join("proxy")
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(".lock")
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.environments_dir())?;
        fs::create_dir_all(self.jobs_dir())?;
        fs::create_dir_all(self.snapshot_meta_dir())?;
        fs::create_dir_all(self.snapshots_dir())?;
        fs::create_dir_all(self.journal_dir())?;
        fs::create_dir_all(self.staging_dir())?;
        fs::create_dir_all(self.proxy_dir())?;
        fs::create_dir_all(self.root.join("stacks"))?;
        fs::create_dir_all(self.root.join("files"))?;

        let version_path = self.root.join(VERSION_FILE);
        if version_path.exists() {
            self.verify_version()?;
        } else {
            let ver = StoreVersion {
                format_version: STORE_FORMAT_VERSION,
            };
            let content = serde_json::to_string_pretty(&ver)?;
            let mut tmp = NamedTempFile::new_in(&self.root)?;
            tmp.write_all(content.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&version_path)
                .map_err(|e| StoreError::Io(e.error))?;
            crate::fsync_dir(&self.root)?;
        }

        Ok(())
    }

    pub fn verify_version(&self) -> Result<(), StoreError> {
        let version_path = self.root.join(VERSION_FILE);
        let content = fs::read_to_string(&version_path)?;
        let ver: StoreVersion = serde_json::from_str(&content)?;

        if ver.format_version != STORE_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: STORE_FORMAT_VERSION,
                found: ver.format_version,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_are_correct() {
        let layout = StoreLayout::new("/tmp/pressline-test");
        assert_eq!(
            layout.environments_dir(),
            PathBuf::from("/tmp/pressline-test/meta/environments")
        );
        assert_eq!(
            layout.snapshots_dir(),
            PathBuf::from("/tmp/pressline-test/snapshots")
        );
        assert_eq!(
            layout.stack_dir("site-dev"),
            PathBuf::from("/tmp/pressline-test/stacks/site-dev")
        );
        assert_eq!(
            layout.files_dir("site-dev"),
            PathBuf::from("/tmp/pressline-test/files/site-dev")
        );
    }

    #[test]
    fn initialize_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();

        assert!(layout.environments_dir().is_dir());
        assert!(layout.snapshots_dir().is_dir());
        assert!(layout.journal_dir().is_dir());
        assert!(layout.staging_dir().is_dir());
    }

    #[test]
    fn initialize_writes_version() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        layout.verify_version().unwrap();
    }

    #[test]
    fn initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        layout.initialize().unwrap();
        layout.verify_version().unwrap();
    }
}
