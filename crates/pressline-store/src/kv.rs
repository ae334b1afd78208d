//! Checksummed, atomically-written JSON records.
//!
//! Shared by the environment, snapshot, and job stores: every record type
//! carries an optional `checksum` field which is computed over the record
//! serialized with the checksum blanked, embedded on write, and verified
//! on read.

use crate::{fsync_dir, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Record types that embed their own integrity checksum.
pub trait Checksummed {
    fn checksum(&self) -> Option<&str>;
    fn set_checksum(&mut self, checksum: Option<String>);
}

pub(crate) fn compute_checksum<T>(record: &T) -> Result<String, StoreError>
where
    T: Checksummed + Serialize + Clone,
{
    let mut copy = record.clone();
    copy.set_checksum(None);
    let json = serde_json::to_string_pretty(&copy)?;
    Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
}

/// Write a record to `path` atomically, embedding a fresh checksum.
pub(crate) fn write_record<T>(dir: &Path, path: &Path, record: &T) -> Result<(), StoreError>
where
    T: Checksummed + Serialize + Clone,
{
    let mut with_checksum = record.clone();
    with_checksum.set_checksum(Some(compute_checksum(record)?));
    let content = serde_json::to_string_pretty(&with_checksum)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    fsync_dir(dir)?;
    Ok(())
}

/// Read a record, verifying its checksum when present (legacy records
/// without one pass through).
pub(crate) fn read_record<T>(path: &Path, id: &str) -> Result<T, StoreError>
where
    T: Checksummed + Serialize + DeserializeOwned + Clone,
{
    let content = fs::read_to_string(path)?;
    let record: T = serde_json::from_str(&content)?;

    if let Some(expected) = record.checksum() {
        let actual = compute_checksum(&record)?;
        if actual != expected {
            return Err(StoreError::IntegrityFailure {
                id: id.to_owned(),
                expected: expected.to_owned(),
                actual,
            });
        }
    }
    Ok(record)
}

/// List record ids (file names) in a directory, skipping dotfiles.
pub(crate) fn list_ids(dir: &Path) -> Result<Vec<String>, StoreError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if !name_str.starts_with('.') {
                ids.push(name_str.into_owned());
            }
        }
    }
    ids.sort();
    Ok(ids)
}

impl Checksummed for pressline_schema::Environment {
    fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }
    fn set_checksum(&mut self, checksum: Option<String>) {
        self.checksum = checksum;
    }
}

impl Checksummed for pressline_schema::SnapshotRecord {
    fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }
    fn set_checksum(&mut self, checksum: Option<String>) {
        self.checksum = checksum;
    }
}

impl Checksummed for pressline_schema::PromotionJob {
    fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }
    fn set_checksum(&mut self, checksum: Option<String>) {
        self.checksum = checksum;
    }
}
