//! File-tree synchronization between environment file roots.

use crate::process::{run_checked, LONG_TIMEOUT};
use crate::RuntimeError;
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::debug;

pub trait FileSync: Send + Sync {
    fn name(&self) -> &str;

    /// Copy `src` into `dst`, leaving files already present in `dst` but
    /// absent from `src` in place.
    fn copy_tree(&self, src: &Path, dst: &Path, excludes: &[String]) -> Result<(), RuntimeError>;

    /// Delete-synchronizing copy: after the call, `dst` mirrors `src`
    /// exactly (minus excludes).
    fn mirror(&self, src: &Path, dst: &Path, excludes: &[String]) -> Result<(), RuntimeError>;
}

/// Pure-Rust implementation over `std::fs`. Used by tests and small
/// installs where rsync is unavailable.
#[derive(Default)]
pub struct NativeFileSync;

impl NativeFileSync {
    pub fn new() -> Self {
        Self
    }

    fn copy_recursive(src: &Path, dst: &Path, excludes: &[String]) -> Result<(), RuntimeError> {
        fs::create_dir_all(dst)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if excludes.iter().any(|e| *e == name_str) {
                continue;
            }
            let from = entry.path();
            let to = dst.join(&name);
            if entry.file_type()?.is_dir() {
                Self::copy_recursive(&from, &to, excludes)?;
            } else {
                fs::copy(&from, &to)?;
            }
        }
        Ok(())
    }

    /// Delete-synchronizing walk. Excluded names are skipped on both
    /// sides, so an excluded entry already present in `dst` survives,
    /// matching rsync's `--delete --exclude` behavior.
    fn mirror_recursive(src: &Path, dst: &Path, excludes: &[String]) -> Result<(), RuntimeError> {
        fs::create_dir_all(dst)?;
        for entry in fs::read_dir(dst)? {
            let entry = entry?;
            let name = entry.file_name();
            if excludes.iter().any(|e| *e == name.to_string_lossy()) {
                continue;
            }
            let counterpart = src.join(&name);
            let dst_is_dir = entry.file_type()?.is_dir();
            if !counterpart.exists() || counterpart.is_dir() != dst_is_dir {
                if dst_is_dir {
                    fs::remove_dir_all(entry.path())?;
                } else {
                    fs::remove_file(entry.path())?;
                }
            }
        }
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            let name = entry.file_name();
            if excludes.iter().any(|e| *e == name.to_string_lossy()) {
                continue;
            }
            let from = entry.path();
            let to = dst.join(&name);
            if entry.file_type()?.is_dir() {
                Self::mirror_recursive(&from, &to, excludes)?;
            } else {
                fs::copy(&from, &to)?;
            }
        }
        Ok(())
    }
}

impl FileSync for NativeFileSync {
    fn name(&self) -> &'static str {
        "native"
    }

    fn copy_tree(&self, src: &Path, dst: &Path, excludes: &[String]) -> Result<(), RuntimeError> {
        debug!("copying {} -> {}", src.display(), dst.display());
        Self::copy_recursive(src, dst, excludes)
    }

    fn mirror(&self, src: &Path, dst: &Path, excludes: &[String]) -> Result<(), RuntimeError> {
        debug!("mirroring {} -> {}", src.display(), dst.display());
        Self::mirror_recursive(src, dst, excludes)
    }
}

/// Host implementation shelling out to rsync.
#[derive(Default)]
pub struct RsyncFileSync;

impl RsyncFileSync {
    pub fn new() -> Self {
        Self
    }

    fn base_cmd(src: &Path, dst: &Path, excludes: &[String]) -> Command {
        let mut cmd = Command::new("rsync");
        cmd.arg("-a");
        for exclude in excludes {
            cmd.arg(format!("--exclude={exclude}"));
        }
        // Trailing slash: sync contents, not the directory itself.
        cmd.arg(format!("{}/", src.display()));
        cmd.arg(dst);
        cmd
    }
}

impl FileSync for RsyncFileSync {
    fn name(&self) -> &'static str {
        "rsync"
    }

    fn copy_tree(&self, src: &Path, dst: &Path, excludes: &[String]) -> Result<(), RuntimeError> {
        fs::create_dir_all(dst)?;
        run_checked(Self::base_cmd(src, dst, excludes), LONG_TIMEOUT)?;
        Ok(())
    }

    fn mirror(&self, src: &Path, dst: &Path, excludes: &[String]) -> Result<(), RuntimeError> {
        fs::create_dir_all(dst)?;
        let mut cmd = Self::base_cmd(src, dst, excludes);
        cmd.arg("--delete");
        run_checked(cmd, LONG_TIMEOUT)?;
        Ok(())
    }
}
