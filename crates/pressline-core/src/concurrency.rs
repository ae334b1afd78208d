//! Process-level store locking and shutdown signalling.
//!
//! `StoreLock` is an advisory flock on the store's lock file, serializing
//! whole engine instances; it is distinct from the per-environment
//! [`LockManager`](crate::locks::LockManager), which coordinates workflows
//! inside one store. The holder's pid is written into the lock file so a
//! blocked invocation can say who it is waiting on.

use crate::CoreError;
use fs2::FileExt;
use pressline_store::StoreLayout;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
pub struct StoreLock {
    file: File,
}

impl StoreLock {
    /// Block until this process holds the store.
    pub fn acquire(layout: &StoreLayout) -> Result<Self, CoreError> {
        let mut file = Self::open(layout)?;
        file.lock_exclusive()
            .map_err(|e| CoreError::Io(std::io::Error::new(std::io::ErrorKind::WouldBlock, e)))?;
        Self::stamp(&mut file)?;
        Ok(Self { file })
    }

    /// Non-blocking variant. Surfaces [`CoreError::StoreBusy`] naming
    /// the holding pid when another engine process has the store.
    pub fn try_acquire(layout: &StoreLayout) -> Result<Self, CoreError> {
        let mut file = Self::open(layout)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                Self::stamp(&mut file)?;
                Ok(Self { file })
            }
            Err(_) => {
                let holder = std::fs::read_to_string(layout.lock_file())
                    .ok()
                    .map(|s| s.trim().to_owned())
                    .filter(|s| !s.is_empty());
                Err(CoreError::StoreBusy(match holder {
                    Some(pid) => format!("held by pid {pid}"),
                    None => "held by another process".to_owned(),
                }))
            }
        }
    }

    fn open(layout: &StoreLayout) -> Result<File, CoreError> {
        std::fs::create_dir_all(layout.root())?;
        Ok(OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(layout.lock_file())?)
    }

    fn stamp(file: &mut File) -> Result<(), CoreError> {
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        Ok(())
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Install a Ctrl-C handler. The first signal requests a graceful stop
/// after the current workflow step; a second signal exits immediately.
pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            std::process::exit(1);
        }
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        eprintln!("\nshutdown requested, finishing current operation...");
    });
}

/// Checked between long workflow steps, e.g. while waiting for a new
/// stack's database to come up.
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> (tempfile::TempDir, StoreLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        (dir, layout)
    }

    #[test]
    fn acquire_stamps_holder_pid() {
        let (_dir, layout) = layout();

        let _lock = StoreLock::acquire(&layout).unwrap();
        let stamped = std::fs::read_to_string(layout.lock_file()).unwrap();
        assert_eq!(stamped.trim(), std::process::id().to_string());
    }

    #[test]
    fn try_acquire_names_the_holder_while_held() {
        let (_dir, layout) = layout();

        let _lock = StoreLock::acquire(&layout).unwrap();
        let err = StoreLock::try_acquire(&layout).unwrap_err();
        match err {
            CoreError::StoreBusy(detail) => {
                assert!(detail.contains(&std::process::id().to_string()));
            }
            other => panic!("expected StoreBusy, got {other}"),
        }
    }

    #[test]
    fn released_on_drop() {
        let (_dir, layout) = layout();

        {
            let _lock = StoreLock::acquire(&layout).unwrap();
        }

        assert!(StoreLock::try_acquire(&layout).is_ok());
    }
}
