//! The run lock: an advisory OS file lock over a single named file,
//! serialising pipeline passes across processes. Exclusivity is the OS
//! lock, never the file's mere existence — stale-lock recovery scans the
//! process table rather than trusting a present-but-unowned file.

use fs2::FileExt;
use ingest_common::Error;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Command-line substring identifying a live pipeline process, used for
/// stale-lock detection via a process-table scan.
const CONTROLLER_CMDLINE_MARKER: &str = "ingestord";

pub struct RunLock {
    path: PathBuf,
    file: Option<File>,
}

impl RunLock {
    pub fn new(path: PathBuf) -> Self {
        Self { path, file: None }
    }

    /// Acquire the lock, non-blocking. If held by another live process,
    /// returns `Error::LockContended`. If the file exists but no process
    /// matching the controller's command line is running, clears it and
    /// retries once.
    pub fn acquire(&mut self) -> ingest_common::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                self.file = Some(file);
                Ok(())
            }
            Err(_) if !has_live_owner() => {
                tracing::warn!(lock = %self.path.display(), "stale lock detected, clearing and retrying");
                drop(file);
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&self.path)?;
                file.try_lock_exclusive()
                    .map_err(|_| Error::LockContended)?;
                self.file = Some(file);
                Ok(())
            }
            Err(_) => Err(Error::LockContended),
        }
    }

    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = fs2::FileExt::unlock(&file);
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Scan the process table for a live process whose command line contains
/// the controller marker. Matches the source system's `pgrep -f` idiom.
#[cfg(target_os = "linux")]
fn has_live_owner() -> bool {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        // Can't inspect the process table; assume live to be conservative
        // (never clear a lock we can't actually verify is stale).
        return true;
    };

    for entry in entries.flatten() {
        let pid_name = entry.file_name();
        let Some(pid_str) = pid_name.to_str() else {
            continue;
        };
        if pid_str.parse::<u32>().is_err() {
            continue;
        }
        let cmdline_path = entry.path().join("cmdline");
        if let Ok(cmdline) = std::fs::read(&cmdline_path) {
            let text = String::from_utf8_lossy(&cmdline);
            if text.contains(CONTROLLER_CMDLINE_MARKER) {
                return true;
            }
        }
    }
    false
}

#[cfg(not(target_os = "linux"))]
fn has_live_owner() -> bool {
    // No portable process-table scan; assume live rather than clear a lock
    // that may legitimately still be held.
    true
}

/// Convenience for callers that only need a boolean (e.g. the scheduler's
/// optimistic "is the run lock currently held" check).
pub fn is_locked(path: &Path) -> bool {
    let Ok(file) = OpenOptions::new().write(true).open(path) else {
        return false;
    };
    match file.try_lock_exclusive() {
        Ok(()) => {
            let _ = fs2::FileExt::unlock(&file);
            false
        }
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_then_release_allows_reacquire() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.lock");

        let mut lock = RunLock::new(path.clone());
        lock.acquire().unwrap();
        lock.release();

        let mut lock2 = RunLock::new(path);
        assert!(lock2.acquire().is_ok());
    }

    #[test]
    fn drop_releases_lock() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipeline.lock");

        {
            let mut lock = RunLock::new(path.clone());
            lock.acquire().unwrap();
        }

        let mut lock2 = RunLock::new(path);
        assert!(lock2.acquire().is_ok());
    }
}
