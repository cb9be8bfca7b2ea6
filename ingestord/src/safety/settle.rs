//! Settle timer: has this folder been left alone long enough that an
//! external writer is unlikely to still be touching it?

use std::path::Path;
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

/// Default settle threshold for artist folders and album subfolders.
pub const DEFAULT_SETTLE_SECONDS: u64 = 300;

/// True if the folder is missing (nothing left to settle) or if the
/// newest `mtime` among its files is older than `min_age`.
///
/// Walk errors other than "not found" are treated as *not settled* — an
/// unreadable folder is not safe to move.
pub fn is_settled(path: &Path, min_age: Duration) -> bool {
    if !path.exists() {
        return true;
    }

    let mut newest: Option<SystemTime> = None;
    for entry in WalkDir::new(path) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                if e.io_error()
                    .map(|io| io.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    continue;
                }
                tracing::warn!(path = %path.display(), error = %e, "settle check walk error, treating as not settled");
                return false;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let mtime = match entry.metadata().and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(_) => continue,
        };
        newest = Some(match newest {
            Some(prev) if prev > mtime => prev,
            _ => mtime,
        });
    }

    match newest {
        None => true, // no files found under the folder
        Some(newest_mtime) => match newest_mtime.elapsed() {
            Ok(age) => age >= min_age,
            Err(_) => false, // mtime in the future — be conservative
        },
    }
}
