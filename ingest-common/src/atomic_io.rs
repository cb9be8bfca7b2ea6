//! Atomic JSON read/write helpers.
//!
//! Every piece of state the pipeline persists between runs (the status
//! record, the fingerprint cache) is a JSON file that must never be observed
//! half-written by a concurrent reader. Both write through this single
//! temp-file-then-rename helper rather than each re-implementing it.

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

/// Serialize `value` to JSON and write it to `path` atomically.
///
/// Writes to a sibling temp file in the same directory (so the rename is
/// guaranteed to be on the same filesystem) and renames it into place.
/// A reader opening `path` at any point either sees the previous complete
/// contents or the new complete contents, never a partial write.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        Error::Internal(format!("path {} has no parent directory", path.display()))
    })?;
    std::fs::create_dir_all(dir)?;

    let tmp_path = dir.join(format!(
        ".{}.tmp-{}",
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "atomic".to_string()),
        std::process::id()
    ));

    let json = serde_json::to_vec_pretty(value)?;
    {
        use std::io::Write;
        let mut f = std::fs::File::create(&tmp_path)?;
        f.write_all(&json)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load JSON from `path`, returning `None` if it does not exist yet.
pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        n: u32,
        s: String,
    }

    #[test]
    fn round_trips_through_atomic_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("status.json");
        let value = Sample {
            n: 7,
            s: "ok".into(),
        };

        write_json_atomic(&path, &value).unwrap();
        let loaded: Sample = read_json_opt(&path).unwrap().unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.json");
        let loaded: Option<Sample> = read_json_opt(&path).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn no_leftover_temp_file_after_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.json");
        write_json_atomic(&path, &Sample { n: 1, s: "a".into() }).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
    }
}
