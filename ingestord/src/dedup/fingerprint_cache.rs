//! Persisted cache of chromaprint fingerprints, keyed by absolute path and
//! revalidated by mtime so an unchanged file never pays the `fpcalc`
//! subprocess cost twice.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    fingerprint: Vec<u32>,
    duration_secs: f64,
    /// Seconds since `UNIX_EPOCH`, per the source file's last-modified time
    /// at the time it was fingerprinted.
    mtime_unix: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    entries: HashMap<String, CacheEntry>,
}

/// In-memory fingerprint cache, loaded once at the start of a tier-2 pass
/// and persisted atomically at the end.
pub struct FingerprintCache {
    path: PathBuf,
    data: CacheFile,
    dirty: bool,
}

impl FingerprintCache {
    pub fn load(path: PathBuf) -> ingest_common::Result<Self> {
        let data = ingest_common::atomic_io::read_json_opt(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            data,
            dirty: false,
        })
    }

    pub fn get(&self, file_path: &Path, mtime: SystemTime) -> Option<(Vec<u32>, f64)> {
        let key = file_path.to_string_lossy().to_string();
        let entry = self.data.entries.get(&key)?;
        if entry.mtime_unix == to_unix(mtime) {
            Some((entry.fingerprint.clone(), entry.duration_secs))
        } else {
            None
        }
    }

    pub fn put(&mut self, file_path: PathBuf, fingerprint: Vec<u32>, duration_secs: f64, mtime: SystemTime) {
        let key = file_path.to_string_lossy().to_string();
        self.data.entries.insert(
            key,
            CacheEntry {
                fingerprint,
                duration_secs,
                mtime_unix: to_unix(mtime),
            },
        );
        self.dirty = true;
    }

    /// Drop entries for paths that no longer exist, so the cache doesn't
    /// grow unbounded across runs.
    pub fn prune_missing(&mut self) {
        let before = self.data.entries.len();
        self.data
            .entries
            .retain(|path, _| Path::new(path).exists());
        if self.data.entries.len() != before {
            self.dirty = true;
        }
    }

    pub fn save_if_dirty(&self) -> ingest_common::Result<()> {
        if self.dirty {
            ingest_common::atomic_io::write_json_atomic(&self.path, &self.data)?;
        }
        Ok(())
    }
}

fn to_unix(t: SystemTime) -> u64 {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn miss_then_hit_after_put() {
        let dir = TempDir::new().unwrap();
        let cache_path = dir.path().join("fpcache.json");
        let mut cache = FingerprintCache::load(cache_path).unwrap();

        let file = dir.path().join("a.flac");
        std::fs::write(&file, b"x").unwrap();
        let mtime = std::fs::metadata(&file).unwrap().modified().unwrap();

        assert!(cache.get(&file, mtime).is_none());
        cache.put(file.clone(), vec![1, 2, 3], 180.0, mtime);
        assert_eq!(cache.get(&file, mtime), Some((vec![1, 2, 3], 180.0)));
    }

    #[test]
    fn stale_mtime_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache_path = dir.path().join("fpcache.json");
        let mut cache = FingerprintCache::load(cache_path).unwrap();

        let file = dir.path().join("a.flac");
        let old_mtime = SystemTime::UNIX_EPOCH;
        cache.put(file.clone(), vec![9], 120.0, old_mtime);

        let newer = SystemTime::now();
        assert!(cache.get(&file, newer).is_none());
    }

    #[test]
    fn persists_across_load_cycles() {
        let dir = TempDir::new().unwrap();
        let cache_path = dir.path().join("fpcache.json");
        let file = dir.path().join("a.flac");
        let mtime = SystemTime::UNIX_EPOCH;

        {
            let mut cache = FingerprintCache::load(cache_path.clone()).unwrap();
            cache.put(file.clone(), vec![7, 7], 210.5, mtime);
            cache.save_if_dirty().unwrap();
        }

        let reloaded = FingerprintCache::load(cache_path).unwrap();
        assert_eq!(reloaded.get(&file, mtime), Some((vec![7, 7], 210.5)));
    }

    #[test]
    fn prune_missing_drops_deleted_files() {
        let dir = TempDir::new().unwrap();
        let cache_path = dir.path().join("fpcache.json");
        let mut cache = FingerprintCache::load(cache_path).unwrap();

        let gone = dir.path().join("gone.flac");
        cache.put(gone, vec![1], 90.0, SystemTime::UNIX_EPOCH);
        cache.prune_missing();
        assert!(cache.data.entries.is_empty());
    }
}
