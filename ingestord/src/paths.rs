//! Filesystem layout: the roots every component agrees on.

use std::path::{Path, PathBuf};

/// Sentinel prefix for in-progress unpacker output; never entered.
pub const UNPACK_PREFIX: &str = "_UNPACK_";

/// Name reserved for the cataloguer's rejection area; never treated as an
/// artist folder, and cleaned up if found directly inside the inbox.
pub const FAILED_IMPORTS_NAME: &str = "failed_imports";

/// Name reserved for tier-1/2/3 dedup rejects inside staging.
pub const DEDUP_REJECTED_NAME: &str = "dedup_rejected";

pub const AUDIO_EXTENSIONS: &[&str] = &["flac", "mp3", "m4a", "ogg", "wav", "aac"];

pub const SAFE_IMAGE_NAMES: &[&str] = &["cover.jpg", "cover.png", "folder.jpg", "folder.png"];
pub const SAFE_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// The four filesystem roots the pipeline reads and writes, plus the data
/// directory for logs/status/cache/lock.
#[derive(Debug, Clone)]
pub struct FsRoots {
    pub inbox: PathBuf,
    pub staging: PathBuf,
    pub library: PathBuf,
    pub quarantine: PathBuf,
    pub data: PathBuf,
}

impl FsRoots {
    pub fn quarantine_corrupt(&self) -> PathBuf {
        self.quarantine.join("corrupt")
    }

    pub fn quarantine_failed_imports(&self) -> PathBuf {
        self.quarantine.join(FAILED_IMPORTS_NAME)
    }

    pub fn staging_failed_imports(&self) -> PathBuf {
        self.staging.join(FAILED_IMPORTS_NAME)
    }

    pub fn staging_dedup_rejected(&self) -> PathBuf {
        self.staging.join(DEDUP_REJECTED_NAME)
    }

    pub fn status_path(&self) -> PathBuf {
        self.data.join("pipeline_status.json")
    }

    pub fn fingerprint_cache_path(&self) -> PathBuf {
        self.data.join("fingerprint_cache.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data.join("pipeline.lock")
    }

    pub fn main_log_path(&self) -> PathBuf {
        self.data.join("pipeline.log")
    }

    pub fn ensure_all(&self) -> std::io::Result<()> {
        for dir in [
            &self.inbox,
            &self.staging,
            &self.library,
            &self.quarantine,
            &self.data,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Is this name a sentinel the controller must skip when listing the inbox?
pub fn is_sentinel_inbox_child(name: &str) -> bool {
    name.starts_with(UNPACK_PREFIX) || name == FAILED_IMPORTS_NAME
}

/// Is this path's extension one of the recognised audio extensions?
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Is this path an allowed piece of cover art that junk cleanup must leave
/// in place?
pub fn is_safe_image(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let lower = name.to_ascii_lowercase();
    if SAFE_IMAGE_NAMES.contains(&lower.as_str()) {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SAFE_IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_children_are_skipped() {
        assert!(is_sentinel_inbox_child("_UNPACK_foo"));
        assert!(is_sentinel_inbox_child("failed_imports"));
        assert!(!is_sentinel_inbox_child("Some Artist"));
    }

    #[test]
    fn audio_extensions_match_case_insensitively() {
        assert!(is_audio_file(Path::new("track.FLAC")));
        assert!(is_audio_file(Path::new("track.mp3")));
        assert!(!is_audio_file(Path::new("cover.jpg")));
    }

    #[test]
    fn safe_images_recognised_by_name_or_extension() {
        assert!(is_safe_image(Path::new("cover.jpg")));
        assert!(is_safe_image(Path::new("random.webp")));
        assert!(!is_safe_image(Path::new("notes.txt")));
    }
}
