//! Staging Manager: owns the size-bounded tmpfs `staging/` tree.

use ingest_common::Error;
use std::path::{Path, PathBuf};

/// Replace `/` with `-`, trim whitespace, substitute `"Unknown"` for empty
/// input. Used for both artist and album directory component names.
pub fn safe_name(name: &str) -> String {
    let replaced = name.replace('/', "-");
    let trimmed = replaced.trim();
    if trimmed.is_empty() {
        "Unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

pub struct StagingManager {
    pub staging_root: PathBuf,
}

impl StagingManager {
    pub fn new(staging_root: PathBuf) -> Self {
        Self { staging_root }
    }

    /// Create `staging/<safe_artist>/<safe_album>/` and move `files` there.
    /// Filename collisions get a `_<counter>` suffix before the extension.
    pub fn move_group(
        &self,
        artist: &str,
        album: &str,
        files: &[PathBuf],
    ) -> ingest_common::Result<PathBuf> {
        let dest_dir = self
            .staging_root
            .join(safe_name(artist))
            .join(safe_name(album));
        std::fs::create_dir_all(&dest_dir).map_err(map_enospc)?;

        for file in files {
            let Some(file_name) = file.file_name() else {
                continue;
            };
            let dest = unique_file_destination(&dest_dir, file_name.to_string_lossy().as_ref());
            if let Err(e) = move_file(file, &dest) {
                if is_enospc(&e) {
                    return Err(Error::StagingFull);
                }
                tracing::warn!(file = %file.display(), error = %e, "failed to move file into staging, skipping");
            }
        }

        Ok(dest_dir)
    }

    /// Move an album subfolder, preserving its position relative to
    /// `src_relative_to` under `staging/`. Folder-name collisions get a
    /// timestamp suffix.
    pub fn move_folder(
        &self,
        src: &Path,
        src_relative_to: &Path,
    ) -> ingest_common::Result<PathBuf> {
        let relative = src.strip_prefix(src_relative_to).unwrap_or(src);
        let mut dest = self.staging_root.join(relative);

        if dest.exists() {
            let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
            let name = dest
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            dest.set_file_name(format!("{name}_{stamp}"));
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(map_enospc)?;
        }

        match std::fs::rename(src, &dest) {
            Ok(()) => Ok(dest),
            Err(e) if e.raw_os_error() == Some(libc_exdev()) => {
                copy_dir_then_remove(src, &dest).map_err(map_enospc)?;
                Ok(dest)
            }
            Err(e) if is_enospc(&e) => Err(Error::StagingFull),
            Err(e) => Err(e.into()),
        }
    }

    /// Kernel-level filesystem usage percentage for the staging mount
    /// (0.0..100.0). If the statistics call itself fails, reports 100% so
    /// callers drain defensively rather than skip the proactive check.
    pub fn usage_pct(&self) -> f64 {
        match fs2::total_space(&self.staging_root).and_then(|total| {
            fs2::free_space(&self.staging_root).map(|free| (total, free))
        }) {
            Ok((total, free)) if total > 0 => {
                let used = total.saturating_sub(free) as f64;
                (used / total as f64) * 100.0
            }
            _ => 100.0,
        }
    }

    /// Remove every child of `staging/` except `failed_imports/`.
    pub fn clear(&self) -> ingest_common::Result<()> {
        let failed_imports = self.staging_root.join(crate::paths::FAILED_IMPORTS_NAME);
        if !self.staging_root.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(&self.staging_root)? {
            let entry = entry?;
            let path = entry.path();
            if path == failed_imports {
                continue;
            }
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            if let Err(e) = result {
                tracing::warn!(path = %path.display(), error = %e, "failed to clear staging entry");
            }
        }
        Ok(())
    }
}

fn unique_file_destination(dir: &Path, file_name: &str) -> PathBuf {
    let mut candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().to_string());

    let mut counter = 1;
    loop {
        let name = match &ext {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        candidate = dir.join(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

fn move_file(src: &Path, dest: &Path) -> std::io::Result<()> {
    match std::fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc_exdev()) => {
            std::fs::copy(src, dest)?;
            {
                let f = std::fs::File::open(dest)?;
                f.sync_all()?;
            }
            std::fs::remove_file(src)
        }
        Err(e) => Err(e),
    }
}

fn copy_dir_then_remove(src: &Path, dest: &Path) -> std::io::Result<()> {
    for entry in walkdir::WalkDir::new(src) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src).unwrap();
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    std::fs::remove_dir_all(src)
}

fn is_enospc(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(28) || e.kind() == std::io::ErrorKind::Other && e.to_string().contains("No space left")
}

fn map_enospc(e: std::io::Error) -> Error {
    if is_enospc(&e) {
        Error::StagingFull
    } else {
        e.into()
    }
}

/// `EXDEV` (cross-device rename) errno, used to fall back to copy+delete.
fn libc_exdev() -> i32 {
    18
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn safe_name_replaces_slashes_and_trims() {
        assert_eq!(safe_name("AC/DC"), "AC-DC");
        assert_eq!(safe_name("  Spaced  "), "Spaced");
        assert_eq!(safe_name(""), "Unknown");
        assert_eq!(safe_name("   "), "Unknown");
    }

    #[test]
    fn move_group_creates_tree_and_moves_files() {
        let src_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let file = src_dir.path().join("01.flac");
        fs::write(&file, b"audio").unwrap();

        let mgr = StagingManager::new(staging_dir.path().to_path_buf());
        let dest = mgr.move_group("Foo", "Bar", &[file.clone()]).unwrap();

        assert_eq!(dest, staging_dir.path().join("Foo").join("Bar"));
        assert!(dest.join("01.flac").exists());
        assert!(!file.exists());
    }

    #[test]
    fn move_group_collision_gets_counter_suffix() {
        let src_dir = TempDir::new().unwrap();
        let staging_dir = TempDir::new().unwrap();
        let mgr = StagingManager::new(staging_dir.path().to_path_buf());

        let existing = staging_dir.path().join("Foo").join("Bar");
        fs::create_dir_all(&existing).unwrap();
        fs::write(existing.join("01.flac"), b"existing").unwrap();

        let file = src_dir.path().join("01.flac");
        fs::write(&file, b"new").unwrap();

        let dest = mgr.move_group("Foo", "Bar", &[file]).unwrap();
        assert!(dest.join("01_1.flac").exists());
        assert!(dest.join("01.flac").exists());
    }

    #[test]
    fn clear_preserves_failed_imports() {
        let staging_dir = TempDir::new().unwrap();
        let mgr = StagingManager::new(staging_dir.path().to_path_buf());

        fs::create_dir_all(staging_dir.path().join("Foo")).unwrap();
        fs::create_dir_all(staging_dir.path().join("failed_imports")).unwrap();
        fs::write(staging_dir.path().join("failed_imports").join("x.flac"), b"x").unwrap();

        mgr.clear().unwrap();

        assert!(!staging_dir.path().join("Foo").exists());
        assert!(staging_dir.path().join("failed_imports").join("x.flac").exists());
    }
}
