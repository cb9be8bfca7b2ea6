//! Quarantine: permanently moves corrupt files and import failures out of
//! the pipeline's working trees so they stop being retried, while keeping
//! enough of the original path visible to find them again.

use ingest_common::Error;
use std::path::{Path, PathBuf};

const ILLEGAL_FILENAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Flatten a nested path into a single filename by joining its components
/// with `" - "`, dropping any `failed_imports` component (it identifies the
/// rejection area, not the file) and sanitizing characters illegal in a
/// filename.
///
/// A run timestamp is appended before the extension so repeated quarantines
/// of files that resolve to the same flattened name never collide or
/// silently overwrite one another.
pub fn flatten_quarantine_filename(original_path: &Path, run_stamp: &str) -> String {
    let stem_parts: Vec<String> = original_path
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .filter(|c| *c != crate::paths::FAILED_IMPORTS_NAME && !c.is_empty() && *c != "/")
        .map(sanitize_component)
        .collect();

    let joined = stem_parts.join(" - ");
    let path = Path::new(&joined);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "quarantined".to_string());
    let ext = path.extension().map(|e| e.to_string_lossy().to_string());

    match ext {
        Some(ext) => format!("{stem}_{run_stamp}.{ext}"),
        None => format!("{stem}_{run_stamp}"),
    }
}

fn sanitize_component(component: &str) -> String {
    component
        .chars()
        .map(|c| if ILLEGAL_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Quarantine a single corrupt file: flatten its path into a unique name
/// under `quarantine/corrupt/` and move it there.
pub fn quarantine_corrupted_file(
    file: &Path,
    quarantine_corrupt_root: &Path,
    run_stamp: &str,
) -> ingest_common::Result<PathBuf> {
    std::fs::create_dir_all(quarantine_corrupt_root)?;
    let flattened = flatten_quarantine_filename(file, run_stamp);
    let dest = quarantine_corrupt_root.join(flattened);
    move_or_copy(file, &dest)?;
    Ok(dest)
}

/// Quarantine an entire folder (used for `failed_imports/` subtrees): every
/// file inside is flattened individually and landed directly in
/// `quarantine/failed_imports/`, then the now-empty source tree is removed.
pub fn quarantine_folder(
    folder: &Path,
    quarantine_failed_imports_root: &Path,
    run_stamp: &str,
) -> ingest_common::Result<()> {
    if folder == quarantine_failed_imports_root {
        return Ok(());
    }
    std::fs::create_dir_all(quarantine_failed_imports_root)?;

    for entry in walkdir::WalkDir::new(folder) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "failed to walk quarantine source tree entry, skipping");
                continue;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }
        let relative = entry.path().strip_prefix(folder).unwrap_or(entry.path());
        let flattened = flatten_quarantine_filename(relative, run_stamp);
        let dest = quarantine_failed_imports_root.join(flattened);
        if let Err(e) = move_or_copy(entry.path(), &dest) {
            tracing::warn!(file = %entry.path().display(), error = %e, "failed to quarantine file, leaving in place");
        }
    }

    remove_empty_tree(folder);
    Ok(())
}

/// Walk `root` for `failed_imports` directories (skipping the real
/// quarantine tree) and quarantine each one found.
pub fn quarantine_failed_imports_global(
    root: &Path,
    quarantine_failed_imports_root: &Path,
    run_stamp: &str,
) -> ingest_common::Result<()> {
    let mut found = Vec::new();
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_dir() {
            continue;
        }
        if entry.path() == quarantine_failed_imports_root {
            continue;
        }
        if entry.file_name() == crate::paths::FAILED_IMPORTS_NAME {
            found.push(entry.path().to_path_buf());
        }
    }

    for folder in found {
        quarantine_folder(&folder, quarantine_failed_imports_root, run_stamp)?;
    }
    Ok(())
}

fn move_or_copy(src: &Path, dest: &Path) -> ingest_common::Result<()> {
    match std::fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(_) => {
            std::fs::copy(src, dest)?;
            {
                let f = std::fs::File::open(dest)?;
                f.sync_all()?;
            }
            std::fs::remove_file(src).map_err(Error::from)
        }
    }
}

/// Best-effort cleanup of now-empty directories left behind after
/// quarantining every file inside a tree. Failures are logged, not
/// propagated: an unremovable empty directory is cosmetic, not a pipeline
/// failure.
fn remove_empty_tree(root: &Path) {
    if let Err(e) = std::fs::remove_dir_all(root) {
        tracing::debug!(path = %root.display(), error = %e, "could not remove emptied quarantine source tree");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn flatten_joins_components_and_drops_failed_imports() {
        let path = Path::new("inbox/failed_imports/Some Artist/Some Album/01.flac");
        let flattened = flatten_quarantine_filename(path, "20260728T000000Z");
        assert!(flattened.starts_with("inbox - Some Artist - Some Album - 01_20260728T000000Z"));
        assert!(flattened.ends_with(".flac"));
        assert!(!flattened.contains("failed_imports"));
    }

    #[test]
    fn flatten_sanitizes_illegal_characters() {
        let path = Path::new("Artist: Name/Album?/track*.mp3");
        let flattened = flatten_quarantine_filename(path, "stamp");
        assert!(!flattened.contains(':'));
        assert!(!flattened.contains('?'));
        assert!(!flattened.contains('*'));
    }

    #[test]
    fn quarantine_corrupted_file_moves_and_flattens() {
        let src_dir = TempDir::new().unwrap();
        let quarantine_dir = TempDir::new().unwrap();

        let artist_dir = src_dir.path().join("Artist").join("Album");
        fs::create_dir_all(&artist_dir).unwrap();
        let file = artist_dir.join("bad.flac");
        fs::write(&file, b"corrupt").unwrap();

        let dest =
            quarantine_corrupted_file(&file, quarantine_dir.path(), "20260728T000000Z").unwrap();

        assert!(dest.exists());
        assert!(!file.exists());
    }

    #[test]
    fn quarantine_folder_flattens_every_file_and_removes_source() {
        let staging = TempDir::new().unwrap();
        let quarantine_dir = TempDir::new().unwrap();

        let failed = staging.path().join("failed_imports").join("Artist").join("Album");
        fs::create_dir_all(&failed).unwrap();
        fs::write(failed.join("01.flac"), b"x").unwrap();
        fs::write(failed.join("02.flac"), b"y").unwrap();

        let source = staging.path().join("failed_imports");
        quarantine_folder(&source, quarantine_dir.path(), "stamp1").unwrap();

        let entries: Vec<_> = fs::read_dir(quarantine_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries.len(), 2);
        assert!(!source.exists());
    }
}
