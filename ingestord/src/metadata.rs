//! Metadata group extraction: groups loose audio files (files sitting
//! directly in an artist folder, not inside an album subfolder) by
//! `(albumartist, album)` so each group can be moved to staging as one unit.

use crate::tags::read_album_group_tags;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Directory names that must never be used as the albumartist/album
/// fallback: a loose file sitting directly under one of the pipeline's own
/// root folders would otherwise be grouped under the literal root name
/// (e.g. "inbox") instead of its actual artist folder.
fn is_forbidden_fallback_component(name: &str, roots: &[&Path]) -> bool {
    if name.is_empty() {
        return true;
    }
    roots
        .iter()
        .any(|root| root.file_name().and_then(|n| n.to_str()) == Some(name))
}

/// `(albumartist, album)` for one loose file, tags first, directory-name
/// fallback second.
///
/// The fallback for albumartist is `parent.parent.name` — except when that
/// resolves to one of the pipeline's root directory names, in which case
/// the file is directly under a root (e.g. `inbox/Artist/track.flac`) and
/// the *immediate* parent (the artist folder) is used instead.
pub fn group_key_for_file(path: &Path, roots: &[&Path]) -> (String, String) {
    let (albumartist_tag, album_tag) = read_album_group_tags(path);

    let albumartist = albumartist_tag.unwrap_or_else(|| {
        let candidate = path
            .parent()
            .and_then(|p| p.parent())
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        if is_forbidden_fallback_component(candidate, roots) {
            path.parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .unwrap_or("Unknown")
                .to_string()
        } else {
            candidate.to_string()
        }
    });

    let album = album_tag.unwrap_or_else(|| {
        path.parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("Unknown Album")
            .to_string()
    });

    (albumartist, album)
}

/// Group a batch of loose files by `(albumartist, album)`, preserving
/// first-seen group order so downstream chunking is deterministic.
pub fn group_files_by_album(
    files: &[PathBuf],
    roots: &[&Path],
) -> Vec<((String, String), Vec<PathBuf>)> {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut groups: HashMap<(String, String), Vec<PathBuf>> = HashMap::new();

    for file in files {
        let key = group_key_for_file(file, roots);
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(file.clone());
    }

    order
        .into_iter()
        .map(|key| {
            let files = groups.remove(&key).unwrap_or_default();
            (key, files)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn loose_file_at_inbox_root_falls_back_to_artist_folder_not_inbox() {
        let inbox = TempDir::new().unwrap();
        let artist_dir = inbox.path().join("Some Artist");
        fs::create_dir_all(&artist_dir).unwrap();
        let file = artist_dir.join("01.flac");
        fs::write(&file, b"not real audio").unwrap();

        let roots = [inbox.path()];
        let (albumartist, _album) = group_key_for_file(&file, &roots);

        assert_eq!(albumartist, "Some Artist");
        assert_ne!(albumartist, inbox.path().file_name().unwrap().to_str().unwrap());
    }

    #[test]
    fn loose_file_nested_under_artist_uses_grandparent_as_albumartist() {
        let inbox = TempDir::new().unwrap();
        let artist_dir = inbox.path().join("Some Artist").join("stray");
        fs::create_dir_all(&artist_dir).unwrap();
        let file = artist_dir.join("01.flac");
        fs::write(&file, b"not real audio").unwrap();

        let roots = [inbox.path()];
        let (albumartist, album) = group_key_for_file(&file, &roots);

        assert_eq!(albumartist, "Some Artist");
        assert_eq!(album, "stray");
    }

    #[test]
    fn grouping_preserves_first_seen_order() {
        let dir = TempDir::new().unwrap();
        let a1 = dir.path().join("a1.flac");
        let b1 = dir.path().join("b1.flac");
        let a2 = dir.path().join("a2.flac");
        for f in [&a1, &b1, &a2] {
            fs::write(f, b"x").unwrap();
        }

        // Same directory for all three => same fallback group key, but the
        // grouping function itself must not silently drop files.
        let groups = group_files_by_album(&[a1.clone(), b1.clone(), a2.clone()], &[dir.path()]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1.len(), 3);
    }
}
