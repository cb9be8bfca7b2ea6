//! Tier 1: tag-based deduplication by normalised title and quality score.

use std::collections::HashMap;
use std::path::PathBuf;
use unicode_normalization::UnicodeNormalization;

/// Tagged metadata pulled from one audio file, enough to score and group it.
#[derive(Debug, Clone)]
pub struct TrackTags {
    pub path: PathBuf,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub format: String,
    pub bit_depth: u32,
    pub sample_rate: u32,
    pub bitrate_kbps: u32,
}

fn format_score(format: &str) -> u32 {
    match format.to_ascii_lowercase().as_str() {
        "flac" => 100,
        "alac" => 95,
        "aiff" => 90,
        "wav" => 85,
        "m4a" => 80,
        "ogg" => 70,
        "mp3" => 60,
        "aac" => 55,
        "wma" => 40,
        _ => 50,
    }
}

/// Pack format/bit-depth/sample-rate/bitrate into one integer so that a
/// higher tier never gets overridden by a lower one.
pub fn quality_score(tags: &TrackTags) -> u64 {
    format_score(&tags.format) as u64 * 1_000_000
        + tags.bit_depth as u64 * 10_000
        + (tags.sample_rate as u64 / 1000) * 100
        + (tags.bitrate_kbps as u64 / 1000)
}

const TITLE_SUFFIX_PATTERNS: &[&str] = &[
    "- remastered",
    "(feat.",
    "(bonus track)",
    "(live)",
    "(radio edit)",
    "(explicit)",
    "(clean)",
    "(album version)",
];

/// Strip diacritics, lowercase, remove known version/credit suffixes, then
/// strip non-alphanumerics so that e.g. "Title (Live)" and "Title" and
/// "Título" all normalise to the same key.
pub fn normalize_title(title: &str) -> String {
    let decomposed: String = title.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    let mut lower = decomposed.to_lowercase();

    for pattern in TITLE_SUFFIX_PATTERNS {
        if let Some(idx) = lower.find(pattern) {
            lower.truncate(idx);
        }
    }

    lower.chars().filter(|c| c.is_alphanumeric()).collect()
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F)
}

/// Group files by normalised title; in each group of size > 1, keep only
/// the highest-quality-scoring file. Returns `(survivors, rejected)`.
pub fn tier1_dedup(files: Vec<TrackTags>) -> (Vec<TrackTags>, Vec<TrackTags>) {
    let mut groups: HashMap<String, Vec<TrackTags>> = HashMap::new();
    for file in files {
        let key = file
            .title
            .as_deref()
            .map(normalize_title)
            .unwrap_or_default();
        groups.entry(key).or_default().push(file);
    }

    let mut survivors = Vec::new();
    let mut rejected = Vec::new();

    for (_, mut group) in groups {
        if group.len() <= 1 {
            survivors.extend(group);
            continue;
        }
        group.sort_by_key(|b| std::cmp::Reverse(quality_score(b)));
        let mut iter = group.into_iter();
        survivors.push(iter.next().unwrap());
        rejected.extend(iter);
    }

    (survivors, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(path: &str, title: &str, format: &str, bit_depth: u32, sample_rate: u32, bitrate: u32) -> TrackTags {
        TrackTags {
            path: PathBuf::from(path),
            title: Some(title.to_string()),
            artist: None,
            format: format.to_string(),
            bit_depth,
            sample_rate,
            bitrate_kbps: bitrate,
        }
    }

    #[test]
    fn normalize_strips_version_suffixes_and_diacritics() {
        assert_eq!(normalize_title("Título (Live)"), "titulo");
        assert_eq!(normalize_title("Song - Remastered"), "song");
        assert_eq!(normalize_title("Track (feat. Someone)"), "track");
    }

    #[test]
    fn higher_quality_duplicate_is_kept_regardless_of_name_order() {
        let a = tags("a.flac", "Same Title", "flac", 16, 44100, 1000);
        let b = tags("b.mp3", "Same Title", "mp3", 16, 44100, 320);

        let (survivors, rejected) = tier1_dedup(vec![a.clone(), b.clone()]);
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].path, a.path);
        assert_eq!(rejected.len(), 1);

        let (survivors2, _) = tier1_dedup(vec![b, a.clone()]);
        assert_eq!(survivors2[0].path, a.path);
    }

    #[test]
    fn unique_titles_all_survive() {
        let a = tags("a.flac", "Title One", "flac", 16, 44100, 1000);
        let b = tags("b.flac", "Title Two", "flac", 16, 44100, 1000);
        let (survivors, rejected) = tier1_dedup(vec![a, b]);
        assert_eq!(survivors.len(), 2);
        assert!(rejected.is_empty());
    }
}
