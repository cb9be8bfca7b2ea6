//! Tier 2: fingerprint-based deduplication via an external `fpcalc`-style
//! tool and bit-level Hamming similarity clustering.

use crate::dedup::fingerprint_cache::FingerprintCache;
use crate::dedup::tier1::{quality_score, TrackTags};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// First N fingerprint words compared (~30s of audio at chromaprint's
/// default resolution).
const COMPARISON_WINDOW: usize = 120;
const SIMILARITY_THRESHOLD: f64 = 0.85;
const FPCALC_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the external fingerprinting tool against one file, honoring the
/// cache (keyed by path, revalidated by mtime). Returns the raw fingerprint
/// words alongside the file's duration, both needed later for a tier-3
/// recording lookup keyed on the fingerprint itself.
pub async fn fingerprint_file(
    fpcalc_path: &str,
    path: &Path,
    cache: &mut FingerprintCache,
) -> anyhow::Result<(Vec<u32>, f64)> {
    let mtime = std::fs::metadata(path)?.modified()?;
    if let Some(cached) = cache.get(path, mtime) {
        return Ok(cached);
    }

    let output = tokio::time::timeout(
        FPCALC_TIMEOUT,
        Command::new(fpcalc_path)
            .arg("-raw")
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output(),
    )
    .await??;

    if !output.status.success() {
        anyhow::bail!("fpcalc exited with status {}", output.status);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let fingerprint = parse_fpcalc_raw(&stdout)?;
    let duration_secs = parse_fpcalc_duration(&stdout);
    cache.put(path.to_path_buf(), fingerprint.clone(), duration_secs, mtime);
    Ok((fingerprint, duration_secs))
}

fn parse_fpcalc_raw(stdout: &str) -> anyhow::Result<Vec<u32>> {
    let line = stdout
        .lines()
        .find_map(|l| l.strip_prefix("FINGERPRINT="))
        .ok_or_else(|| anyhow::anyhow!("fpcalc output missing FINGERPRINT= line"))?;

    line.split(',')
        .map(|word| word.trim().parse::<u32>().map_err(Into::into))
        .collect()
}

/// `DURATION=` is seconds, truncated to an integer by `fpcalc`; defaults to
/// `0.0` if missing rather than failing the whole fingerprint, since tier 2's
/// similarity clustering doesn't need it.
fn parse_fpcalc_duration(stdout: &str) -> f64 {
    stdout
        .lines()
        .find_map(|l| l.strip_prefix("DURATION="))
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// `1 - popcount(a ^ b) / (32 * N)` over the first `COMPARISON_WINDOW`
/// words shared by both fingerprints.
pub fn fingerprint_similarity(a: &[u32], b: &[u32]) -> f64 {
    let n = a.len().min(b.len()).min(COMPARISON_WINDOW);
    if n == 0 {
        return 0.0;
    }
    let differing_bits: u32 = a[..n]
        .iter()
        .zip(&b[..n])
        .map(|(x, y)| (x ^ y).count_ones())
        .sum();
    1.0 - (differing_bits as f64) / (32.0 * n as f64)
}

/// One tier-1 survivor paired with its fingerprint and duration.
pub struct FingerprintedTrack {
    pub tags: TrackTags,
    pub fingerprint: Vec<u32>,
    pub duration_secs: f64,
}

/// Group fingerprinted tracks into clusters (by index into `tracks`) using
/// pairwise similarity >= [`SIMILARITY_THRESHOLD`]. Exposed separately from
/// [`tier2_dedup`] so tier 3 can inspect a cluster's full membership before
/// any file is discarded.
pub fn cluster_indices(tracks: &[FingerprintedTrack]) -> Vec<Vec<usize>> {
    let n = tracks.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], x: usize) -> usize {
        if parent[x] != x {
            parent[x] = find(parent, parent[x]);
        }
        parent[x]
    }

    for i in 0..n {
        for j in (i + 1)..n {
            let sim = fingerprint_similarity(&tracks[i].fingerprint, &tracks[j].fingerprint);
            if sim >= SIMILARITY_THRESHOLD {
                let ri = find(&mut parent, i);
                let rj = find(&mut parent, j);
                if ri != rj {
                    parent[ri] = rj;
                }
            }
        }
    }

    let mut clusters: std::collections::HashMap<usize, Vec<usize>> = std::collections::HashMap::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        clusters.entry(root).or_default().push(i);
    }
    clusters.into_values().collect()
}

/// Within one cluster, keep only the highest quality score. Used both as
/// tier 2's own default resolution (no recording-ID confirmation) and as
/// tier 3's fallback once a cluster is confirmed.
pub fn keep_best_quality(tracks: &[FingerprintedTrack], members: &[usize]) -> (TrackTags, Vec<TrackTags>) {
    let best = members
        .iter()
        .copied()
        .max_by_key(|&i| quality_score(&tracks[i].tags))
        .expect("members is non-empty");

    let mut rejected = Vec::new();
    for &i in members {
        if i != best {
            rejected.push(tracks[i].tags.clone());
        }
    }
    (tracks[best].tags.clone(), rejected)
}

/// Cluster survivors pairwise by similarity >= 0.85; within a cluster keep
/// only the highest quality score. Returns `(survivors, rejected)`.
///
/// This is tier 2 run standalone (no tier-3 recording-ID confirmation);
/// [`crate::dedup::Deduplicator::dedup_album`] calls [`cluster_indices`]
/// directly instead when tier 3 is enabled, so it can inspect cluster
/// membership before collapsing.
pub fn tier2_dedup(tracks: Vec<FingerprintedTrack>) -> (Vec<TrackTags>, Vec<TrackTags>) {
    let mut survivors = Vec::new();
    let mut rejected = Vec::new();
    for members in cluster_indices(&tracks) {
        if members.len() == 1 {
            survivors.push(tracks[members[0]].tags.clone());
            continue;
        }
        let (best, mut rest) = keep_best_quality(&tracks, &members);
        survivors.push(best);
        rejected.append(&mut rest);
    }
    (survivors, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fpcalc_raw_output() {
        let stdout = "DURATION=180\nFINGERPRINT=1,2,3,4\n";
        assert_eq!(parse_fpcalc_raw(stdout).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(parse_fpcalc_duration(stdout), 180.0);
    }

    #[test]
    fn missing_duration_line_defaults_to_zero() {
        assert_eq!(parse_fpcalc_duration("FINGERPRINT=1,2,3\n"), 0.0);
    }

    #[test]
    fn identical_fingerprints_have_similarity_one() {
        let fp = vec![0xABCDu32; 10];
        assert_eq!(fingerprint_similarity(&fp, &fp), 1.0);
    }

    #[test]
    fn completely_different_fingerprints_have_low_similarity() {
        let a = vec![0u32; 4];
        let b = vec![u32::MAX; 4];
        assert!(fingerprint_similarity(&a, &b) < 0.1);
    }

    fn track(path: &str, fingerprint: Vec<u32>, quality: u32) -> FingerprintedTrack {
        FingerprintedTrack {
            tags: TrackTags {
                path: path.into(),
                title: None,
                artist: None,
                format: "flac".into(),
                bit_depth: quality,
                sample_rate: 44100,
                bitrate_kbps: 1000,
            },
            fingerprint,
            duration_secs: 180.0,
        }
    }

    #[test]
    fn similar_fingerprints_cluster_and_keep_best_quality() {
        let a = track("a.flac", vec![0b1010; 40], 24);
        let b = track("b.flac", vec![0b1010; 40], 16); // identical fingerprint, lower quality
        let c = track("c.flac", vec![0xFFFF_FFFF; 40], 24); // unrelated

        let (survivors, rejected) = tier2_dedup(vec![a, b, c]);
        assert_eq!(survivors.len(), 2);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].path.to_str().unwrap(), "b.flac");
    }
}
