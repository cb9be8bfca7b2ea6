//! Deduplicator: runs tier 1 (tag-based), tier 2 (fingerprint-based), and
//! the optional tier 3 (recording-ID confirmation) over one album's worth
//! of candidate files, in order, writing everything it rejects to
//! `staging/dedup_rejected/` with a run-timestamp prefix.

pub mod fingerprint_cache;
pub mod tier1;
pub mod tier2;
pub mod tier3;

use fingerprint_cache::FingerprintCache;
use std::path::{Path, PathBuf};
use tier1::TrackTags;
use tier2::FingerprintedTrack;
use tier3::RecordingResolver;

#[derive(Debug, Default, Clone, Copy)]
pub struct DedupStats {
    pub files_scanned: usize,
    pub tier1_rejected: usize,
    pub tier2_rejected: usize,
    pub bytes_saved: u64,
}

pub struct DeduplicatorConfig {
    pub fpcalc_path: String,
    pub use_musicbrainz: bool,
    pub acoustid_base_url: String,
    pub acoustid_api_key: String,
}

pub struct Deduplicator {
    config: DeduplicatorConfig,
    recording_resolver: RecordingResolver,
}

impl Deduplicator {
    pub fn new(config: DeduplicatorConfig) -> Self {
        let recording_resolver = RecordingResolver::new(config.acoustid_base_url.clone(), config.acoustid_api_key.clone());
        Self {
            config,
            recording_resolver,
        }
    }

    /// Run all dedup tiers over `files` belonging to one album, moving
    /// rejects under `rejected_dir` (caller passes
    /// `staging/dedup_rejected/<run-timestamp>/`). Returns survivors plus
    /// stats for the run log.
    pub async fn dedup_album(
        &self,
        files: Vec<TrackTags>,
        rejected_dir: &Path,
        fingerprint_cache: &mut FingerprintCache,
    ) -> anyhow::Result<(Vec<TrackTags>, DedupStats)> {
        let mut stats = DedupStats {
            files_scanned: files.len(),
            ..Default::default()
        };

        let (survivors, rejected1) = tier1::tier1_dedup(files);
        stats.tier1_rejected = rejected1.len();
        stats.bytes_saved += total_bytes(&rejected1);
        move_rejected(&rejected1, rejected_dir)?;

        if survivors.len() <= 1 {
            return Ok((survivors, stats));
        }

        let mut fingerprinted = Vec::with_capacity(survivors.len());
        for tags in survivors {
            match tier2::fingerprint_file(&self.config.fpcalc_path, &tags.path, fingerprint_cache).await {
                Ok((fingerprint, duration_secs)) => fingerprinted.push(FingerprintedTrack {
                    tags,
                    fingerprint,
                    duration_secs,
                }),
                Err(e) => {
                    tracing::warn!(file = %tags.path.display(), error = %e, "fingerprinting failed, keeping file unclustered");
                    fingerprinted.push(FingerprintedTrack {
                        fingerprint: Vec::new(),
                        duration_secs: 0.0,
                        tags,
                    });
                }
            }
        }

        let clusters = tier2::cluster_indices(&fingerprinted);
        let mut survivors2 = Vec::new();
        let mut rejected2 = Vec::new();

        for members in clusters {
            if members.len() == 1 {
                survivors2.push(fingerprinted[members[0]].tags.clone());
                continue;
            }

            if !self.config.use_musicbrainz {
                let (best, mut rest) = tier2::keep_best_quality(&fingerprinted, &members);
                survivors2.push(best);
                rejected2.append(&mut rest);
                continue;
            }

            let candidates: Vec<(&[u32], f64)> = members
                .iter()
                .map(|&i| (fingerprinted[i].fingerprint.as_slice(), fingerprinted[i].duration_secs))
                .collect();

            if tier3::confirm_same_recording(&self.recording_resolver, &candidates).await {
                let (best, mut rest) = tier2::keep_best_quality(&fingerprinted, &members);
                survivors2.push(best);
                rejected2.append(&mut rest);
            } else {
                // Acoustic similarity clustered these, but recording-ID
                // confirmation either disagreed or couldn't resolve every
                // member: treat the cluster as a false positive and keep
                // only the first member rather than trusting quality
                // ranking over an unconfirmed cluster.
                let (first, rest) = members.split_first().expect("members is non-empty");
                survivors2.push(fingerprinted[*first].tags.clone());
                rejected2.extend(rest.iter().map(|&i| fingerprinted[i].tags.clone()));
            }
        }

        stats.tier2_rejected = rejected2.len();
        stats.bytes_saved += total_bytes(&rejected2);
        move_rejected(&rejected2, rejected_dir)?;

        Ok((survivors2, stats))
    }
}

fn total_bytes(files: &[TrackTags]) -> u64 {
    files
        .iter()
        .filter_map(|f| std::fs::metadata(&f.path).ok())
        .map(|m| m.len())
        .sum()
}

fn move_rejected(files: &[TrackTags], rejected_dir: &Path) -> anyhow::Result<()> {
    if files.is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(rejected_dir)?;
    for file in files {
        let Some(name) = file.path.file_name() else {
            continue;
        };
        let dest = unique_dest(rejected_dir, name.to_string_lossy().as_ref());
        if let Err(e) = std::fs::rename(&file.path, &dest) {
            tracing::warn!(file = %file.path.display(), error = %e, "failed to move rejected duplicate to dedup_rejected");
        }
    }
    Ok(())
}

fn unique_dest(dir: &Path, file_name: &str) -> PathBuf {
    let mut candidate = dir.join(file_name);
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_string());
    let mut counter = 1;
    while candidate.exists() {
        candidate = dir.join(match &ext {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        });
        counter += 1;
    }
    candidate
}
