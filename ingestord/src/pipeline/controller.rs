//! Pipeline Controller: the state machine that walks one pass —
//! `INIT → CLEANUP_INVALID → DRAIN_STARTUP → SNAPSHOT_BUSY →
//! FOR_EACH_ARTIST → FINALIZE → DONE/FAILED`.

use crate::cataloguer::Cataloguer;
use crate::config::PipelineConfig;
use crate::dedup::fingerprint_cache::FingerprintCache;
use crate::dedup::{Deduplicator, DeduplicatorConfig};
use crate::media_server::{self, MediaServerConfig, NavidromeConfig};
use crate::metadata::group_files_by_album;
use crate::paths::FsRoots;
use crate::pipeline::lock::RunLock;
use crate::pipeline::status::{write_status, PipelineState, StatusRecord};
use crate::quarantine;
use crate::safety::{is_settled, NewsgroupProbe, NewsgroupProbeConfig, PeerProbe, PeerProbeConfig};
use crate::staging::StagingManager;
use crate::tags::read_track_tags;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MIN_HEADER_BYTES: usize = 100;

/// Owns every collaborator a pipeline pass needs and drives one pass
/// end-to-end. Constructed once per process; `run_once` is called by each
/// scheduler shape (continuous, `--once`) with fresh per-pass state.
pub struct PipelineController {
    roots: FsRoots,
    peer_probe: PeerProbe,
    newsgroup_probe: NewsgroupProbe,
    staging: StagingManager,
    dedup: Deduplicator,
    cataloguer: Cataloguer,
    media_server: MediaServerConfig,
    settle_seconds: u64,
    chunk_size: usize,
    chunk_cooldown: Duration,
    drain_usage_pct: f64,
    dry_run: bool,
}

impl PipelineController {
    pub fn new(config: &PipelineConfig) -> Self {
        let roots = config.fs_roots();

        Self {
            staging: StagingManager::new(roots.staging.clone()),
            peer_probe: PeerProbe::new(PeerProbeConfig {
                base_url: config.peer_probe.base_url.clone(),
                api_key: config.peer_probe.api_key.clone(),
                timeout: config.peer_probe.timeout,
            }),
            newsgroup_probe: NewsgroupProbe::new(NewsgroupProbeConfig {
                base_url: config.newsgroup_probe.base_url.clone(),
                api_key: config.newsgroup_probe.api_key.clone(),
                timeout: config.newsgroup_probe.timeout,
            }),
            dedup: Deduplicator::new(DeduplicatorConfig {
                fpcalc_path: config.dedup.fpcalc_path.clone(),
                use_musicbrainz: config.dedup.use_musicbrainz,
                acoustid_base_url: config.dedup.acoustid_base_url.clone(),
                acoustid_api_key: config.dedup.acoustid_api_key.clone(),
            }),
            cataloguer: Cataloguer::new(
                config.cataloguer_binary_path.clone(),
                config.cataloguer_import_log_path.clone(),
            ),
            media_server: MediaServerConfig {
                navidrome: config.media_server.navidrome_url.clone().map(|url| NavidromeConfig {
                    url,
                    username: config.media_server.navidrome_username.clone().unwrap_or_default(),
                    password: config.media_server.navidrome_password.clone().unwrap_or_default(),
                    client_name: "ingestord".to_string(),
                }),
                volumio_ssh_target: config.media_server.volumio_ssh_target.clone(),
            },
            settle_seconds: config.thresholds.settle_seconds,
            chunk_size: config.thresholds.chunk_size,
            chunk_cooldown: config.thresholds.chunk_cooldown,
            drain_usage_pct: config.thresholds.drain_usage_pct,
            dry_run: config.dry_run,
            roots,
        }
    }

    /// Run one complete pipeline pass. Returns `Ok(())` on `DONE`,
    /// `Err` on `FAILED` or lock contention — the caller (scheduler or
    /// `--once` entry point) decides the process exit code.
    pub async fn run_once(&self) -> anyhow::Result<()> {
        self.roots.ensure_all()?;

        // INIT
        let mut lock = RunLock::new(self.roots.lock_path());
        if let Err(e) = lock.acquire() {
            tracing::warn!(error = %e, "pipeline lock contended, aborting this pass");
            return Err(e.into());
        }

        let result = self.run_locked().await;

        match &result {
            Ok(()) => {
                write_status(
                    &self.roots.status_path(),
                    &StatusRecord::new(PipelineState::Success, "pipeline finished"),
                )?;
            }
            Err(e) => {
                tracing::error!(error = %e, "pipeline pass failed");
                write_status(
                    &self.roots.status_path(),
                    &StatusRecord::new(PipelineState::Error, e.to_string()),
                )?;
            }
        }

        lock.release();
        result
    }

    async fn run_locked(&self) -> anyhow::Result<()> {
        write_status(
            &self.roots.status_path(),
            &StatusRecord::new(PipelineState::Running, "starting pipeline"),
        )?;

        // CLEANUP_INVALID
        self.cleanup_invalid_failed_imports();

        // DRAIN_STARTUP
        self.drain("startup").await?;

        // SNAPSHOT_BUSY (non-blocking; re-read per-artist inside the loop)
        let _ = self.peer_probe.active_transfer_filenames().await;

        // FOR_EACH_ARTIST
        let artists = self.list_artist_folders();
        if artists.is_empty() {
            write_status(
                &self.roots.status_path(),
                &StatusRecord::new(PipelineState::Idle, "inbox empty"),
            )?;
            return Ok(());
        }

        for artist in &artists {
            if !artist.exists() {
                continue;
            }
            write_status(
                &self.roots.status_path(),
                &StatusRecord::new(PipelineState::Running, "processing artist")
                    .with_artist(artist_name(artist)),
            )?;
            if let Err(e) = self.process_artist(artist).await {
                tracing::error!(artist = %artist.display(), error = %e, "error processing artist, continuing with the rest");
            }
        }

        // FINALIZE
        media_server::fix_library_permissions(&self.roots.library);
        media_server::trigger_subsonic_scan(&self.media_server.navidrome).await;
        media_server::trigger_volumio_rescan(&self.media_server.volumio_ssh_target).await;

        Ok(())
    }

    /// Remove any `failed_imports/` created directly inside the inbox —
    /// it must live only in staging or quarantine.
    fn cleanup_invalid_failed_imports(&self) {
        let invalid = self.roots.inbox.join(crate::paths::FAILED_IMPORTS_NAME);
        if !invalid.exists() {
            return;
        }
        tracing::warn!(path = %invalid.display(), "removing invalid failed_imports from inbox");
        if let Err(e) = std::fs::remove_dir_all(&invalid) {
            tracing::warn!(path = %invalid.display(), error = %e, "could not remove invalid failed_imports");
        }
    }

    fn list_artist_folders(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.roots.inbox) else {
            return Vec::new();
        };
        let mut folders: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| !crate::paths::is_sentinel_inbox_child(n))
                    .unwrap_or(false)
            })
            .collect();
        folders.sort();
        folders
    }

    async fn process_artist(&self, artist_folder: &Path) -> anyhow::Result<()> {
        if self.peer_probe.is_artist_busy(&artist_name(artist_folder)).await {
            tracing::info!(artist = %artist_folder.display(), "skipping, peer transfer active");
            return Ok(());
        }
        if self.newsgroup_probe.is_artist_busy(&artist_name(artist_folder)).await {
            tracing::info!(artist = %artist_folder.display(), "skipping, newsgroup job active");
            return Ok(());
        }
        if !is_settled(artist_folder, Duration::from_secs(self.settle_seconds)) {
            tracing::info!(artist = %artist_folder.display(), "skipping, grace period not met");
            return Ok(());
        }

        self.cleanup_junk(artist_folder);
        if !artist_folder.exists() {
            return Ok(());
        }

        let entries: Vec<PathBuf> = std::fs::read_dir(artist_folder)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .collect();

        let loose_audio: Vec<PathBuf> = entries
            .iter()
            .filter(|p| p.is_file() && crate::paths::is_audio_file(p))
            .cloned()
            .collect();

        let album_subfolders: Vec<PathBuf> = entries
            .iter()
            .filter(|p| p.is_dir())
            .filter(|p| {
                p.file_name().and_then(|n| n.to_str()) != Some(crate::paths::FAILED_IMPORTS_NAME)
            })
            .cloned()
            .collect();

        let import_candidates = self.validate_album_subfolders(&album_subfolders);
        if !import_candidates.is_empty() {
            self.process_album_chunks(&import_candidates).await?;
        }

        let valid_loose = self.validate_loose_files(&loose_audio);
        if !valid_loose.is_empty() {
            self.process_loose_chunks(artist_folder, &valid_loose).await?;
        }

        self.prune_if_empty(artist_folder);
        Ok(())
    }

    fn cleanup_junk(&self, folder: &Path) {
        let Ok(entries) = std::fs::read_dir(folder) else {
            return;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_file() && !crate::paths::is_audio_file(&path) && !crate::paths::is_safe_image(&path) {
                let _ = std::fs::remove_file(&path);
            }
        }
        remove_empty_subdirs(folder);
    }

    /// Settle + quick corruption-check each album subfolder; quarantine
    /// files that fail the check. Returns the subset still containing
    /// valid audio.
    fn validate_album_subfolders(&self, subfolders: &[PathBuf]) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        let run_stamp = run_stamp();

        for sub in subfolders {
            if !is_settled(sub, Duration::from_secs(self.settle_seconds)) {
                tracing::info!(folder = %sub.display(), "skipping album subfolder, not settled");
                continue;
            }

            let audio_files: Vec<PathBuf> = walkdir::WalkDir::new(sub)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file() && crate::paths::is_audio_file(e.path()))
                .map(|e| e.path().to_path_buf())
                .collect();

            let mut remaining = 0;
            for file in &audio_files {
                if quick_corruption_check(file) {
                    remaining += 1;
                } else if !self.dry_run {
                    if let Err(e) = quarantine::quarantine_corrupted_file(
                        file,
                        &self.roots.quarantine_corrupt(),
                        &run_stamp,
                    ) {
                        tracing::warn!(file = %file.display(), error = %e, "failed to quarantine corrupt file");
                    }
                }
            }

            if remaining > 0 {
                candidates.push(sub.clone());
            } else {
                tracing::info!(folder = %sub.display(), "no valid files remaining, skipping");
            }
        }

        candidates
    }

    fn validate_loose_files(&self, files: &[PathBuf]) -> Vec<PathBuf> {
        let run_stamp = run_stamp();
        let mut valid = Vec::new();
        for file in files {
            if !file.exists() {
                continue;
            }
            if quick_corruption_check(file) {
                valid.push(file.clone());
            } else if !self.dry_run {
                if let Err(e) =
                    quarantine::quarantine_corrupted_file(file, &self.roots.quarantine_corrupt(), &run_stamp)
                {
                    tracing::warn!(file = %file.display(), error = %e, "failed to quarantine corrupt file");
                }
            }
        }
        valid
    }

    async fn process_album_chunks(&self, albums: &[PathBuf]) -> anyhow::Result<()> {
        let chunks: Vec<&[PathBuf]> = albums.chunks(self.chunk_size).collect();
        let total = chunks.len();

        for (idx, chunk) in chunks.into_iter().enumerate() {
            for album in chunk {
                self.maybe_drain_proactively(&artist_name(album)).await?;

                if self.dry_run {
                    tracing::info!(album = %album.display(), "dry-run: would move album folder to staging");
                    continue;
                }

                let moved = self.staging.move_folder(album, &self.roots.inbox);
                if let Err(ingest_common::Error::StagingFull) = moved {
                    tracing::warn!(album = %album.display(), "staging full, emergency drain and retry");
                    self.drain("emergency ENOSPC").await?;
                    if let Err(e) = self.staging.move_folder(album, &self.roots.inbox) {
                        tracing::warn!(album = %album.display(), error = %e, "retry failed, skipping album");
                    }
                } else if let Err(e) = moved {
                    tracing::warn!(album = %album.display(), error = %e, "failed to move album, skipping");
                }
            }

            self.run_dedup_over_staging().await;
            self.cataloguer.run_import(&self.roots.staging).await?;
            self.cataloguer
                .run_post_import(&self.roots.library, &self.roots.staging)
                .await?;

            if idx + 1 < total {
                tokio::time::sleep(self.chunk_cooldown).await;
            }
        }

        Ok(())
    }

    async fn process_loose_chunks(&self, artist_folder: &Path, files: &[PathBuf]) -> anyhow::Result<()> {
        let roots = [self.roots.inbox.as_path()];
        let groups = group_files_by_album(&files.to_vec(), &roots);
        let chunks: Vec<&[((String, String), Vec<PathBuf>)]> = groups.chunks(self.chunk_size).collect();
        let total = chunks.len();

        for (idx, chunk) in chunks.into_iter().enumerate() {
            for ((albumartist, album), group_files) in chunk {
                let artist = if albumartist.is_empty() {
                    artist_name(artist_folder)
                } else {
                    albumartist.clone()
                };
                self.maybe_drain_proactively(&format!("{artist}/{album}")).await?;

                if self.dry_run {
                    tracing::info!(artist = %artist, album = %album, "dry-run: would move loose file group to staging");
                    continue;
                }

                let moved = self.staging.move_group(&artist, album, group_files);
                if let Err(ingest_common::Error::StagingFull) = moved {
                    tracing::warn!(artist = %artist, album = %album, "staging full, emergency drain and retry");
                    self.drain("emergency ENOSPC").await?;
                    if let Err(e) = self.staging.move_group(&artist, album, group_files) {
                        tracing::warn!(artist = %artist, album = %album, error = %e, "retry failed, skipping group");
                    }
                } else if let Err(e) = moved {
                    tracing::warn!(artist = %artist, album = %album, error = %e, "failed to move group, skipping");
                }
            }

            self.run_dedup_over_staging().await;
            self.cataloguer.run_import(&self.roots.staging).await?;
            self.cataloguer
                .run_post_import(&self.roots.library, &self.roots.staging)
                .await?;

            if idx + 1 < total {
                tokio::time::sleep(self.chunk_cooldown).await;
            }
        }

        Ok(())
    }

    async fn maybe_drain_proactively(&self, context: &str) -> anyhow::Result<()> {
        let pct = self.staging.usage_pct();
        if pct >= self.drain_usage_pct {
            tracing::info!(context, usage_pct = pct, "proactive drain threshold reached");
            self.drain("proactive").await?;
        }
        Ok(())
    }

    /// Run dedup over every album directory currently staged. Best-effort:
    /// a failure to read one album's tags is logged and skipped, it does
    /// not abort the drain.
    async fn run_dedup_over_staging(&self) {
        let Ok(mut cache) = FingerprintCache::load(self.roots.fingerprint_cache_path()) else {
            return;
        };
        let run_stamp = run_stamp();

        let album_dirs: Vec<PathBuf> = walkdir::WalkDir::new(&self.roots.staging)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .map(|e| e.path().to_path_buf())
            .collect();

        for album_dir in album_dirs {
            let files: Vec<PathBuf> = std::fs::read_dir(&album_dir)
                .into_iter()
                .flatten()
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && crate::paths::is_audio_file(p))
                .collect();

            if files.len() < 2 {
                continue;
            }

            let tags: Vec<_> = files.iter().map(|f| read_track_tags(f)).collect();
            let rejected_dir = self.roots.staging_dedup_rejected().join(&run_stamp);

            if let Err(e) = self.dedup.dedup_album(tags, &rejected_dir, &mut cache).await {
                tracing::warn!(album = %album_dir.display(), error = %e, "dedup failed for album, leaving files as-is");
            }
        }

        let _ = cache.save_if_dirty();
    }

    async fn drain(&self, reason: &str) -> anyhow::Result<()> {
        if self.dry_run {
            tracing::info!(reason, "dry-run: would drain staging");
            return Ok(());
        }

        let run_stamp = run_stamp();
        if let Err(e) = quarantine::quarantine_failed_imports_global(
            &self.roots.staging,
            &self.roots.quarantine_failed_imports(),
            &run_stamp,
        ) {
            tracing::warn!(error = %e, "failed to quarantine failed_imports during drain");
        }

        self.run_dedup_over_staging().await;
        self.cataloguer.run_import(&self.roots.staging).await?;
        self.cataloguer
            .run_post_import(&self.roots.library, &self.roots.staging)
            .await?;

        self.staging.clear()?;
        tracing::info!(reason, "staging drained");
        Ok(())
    }

    fn prune_if_empty(&self, artist_folder: &Path) {
        let Ok(mut entries) = std::fs::read_dir(artist_folder) else {
            return;
        };
        if entries.next().is_some() {
            return;
        }
        let _ = std::fs::remove_dir(artist_folder);

        let mut parent = artist_folder.parent();
        while let Some(dir) = parent {
            if dir == self.roots.inbox {
                break;
            }
            match std::fs::read_dir(dir) {
                Ok(mut e) if e.next().is_none() => {
                    let _ = std::fs::remove_dir(dir);
                    parent = dir.parent();
                }
                _ => break,
            }
        }
    }
}

fn artist_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("Unknown")
        .to_string()
}

fn remove_empty_subdirs(root: &Path) {
    let Ok(entries) = std::fs::read_dir(root) else {
        return;
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() {
            remove_empty_subdirs(&path);
            if std::fs::read_dir(&path).map(|mut e| e.next().is_none()).unwrap_or(false) {
                let _ = std::fs::remove_dir(&path);
            }
        }
    }
}

/// File exists, is non-empty, and its header is readable for at least
/// [`MIN_HEADER_BYTES`] bytes.
fn quick_corruption_check(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if metadata.len() == 0 {
        return false;
    }
    let Ok(mut file) = std::fs::File::open(path) else {
        return false;
    };
    use std::io::Read;
    let mut header = vec![0u8; MIN_HEADER_BYTES];
    match file.read(&mut header) {
        Ok(n) => n >= MIN_HEADER_BYTES,
        Err(_) => false,
    }
}

fn run_stamp() -> String {
    chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string()
}
