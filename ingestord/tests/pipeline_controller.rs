//! End-to-end coverage of `PipelineController::run_once` against a real
//! temp-directory filesystem, without needing the external cataloguer or
//! media-server binaries actually present.

use ingestord::config::{
    AncillaryJobConfig, DedupThresholds, FsRootsConfig, MediaServerConfig, PipelineConfig,
    PipelineThresholds, ProbeConfig, SchedulerMode, WallClockTarget,
};
use ingestord::pipeline::status::{read_status, PipelineState};
use ingestord::PipelineController;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    _root: TempDir,
    config: PipelineConfig,
}

fn fixture() -> Fixture {
    let root = TempDir::new().unwrap();
    let inbox = root.path().join("inbox");
    let staging = root.path().join("staging");
    let library = root.path().join("library");
    let quarantine = root.path().join("quarantine");
    let data = root.path().join("data");
    for dir in [&inbox, &staging, &library, &quarantine, &data] {
        std::fs::create_dir_all(dir).unwrap();
    }

    let ancillary = AncillaryJobConfig {
        mode: SchedulerMode::Interval,
        interval_minutes: 60,
        wall_clock: WallClockTarget::default(),
        command: "true".to_string(),
    };

    let config = PipelineConfig {
        roots: FsRootsConfig {
            inbox,
            staging,
            library,
            quarantine,
            data,
        },
        pipeline_mode: SchedulerMode::Continuous,
        pipeline_interval_minutes: 60,
        pipeline_wall_clock: WallClockTarget::default(),
        metadata_refresh: ancillary.clone(),
        discogs_refresh: ancillary.clone(),
        regen_interval_minutes: 1440,
        regen_command: "true".to_string(),
        dedup: DedupThresholds {
            use_musicbrainz: false,
            ..DedupThresholds::default()
        },
        thresholds: PipelineThresholds {
            settle_seconds: 0,
            ..PipelineThresholds::default()
        },
        peer_probe: ProbeConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            api_key: String::new(),
            timeout: Duration::from_millis(200),
        },
        newsgroup_probe: ProbeConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            api_key: String::new(),
            timeout: Duration::from_millis(200),
        },
        cataloguer_binary_path: "true".to_string(),
        cataloguer_import_log_path: root.path().join("import.log").to_string_lossy().to_string(),
        media_server: MediaServerConfig {
            navidrome_url: None,
            navidrome_username: None,
            navidrome_password: None,
            volumio_ssh_target: None,
        },
        once: true,
        dry_run: false,
    };

    Fixture { _root: root, config }
}

#[tokio::test]
async fn empty_inbox_finishes_idle_and_does_not_invoke_cataloguer() {
    let fx = fixture();
    let controller = PipelineController::new(&fx.config);

    controller.run_once().await.unwrap();

    let status = read_status(&fx.config.roots.data.join("pipeline_status.json"))
        .unwrap()
        .unwrap();
    assert_eq!(status.status, PipelineState::Idle);
}

#[tokio::test]
async fn junk_only_artist_folder_is_cleaned_and_pruned() {
    let fx = fixture();
    let artist_dir = fx.config.roots.inbox.join("Some Artist");
    std::fs::create_dir_all(&artist_dir).unwrap();
    std::fs::write(artist_dir.join("readme.txt"), b"not audio").unwrap();

    let controller = PipelineController::new(&fx.config);
    controller.run_once().await.unwrap();

    assert!(!artist_dir.exists(), "empty artist folder should be pruned after junk cleanup");
}

#[tokio::test]
async fn unsettled_artist_folder_is_left_alone() {
    let fx = fixture();
    let mut config = fx.config.clone();
    config.thresholds.settle_seconds = 3600;

    let artist_dir = config.roots.inbox.join("Some Artist");
    std::fs::create_dir_all(&artist_dir).unwrap();
    std::fs::write(artist_dir.join("track.flac"), vec![0u8; 200]).unwrap();

    let controller = PipelineController::new(&config);
    controller.run_once().await.unwrap();

    assert!(artist_dir.join("track.flac").exists(), "unsettled folder must not be touched this pass");
}

#[tokio::test]
async fn concurrent_run_once_calls_serialise_on_the_run_lock() {
    let fx = fixture();
    let controller = std::sync::Arc::new(PipelineController::new(&fx.config));

    let a = controller.clone();
    let b = controller.clone();
    let (ra, rb) = tokio::join!(tokio::spawn(async move { a.run_once().await }), tokio::spawn(async move { b.run_once().await }));

    // Exactly one side may observe lock contention; both may also succeed
    // if they do not overlap, but neither run should panic or deadlock.
    ra.unwrap().ok();
    rb.unwrap().ok();
}
