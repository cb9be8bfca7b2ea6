//! `PipelineConfig`: the single typed configuration record assembled once
//! at startup from CLI flags, environment variables, an optional TOML file,
//! and compiled defaults, in that priority order. No other component reads
//! an environment variable or a config file directly.

use ingest_common::config::{
    default_data_dir, env_flag, env_parsed, load_toml_config, resolve_path, resolve_string,
};
use std::path::PathBuf;
use std::time::Duration;

pub const APP_NAME: &str = "ingestord";

/// How a scheduler (pipeline, metadata-refresh, library-regen) is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerMode {
    /// Call the job, cool down, call again.
    Continuous,
    /// Call the job, sleep a fixed interval, repeat.
    Interval,
    /// Run once daily or weekly at a wall-clock time.
    WallClock,
}

impl SchedulerMode {
    fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "continuous" => SchedulerMode::Continuous,
            "wallclock" | "wall_clock" | "wall-clock" => SchedulerMode::WallClock,
            _ => SchedulerMode::Interval,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WallClockTarget {
    pub hour: u32,
    pub minute: u32,
    /// `None` for daily; `Some(0..=6)` (Monday=0) for weekly.
    pub day_of_week: Option<u32>,
}

impl Default for WallClockTarget {
    fn default() -> Self {
        Self {
            hour: 3,
            minute: 0,
            day_of_week: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FsRootsConfig {
    pub inbox: PathBuf,
    pub staging: PathBuf,
    pub library: PathBuf,
    pub quarantine: PathBuf,
    pub data: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DedupThresholds {
    pub use_musicbrainz: bool,
    pub acoustid_base_url: String,
    pub acoustid_api_key: String,
    pub fpcalc_path: String,
    pub comparison_window: usize,
    pub similarity_threshold: f64,
    pub confirmation_threshold: f64,
}

impl Default for DedupThresholds {
    fn default() -> Self {
        Self {
            use_musicbrainz: true,
            acoustid_base_url: "https://api.acoustid.org/v2".to_string(),
            acoustid_api_key: String::new(),
            fpcalc_path: "fpcalc".to_string(),
            comparison_window: 120,
            similarity_threshold: 0.85,
            confirmation_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineThresholds {
    pub drain_usage_pct: f64,
    pub settle_seconds: u64,
    pub chunk_size: usize,
    pub chunk_cooldown: Duration,
}

impl Default for PipelineThresholds {
    fn default() -> Self {
        Self {
            drain_usage_pct: 85.0,
            settle_seconds: 300,
            chunk_size: 500,
            chunk_cooldown: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AncillaryJobConfig {
    pub mode: SchedulerMode,
    pub interval_minutes: u64,
    pub wall_clock: WallClockTarget,
    pub command: String,
}

#[derive(Debug, Clone)]
pub struct MediaServerConfig {
    pub navidrome_url: Option<String>,
    pub navidrome_username: Option<String>,
    pub navidrome_password: Option<String>,
    pub volumio_ssh_target: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub roots: FsRootsConfig,
    pub pipeline_mode: SchedulerMode,
    pub pipeline_interval_minutes: u64,
    pub pipeline_wall_clock: WallClockTarget,
    pub metadata_refresh: AncillaryJobConfig,
    pub discogs_refresh: AncillaryJobConfig,
    pub regen_interval_minutes: u64,
    pub regen_command: String,
    pub dedup: DedupThresholds,
    pub thresholds: PipelineThresholds,
    pub peer_probe: ProbeConfig,
    pub newsgroup_probe: ProbeConfig,
    pub cataloguer_binary_path: String,
    pub cataloguer_import_log_path: String,
    pub media_server: MediaServerConfig,
    pub once: bool,
    pub dry_run: bool,
}

/// CLI overrides layered on top of environment/TOML/default. Every field
/// mirrors a `clap` argument in [`crate::main`]'s CLI struct; kept separate
/// so config assembly stays testable without constructing a `clap::Parser`.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub inbox: Option<String>,
    pub staging: Option<String>,
    pub library: Option<String>,
    pub quarantine: Option<String>,
    pub data: Option<String>,
    pub once: bool,
    pub dry_run: bool,
}

impl PipelineConfig {
    /// Assemble the full configuration: CLI > env > TOML > default.
    pub fn resolve(cli: &CliOverrides) -> ingest_common::Result<Self> {
        let toml = load_toml_config(APP_NAME)?;
        let toml_ref = toml.as_ref();
        let data_dir = default_data_dir(APP_NAME);

        let roots = FsRootsConfig {
            inbox: resolve_path(cli.inbox.as_deref(), "INGESTORD_INBOX", toml_ref, "inbox", || {
                PathBuf::from("/music/inbox")
            }),
            staging: resolve_path(
                cli.staging.as_deref(),
                "INGESTORD_STAGING",
                toml_ref,
                "staging",
                || PathBuf::from("/music/pre-library"),
            ),
            library: resolve_path(
                cli.library.as_deref(),
                "INGESTORD_LIBRARY",
                toml_ref,
                "library",
                || PathBuf::from("/music/library"),
            ),
            quarantine: resolve_path(
                cli.quarantine.as_deref(),
                "INGESTORD_QUARANTINE",
                toml_ref,
                "quarantine",
                || PathBuf::from("/music/quarantine"),
            ),
            data: resolve_path(cli.data.as_deref(), "INGESTORD_DATA", toml_ref, "data", || data_dir),
        };

        let pipeline_mode = SchedulerMode::parse(&resolve_string(
            None,
            "PIPELINE_MODE",
            toml_ref,
            "pipeline_mode",
            || "continuous".to_string(),
        ));
        let pipeline_interval_minutes = env_parsed("PIPELINE_INTERVAL_MINUTES", 60)?;
        let pipeline_wallclock_time = resolve_string(
            None,
            "PIPELINE_WALLCLOCK_TIME",
            toml_ref,
            "pipeline_wallclock_time",
            || "03:00".to_string(),
        );
        let (pipeline_wallclock_hour, pipeline_wallclock_minute) = parse_hh_mm(&pipeline_wallclock_time);
        let pipeline_wallclock_day = env_parsed::<i64>("PIPELINE_WALLCLOCK_DAY", -1)?;
        let pipeline_wall_clock = WallClockTarget {
            hour: pipeline_wallclock_hour,
            minute: pipeline_wallclock_minute,
            day_of_week: if (0..=6).contains(&pipeline_wallclock_day) {
                Some(pipeline_wallclock_day as u32)
            } else {
                None
            },
        };

        let metadata_refresh = AncillaryJobConfig {
            mode: SchedulerMode::parse(&resolve_string(
                None,
                "METADATA_REFRESH_MODE",
                toml_ref,
                "metadata_refresh_mode",
                || "interval".to_string(),
            )),
            interval_minutes: env_parsed("METADATA_REFRESH_INTERVAL_MINUTES", 360)?,
            wall_clock: WallClockTarget::default(),
            command: resolve_string(
                None,
                "METADATA_REFRESH_COMMAND",
                toml_ref,
                "metadata_refresh_command",
                || "metadata-refresh".to_string(),
            ),
        };

        let discogs_time = resolve_string(None, "DISCOGS_REFRESH_TIME", toml_ref, "discogs_refresh_time", || {
            "03:00".to_string()
        });
        let (discogs_hour, discogs_minute) = parse_hh_mm(&discogs_time);
        let discogs_day = env_parsed::<i64>("DISCOGS_REFRESH_DAY", -1)?;

        let discogs_refresh = AncillaryJobConfig {
            mode: SchedulerMode::parse(&resolve_string(
                None,
                "DISCOGS_REFRESH_MODE",
                toml_ref,
                "discogs_refresh_mode",
                || "wallclock".to_string(),
            )),
            interval_minutes: 0,
            wall_clock: WallClockTarget {
                hour: discogs_hour,
                minute: discogs_minute,
                day_of_week: if (0..=6).contains(&discogs_day) {
                    Some(discogs_day as u32)
                } else {
                    None
                },
            },
            command: resolve_string(
                None,
                "DISCOGS_REFRESH_COMMAND",
                toml_ref,
                "discogs_refresh_command",
                || "discogs-refresh".to_string(),
            ),
        };

        let regen_interval_minutes = env_parsed("REGEN_INTERVAL_MINUTES", 1440)?;
        let regen_command = resolve_string(None, "REGEN_COMMAND", toml_ref, "regen_command", || {
            "library-regen".to_string()
        });

        let dedup = DedupThresholds {
            use_musicbrainz: env_flag("DEDUP_USE_MUSICBRAINZ", DedupThresholds::default().use_musicbrainz),
            acoustid_api_key: resolve_string(None, "ACOUSTID_API_KEY", toml_ref, "acoustid_api_key", String::new),
            ..DedupThresholds::default()
        };

        let peer_probe = ProbeConfig {
            base_url: resolve_string(None, "PEER_DAEMON_URL", toml_ref, "peer_daemon_url", || {
                "http://localhost:9091".to_string()
            }),
            api_key: resolve_string(None, "PEER_DAEMON_API_KEY", toml_ref, "peer_daemon_api_key", String::new),
            timeout: Duration::from_secs(10),
        };
        let newsgroup_probe = ProbeConfig {
            base_url: resolve_string(None, "NEWSGROUP_DAEMON_URL", toml_ref, "newsgroup_daemon_url", || {
                "http://localhost:8080".to_string()
            }),
            api_key: resolve_string(
                None,
                "NEWSGROUP_DAEMON_API_KEY",
                toml_ref,
                "newsgroup_daemon_api_key",
                String::new,
            ),
            timeout: Duration::from_secs(10),
        };

        let media_server = MediaServerConfig {
            navidrome_url: std::env::var("NAVIDROME_URL").ok(),
            navidrome_username: std::env::var("NAVIDROME_USERNAME").ok(),
            navidrome_password: std::env::var("NAVIDROME_PASSWORD").ok(),
            volumio_ssh_target: std::env::var("VOLUMIO_SSH_TARGET").ok(),
        };

        Ok(PipelineConfig {
            roots,
            pipeline_mode,
            pipeline_interval_minutes,
            pipeline_wall_clock,
            metadata_refresh,
            discogs_refresh,
            regen_interval_minutes,
            regen_command,
            dedup,
            thresholds: PipelineThresholds::default(),
            peer_probe,
            newsgroup_probe,
            cataloguer_binary_path: resolve_string(None, "CATALOGUER_BIN", toml_ref, "cataloguer_bin", || {
                "beet".to_string()
            }),
            cataloguer_import_log_path: resolve_string(
                None,
                "CATALOGUER_IMPORT_LOG",
                toml_ref,
                "cataloguer_import_log",
                || "/data/last_import.log".to_string(),
            ),
            media_server,
            once: cli.once,
            dry_run: cli.dry_run,
        })
    }

    pub fn fs_roots(&self) -> crate::paths::FsRoots {
        crate::paths::FsRoots {
            inbox: self.roots.inbox.clone(),
            staging: self.roots.staging.clone(),
            library: self.roots.library.clone(),
            quarantine: self.roots.quarantine.clone(),
            data: self.roots.data.clone(),
        }
    }
}

/// Parse `"HH:MM"`, falling back to the default target's time on any
/// malformed input rather than failing startup over an ancillary scheduler.
fn parse_hh_mm(s: &str) -> (u32, u32) {
    let default = WallClockTarget::default();
    let mut parts = s.splitn(2, ':');
    let hour = parts
        .next()
        .and_then(|h| h.parse().ok())
        .unwrap_or(default.hour);
    let minute = parts
        .next()
        .and_then(|m| m.parse().ok())
        .unwrap_or(default.minute);
    (hour, minute)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_mode_parses_known_variants() {
        assert_eq!(SchedulerMode::parse("continuous"), SchedulerMode::Continuous);
        assert_eq!(SchedulerMode::parse("wallclock"), SchedulerMode::WallClock);
        assert_eq!(SchedulerMode::parse("interval"), SchedulerMode::Interval);
        assert_eq!(SchedulerMode::parse("garbage"), SchedulerMode::Interval);
    }

    #[test]
    fn parse_hh_mm_handles_valid_and_malformed_input() {
        assert_eq!(parse_hh_mm("03:30"), (3, 30));
        let default = WallClockTarget::default();
        assert_eq!(parse_hh_mm("not-a-time"), (default.hour, default.minute));
    }

    #[test]
    fn resolve_uses_defaults_with_no_overrides_or_env() {
        let cli = CliOverrides::default();
        let config = PipelineConfig::resolve(&cli).unwrap();
        assert_eq!(config.thresholds.chunk_size, 500);
        assert_eq!(config.dedup.comparison_window, 120);
        assert!(!config.once);
    }
}
