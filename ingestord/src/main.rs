//! ingestord — CLI entry point.
//!
//! Parses arguments, assembls a [`PipelineConfig`], initialises logging,
//! then either runs one pipeline pass and exits (`--once`) or starts the
//! Scheduling Kernel's jobs plus the inbox watcher and blocks until a
//! shutdown signal arrives.

use anyhow::Context;
use clap::Parser;
use ingestord::config::{CliOverrides, PipelineConfig, SchedulerMode};
use ingestord::pipeline::scheduler::{ContinuousScheduler, IntervalScheduler, Job, WallClockScheduler};
use ingestord::watcher::InboxWatcher;
use ingestord::PipelineController;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Background music-ingestion daemon: validates and deduplicates finished
/// downloads, hands them to the cataloguer, and publishes the result to
/// downstream media servers.
#[derive(Parser, Debug)]
#[command(name = "ingestord", version)]
struct Cli {
    /// Override the inbox root (default: configured/compiled default).
    #[arg(long, env = "INGESTORD_INBOX")]
    inbox: Option<String>,
    /// Override the staging (pre-library, tmpfs) root.
    #[arg(long, env = "INGESTORD_STAGING")]
    staging: Option<String>,
    /// Override the library root.
    #[arg(long, env = "INGESTORD_LIBRARY")]
    library: Option<String>,
    /// Override the quarantine root.
    #[arg(long, env = "INGESTORD_QUARANTINE")]
    quarantine: Option<String>,
    /// Override the data directory (logs, status, cache, lock).
    #[arg(long, env = "INGESTORD_DATA")]
    data: Option<String>,
    /// Run exactly one pipeline pass and exit instead of starting the
    /// scheduling kernel.
    #[arg(long)]
    once: bool,
    /// Log every move/import/quarantine decision without performing it.
    #[arg(long)]
    dry_run: bool,
}

impl From<&Cli> for CliOverrides {
    fn from(cli: &Cli) -> Self {
        Self {
            inbox: cli.inbox.clone(),
            staging: cli.staging.clone(),
            library: cli.library.clone(),
            quarantine: cli.quarantine.clone(),
            data: cli.data.clone(),
            once: cli.once,
            dry_run: cli.dry_run,
        }
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// A pipeline pass, wrapped as a [`Job`] so the Scheduling Kernel can drive
/// it the same way it drives the ancillary refresh jobs.
struct PipelineJob(Arc<PipelineController>);

#[async_trait::async_trait]
impl Job for PipelineJob {
    fn name(&self) -> &str {
        "pipeline"
    }

    async fn run(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
        self.0.run_once().await
    }
}

/// An ancillary refresh job: shells out to an external command and
/// records only its own last-run/last-result — it never bubbles an error
/// back into the pipeline.
struct ShellJob {
    name: String,
    command: String,
}

#[async_trait::async_trait]
impl Job for ShellJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
        let mut parts = self.command.split_whitespace();
        let Some(program) = parts.next() else {
            return Ok(());
        };
        let output = Command::new(program)
            .args(parts)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("failed to launch ancillary job '{}'", self.name))?;

        if !output.status.success() {
            anyhow::bail!(
                "{} exited with {}: {}",
                self.name,
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(())
    }
}

/// One of the three scheduler shapes, erased behind a common `start`, so
/// the same dispatch code can drive whichever shape configuration picked.
enum AnyScheduler {
    Continuous(ContinuousScheduler),
    Interval(IntervalScheduler),
    WallClock(WallClockScheduler),
}

impl AnyScheduler {
    async fn start(&self, cancel: CancellationToken) {
        match self {
            AnyScheduler::Continuous(s) => s.start(cancel).await,
            AnyScheduler::Interval(s) => s.start(cancel).await,
            AnyScheduler::WallClock(s) => s.start(cancel).await,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();
    tracing::info!(build_timestamp = env!("BUILD_TIMESTAMP"), "starting ingestord");

    let overrides: CliOverrides = (&cli).into();
    let config = PipelineConfig::resolve(&overrides).context("failed to resolve configuration")?;
    let roots = config.fs_roots();
    roots.ensure_all().context("failed to create pipeline root directories")?;

    let controller = Arc::new(PipelineController::new(&config));

    if config.once {
        return match controller.run_once().await {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("lock") => {
                tracing::warn!(error = %e, "pipeline lock contended");
                std::process::exit(1);
            }
            Err(e) => Err(e),
        };
    }

    let root_cancel = CancellationToken::new();

    let pipeline_job: Arc<dyn Job> = Arc::new(PipelineJob(controller.clone()));
    let pipeline_scheduler = match config.pipeline_mode {
        SchedulerMode::Continuous => AnyScheduler::Continuous(ContinuousScheduler::new(
            pipeline_job,
            roots.lock_path(),
            Duration::from_secs(10),
            Duration::from_secs(30),
        )),
        SchedulerMode::Interval => AnyScheduler::Interval(IntervalScheduler::new(
            pipeline_job,
            Duration::from_secs(config.pipeline_interval_minutes.max(1) * 60),
        )),
        SchedulerMode::WallClock => AnyScheduler::WallClock(WallClockScheduler::new(
            pipeline_job,
            config.pipeline_wall_clock.hour,
            config.pipeline_wall_clock.minute,
            config.pipeline_wall_clock.day_of_week,
        )),
    };

    let metadata_scheduler = build_ancillary_scheduler(
        "metadata-refresh",
        &config.metadata_refresh,
    );
    let discogs_scheduler = build_ancillary_scheduler("discogs-refresh", &config.discogs_refresh);
    let regen_scheduler = AnyScheduler::Interval(IntervalScheduler::new(
        Arc::new(ShellJob {
            name: "library-regen".to_string(),
            command: config.regen_command.clone(),
        }),
        Duration::from_secs(config.regen_interval_minutes * 60),
    ));

    let (_watcher, mut watch_rx) = InboxWatcher::new(&roots.inbox).context("failed to start inbox watcher")?;
    let watcher_cancel = root_cancel.child_token();
    let watcher_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = watcher_cancel.cancelled() => break,
                event = watch_rx.recv() => {
                    if event.is_none() {
                        break;
                    }
                    tracing::debug!(?event, "inbox watcher event (debounce signal only)");
                }
            }
        }
    });

    let schedulers = [
        pipeline_scheduler,
        metadata_scheduler,
        discogs_scheduler,
        regen_scheduler,
    ];

    let scheduler_tasks: Vec<_> = schedulers
        .into_iter()
        .map(|scheduler| {
            let cancel = root_cancel.child_token();
            tokio::spawn(async move { scheduler.start(cancel).await })
        })
        .collect();

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received, cancelling all tasks");
    root_cancel.cancel();

    for task in scheduler_tasks {
        let _ = task.await;
    }
    let _ = watcher_task.await;

    Ok(())
}

fn build_ancillary_scheduler(name: &str, config: &ingestord::config::AncillaryJobConfig) -> AnyScheduler {
    let job: Arc<dyn Job> = Arc::new(ShellJob {
        name: name.to_string(),
        command: config.command.clone(),
    });

    match config.mode {
        SchedulerMode::WallClock => AnyScheduler::WallClock(WallClockScheduler::new(
            job,
            config.wall_clock.hour,
            config.wall_clock.minute,
            config.wall_clock.day_of_week,
        )),
        SchedulerMode::Continuous | SchedulerMode::Interval => AnyScheduler::Interval(IntervalScheduler::new(
            job,
            Duration::from_secs(config.interval_minutes.max(1) * 60),
        )),
    }
}
