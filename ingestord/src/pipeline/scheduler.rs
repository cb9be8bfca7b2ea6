//! Scheduling Kernel: the three scheduler shapes (continuous, interval,
//! wall-clock) driving a generic [`Job`], plus the run-lock-aware
//! continuous loop used specifically for the ingestion pipeline.
//!
//! The kernel is job-agnostic: the pipeline pass, the metadata-refresh job,
//! the discogs-style tag-lookup refresh, and the library-regeneration job
//! are all just different `Job` impls driven by the same three loops.

use async_trait::async_trait;
use chrono::{Datelike, Timelike, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// One unit of scheduled work. Ancillary jobs record only their own
/// last-run/last-result; they never bubble an error back into the kernel.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerStatus {
    pub running: bool,
    pub last_run: Option<String>,
    pub last_result: Option<String>,
}

struct SharedStatus(Mutex<SchedulerStatus>);

impl SharedStatus {
    fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(SchedulerStatus::default())))
    }

    async fn record(&self, result: &anyhow::Result<()>) {
        let mut status = self.0.lock().await;
        status.last_run = Some(Utc::now().to_rfc3339());
        status.last_result = Some(match result {
            Ok(()) => "ok".to_string(),
            Err(e) => format!("error: {e}"),
        });
    }
}

/// Continuous scheduler: run the job, wait for it to return, cool down,
/// run again. Before each run, checks the pipeline's run lock — optimistic
/// at the scheduler level, since the lock file itself is the authoritative
/// serialisation point.
pub struct ContinuousScheduler {
    job: Arc<dyn Job>,
    lock_path: PathBuf,
    cooldown: Duration,
    poll_interval: Duration,
    status: Arc<SharedStatus>,
    running: Arc<AtomicBool>,
}

impl ContinuousScheduler {
    pub fn new(job: Arc<dyn Job>, lock_path: PathBuf, cooldown: Duration, poll_interval: Duration) -> Self {
        Self {
            job,
            lock_path,
            cooldown,
            poll_interval,
            status: SharedStatus::new(),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub async fn start(&self, cancel: CancellationToken) {
        self.running.store(true, Ordering::Relaxed);
        loop {
            if cancel.is_cancelled() || !self.running.load(Ordering::Relaxed) {
                return;
            }

            if crate::pipeline::lock::is_locked(&self.lock_path) {
                if sleep_or_cancel(self.poll_interval, &cancel).await {
                    return;
                }
                continue;
            }

            self.run_now().await;

            if sleep_or_cancel(self.cooldown, &cancel).await {
                return;
            }
        }
    }

    pub async fn run_now(&self) {
        let result = self.job.run(CancellationToken::new()).await;
        if let Err(e) = &result {
            tracing::warn!(job = self.job.name(), error = %e, "continuous job run failed");
        }
        self.status.record(&result).await;
    }

    /// Signal the running loop to stop after its current tick. Independent
    /// of `cancel`, which `start()`'s caller owns; this lets a scheduler be
    /// stopped without tearing down the cancellation token it shares with
    /// other tasks.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub async fn get_status(&self) -> SchedulerStatus {
        self.status.0.lock().await.clone()
    }
}

/// Interval scheduler: run the job, sleep a fixed interval, repeat.
/// Sleeping in short ticks so `stop()`/cancellation stays responsive.
pub struct IntervalScheduler {
    job: Arc<dyn Job>,
    interval: Duration,
    status: Arc<SharedStatus>,
    running: Arc<AtomicBool>,
}

impl IntervalScheduler {
    pub fn new(job: Arc<dyn Job>, interval: Duration) -> Self {
        Self {
            job,
            interval,
            status: SharedStatus::new(),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub async fn start(&self, cancel: CancellationToken) {
        self.running.store(true, Ordering::Relaxed);
        loop {
            if cancel.is_cancelled() || !self.running.load(Ordering::Relaxed) {
                return;
            }
            self.run_now().await;
            if sleep_or_cancel(self.interval, &cancel).await {
                return;
            }
        }
    }

    pub async fn run_now(&self) {
        let result = self.job.run(CancellationToken::new()).await;
        if let Err(e) = &result {
            tracing::warn!(job = self.job.name(), error = %e, "interval job run failed");
        }
        self.status.record(&result).await;
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub async fn get_status(&self) -> SchedulerStatus {
        self.status.0.lock().await.clone()
    }
}

/// Wall-clock scheduler: run once daily (or weekly, when `day_of_week` is
/// set) at a fixed `HH:MM`, computing the seconds to the next target and
/// sleeping in 60-second ticks.
pub struct WallClockScheduler {
    job: Arc<dyn Job>,
    hour: u32,
    minute: u32,
    day_of_week: Option<u32>,
    status: Arc<SharedStatus>,
    running: Arc<AtomicBool>,
}

impl WallClockScheduler {
    pub fn new(job: Arc<dyn Job>, hour: u32, minute: u32, day_of_week: Option<u32>) -> Self {
        Self {
            job,
            hour,
            minute,
            day_of_week,
            status: SharedStatus::new(),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub async fn start(&self, cancel: CancellationToken) {
        self.running.store(true, Ordering::Relaxed);
        loop {
            if cancel.is_cancelled() || !self.running.load(Ordering::Relaxed) {
                return;
            }
            let wait = seconds_until_next_run(self.hour, self.minute, self.day_of_week);
            if sleep_seconds_or_cancel(wait, &cancel).await {
                return;
            }
            if cancel.is_cancelled() || !self.running.load(Ordering::Relaxed) {
                return;
            }
            self.run_now().await;
        }
    }

    pub async fn run_now(&self) {
        let result = self.job.run(CancellationToken::new()).await;
        if let Err(e) = &result {
            tracing::warn!(job = self.job.name(), error = %e, "wall-clock job run failed");
        }
        self.status.record(&result).await;
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub async fn get_status(&self) -> SchedulerStatus {
        self.status.0.lock().await.clone()
    }
}

/// Seconds until the next daily (or weekly) `HH:MM` target, always > 0.
fn seconds_until_next_run(hour: u32, minute: u32, day_of_week: Option<u32>) -> u64 {
    let now = Utc::now();
    let today_target = now
        .date_naive()
        .and_hms_opt(hour, minute, 0)
        .unwrap_or_else(|| now.naive_utc());

    match day_of_week {
        None => {
            let target = if today_target > now.naive_utc() {
                today_target
            } else {
                today_target + chrono::Duration::days(1)
            };
            (target - now.naive_utc()).num_seconds().max(1) as u64
        }
        Some(target_dow) => {
            let current_dow = now.weekday().num_days_from_monday();
            let mut days_ahead = (target_dow as i64 - current_dow as i64).rem_euclid(7);
            if days_ahead == 0 && today_target <= now.naive_utc() {
                days_ahead = 7;
            }
            let target = today_target + chrono::Duration::days(days_ahead);
            (target - now.naive_utc()).num_seconds().max(1) as u64
        }
    }
}

/// Sleep for `duration`, returning `true` if cancelled before it elapsed.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = cancel.cancelled() => true,
    }
}

/// As [`sleep_or_cancel`] but in 60-second ticks, so a long wall-clock wait
/// remains responsive to cancellation.
async fn sleep_seconds_or_cancel(total_seconds: u64, cancel: &CancellationToken) -> bool {
    let mut remaining = total_seconds;
    while remaining > 0 {
        let tick = remaining.min(60);
        if sleep_or_cancel(Duration::from_secs(tick), cancel).await {
            return true;
        }
        remaining -= tick;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingJob {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Job for CountingJob {
        fn name(&self) -> &str {
            "counting"
        }
        async fn run(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn interval_scheduler_runs_at_least_once_before_cancellation() {
        let count = Arc::new(AtomicUsize::new(0));
        let job = Arc::new(CountingJob { count: count.clone() });
        let scheduler = IntervalScheduler::new(job, Duration::from_secs(3600));
        let cancel = CancellationToken::new();

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_clone.cancel();
        });

        scheduler.start(cancel).await;
        assert!(count.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn stop_halts_the_loop_without_cancelling_the_token() {
        let count = Arc::new(AtomicUsize::new(0));
        let job = Arc::new(CountingJob { count: count.clone() });
        let scheduler = Arc::new(IntervalScheduler::new(job, Duration::from_millis(10)));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let scheduler = scheduler.clone();
            let cancel = cancel.clone();
            async move { scheduler.start(cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(35)).await;
        scheduler.stop();
        handle.await.unwrap();

        assert!(!cancel.is_cancelled());
        assert!(count.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn run_now_records_status() {
        let count = Arc::new(AtomicUsize::new(0));
        let job = Arc::new(CountingJob { count });
        let scheduler = IntervalScheduler::new(job, Duration::from_secs(3600));
        scheduler.run_now().await;

        let status = scheduler.get_status().await;
        assert_eq!(status.last_result.as_deref(), Some("ok"));
        assert!(status.last_run.is_some());
    }

    #[test]
    fn seconds_until_next_daily_run_is_within_24_hours() {
        let seconds = seconds_until_next_run(3, 0, None);
        assert!(seconds > 0);
        assert!(seconds <= 24 * 3600);
    }

    #[test]
    fn seconds_until_next_weekly_run_is_within_7_days() {
        let seconds = seconds_until_next_run(3, 0, Some(2));
        assert!(seconds > 0);
        assert!(seconds <= 7 * 24 * 3600);
    }
}
