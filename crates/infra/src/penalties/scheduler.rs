use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::document_store::DocumentStore;

use super::clock::Clock;
use super::job::EnforcementJob;

/// Timer trigger for the enforcement job.
#[derive(Debug, Clone)]
pub struct PenaltyScheduler {
    pub interval: Duration,
    pub run_on_startup: bool,
}

impl Default for PenaltyScheduler {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            run_on_startup: false,
        }
    }
}

/// Cumulative scheduler statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub tasks_applied: u64,
    pub tasks_skipped: u64,
    pub tasks_already_penalized: u64,
    pub tasks_failed: u64,
}

/// Handle for a running scheduler (trigger + shutdown).
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: Arc<Notify>,
    trigger: Arc<Notify>,
    join: Option<JoinHandle<()>>,
    stats: Arc<Mutex<SchedulerStats>>,
}

impl SchedulerHandle {
    /// Request a run now, outside the interval.
    ///
    /// Triggers are coalesced: any number of calls before the scheduler wakes
    /// up start a single run.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Stop ticking and wait for in-flight runs to finish.
    pub async fn shutdown(mut self) {
        self.shutdown.notify_one();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                error!(error = %e, "penalty scheduler loop ended abnormally");
            }
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        lock(&self.stats).clone()
    }
}

impl PenaltyScheduler {
    /// Longest interval the loop honours; longer ones are clamped.
    pub const MAX_INTERVAL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_run_on_startup(mut self, run_on_startup: bool) -> Self {
        self.run_on_startup = run_on_startup;
        self
    }

    /// Spawn the scheduler loop on the current tokio runtime.
    ///
    /// Every tick spawns a run as its own task, so a slow run never delays the
    /// next tick and two runs may overlap. Missed ticks are skipped.
    pub fn spawn<S, C>(&self, job: Arc<EnforcementJob<S, C>>) -> SchedulerHandle
    where
        S: DocumentStore + ?Sized + 'static,
        C: Clock + 'static,
    {
        let shutdown = Arc::new(Notify::new());
        let trigger = Arc::new(Notify::new());
        let stats = Arc::new(Mutex::new(SchedulerStats::default()));

        let join = tokio::spawn(scheduler_loop(
            self.clone(),
            job,
            shutdown.clone(),
            trigger.clone(),
            stats.clone(),
        ));

        SchedulerHandle {
            shutdown,
            trigger,
            join: Some(join),
            stats,
        }
    }
}

async fn scheduler_loop<S, C>(
    cfg: PenaltyScheduler,
    job: Arc<EnforcementJob<S, C>>,
    shutdown: Arc<Notify>,
    trigger: Arc<Notify>,
    stats: Arc<Mutex<SchedulerStats>>,
) where
    S: DocumentStore + ?Sized + 'static,
    C: Clock + 'static,
{
    info!(
        interval_secs = cfg.interval.as_secs(),
        run_on_startup = cfg.run_on_startup,
        "penalty scheduler started"
    );

    // `interval_at` panics on a zero period.
    let period = cfg
        .interval
        .clamp(Duration::from_millis(1), PenaltyScheduler::MAX_INTERVAL);
    let now = Instant::now();
    let first = if cfg.run_on_startup {
        now
    } else {
        now.checked_add(period).unwrap_or_else(|| far_future(now))
    };
    let mut ticker = tokio::time::interval_at(first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut runs: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            // Shutdown has priority.
            biased;
            _ = shutdown.notified() => {
                info!(in_flight = runs.len(), "penalty scheduler received shutdown signal");
                break;
            }
            Some(joined) = runs.join_next(), if !runs.is_empty() => {
                reap(joined, &stats);
                continue;
            }
            _ = trigger.notified() => {
                debug!("manual penalty run requested");
            }
            _ = ticker.tick() => {}
        }

        lock(&stats).runs_started += 1;
        let job = job.clone();
        let stats = stats.clone();
        runs.spawn(async move {
            match job.run().await {
                Ok(summary) => {
                    let mut stats = lock(&stats);
                    stats.runs_completed += 1;
                    stats.tasks_applied += summary.applied as u64;
                    stats.tasks_skipped += summary.skipped as u64;
                    stats.tasks_already_penalized += summary.already_penalized as u64;
                    stats.tasks_failed += summary.failed as u64;
                }
                Err(e) => {
                    error!(error = %e, "penalty run failed");
                    lock(&stats).runs_failed += 1;
                }
            }
        });
    }

    while let Some(joined) = runs.join_next().await {
        reap(joined, &stats);
    }

    info!("penalty scheduler stopped");
}

fn far_future(now: Instant) -> Instant {
    // Roughly 30 years, which every platform's `Instant` can represent.
    now + Duration::from_secs(86400 * 365 * 30)
}

fn reap(joined: Result<(), JoinError>, stats: &Mutex<SchedulerStats>) {
    if let Err(e) = joined {
        error!(error = %e, "penalty run panicked");
        lock(stats).runs_failed += 1;
    }
}

fn lock(stats: &Mutex<SchedulerStats>) -> std::sync::MutexGuard<'_, SchedulerStats> {
    stats.lock().unwrap_or_else(|e| e.into_inner())
}
