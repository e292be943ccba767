//! The overdue penalty run.
//!
//! One invocation scans for candidates, drops the ones with missing data,
//! fans the rest out to the applier with bounded concurrency and aggregates
//! the per-task outcomes into a `RunSummary`.
//!
//! A run keeps no state between invocations. Anything that fails is simply
//! found again by the next run's scan.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use taskboard_core::TaskId;
use taskboard_tasks::{PenaltyOutcome, RunSummary};

use crate::document_store::{DocumentStore, DocumentStoreError};

use super::applier::PenaltyApplier;
use super::clock::{Clock, SystemClock};
use super::scanner::OverdueTaskScanner;

/// Enforcement run error.
///
/// Only the scan can fail a run; per-task failures become outcomes.
#[derive(Debug, Error)]
pub enum EnforcementError {
    #[error("overdue task scan failed: {0}")]
    Scan(#[from] DocumentStoreError),
}

/// Enforcement job configuration.
#[derive(Debug, Clone)]
pub struct EnforcementJobConfig {
    /// Maximum penalty batches in flight within one run
    pub max_concurrent: usize,
}

impl Default for EnforcementJobConfig {
    fn default() -> Self {
        Self { max_concurrent: 16 }
    }
}

impl EnforcementJobConfig {
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }
}

/// Scans for overdue tasks and applies their penalties.
pub struct EnforcementJob<S: ?Sized, C = SystemClock> {
    scanner: OverdueTaskScanner<S>,
    applier: PenaltyApplier<S>,
    clock: C,
    config: EnforcementJobConfig,
}

impl<S> EnforcementJob<S, SystemClock>
where
    S: DocumentStore + ?Sized + 'static,
{
    /// Job on the wall clock.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S, C> EnforcementJob<S, C>
where
    S: DocumentStore + ?Sized + 'static,
    C: Clock,
{
    pub fn with_clock(store: Arc<S>, clock: C) -> Self {
        Self {
            scanner: OverdueTaskScanner::new(store.clone()),
            applier: PenaltyApplier::new(store),
            clock,
            config: EnforcementJobConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EnforcementJobConfig) -> Self {
        self.config = config;
        self
    }

    /// Run once. Every log line of the run carries its `run_id`.
    pub async fn run(&self) -> Result<RunSummary, EnforcementError> {
        let run_id = Uuid::now_v7();
        let span = info_span!("penalty_run", run_id = %run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> Result<RunSummary, EnforcementError> {
        let now = self.clock.now();

        let candidates = self.scanner.scan(now).await.map_err(|e| {
            error!(error = %e, "overdue task scan failed; nothing processed");
            EnforcementError::Scan(e)
        })?;

        if candidates.is_empty() {
            info!("no overdue tasks; nothing to do");
            return Ok(RunSummary::empty(run_id, now));
        }

        let mut outcomes = Vec::with_capacity(candidates.len());
        let mut targets = Vec::new();
        for task in candidates {
            match task.validate() {
                Ok(target) => targets.push(target),
                Err(reason) => {
                    warn!(task_id = %task.id, reason = %reason, "skipping task with missing penalty data");
                    outcomes.push(PenaltyOutcome::Skipped {
                        task_id: task.id,
                        reason,
                    });
                }
            }
        }

        let permits = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut batches = JoinSet::new();
        let mut pending: HashSet<TaskId> = HashSet::with_capacity(targets.len());

        for target in targets {
            pending.insert(target.task_id.clone());
            let applier = self.applier.clone();
            let permits = permits.clone();
            batches.spawn(
                async move {
                    // The semaphore is never closed.
                    let _permit = permits.acquire_owned().await.ok();
                    applier.apply(&target).await
                }
                .instrument(Span::current()),
            );
        }

        while let Some(joined) = batches.join_next().await {
            match joined {
                Ok(outcome) => {
                    pending.remove(outcome.task_id());
                    outcomes.push(outcome);
                }
                Err(e) => error!(error = %e, "penalty task aborted"),
            }
        }

        // Whatever never reported back panicked.
        for task_id in pending {
            warn!(task_id = %task_id, "penalty task panicked; counted as failed");
            outcomes.push(PenaltyOutcome::Failed {
                task_id,
                reason: "penalty task panicked".to_string(),
            });
        }

        let summary = RunSummary::from_outcomes(run_id, now, outcomes);
        info!(
            candidates = summary.candidates,
            applied = summary.applied,
            skipped = summary.skipped,
            already_penalized = summary.already_penalized,
            failed = summary.failed,
            points_deducted = summary.points_deducted,
            "penalty run finished"
        );
        Ok(summary)
    }
}
