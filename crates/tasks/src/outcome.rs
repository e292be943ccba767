//! Per-task results and the per-run summary.
//!
//! Nothing here is persisted; it exists so a run can be logged and so tests can
//! assert on what a run did.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use taskboard_core::TaskId;

use crate::task::SkipReason;

/// What happened to one candidate task during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PenaltyOutcome {
    /// The batch committed: flag set and every member decremented.
    Applied {
        task_id: TaskId,
        members: usize,
        points: i64,
    },
    /// The task failed validation and was left untouched.
    Skipped { task_id: TaskId, reason: SkipReason },
    /// Another run committed the penalty first; this batch was a no-op.
    AlreadyPenalized { task_id: TaskId },
    /// The batch was rejected as a whole; the task stays a candidate.
    Failed { task_id: TaskId, reason: String },
}

impl PenaltyOutcome {
    pub fn task_id(&self) -> &TaskId {
        match self {
            PenaltyOutcome::Applied { task_id, .. }
            | PenaltyOutcome::Skipped { task_id, .. }
            | PenaltyOutcome::AlreadyPenalized { task_id }
            | PenaltyOutcome::Failed { task_id, .. } => task_id,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, PenaltyOutcome::Applied { .. })
    }
}

/// Aggregated result of one enforcement run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub candidates: usize,
    pub applied: usize,
    pub skipped: usize,
    pub already_penalized: usize,
    pub failed: usize,
    /// Sum of all member decrements that committed in this run.
    pub points_deducted: i64,
    pub outcomes: Vec<PenaltyOutcome>,
}

impl RunSummary {
    /// Summary of a run whose scan found nothing.
    pub fn empty(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self::from_outcomes(run_id, started_at, Vec::new())
    }

    pub fn from_outcomes(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        outcomes: Vec<PenaltyOutcome>,
    ) -> Self {
        let mut summary = Self {
            run_id,
            started_at,
            candidates: outcomes.len(),
            applied: 0,
            skipped: 0,
            already_penalized: 0,
            failed: 0,
            points_deducted: 0,
            outcomes: Vec::new(),
        };

        for outcome in &outcomes {
            match outcome {
                PenaltyOutcome::Applied {
                    members, points, ..
                } => {
                    summary.applied += 1;
                    summary.points_deducted = summary
                        .points_deducted
                        .saturating_add(points.saturating_mul(*members as i64));
                }
                PenaltyOutcome::Skipped { .. } => summary.skipped += 1,
                PenaltyOutcome::AlreadyPenalized { .. } => summary.already_penalized += 1,
                PenaltyOutcome::Failed { .. } => summary.failed += 1,
            }
        }

        summary.outcomes = outcomes;
        summary
    }

    pub fn is_empty(&self) -> bool {
        self.candidates == 0
    }

    pub fn outcome_for(&self, task_id: &TaskId) -> Option<&PenaltyOutcome> {
        self.outcomes.iter().find(|o| o.task_id() == task_id)
    }
}
