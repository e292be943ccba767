use std::sync::Arc;

use tracing::{info, warn};

use taskboard_tasks::{PenaltyOutcome, PenaltyTarget};

use crate::document_store::{DocumentStore, DocumentStoreError, UpdateOp, WriteBatch};

use super::records;

/// Commits one penalty as a single atomic batch.
///
/// The batch marks the task penalized (only if it is still unpenalized) and
/// decrements every assigned member's balance with a store-side increment.
pub struct PenaltyApplier<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for PenaltyApplier<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S> PenaltyApplier<S>
where
    S: DocumentStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Build the write set for `target` without committing it.
    pub fn build_batch(target: &PenaltyTarget) -> Result<WriteBatch, DocumentStoreError> {
        let mut batch = WriteBatch::new();
        batch.update(
            UpdateOp::new(records::task_path(&target.task_id)?)
                .when_equals(records::PENALTY_APPLIED, false)
                .set(records::PENALTY_APPLIED, true),
        );

        let delta = target.points.delta();
        for member_id in &target.members {
            batch.update(
                UpdateOp::new(records::member_path(&target.board_id, member_id)?)
                    .increment(records::POINTS, delta),
            );
        }
        Ok(batch)
    }

    /// Commit the penalty for `target`. Never returns an error: failures are
    /// reported as outcomes so one task cannot affect another.
    pub async fn apply(&self, target: &PenaltyTarget) -> PenaltyOutcome {
        let task_id = target.task_id.clone();

        let result = match Self::build_batch(target) {
            Ok(batch) => self.store.commit(batch).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(_) => {
                info!(
                    task_id = %task_id,
                    board_id = %target.board_id,
                    members = target.members.len(),
                    points = target.points.get(),
                    "penalty applied"
                );
                PenaltyOutcome::Applied {
                    task_id,
                    members: target.members.len(),
                    points: target.points.get(),
                }
            }
            // Only the task write carries a field guard.
            Err(e) if e.is_precondition_failure() => {
                info!(task_id = %task_id, "penalty already applied by another run");
                PenaltyOutcome::AlreadyPenalized { task_id }
            }
            Err(e) => {
                warn!(task_id = %task_id, board_id = %target.board_id, error = %e, "penalty batch failed");
                PenaltyOutcome::Failed {
                    task_id,
                    reason: e.to_string(),
                }
            }
        }
    }
}
