use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use taskboard_tasks::{OverdueTask, TaskStatus};

use crate::document_store::{DocumentStore, DocumentStoreError, FilterOp, Query};

use super::records::{self, decode_overdue_task};

/// Selects tasks whose penalty is due.
///
/// All three conditions (`deadline <= now`, `status != completed`,
/// `penaltyApplied == false`) are evaluated by the store.
pub struct OverdueTaskScanner<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for OverdueTaskScanner<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S> OverdueTaskScanner<S>
where
    S: DocumentStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The candidate query for a given cut-off.
    pub fn query(now: DateTime<Utc>) -> Query {
        Query::collection(records::TASKS)
            .filter(records::DEADLINE, FilterOp::Le, now)
            .filter(records::STATUS, FilterOp::Ne, TaskStatus::Completed.as_str())
            .filter(records::PENALTY_APPLIED, FilterOp::Eq, false)
    }

    /// Fetch every overdue, unpenalized, open task. No ordering guarantee.
    pub async fn scan(&self, now: DateTime<Utc>) -> Result<Vec<OverdueTask>, DocumentStoreError> {
        let docs = self.store.query(&Self::query(now)).await?;

        let mut tasks = Vec::with_capacity(docs.len());
        for doc in &docs {
            match decode_overdue_task(doc) {
                Some(task) => tasks.push(task),
                None => warn!(path = %doc.path, "ignoring task document with unusable id"),
            }
        }

        debug!(candidates = tasks.len(), cutoff = %now, "overdue scan finished");
        Ok(tasks)
    }
}
