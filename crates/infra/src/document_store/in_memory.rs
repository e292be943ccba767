use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use super::batch::{CommitReceipt, WriteBatch};
use super::changes::{ChangeFeed, CreatedDocuments};
use super::document::Document;
use super::path::{validate_collection, DocumentPath};
use super::query::Query;
use super::r#trait::{DocumentStore, DocumentStoreError};
use super::value::Fields;

#[derive(Debug, Default)]
struct Faults {
    failing_queries: usize,
    failing_commits: usize,
    failing_paths: HashSet<DocumentPath>,
}

/// In-memory document store.
///
/// Intended for tests/dev. Commits run under a single write lock, which makes
/// every batch (preconditions included) atomic with respect to other commits.
///
/// Faults can be injected to exercise failure handling: the next N queries or
/// commits fail with `Unavailable`, or any commit touching a given path fails.
///
/// Documents created by `commit` are published to subscribers; `insert` is
/// silent.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    docs: RwLock<HashMap<DocumentPath, Fields>>,
    faults: Mutex<Faults>,
    changes: ChangeFeed,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a document directly, bypassing batches and faults (seeding).
    pub fn insert(&self, path: DocumentPath, fields: Fields) {
        if let Ok(mut docs) = self.docs.write() {
            docs.insert(path, fields);
        }
    }

    /// Current fields of a document, if present.
    pub fn snapshot(&self, path: &DocumentPath) -> Option<Fields> {
        self.docs.read().ok()?.get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fail the next `n` queries with `Unavailable`.
    pub fn fail_next_queries(&self, n: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.failing_queries = n;
        }
    }

    /// Fail the next `n` commits with `Unavailable`.
    pub fn fail_next_commits(&self, n: usize) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.failing_commits = n;
        }
    }

    /// Fail every commit that writes to `path` until cleared.
    pub fn fail_commits_touching(&self, path: DocumentPath) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.failing_paths.insert(path);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            *faults = Faults::default();
        }
    }

    fn take_query_fault(&self) -> bool {
        match self.faults.lock() {
            Ok(mut faults) if faults.failing_queries > 0 => {
                faults.failing_queries -= 1;
                true
            }
            _ => false,
        }
    }

    fn take_commit_fault(&self, batch: &WriteBatch) -> Option<String> {
        let mut faults = self.faults.lock().ok()?;
        if faults.failing_commits > 0 {
            faults.failing_commits -= 1;
            return Some("injected commit failure".to_string());
        }
        batch
            .ops()
            .iter()
            .find(|op| faults.failing_paths.contains(op.path()))
            .map(|op| format!("injected failure writing {}", op.path()))
    }

    fn poisoned() -> DocumentStoreError {
        DocumentStoreError::Storage("lock poisoned".to_string())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, DocumentStoreError> {
        let docs = self.docs.read().map_err(|_| Self::poisoned())?;
        Ok(docs
            .get(path)
            .map(|fields| Document::new(path.clone(), fields.clone())))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, DocumentStoreError> {
        validate_collection(&query.collection)?;
        if self.take_query_fault() {
            return Err(DocumentStoreError::Unavailable(
                "injected query failure".to_string(),
            ));
        }

        let docs = self.docs.read().map_err(|_| Self::poisoned())?;
        Ok(docs
            .iter()
            .filter(|(path, fields)| query.matches(path, fields))
            .map(|(path, fields)| Document::new(path.clone(), fields.clone()))
            .collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, DocumentStoreError> {
        if let Some(reason) = self.take_commit_fault(&batch) {
            return Err(DocumentStoreError::Unavailable(reason));
        }

        let mut docs = self.docs.write().map_err(|_| Self::poisoned())?;

        // Stage every write first; nothing touches `docs` until all succeed.
        let mut staged: HashMap<DocumentPath, Fields> = HashMap::new();
        for op in batch.ops() {
            let current = staged.get(op.path()).or_else(|| docs.get(op.path()));
            let next = op.apply(current)?;
            staged.insert(op.path().clone(), next);
        }

        let writes = batch.len();
        let created: Vec<DocumentPath> = staged
            .keys()
            .filter(|path| !docs.contains_key(*path))
            .cloned()
            .collect();
        docs.extend(staged);
        drop(docs);

        for path in created {
            self.changes.publish_created(path);
        }

        Ok(CommitReceipt {
            writes,
            committed_at: Utc::now(),
        })
    }

    fn subscribe_created(&self) -> CreatedDocuments {
        self.changes.subscribe()
    }
}
