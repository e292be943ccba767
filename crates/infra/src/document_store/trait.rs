use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::batch::{CommitReceipt, WriteBatch};
use super::changes::CreatedDocuments;
use super::document::Document;
use super::path::DocumentPath;
use super::query::Query;

/// Document store operation error.
///
/// These are **infrastructure errors** (availability, preconditions, storage)
/// as opposed to domain errors (validation).
///
/// ## Error Categories
///
/// - **NotFound**: an update targeted a document that does not exist
/// - **PreconditionFailed**: a compare-and-set guard did not hold
/// - **Unavailable**: the backend could not be reached; safe to retry later
/// - **Storage**: any other backend failure
#[derive(Debug, Clone, Error)]
pub enum DocumentStoreError {
    #[error("document not found: {0}")]
    NotFound(DocumentPath),

    #[error("precondition failed on {path}: {detail}")]
    PreconditionFailed { path: DocumentPath, detail: String },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("malformed document {path}: {detail}")]
    Malformed { path: String, detail: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl DocumentStoreError {
    /// `true` if the failure was a compare-and-set guard, not a fault.
    pub fn is_precondition_failure(&self) -> bool {
        matches!(self, DocumentStoreError::PreconditionFailed { .. })
    }
}

/// Collection-oriented document store.
///
/// ## Design Principles
///
/// - **Store-side filtering**: `query` evaluates every predicate in the backend;
///   callers never post-filter on queried fields
/// - **Atomic batches**: `commit` applies every write or none of them
/// - **Commutative increments**: `FieldUpdate::Increment` is applied against
///   the committed value inside the backend, so concurrent increments never
///   lose updates
/// - **Conditional writes**: preconditions are evaluated inside the same
///   atomic step as the writes they guard
///
/// ## Implementation Requirements
///
/// Implementations must:
/// - return an empty vector, not an error, when nothing matches
/// - reject a batch as a whole when any write's precondition fails
/// - leave no partial state behind when `commit` returns an error
/// - publish a created path only once the creating commit is durable
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load one document.
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, DocumentStoreError>;

    /// Return every document in `query.collection` matching all filters.
    /// No ordering guarantee.
    async fn query(&self, query: &Query) -> Result<Vec<Document>, DocumentStoreError>;

    /// Commit all writes atomically.
    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, DocumentStoreError>;

    /// Paths of documents created after this call, by any writer the backend
    /// can observe.
    fn subscribe_created(&self) -> CreatedDocuments;
}

#[async_trait]
impl<S> DocumentStore for Arc<S>
where
    S: DocumentStore + ?Sized,
{
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, DocumentStoreError> {
        (**self).get(path).await
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, DocumentStoreError> {
        (**self).query(query).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, DocumentStoreError> {
        (**self).commit(batch).await
    }

    fn subscribe_created(&self) -> CreatedDocuments {
        (**self).subscribe_created()
    }
}
