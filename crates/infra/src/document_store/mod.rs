//! Document store boundary.
//!
//! This module defines the infrastructure-facing abstraction the rest of the
//! workspace uses to read and write documents: typed field values, filtered
//! collection queries and atomic write batches, with an in-memory backend for
//! tests/dev and a Postgres backend for deployments.

pub mod batch;
pub mod changes;
pub mod document;
pub mod in_memory;
pub mod path;
pub mod postgres;
pub mod query;
pub mod r#trait;
pub mod value;

pub use batch::{CommitReceipt, FieldUpdate, Precondition, UpdateOp, WriteBatch, WriteOp};
pub use changes::{ChangeFeed, CreatedDocuments};
pub use document::Document;
pub use in_memory::InMemoryDocumentStore;
pub use path::DocumentPath;
pub use postgres::PostgresDocumentStore;
pub use query::{Filter, FilterOp, Query};
pub use r#trait::{DocumentStore, DocumentStoreError};
pub use value::{FieldValue, Fields, ValueKind};
