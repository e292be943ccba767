//! Postgres-backed document store.
//!
//! Documents live in a single `documents` table keyed by `(collection, id)`,
//! with the fields stored as JSONB in their tagged encoding (see `value`).
//!
//! ## Queries
//!
//! Every predicate is translated to SQL and evaluated by Postgres:
//!
//! | op | SQL |
//! |----|-----|
//! | `==` | `fields -> f = v` |
//! | `!=` | `jsonb_exists(fields, f) AND fields -> f <> v AND fields -> f <> '"nullValue"'` |
//! | `<`, `<=`, `>`, `>=` | kind tag present on `fields -> f`, then `fields -> f <op> v` |
//!
//! Tagged values of the same kind are single-key JSON objects with the same key,
//! so JSONB ordering compares the inner values: numbers numerically, strings
//! (and fixed-width timestamps) lexicographically.
//!
//! ## Commits
//!
//! A batch runs in one transaction. Every target row is first locked with
//! `SELECT … FOR UPDATE` in `(collection, id)` order, whatever order the batch
//! lists its writes in, so two batches sharing rows never wait on each other in
//! a cycle. Writes are then applied in batch order against the locked state, so
//! preconditions and increments see the latest committed values.
//!
//! ## Change Feed
//!
//! An `AFTER INSERT` trigger on `documents` sends `pg_notify('documents_created',
//! '<collection>/<id>')`. Postgres delivers it only once the inserting
//! transaction commits, and it fires for every writer of the table, not just
//! this process. `listen_for_changes` forwards those notifications to
//! `subscribe_created` receivers.
//!
//! ## Error Mapping
//!
//! | SQLx Error | DocumentStoreError |
//! |------------|--------------------|
//! | PoolTimedOut / PoolClosed / Io | `Unavailable` |
//! | Database (serialization failure `40001`, deadlock `40P01`) | `Unavailable` |
//! | anything else | `Storage` |

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn, Span};

use super::batch::{CommitReceipt, WriteBatch, WriteOp};
use super::changes::{ChangeFeed, CreatedDocuments};
use super::document::Document;
use super::path::{validate_collection, DocumentPath};
use super::query::{Filter, FilterOp, Query};
use super::r#trait::{DocumentStore, DocumentStoreError};
use super::value::{FieldValue, Fields};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    collection  TEXT        NOT NULL,
    id          TEXT        NOT NULL,
    fields      JSONB       NOT NULL DEFAULT '{}'::jsonb,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (collection, id)
);

CREATE INDEX IF NOT EXISTS documents_tasks_deadline_idx
    ON documents ((fields -> 'deadline'))
    WHERE collection = 'tasks';

CREATE OR REPLACE FUNCTION documents_notify_created() RETURNS trigger AS $$
BEGIN
    PERFORM pg_notify('documents_created', NEW.collection || '/' || NEW.id);
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS documents_created_notify ON documents;
CREATE TRIGGER documents_created_notify
    AFTER INSERT ON documents
    FOR EACH ROW EXECUTE FUNCTION documents_notify_created();
"#;

/// Channel the insert trigger notifies on.
pub const CREATED_CHANNEL: &str = "documents_created";

/// Postgres-backed document store.
///
/// Uses an SQLx connection pool, so the store is `Send + Sync` and cheap to share.
#[derive(Debug, Clone)]
pub struct PostgresDocumentStore {
    pool: Arc<PgPool>,
    changes: ChangeFeed,
}

impl PostgresDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            changes: ChangeFeed::new(),
        }
    }

    /// Connect a pool of at most `max_connections` to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, DocumentStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the `documents` table and its indexes if missing.
    pub async fn ensure_schema(&self) -> Result<(), DocumentStoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    /// Start forwarding `documents_created` notifications to subscribers.
    ///
    /// The listener holds its own connection and reconnects on failure;
    /// notifications sent while it is disconnected are lost. Abort the returned
    /// handle to stop it.
    pub async fn listen_for_changes(&self) -> Result<JoinHandle<()>, DocumentStoreError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("listen_connect", e))?;
        listener
            .listen(CREATED_CHANNEL)
            .await
            .map_err(|e| map_sqlx_error("listen", e))?;

        let changes = self.changes.clone();
        Ok(tokio::spawn(async move {
            info!(channel = CREATED_CHANNEL, "listening for created documents");
            loop {
                match listener.recv().await {
                    Ok(notification) => match DocumentPath::parse(notification.payload()) {
                        Ok(path) => {
                            debug!(path = %path, "document created");
                            changes.publish_created(path);
                        }
                        Err(e) => warn!(error = %e, "ignoring malformed created-document notification"),
                    },
                    Err(e) => {
                        warn!(error = %e, "created-document listener lost its connection; retrying");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }))
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    #[instrument(skip(self), fields(path = %path), err)]
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, DocumentStoreError> {
        let row = sqlx::query("SELECT fields FROM documents WHERE collection = $1 AND id = $2")
            .bind(path.collection())
            .bind(path.id())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?;

        match row {
            Some(row) => {
                let fields = decode_fields(path.to_string(), &row)?;
                Ok(Some(Document::new(path.clone(), fields)))
            }
            None => Ok(None),
        }
    }

    #[instrument(
        skip(self, query),
        fields(collection = %query.collection, filters = query.filters.len(), matched = tracing::field::Empty),
        err
    )]
    async fn query(&self, query: &Query) -> Result<Vec<Document>, DocumentStoreError> {
        let mut sql = select_query(query)?;
        let rows = sql
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("query", e))?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row
                .try_get("id")
                .map_err(|e| map_sqlx_error("query.decode_id", e))?;
            let path = DocumentPath::new(query.collection.clone(), id)?;
            let fields = decode_fields(path.to_string(), &row)?;
            documents.push(Document::new(path, fields));
        }

        Span::current().record("matched", documents.len());
        Ok(documents)
    }

    #[instrument(skip(self, batch), fields(writes = batch.len()), err)]
    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt, DocumentStoreError> {
        let writes = batch.len();
        if writes == 0 {
            return Ok(CommitReceipt {
                writes,
                committed_at: Utc::now(),
            });
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Any early return drops `tx`, which rolls the transaction back.
        let mut staged = lock_targets(&mut tx, batch.ops()).await?;
        for op in batch.ops() {
            let current = staged.get(op.path()).and_then(Option::as_ref);
            let next = op.apply(current)?;
            staged.insert(op.path().clone(), Some(next));
        }
        for (path, fields) in &staged {
            if let Some(fields) = fields {
                write_document(&mut tx, path, fields).await?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(CommitReceipt {
            writes,
            committed_at: Utc::now(),
        })
    }

    fn subscribe_created(&self) -> CreatedDocuments {
        self.changes.subscribe()
    }
}

/// Distinct write targets in lock order.
fn lock_order(ops: &[WriteOp]) -> Vec<&DocumentPath> {
    ops.iter()
        .map(WriteOp::path)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Lock every target row in `lock_order`, returning the current fields of
/// each (`None` for documents that do not exist yet).
async fn lock_targets(
    tx: &mut Transaction<'_, Postgres>,
    ops: &[WriteOp],
) -> Result<BTreeMap<DocumentPath, Option<Fields>>, DocumentStoreError> {
    let mut locked = BTreeMap::new();
    for path in lock_order(ops) {
        let row = sqlx::query(
            "SELECT fields FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
        )
        .bind(path.collection())
        .bind(path.id())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_document", e))?;

        let current = match row {
            Some(row) => Some(decode_fields(path.to_string(), &row)?),
            None => None,
        };
        locked.insert(path.clone(), current);
    }
    Ok(locked)
}

async fn write_document(
    tx: &mut Transaction<'_, Postgres>,
    path: &DocumentPath,
    fields: &Fields,
) -> Result<(), DocumentStoreError> {
    sqlx::query(
        r#"
        INSERT INTO documents (collection, id, fields, updated_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (collection, id)
        DO UPDATE SET fields = EXCLUDED.fields, updated_at = NOW()
        "#,
    )
    .bind(path.collection())
    .bind(path.id())
    .bind(Json(fields))
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("write_document", e))?;

    Ok(())
}

fn select_query(query: &Query) -> Result<QueryBuilder<'static, Postgres>, DocumentStoreError> {
    validate_collection(&query.collection)?;

    let mut sql = QueryBuilder::new("SELECT id, fields FROM documents WHERE collection = ");
    sql.push_bind(query.collection.clone());
    for filter in &query.filters {
        sql.push(" AND ");
        push_filter(&mut sql, filter)?;
    }
    Ok(sql)
}

fn push_filter(sql: &mut QueryBuilder<'_, Postgres>, filter: &Filter) -> Result<(), DocumentStoreError> {
    let encoded = encode_value(&filter.value)?;

    match filter.op {
        FilterOp::Eq => {
            sql.push("fields -> ");
            sql.push_bind(filter.field.clone());
            sql.push(" = ");
            sql.push_bind(Json(encoded));
        }
        FilterOp::Ne => {
            sql.push("jsonb_exists(fields, ");
            sql.push_bind(filter.field.clone());
            sql.push(") AND fields -> ");
            sql.push_bind(filter.field.clone());
            sql.push(" <> ");
            sql.push_bind(Json(encoded));
            sql.push(" AND fields -> ");
            sql.push_bind(filter.field.clone());
            sql.push(" <> '\"nullValue\"'::jsonb");
        }
        op => {
            let tags = filter.value.kind().tags();
            if tags.is_empty() {
                // Nothing orders against null.
                sql.push("FALSE");
                return Ok(());
            }

            sql.push("jsonb_exists_any(fields -> ");
            sql.push_bind(filter.field.clone());
            sql.push(", ");
            sql.push_bind(tags.iter().map(|t| t.to_string()).collect::<Vec<String>>());
            sql.push(") AND fields -> ");
            sql.push_bind(filter.field.clone());
            sql.push(match op {
                FilterOp::Lt => " < ",
                FilterOp::Le => " <= ",
                FilterOp::Gt => " > ",
                _ => " >= ",
            });
            sql.push_bind(Json(encoded));
        }
    }
    Ok(())
}

fn encode_value(value: &FieldValue) -> Result<serde_json::Value, DocumentStoreError> {
    serde_json::to_value(value)
        .map_err(|e| DocumentStoreError::Storage(format!("failed to encode filter value: {e}")))
}

fn decode_fields(path: String, row: &sqlx::postgres::PgRow) -> Result<Fields, DocumentStoreError> {
    let Json(fields) = row
        .try_get::<Json<Fields>, _>("fields")
        .map_err(|e| DocumentStoreError::Malformed {
            path,
            detail: e.to_string(),
        })?;
    Ok(fields)
}

/// Map SQLx errors to `DocumentStoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DocumentStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // serialization_failure / deadlock_detected: transient
                Some("40001") | Some("40P01") => DocumentStoreError::Unavailable(msg),
                _ => DocumentStoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            DocumentStoreError::Unavailable(format!("{} in {}", err, operation))
        }
        _ => DocumentStoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
