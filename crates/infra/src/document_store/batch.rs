//! Atomic write batches (unit of work).
//!
//! A `WriteBatch` collects field-level operations against named documents and
//! is handed to `DocumentStore::commit` as a single all-or-nothing unit. Both
//! backends evaluate preconditions and apply updates through the helpers in
//! this module, so their semantics cannot drift apart.

use serde::{Deserialize, Serialize};

use super::path::DocumentPath;
use super::value::{FieldValue, Fields};
use super::DocumentStoreError;

/// How a single field changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldUpdate {
    /// Overwrite the field.
    Set(FieldValue),
    /// Add `delta` to the stored number without reading it client-side.
    ///
    /// A missing or non-numeric field is replaced by `delta`.
    Increment(i64),
}

/// Condition that must hold on the stored document for a write to proceed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Precondition {
    /// The document must exist (implied by every update).
    Exists,
    /// The field must currently equal `value`.
    FieldEquals { field: String, value: FieldValue },
}

impl Precondition {
    pub fn check(&self, path: &DocumentPath, current: Option<&Fields>) -> Result<(), DocumentStoreError> {
        let Some(fields) = current else {
            return Err(DocumentStoreError::NotFound(path.clone()));
        };

        match self {
            Precondition::Exists => Ok(()),
            Precondition::FieldEquals { field, value } => {
                let actual = fields.get(field);
                if actual.and_then(|a| a.compare(value)) == Some(core::cmp::Ordering::Equal) {
                    Ok(())
                } else {
                    Err(DocumentStoreError::PreconditionFailed {
                        path: path.clone(),
                        detail: format!("expected {field} == {value:?}, found {actual:?}"),
                    })
                }
            }
        }
    }
}

/// Field updates against one existing document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOp {
    pub path: DocumentPath,
    pub updates: Vec<(String, FieldUpdate)>,
    pub preconditions: Vec<Precondition>,
}

impl UpdateOp {
    pub fn new(path: DocumentPath) -> Self {
        Self {
            path,
            updates: Vec::new(),
            preconditions: vec![Precondition::Exists],
        }
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.updates.push((field.into(), FieldUpdate::Set(value.into())));
        self
    }

    pub fn increment(mut self, field: impl Into<String>, delta: i64) -> Self {
        self.updates.push((field.into(), FieldUpdate::Increment(delta)));
        self
    }

    /// Only apply if `field` currently equals `value` (compare-and-set).
    pub fn when_equals(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.preconditions.push(Precondition::FieldEquals {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Check every precondition against `current`, then return the updated fields.
    pub fn apply(&self, current: Option<&Fields>) -> Result<Fields, DocumentStoreError> {
        for precondition in &self.preconditions {
            precondition.check(&self.path, current)?;
        }

        let mut fields = current.cloned().unwrap_or_default();
        for (name, update) in &self.updates {
            match update {
                FieldUpdate::Set(value) => {
                    fields.insert(name.clone(), value.clone());
                }
                FieldUpdate::Increment(delta) => {
                    let next = match fields.get(name) {
                        Some(FieldValue::Integer(n)) => FieldValue::Integer(n.saturating_add(*delta)),
                        Some(FieldValue::Double(d)) => FieldValue::Double(d + *delta as f64),
                        _ => FieldValue::Integer(*delta),
                    };
                    fields.insert(name.clone(), next);
                }
            }
        }
        Ok(fields)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriteOp {
    /// Create or overwrite the whole document.
    Set { path: DocumentPath, fields: Fields },
    Update(UpdateOp),
}

impl WriteOp {
    pub fn path(&self) -> &DocumentPath {
        match self {
            WriteOp::Set { path, .. } => path,
            WriteOp::Update(op) => &op.path,
        }
    }

    /// Compute the document that results from this write.
    pub fn apply(&self, current: Option<&Fields>) -> Result<Fields, DocumentStoreError> {
        match self {
            WriteOp::Set { fields, .. } => Ok(fields.clone()),
            WriteOp::Update(op) => op.apply(current),
        }
    }
}

/// Ordered set of writes committed atomically.
///
/// Writes to the same document apply in insertion order within the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: DocumentPath, fields: Fields) -> &mut Self {
        self.ops.push(WriteOp::Set { path, fields });
        self
    }

    pub fn update(&mut self, op: UpdateOp) -> &mut Self {
        self.ops.push(WriteOp::Update(op));
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Acknowledgement of a committed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReceipt {
    pub writes: usize,
    pub committed_at: chrono::DateTime<chrono::Utc>,
}
