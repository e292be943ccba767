use core::fmt;
use serde::{Deserialize, Serialize};

use super::DocumentStoreError;

/// Address of one document: a collection path plus a document id.
///
/// Collection paths alternate collection and document segments, so nested
/// collections look like `boards/b1/members_details`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentPath {
    collection: String,
    id: String,
}

impl DocumentPath {
    pub fn new(
        collection: impl Into<String>,
        id: impl Into<String>,
    ) -> Result<Self, DocumentStoreError> {
        let collection = collection.into();
        let id = id.into();

        validate_collection(&collection)?;
        if id.is_empty() || id.contains('/') {
            return Err(DocumentStoreError::InvalidPath(format!(
                "{collection}/{id}: document id must be a single non-empty segment"
            )));
        }

        Ok(Self { collection, id })
    }

    /// Parse `collection/.../id`.
    pub fn parse(raw: &str) -> Result<Self, DocumentStoreError> {
        match raw.rsplit_once('/') {
            Some((collection, id)) => Self::new(collection, id),
            None => Err(DocumentStoreError::InvalidPath(format!(
                "{raw}: expected <collection>/<id>"
            ))),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

pub(crate) fn validate_collection(collection: &str) -> Result<(), DocumentStoreError> {
    let segments: Vec<&str> = collection.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) || segments.len() % 2 == 0 {
        return Err(DocumentStoreError::InvalidPath(format!(
            "{collection}: not a collection path"
        )));
    }
    Ok(())
}
