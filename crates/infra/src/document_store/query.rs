//! Filtered collection queries.
//!
//! A query is a conjunction of `(field, operator, value)` predicates evaluated
//! by the store. A document whose field is missing never matches a predicate on
//! that field.

use serde::{Deserialize, Serialize};

use super::path::DocumentPath;
use super::value::{FieldValue, Fields};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOp {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
}

impl FilterOp {
    pub fn symbol(self) -> &'static str {
        match self {
            FilterOp::Lt => "<",
            FilterOp::Le => "<=",
            FilterOp::Eq => "==",
            FilterOp::Ne => "!=",
            FilterOp::Gt => ">",
            FilterOp::Ge => ">=",
        }
    }

    pub fn is_ordering(self) -> bool {
        matches!(self, FilterOp::Lt | FilterOp::Le | FilterOp::Gt | FilterOp::Ge)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: FieldValue,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: FilterOp, value: impl Into<FieldValue>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        let Some(actual) = fields.get(&self.field) else {
            return false;
        };

        let ord = actual.compare(&self.value);
        match self.op {
            FilterOp::Eq => ord == Some(core::cmp::Ordering::Equal),
            // `!=` also requires a present, non-null value.
            FilterOp::Ne => !actual.is_null() && ord != Some(core::cmp::Ordering::Equal),
            FilterOp::Lt => ord.is_some_and(|o| o.is_lt()),
            FilterOp::Le => ord.is_some_and(|o| o.is_le()),
            FilterOp::Gt => ord.is_some_and(|o| o.is_gt()),
            FilterOp::Ge => ord.is_some_and(|o| o.is_ge()),
        }
    }
}

impl core::fmt::Display for Filter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {} {:?}", self.field, self.op.symbol(), self.value)
    }
}

/// Query over one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
}

impl Query {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
        }
    }

    /// Add a predicate; all predicates must hold.
    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<FieldValue>) -> Self {
        self.filters.push(Filter::new(field, op, value));
        self
    }

    /// Evaluate the query against one document.
    pub fn matches(&self, path: &DocumentPath, fields: &Fields) -> bool {
        path.collection() == self.collection && self.filters.iter().all(|f| f.matches(fields))
    }
}
