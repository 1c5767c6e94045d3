//! Predicate evaluation and set combination
//!
//! A predicate names a field path and a value. It is resolved against the
//! index keyed by `(field, type of value)`; string values are lowercased
//! first because indexes store lowercase strings. The result of each
//! predicate is the id list of the matching equal range, in index order.
//!
//! Predicates carry an `operator`, but only equality is evaluated.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::document::DocumentId;
use crate::index::IndexKey;
use crate::table::Table;
use crate::value::Value;
use crate::log_trace;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: String,
    /// Accepted for compatibility; every predicate matches by equality
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    pub value: Value,
}

impl Predicate {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate {
            field: field.into(),
            operator: None,
            value: value.into(),
        }
    }

    /// Index this predicate is answered from, or `None` for non-scalar values
    pub fn index_key(&self) -> Option<IndexKey> {
        self.value
            .value_type()
            .map(|value_type| IndexKey::new(self.field.clone(), value_type))
    }
}

/// How per-predicate id lists are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl Combinator {
    pub fn combine(self, lists: Vec<Vec<DocumentId>>) -> Vec<DocumentId> {
        match self {
            Combinator::And => and(lists),
            Combinator::Or => or(lists),
        }
    }
}

/// Resolve each predicate to its matching ids.
///
/// A predicate whose index does not exist (or whose value can't be indexed)
/// yields an empty list rather than an error.
pub fn resolve(table: &Table, predicates: &[Predicate]) -> Vec<Vec<DocumentId>> {
    predicates
        .iter()
        .map(|predicate| {
            let (key, needle) = match (predicate.index_key(), predicate.value.to_scalar()) {
                (Some(key), Some(scalar)) => (key, scalar.normalized()),
                _ => return Vec::new(),
            };
            let ids = table
                .with_index(&key, |index| index.search(&needle))
                .unwrap_or_default();
            log_trace!("predicate {} on {}: {} ids", key, table.name(), ids.len());
            ids
        })
        .collect()
}

/// Union; first-seen order across lists, no duplicates
pub fn or(lists: Vec<Vec<DocumentId>>) -> Vec<DocumentId> {
    let mut seen = AHashSet::new();
    let mut out = Vec::new();
    for id in lists.into_iter().flatten() {
        if seen.insert(id) {
            out.push(id);
        }
    }
    out
}

/// Intersection.
///
/// Every id of every list is a candidate, tested once: it is kept when each
/// other list contains it. A single list comes back unchanged.
pub fn and(mut lists: Vec<Vec<DocumentId>>) -> Vec<DocumentId> {
    if lists.len() == 1 {
        return lists.pop().unwrap_or_default();
    }

    let sets: Vec<AHashSet<DocumentId>> = lists
        .iter()
        .map(|ids| ids.iter().copied().collect())
        .collect();

    let mut tested = AHashSet::new();
    let mut out = Vec::new();
    for (list_pos, ids) in lists.iter().enumerate() {
        for &candidate in ids {
            if !tested.insert(candidate) {
                continue;
            }
            let in_all = sets
                .iter()
                .enumerate()
                .all(|(other_pos, set)| other_pos == list_pos || set.contains(&candidate));
            if in_all {
                out.push(candidate);
            }
        }
    }
    out
}
