// flexbase-core/src/index.rs
// Sorted-array secondary index

//! Secondary index engine.
//!
//! Every table keeps one [`SortedIndex`] per [`IndexKey`], i.e. per
//! (flattened field path, scalar type) pair, created the first time a
//! document carries such a field. An index is a `Vec<IndexItem>` kept sorted
//! ascending by value:
//!
//! - `insert` is a lower-bound binary search plus a `Vec::insert`, so
//!   O(log n) comparisons and an O(n) shift. Equal values end up
//!   most-recent-first.
//! - `remove` is a linear scan by id, O(n).
//! - `equal_range` runs two binary searches (first and last occurrence).
//!
//! The flat vector keeps range scans cache friendly; a tree could replace it
//! without changing this API.

use std::collections::HashMap;
use std::fmt;

use crate::document::{Document, DocumentId, ID_FIELD};
use crate::value::{Fields, Scalar, Value, ValueType};

/// (field path, value type) pair naming one index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexKey {
    pub path: String,
    pub value_type: ValueType,
}

impl IndexKey {
    pub fn new(path: impl Into<String>, value_type: ValueType) -> Self {
        IndexKey {
            path: path.into(),
            value_type,
        }
    }

    /// The primary-key index every table gets once a document is indexed
    pub fn id() -> Self {
        IndexKey::new(ID_FIELD, ValueType::Number)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.path, self.value_type)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexItem {
    pub id: DocumentId,
    pub value: Scalar,
}

impl IndexItem {
    pub fn new(id: DocumentId, value: Scalar) -> Self {
        IndexItem { id, value }
    }
}

/// Sorted sequence of (id, value) pairs for one index key
#[derive(Debug, Clone, Default)]
pub struct SortedIndex {
    items: Vec<IndexItem>,
}

impl SortedIndex {
    pub fn new() -> Self {
        SortedIndex::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[IndexItem] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexItem> {
        self.items.iter()
    }

    pub fn last(&self) -> Option<&IndexItem> {
        self.items.last()
    }

    /// Insert before the first item whose value is not less than the new one
    pub fn insert(&mut self, item: IndexItem) {
        let pos = self
            .items
            .partition_point(|existing| existing.value.is_less(&item.value));
        self.items.insert(pos, item);
    }

    /// Remove the entry for `id`; absent ids are a no-op
    pub fn remove(&mut self, id: DocumentId) -> Option<IndexItem> {
        let pos = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(pos))
    }

    /// Inclusive `(first, last)` positions holding `needle`, or `None`
    pub fn equal_range(&self, needle: &Scalar) -> Option<(usize, usize)> {
        if self.items.is_empty() {
            return None;
        }
        let high = self.items.len() - 1;
        let first = first_occurrence(&self.items, 0, high, needle)?;
        let last = last_occurrence(&self.items, first, high, needle)?;
        Some((first, last))
    }

    /// Ids whose value equals `needle`, in index order
    pub fn search(&self, needle: &Scalar) -> Vec<DocumentId> {
        match self.equal_range(needle) {
            Some((first, last)) => self.items[first..=last].iter().map(|item| item.id).collect(),
            None => Vec::new(),
        }
    }

    /// True when every adjacent pair is in ascending order
    pub fn is_sorted(&self) -> bool {
        self.items
            .windows(2)
            .all(|pair| !pair[1].value.is_less(&pair[0].value))
    }
}

/// Lowest position equal to `needle` whose predecessor is smaller.
///
/// Bounds are inclusive; `checked_sub` ends the search when `high` would go
/// below zero.
fn first_occurrence(items: &[IndexItem], low: usize, high: usize, needle: &Scalar) -> Option<usize> {
    if low > high {
        return None;
    }
    let mid = low + (high - low) / 2;
    let value = &items[mid].value;
    let predecessor_smaller = mid == 0 || needle.is_greater(&items[mid - 1].value);
    if predecessor_smaller && value.is_equal(needle) {
        Some(mid)
    } else if needle.is_greater(value) {
        first_occurrence(items, mid + 1, high, needle)
    } else {
        first_occurrence(items, low, mid.checked_sub(1)?, needle)
    }
}

/// Highest position equal to `needle` whose successor is larger
fn last_occurrence(items: &[IndexItem], low: usize, high: usize, needle: &Scalar) -> Option<usize> {
    if low > high {
        return None;
    }
    let mid = low + (high - low) / 2;
    let value = &items[mid].value;
    let successor_larger = mid == items.len() - 1 || needle.is_less(&items[mid + 1].value);
    if successor_larger && value.is_equal(needle) {
        Some(mid)
    } else if needle.is_less(value) {
        last_occurrence(items, low, mid.checked_sub(1)?, needle)
    } else {
        last_occurrence(items, mid + 1, high, needle)
    }
}

/// Flatten a document into `path -> scalar` pairs ready for indexing.
///
/// Nested documents are walked with `.`-joined paths. Nulls, lists and empty
/// strings are skipped; strings are lowercased.
pub fn flatten(document: &Document) -> HashMap<String, Scalar> {
    let mut out = HashMap::new();
    flatten_into(&document.fields, "", &mut out);
    out
}

fn flatten_into(fields: &Fields, prefix: &str, out: &mut HashMap<String, Scalar>) {
    for (key, value) in fields {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Null | Value::List(_) => continue,
            Value::Object(nested) => flatten_into(nested, &path, out),
            Value::String(s) if s.is_empty() => continue,
            scalar => {
                if let Some(scalar) = scalar.to_scalar() {
                    out.insert(path, scalar.normalized());
                }
            }
        }
    }
}
