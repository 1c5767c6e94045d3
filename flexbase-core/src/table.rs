// flexbase-core/src/table.rs
// Per-table document store and index set

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};

use crate::document::{Document, DocumentId, ID_FIELD};
use crate::error::{FlexError, Result};
use crate::index::{flatten, IndexItem, IndexKey, SortedIndex};
use crate::value::Value;

/// A named collection of documents plus its secondary indexes.
///
/// Documents live in a concurrent map and can be read and written by any
/// thread. Indexes are also held in a concurrent map, but only the index
/// pipeline's consumer thread mutates them (`index_document` /
/// `unindex_document` are crate-private for that reason).
///
/// Mutations made through [`crate::Database`] hold the table's write lock
/// from the store write until the index event is queued, so each document's
/// events reach the pipeline in the order its versions were stored.
pub struct Table {
    name: String,
    docs: DashMap<DocumentId, Document>,
    indexes: DashMap<IndexKey, SortedIndex>,
    /// Highest id ever stored here; guards allocation in `add`
    high_water: Mutex<Option<DocumentId>>,
    writes: Mutex<()>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Table {
            name: name.into(),
            docs: DashMap::new(),
            indexes: DashMap::new(),
            high_water: Mutex::new(None),
            writes: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn contains(&self, id: DocumentId) -> bool {
        self.docs.contains_key(&id)
    }

    pub fn get(&self, id: DocumentId) -> Result<Document> {
        self.docs
            .get(&id)
            .map(|doc| doc.value().clone())
            .ok_or_else(|| FlexError::DocumentNotFound(format!("{}/{}", self.name, id)))
    }

    /// Documents for `ids` in the given order; unknown ids are skipped
    pub fn multi_get(&self, ids: &[DocumentId]) -> Vec<Document> {
        ids.iter()
            .filter_map(|id| self.docs.get(id).map(|doc| doc.value().clone()))
            .collect()
    }

    /// Store `doc` under its own id, replacing whatever was there
    pub fn put(&self, doc: Document) -> Result<DocumentId> {
        let id = doc.id()?;
        let mut high_water = self.high_water.lock();
        self.docs.insert(id, doc);
        bump(&mut high_water, id);
        Ok(id)
    }

    /// Insert a new document, allocating an id when it has none.
    ///
    /// The allocated id is one past the larger of the id index's last entry
    /// and the highest id this table has ever stored, so back-to-back adds
    /// get increasing ids even before the pipeline has indexed them.
    pub fn add(&self, mut doc: Document) -> Result<Document> {
        let mut high_water = self.high_water.lock();

        let id = match doc.fields.get(ID_FIELD) {
            None | Some(Value::Null) => {
                let id = self.next_id(*high_water);
                doc.set_id(id);
                id
            }
            Some(value) => DocumentId::from_value(value)?,
        };

        match self.docs.entry(id) {
            Entry::Occupied(_) => Err(FlexError::DuplicateId(id.as_f64())),
            Entry::Vacant(slot) => {
                slot.insert(doc.clone());
                bump(&mut high_water, id);
                Ok(doc)
            }
        }
    }

    /// Remove a document; an absent id is not an error here
    pub fn delete(&self, id: DocumentId) -> Option<Document> {
        self.docs.remove(&id).map(|(_, doc)| doc)
    }

    /// Serializes a store write with the enqueue of its index event
    pub(crate) fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.writes.lock()
    }

    fn next_id(&self, high_water: Option<DocumentId>) -> DocumentId {
        let indexed = self
            .indexes
            .get(&IndexKey::id())
            .and_then(|index| index.last().map(|item| item.id));
        let last = match (indexed, high_water) {
            (Some(a), Some(b)) => Some(if a.as_f64() >= b.as_f64() { a } else { b }),
            (a, b) => a.or(b),
        };
        match last {
            Some(id) => id.next(),
            None => DocumentId::FIRST,
        }
    }

    // ========== INDEX ACCESS ==========

    /// Run `f` against the index for `key`, if it exists
    pub fn with_index<R>(&self, key: &IndexKey, f: impl FnOnce(&SortedIndex) -> R) -> Option<R> {
        self.indexes.get(key).map(|index| f(index.value()))
    }

    pub fn has_index(&self, key: &IndexKey) -> bool {
        self.indexes.contains_key(key)
    }

    /// Every index key known to this table, sorted for stable output
    pub fn index_keys(&self) -> Vec<IndexKey> {
        let mut keys: Vec<IndexKey> = self.indexes.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn index_len(&self, key: &IndexKey) -> usize {
        self.with_index(key, SortedIndex::len).unwrap_or(0)
    }

    /// Insert the document's flattened fields into their indexes
    pub(crate) fn index_document(&self, doc: &Document) -> Result<usize> {
        let id = doc.id()?;
        let flat = flatten(doc);
        let count = flat.len();
        for (path, scalar) in flat {
            let key = IndexKey::new(path, scalar.value_type());
            self.indexes
                .entry(key)
                .or_default()
                .insert(IndexItem::new(id, scalar));
        }
        Ok(count)
    }

    /// Remove `id` from every index of the table
    pub(crate) fn unindex_document(&self, id: DocumentId) -> usize {
        let mut removed = 0;
        for mut index in self.indexes.iter_mut() {
            if index.value_mut().remove(id).is_some() {
                removed += 1;
            }
        }
        removed
    }
}

fn bump(high_water: &mut Option<DocumentId>, id: DocumentId) {
    match high_water {
        Some(current) if current.as_f64() >= id.as_f64() => {}
        _ => *high_water = Some(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Scalar, ValueType};
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_json_value(value).unwrap()
    }

    fn id(n: f64) -> DocumentId {
        DocumentId::new(n).unwrap()
    }

    #[test]
    fn test_add_allocates_from_one() {
        let table = Table::new("users");
        let first = table.add(doc(json!({"name": "Bob"}))).unwrap();
        let second = table.add(doc(json!({"name": "Ana"}))).unwrap();
        assert_eq!(first.id().unwrap(), id(1.0));
        assert_eq!(second.id().unwrap(), id(2.0));
    }

    #[test]
    fn test_add_null_id_allocates() {
        let table = Table::new("users");
        let added = table.add(doc(json!({"id": null, "name": "Bob"}))).unwrap();
        assert_eq!(added.id().unwrap(), id(1.0));
    }

    #[test]
    fn test_add_invalid_id_rejected() {
        let table = Table::new("users");
        let err = table.add(doc(json!({"id": 0}))).unwrap_err();
        assert!(matches!(err, FlexError::InvalidId(_)));
        let err = table.add(doc(json!({"id": "7"}))).unwrap_err();
        assert!(matches!(err, FlexError::InvalidId(_)));
    }

    #[test]
    fn test_add_duplicate_id() {
        let table = Table::new("users");
        table.add(doc(json!({"id": 5, "name": "Bob"}))).unwrap();
        let err = table.add(doc(json!({"id": 5, "name": "Eve"}))).unwrap_err();
        assert_eq!(err, FlexError::DuplicateId(5.0));
        assert_eq!(table.get(id(5.0)).unwrap().get("name"), Some(&Value::from("Bob")));
    }

    #[test]
    fn test_allocation_follows_caller_ids() {
        let table = Table::new("users");
        table.add(doc(json!({"id": 10}))).unwrap();
        let next = table.add(doc(json!({"name": "x"}))).unwrap();
        assert_eq!(next.id().unwrap(), id(11.0));
    }

    #[test]
    fn test_allocation_follows_id_index() {
        let table = Table::new("users");
        table.index_document(&doc(json!({"id": 40}))).unwrap();
        let next = table.add(doc(json!({"name": "x"}))).unwrap();
        assert_eq!(next.id().unwrap(), id(41.0));
    }

    #[test]
    fn test_allocation_never_reuses_deleted_max() {
        let table = Table::new("users");
        table.add(doc(json!({}))).unwrap();
        let second = table.add(doc(json!({}))).unwrap().id().unwrap();
        table.delete(second);
        let third = table.add(doc(json!({}))).unwrap().id().unwrap();
        assert_eq!(third, id(3.0));
    }

    #[test]
    fn test_put_requires_id() {
        let table = Table::new("users");
        assert!(matches!(
            table.put(doc(json!({"name": "x"}))),
            Err(FlexError::InvalidId(_))
        ));
        table.put(doc(json!({"id": 2, "name": "x"}))).unwrap();
        table.put(doc(json!({"id": 2, "name": "y"}))).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(id(2.0)).unwrap().get("name"), Some(&Value::from("y")));
    }

    #[test]
    fn test_get_missing() {
        let table = Table::new("users");
        assert!(matches!(
            table.get(id(1.0)),
            Err(FlexError::DocumentNotFound(_))
        ));
    }

    #[test]
    fn test_multi_get_skips_missing() {
        let table = Table::new("users");
        table.put(doc(json!({"id": 1}))).unwrap();
        table.put(doc(json!({"id": 3}))).unwrap();
        let docs = table.multi_get(&[id(3.0), id(2.0), id(1.0)]);
        let ids: Vec<f64> = docs.iter().map(|d| d.id().unwrap().as_f64()).collect();
        assert_eq!(ids, vec![3.0, 1.0]);
    }

    #[test]
    fn test_delete_absent_is_none() {
        let table = Table::new("users");
        assert!(table.delete(id(1.0)).is_none());
    }

    #[test]
    fn test_index_and_unindex_document() {
        let table = Table::new("users");
        let d = doc(json!({"id": 1, "name": "Ana", "age": 30}));
        assert_eq!(table.index_document(&d).unwrap(), 3);

        let name_key = IndexKey::new("name", ValueType::String);
        assert_eq!(
            table.with_index(&name_key, |index| index.search(&Scalar::String("ana".into()))),
            Some(vec![id(1.0)])
        );
        assert_eq!(
            table.index_keys(),
            vec![
                IndexKey::new("age", ValueType::Number),
                IndexKey::new("id", ValueType::Number),
                name_key.clone(),
            ]
        );

        assert_eq!(table.unindex_document(id(1.0)), 3);
        assert_eq!(table.index_len(&name_key), 0);
        // Indexes outlive their last entry
        assert!(table.has_index(&name_key));
    }

    #[test]
    fn test_index_document_without_id_fails() {
        let table = Table::new("users");
        assert!(table.index_document(&doc(json!({"name": "x"}))).is_err());
        assert!(table.index_keys().is_empty());
    }
}
