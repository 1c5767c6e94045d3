// flexbase-core/src/database.rs
// In-process document database: tables, store operations and index queries

use std::sync::Arc;

use ahash::AHashSet;
use dashmap::DashMap;

use crate::config::DatabaseConfig;
use crate::document::{Document, DocumentId};
use crate::error::{FlexError, Result};
use crate::index::IndexKey;
use crate::logging::set_log_level;
use crate::merge::merge_fields;
use crate::pipeline::{EventKind, IndexEvent, IndexPipeline, PipelineStats, TableMap};
use crate::predicate::{resolve, Combinator, Predicate};
use crate::query::Order;
use crate::table::Table;
use crate::{log_debug, log_info, log_trace};

/// FlexBase database
///
/// Tables are created lazily by the first write. Every mutation is applied
/// to the document store right away; the matching index update is handed
/// to the [`IndexPipeline`] and applied in the background. Use
/// [`Database::flush`] when a following indexed read must see the write.
pub struct Database {
    tables: Arc<TableMap>,
    pipeline: IndexPipeline,
    config: DatabaseConfig,
}

impl Database {
    /// Database with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(DatabaseConfig::default())
    }

    pub fn with_config(config: DatabaseConfig) -> Result<Self> {
        if let Some(level) = config.log_level {
            set_log_level(level);
        }
        let tables: Arc<TableMap> = Arc::new(DashMap::new());
        let pipeline = IndexPipeline::start(Arc::clone(&tables), config.queue)?;
        log_debug!("database opened with {:?}", config);

        Ok(Database {
            tables,
            pipeline,
            config,
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    // ========== TABLES ==========

    /// Existing table by name
    pub fn load_table(&self, name: &str) -> Result<Arc<Table>> {
        self.tables
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| FlexError::TableNotFound(name.to_string()))
    }

    fn table_or_create(&self, name: &str) -> Result<Arc<Table>> {
        if name.is_empty() {
            return Err(FlexError::Validation("table name is empty".to_string()));
        }
        if let Some(table) = self.tables.get(name) {
            return Ok(Arc::clone(table.value()));
        }
        let table = self
            .tables
            .entry(name.to_string())
            .or_insert_with(|| {
                log_info!("created table '{}'", name);
                Arc::new(Table::new(name))
            })
            .value()
            .clone();
        Ok(table)
    }

    /// Names of every table, sorted
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    // ========== STORE ==========

    pub fn get(&self, table: &str, id: DocumentId) -> Result<Document> {
        self.load_table(table)?.get(id)
    }

    /// Documents for `ids` in order; ids without a document are skipped
    pub fn multi_get(&self, table: &str, ids: &[DocumentId]) -> Result<Vec<Document>> {
        Ok(self.load_table(table)?.multi_get(ids))
    }

    /// Store `doc` under its id, overwriting any previous version
    pub fn put(&self, table: &str, doc: Document) -> Result<DocumentId> {
        let handle = self.table_or_create(table)?;
        let _writes = handle.lock_writes();
        let id = handle.put(doc.clone())?;
        self.enqueue(table, doc, EventKind::Reindex)?;
        Ok(id)
    }

    /// Insert a new document, allocating an id when it carries none
    pub fn add(&self, table: &str, doc: Document) -> Result<Document> {
        let handle = self.table_or_create(table)?;
        let _writes = handle.lock_writes();
        let added = handle.add(doc)?;
        log_trace!("added {}/{}", table, added.id()?);
        self.enqueue(table, added.clone(), EventKind::Insert)?;
        Ok(added)
    }

    /// Swap the stored document for `doc` entirely
    pub fn replace(&self, table: &str, doc: Document) -> Result<Document> {
        let handle = self.load_table(table)?;
        let id = doc.id()?;
        let _writes = handle.lock_writes();
        if !handle.contains(id) {
            return Err(FlexError::DocumentNotFound(format!("{}/{}", table, id)));
        }
        handle.put(doc.clone())?;
        self.enqueue(table, doc.clone(), EventKind::Reindex)?;
        Ok(doc)
    }

    /// Merge `patch` into the stored document (see [`crate::merge`])
    pub fn update(&self, table: &str, patch: Document) -> Result<Document> {
        let handle = self.load_table(table)?;
        let id = patch.id()?;
        let _writes = handle.lock_writes();
        let old = handle.get(id)?;
        let merged = Document::from_fields(merge_fields(old.fields, patch.fields));
        handle.put(merged.clone())?;
        self.enqueue(table, merged.clone(), EventKind::Reindex)?;
        Ok(merged)
    }

    /// Remove a document by id; `Ok(None)` when there was nothing to remove
    pub fn delete(&self, table: &str, id: DocumentId) -> Result<Option<Document>> {
        let handle = self.load_table(table)?;
        let _writes = handle.lock_writes();
        match handle.delete(id) {
            Some(removed) => {
                self.enqueue(table, removed.clone(), EventKind::Remove)?;
                Ok(Some(removed))
            }
            None => Ok(None),
        }
    }

    fn enqueue(&self, table: &str, doc: Document, kind: EventKind) -> Result<()> {
        self.pipeline.enqueue(IndexEvent::new(table, doc, kind))
    }

    // ========== INDEXED READS ==========

    /// Ids matching `predicates`, combined with `combinator`
    pub fn where_ids(
        &self,
        table: &str,
        predicates: &[Predicate],
        combinator: Combinator,
    ) -> Result<Vec<DocumentId>> {
        let handle = self.load_table(table)?;
        let lists = resolve(&handle, predicates);
        let ids = combinator.combine(lists);
        log_trace!("{:?} of {} predicates on {}: {} ids", combinator, predicates.len(), table, ids.len());
        Ok(ids)
    }

    /// Sort `ids` by the order index, keeping at most `limit` of them.
    ///
    /// Zero or one candidate comes back untouched. Otherwise the order index
    /// must exist, and candidates it does not hold are left out.
    pub fn order(
        &self,
        table: &str,
        ids: Vec<DocumentId>,
        order: &Order,
        limit: Option<usize>,
    ) -> Result<Vec<DocumentId>> {
        if ids.len() <= 1 {
            return Ok(ids);
        }
        let handle = self.load_table(table)?;
        order_ids(&handle, ids, &order.index_key(), limit)
    }

    /// First `limit` ids of the order index
    pub fn all(&self, table: &str, order: &Order, limit: usize) -> Result<Vec<DocumentId>> {
        let handle = self.load_table(table)?;
        let key = order.index_key();
        let ids = handle.with_index(&key, |index| {
            index.iter().take(limit).map(|item| item.id).collect::<Vec<_>>()
        });
        match ids {
            Some(ids) => Ok(ids),
            // Nothing indexed yet
            None if key == IndexKey::id() => Ok(Vec::new()),
            None => Err(FlexError::InvalidIndexKey(key.to_string())),
        }
    }

    // ========== PIPELINE ==========

    /// Wait until every index update enqueued so far has been applied
    pub fn flush(&self) -> Result<()> {
        self.pipeline.flush()
    }

    pub fn pipeline_stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }
}

fn order_ids(
    table: &Table,
    ids: Vec<DocumentId>,
    key: &IndexKey,
    limit: Option<usize>,
) -> Result<Vec<DocumentId>> {
    let wanted: AHashSet<DocumentId> = ids.into_iter().collect();
    let max = limit.map_or(wanted.len(), |limit| limit.min(wanted.len()));

    table
        .with_index(key, |index| {
            index
                .iter()
                .filter(|item| wanted.contains(&item.id))
                .map(|item| item.id)
                .take(max)
                .collect()
        })
        .ok_or_else(|| FlexError::InvalidIndexKey(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Value, ValueType};
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_json_value(value).unwrap()
    }

    fn id(n: f64) -> DocumentId {
        DocumentId::new(n).unwrap()
    }

    fn as_f64s(ids: &[DocumentId]) -> Vec<f64> {
        ids.iter().map(|id| id.as_f64()).collect()
    }

    #[test]
    fn test_tables_created_on_first_write() {
        let db = Database::new().unwrap();
        assert!(matches!(db.load_table("users"), Err(FlexError::TableNotFound(_))));

        db.add("users", doc(json!({"name": "Bob"}))).unwrap();
        db.add("posts", doc(json!({"title": "x"}))).unwrap();
        assert_eq!(db.table_names(), vec!["posts".to_string(), "users".to_string()]);
    }

    #[test]
    fn test_empty_table_name_rejected() {
        let db = Database::new().unwrap();
        assert!(matches!(
            db.add("", doc(json!({"a": 1}))),
            Err(FlexError::Validation(_))
        ));
    }

    #[test]
    fn test_add_get_put() {
        let db = Database::new().unwrap();
        let added = db.add("users", doc(json!({"name": "Bob"}))).unwrap();
        assert_eq!(added.id().unwrap(), id(1.0));

        db.put("users", doc(json!({"id": 1, "name": "Rob"}))).unwrap();
        let stored = db.get("users", id(1.0)).unwrap();
        assert_eq!(stored.get("name"), Some(&Value::from("Rob")));
    }

    #[test]
    fn test_replace_missing_document() {
        let db = Database::new().unwrap();
        db.add("users", doc(json!({"id": 1}))).unwrap();
        assert!(matches!(
            db.replace("users", doc(json!({"id": 2, "a": 1}))),
            Err(FlexError::DocumentNotFound(_))
        ));
    }

    #[test]
    fn test_update_merges() {
        let db = Database::new().unwrap();
        db.add("users", doc(json!({"id": 1, "a": 1, "b": 2}))).unwrap();
        let merged = db.update("users", doc(json!({"id": 1, "a": 9}))).unwrap();
        assert_eq!(merged, doc(json!({"id": 1, "a": 9, "b": 2})));
    }

    #[test]
    fn test_delete_by_id_is_lenient() {
        let db = Database::new().unwrap();
        db.add("users", doc(json!({"id": 1}))).unwrap();
        assert!(db.delete("users", id(1.0)).unwrap().is_some());
        assert!(db.delete("users", id(1.0)).unwrap().is_none());
        assert!(db.delete("nope", id(1.0)).is_err());
    }

    #[test]
    fn test_order_by_field() {
        let db = Database::new().unwrap();
        db.add("users", doc(json!({"id": 1, "age": 40}))).unwrap();
        db.add("users", doc(json!({"id": 2, "age": 20}))).unwrap();
        db.add("users", doc(json!({"id": 3, "age": 30}))).unwrap();
        db.flush().unwrap();

        let by_age = Order::new("age", ValueType::Number);
        let ordered = db
            .order("users", vec![id(1.0), id(2.0), id(3.0)], &by_age, None)
            .unwrap();
        assert_eq!(as_f64s(&ordered), vec![2.0, 3.0, 1.0]);

        let limited = db
            .order("users", vec![id(1.0), id(2.0), id(3.0)], &by_age, Some(2))
            .unwrap();
        assert_eq!(as_f64s(&limited), vec![2.0, 3.0]);
    }

    #[test]
    fn test_order_missing_index() {
        let db = Database::new().unwrap();
        db.add("users", doc(json!({"id": 1}))).unwrap();
        db.add("users", doc(json!({"id": 2}))).unwrap();
        db.flush().unwrap();

        let by_age = Order::new("age", ValueType::Number);
        let err = db.order("users", vec![id(1.0), id(2.0)], &by_age, None).unwrap_err();
        assert_eq!(err, FlexError::InvalidIndexKey("age_number".to_string()));

        // A single candidate needs no ordering
        assert_eq!(db.order("users", vec![id(1.0)], &by_age, None).unwrap(), vec![id(1.0)]);
    }

    #[test]
    fn test_order_drops_unindexed_candidates() {
        let db = Database::new().unwrap();
        db.add("users", doc(json!({"id": 1, "age": 40}))).unwrap();
        db.add("users", doc(json!({"id": 2}))).unwrap();
        db.flush().unwrap();

        let by_age = Order::new("age", ValueType::Number);
        let ordered = db.order("users", vec![id(1.0), id(2.0)], &by_age, None).unwrap();
        assert_eq!(ordered, vec![id(1.0)]);
    }

    #[test]
    fn test_all_respects_limit() {
        let db = Database::new().unwrap();
        for _ in 0..5 {
            db.add("users", doc(json!({"x": 1}))).unwrap();
        }
        db.flush().unwrap();
        let ids = db.all("users", &Order::default(), 3).unwrap();
        assert_eq!(as_f64s(&ids), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_all_unknown_order_index() {
        let db = Database::new().unwrap();
        db.add("users", doc(json!({"x": 1}))).unwrap();
        db.flush().unwrap();
        let by_name = Order::new("name", ValueType::String);
        assert!(matches!(
            db.all("users", &by_name, 10),
            Err(FlexError::InvalidIndexKey(_))
        ));
    }

    #[test]
    fn test_pipeline_stats_count_mutations() {
        let db = Database::new().unwrap();
        db.add("users", doc(json!({"id": 1}))).unwrap();
        db.update("users", doc(json!({"id": 1, "a": 1}))).unwrap();
        db.delete("users", id(1.0)).unwrap();
        db.flush().unwrap();

        let stats = db.pipeline_stats();
        assert_eq!(stats.enqueued, 3);
        assert_eq!(stats.applied, 3);
        assert_eq!(stats.pending(), 0);
    }
}
