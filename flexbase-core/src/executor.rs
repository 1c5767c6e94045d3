// flexbase-core/src/executor.rs
// Request dispatch: turns a Query into store and index operations

use crate::database::Database;
use crate::document::{Document, DocumentId};
use crate::error::{FlexError, Result};
use crate::query::{Query, QueryKind, QueryOutput};
use crate::{log_debug, log_trace};

impl Database {
    /// Validate `query`, apply its defaults and execute it.
    ///
    /// Without predicates, `get`/`exists`/`replace`/`update`/`delete` address
    /// the document named by `doc.id`. With predicates they address every
    /// match (`get` the first one), in `order`, up to `limit`.
    pub fn run(&self, mut query: Query) -> Result<QueryOutput> {
        query.check()?;
        log_trace!("run {:?} on '{}'", query.kind, query.table);

        match query.kind {
            QueryKind::Get => self.get_query(&query),
            QueryKind::List => self.list_query(&query),
            QueryKind::Exists => self.exists_query(&query),
            QueryKind::Add => self.add_query(query),
            QueryKind::Replace => self.replace_query(query),
            QueryKind::Update => self.update_query(query),
            QueryKind::Delete => self.delete_query(&query),
        }
    }

    /// Ids matching the query's predicates, ordered and limited
    fn matching_ids(&self, query: &Query) -> Result<Vec<DocumentId>> {
        let ids = self.where_ids(&query.table, &query.predicates, query.combinator())?;
        self.order(&query.table, ids, &query.order(), query.limit)
    }

    fn get_query(&self, query: &Query) -> Result<QueryOutput> {
        if query.has_predicates() {
            let ids = self.matching_ids(query)?;
            let first = match ids.first() {
                Some(id) => self.multi_get(&query.table, std::slice::from_ref(id))?.pop(),
                None => None,
            };
            return Ok(QueryOutput::Document(first));
        }
        let id = query.doc.id()?;
        Ok(QueryOutput::Document(Some(self.get(&query.table, id)?)))
    }

    fn list_query(&self, query: &Query) -> Result<QueryOutput> {
        let ids = if query.has_predicates() {
            self.matching_ids(query)?
        } else {
            let limit = query.limit.unwrap_or(self.config().default_limit);
            self.all(&query.table, &query.order(), limit)?
        };
        Ok(QueryOutput::Documents(self.multi_get(&query.table, &ids)?))
    }

    fn exists_query(&self, query: &Query) -> Result<QueryOutput> {
        if query.has_predicates() {
            let ids = self.where_ids(&query.table, &query.predicates, query.combinator())?;
            return Ok(QueryOutput::Exists(!ids.is_empty()));
        }
        let id = query.doc.id()?;
        let table = self.load_table(&query.table)?;
        Ok(QueryOutput::Exists(table.contains(id)))
    }

    fn add_query(&self, query: Query) -> Result<QueryOutput> {
        if query.has_predicates() {
            return Err(FlexError::Validation("add does not take predicates".to_string()));
        }
        let added = self.add(&query.table, query.doc)?;
        Ok(QueryOutput::Document(Some(added)))
    }

    fn replace_query(&self, query: Query) -> Result<QueryOutput> {
        if !query.has_predicates() {
            let replaced = self.replace(&query.table, query.doc)?;
            return Ok(QueryOutput::Document(Some(replaced)));
        }
        let ids = self.matching_ids(&query)?;
        let replaced = apply_to_matches(ids, |id| self.replace(&query.table, with_id(&query.doc, id)))?;
        log_debug!("replaced {} documents in '{}'", replaced.len(), query.table);
        Ok(QueryOutput::Documents(replaced))
    }

    fn update_query(&self, query: Query) -> Result<QueryOutput> {
        if !query.has_predicates() {
            let updated = self.update(&query.table, query.doc)?;
            return Ok(QueryOutput::Document(Some(updated)));
        }
        let ids = self.matching_ids(&query)?;
        let updated = apply_to_matches(ids, |id| self.update(&query.table, with_id(&query.doc, id)))?;
        log_debug!("updated {} documents in '{}'", updated.len(), query.table);
        Ok(QueryOutput::Documents(updated))
    }

    fn delete_query(&self, query: &Query) -> Result<QueryOutput> {
        if !query.has_predicates() {
            let id = query.doc.id()?;
            let removed = self
                .delete(&query.table, id)?
                .ok_or_else(|| FlexError::DocumentNotFound(format!("{}/{}", query.table, id)))?;
            return Ok(QueryOutput::Document(Some(removed)));
        }
        let ids = self.matching_ids(query)?;
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            // A match may already be gone while its index entry lingers
            if let Some(doc) = self.delete(&query.table, id)? {
                removed.push(doc);
            }
        }
        log_debug!("deleted {} documents from '{}'", removed.len(), query.table);
        Ok(QueryOutput::Documents(removed))
    }
}

/// Run `op` for every matched id and collect the results.
///
/// A match whose document is gone while its index entry lingers is skipped;
/// any other error stops the loop.
fn apply_to_matches(
    ids: Vec<DocumentId>,
    mut op: impl FnMut(DocumentId) -> Result<Document>,
) -> Result<Vec<Document>> {
    let mut done = Vec::with_capacity(ids.len());
    for id in ids {
        match op(id) {
            Ok(doc) => done.push(doc),
            Err(FlexError::DocumentNotFound(missing)) => {
                log_trace!("skipping stale match {}", missing);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(done)
}

/// Copy of `doc` addressed at `id`
fn with_id(doc: &Document, id: DocumentId) -> Document {
    let mut doc = doc.clone();
    doc.set_id(id);
    doc
}
