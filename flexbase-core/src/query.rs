//! Request objects for [`Database::run`](crate::Database::run)
//!
//! A [`Query`] mirrors the JSON request shape:
//!
//! ```json
//! {
//!   "table": "users",
//!   "type": "get",
//!   "doc": {"id": 1},
//!   "where": [{"field": "name", "operator": "==", "value": "ana"}],
//!   "where_type": "and",
//!   "order": {"field": "id", "type": "number"},
//!   "limit": 10
//! }
//! ```
//!
//! `check()` validates the request and fills in defaults: combinator `and`,
//! order by `id` as a number, and a limit of 0 meaning "none".

use serde::{Deserialize, Serialize};

use crate::document::{Document, ID_FIELD};
use crate::error::{FlexError, Result};
use crate::index::IndexKey;
use crate::predicate::{Combinator, Predicate};
use crate::value::ValueType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Get,
    List,
    Exists,
    Add,
    Replace,
    Update,
    Delete,
}

/// Sort target: one (field, type) index scanned in ascending order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub field: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
}

impl Order {
    pub fn new(field: impl Into<String>, value_type: ValueType) -> Self {
        Order {
            field: field.into(),
            value_type,
        }
    }

    pub fn index_key(&self) -> IndexKey {
        IndexKey::new(self.field.clone(), self.value_type)
    }
}

impl Default for Order {
    fn default() -> Self {
        Order::new(ID_FIELD, ValueType::Number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub table: String,
    #[serde(rename = "type")]
    pub kind: QueryKind,
    #[serde(default)]
    pub doc: Document,
    #[serde(default, rename = "where")]
    pub predicates: Vec<Predicate>,
    #[serde(default, rename = "where_type")]
    pub combinator: Option<Combinator>,
    #[serde(default)]
    pub order: Option<Order>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(table: impl Into<String>, kind: QueryKind) -> Self {
        Query {
            table: table.into(),
            kind,
            doc: Document::new(),
            predicates: Vec::new(),
            combinator: None,
            order: None,
            limit: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_doc(mut self, doc: Document) -> Self {
        self.doc = doc;
        self
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn with_combinator(mut self, combinator: Combinator) -> Self {
        self.combinator = Some(combinator);
        self
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn has_predicates(&self) -> bool {
        !self.predicates.is_empty()
    }

    /// Validate and apply defaults
    pub fn check(&mut self) -> Result<()> {
        if self.table.is_empty() {
            return Err(FlexError::Validation("table name is empty".to_string()));
        }
        if let Some(predicate) = self.predicates.iter().find(|p| p.field.is_empty()) {
            return Err(FlexError::Validation(format!(
                "predicate without field: {:?}",
                predicate
            )));
        }
        if self.combinator.is_none() {
            self.combinator = Some(Combinator::And);
        }
        match &self.order {
            Some(order) if !order.field.is_empty() => {}
            _ => self.order = Some(Order::default()),
        }
        if self.limit == Some(0) {
            self.limit = None;
        }
        Ok(())
    }

    pub fn combinator(&self) -> Combinator {
        self.combinator.unwrap_or_default()
    }

    pub fn order(&self) -> Order {
        self.order.clone().unwrap_or_default()
    }
}

/// Result of running a query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    Document(Option<Document>),
    Documents(Vec<Document>),
    Exists(bool),
}

impl QueryOutput {
    pub fn document(self) -> Option<Document> {
        match self {
            QueryOutput::Document(doc) => doc,
            QueryOutput::Documents(docs) => docs.into_iter().next(),
            QueryOutput::Exists(_) => None,
        }
    }

    pub fn documents(self) -> Vec<Document> {
        match self {
            QueryOutput::Document(doc) => doc.into_iter().collect(),
            QueryOutput::Documents(docs) => docs,
            QueryOutput::Exists(_) => Vec::new(),
        }
    }

    pub fn exists(&self) -> bool {
        match self {
            QueryOutput::Exists(found) => *found,
            QueryOutput::Document(doc) => doc.is_some(),
            QueryOutput::Documents(docs) => !docs.is_empty(),
        }
    }
}
