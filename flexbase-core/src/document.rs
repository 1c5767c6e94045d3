// flexbase-core/src/document.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{FlexError, Result};
use crate::value::{Fields, Value};

/// Reserved field holding the document identifier
pub const ID_FIELD: &str = "id";

/// Numeric document identifier.
///
/// Identifiers are `f64` to stay compatible with JSON clients that only know
/// one number type. A valid id is finite and non-zero, which makes bitwise
/// equality and hashing sound.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct DocumentId(f64);

impl DocumentId {
    /// Id given to the first document of an empty table
    pub const FIRST: DocumentId = DocumentId(1.0);

    pub fn new(id: f64) -> Result<Self> {
        if !id.is_finite() {
            return Err(FlexError::InvalidId(format!("id must be finite, got {}", id)));
        }
        if id == 0.0 {
            return Err(FlexError::InvalidId("id can not be zero".to_string()));
        }
        Ok(DocumentId(id))
    }

    /// Parse from a field value; only non-zero numbers qualify
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => DocumentId::new(*n),
            other => Err(FlexError::InvalidId(format!(
                "id should be a number, got {:?}",
                other
            ))),
        }
    }

    /// Next id after this one
    pub fn next(self) -> DocumentId {
        DocumentId(self.0.floor() + 1.0)
    }

    pub fn as_f64(self) -> f64 {
        self.0
    }
}

impl Eq for DocumentId {}

impl Hash for DocumentId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl TryFrom<f64> for DocumentId {
    type Error = FlexError;

    fn try_from(id: f64) -> Result<Self> {
        DocumentId::new(id)
    }
}

impl From<DocumentId> for f64 {
    fn from(id: DocumentId) -> f64 {
        id.0
    }
}

impl From<DocumentId> for Value {
    fn from(id: DocumentId) -> Value {
        Value::Number(id.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Schema-less document: a field map with a reserved numeric `id`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    pub fields: Fields,
}

impl Document {
    pub fn new() -> Self {
        Document::default()
    }

    pub fn from_fields(fields: Fields) -> Self {
        Document { fields }
    }

    /// Build from a JSON object; anything else is a serialization error
    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        match Value::from(value) {
            Value::Object(fields) => Ok(Document { fields }),
            other => Err(FlexError::Serialization(format!(
                "document must be an object, got {:?}",
                other
            ))),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Document::from_json_value(value)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Convert any serializable struct into a document.
    ///
    /// Object keys are lowercased at every level, so `Name` and `name` land
    /// on the same field.
    pub fn from_serialize<T: Serialize>(item: &T) -> Result<Self> {
        let json = serde_json::to_value(item)?;
        match lowercase_keys(Value::from(json)) {
            Value::Object(fields) => Ok(Document { fields }),
            other => Err(FlexError::Serialization(format!(
                "expected a struct or map, got {:?}",
                other
            ))),
        }
    }

    /// A document without fields has no identity
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn id(&self) -> Result<DocumentId> {
        if self.is_empty() {
            return Err(FlexError::InvalidId("document is empty".to_string()));
        }
        match self.fields.get(ID_FIELD) {
            Some(value) => DocumentId::from_value(value),
            None => Err(FlexError::InvalidId("document id is missing".to_string())),
        }
    }

    pub fn has_id(&self) -> bool {
        self.id().is_ok()
    }

    pub fn set_id(&mut self, id: DocumentId) {
        self.fields.insert(ID_FIELD.to_string(), id.into());
    }

    /// Set a field; writing `id` goes through id validation
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        if key.is_empty() {
            return Err(FlexError::Validation("key should not be empty".to_string()));
        }
        if key == ID_FIELD {
            let id = DocumentId::from_value(&value)?;
            self.set_id(id);
            return Ok(());
        }
        self.fields.insert(key.to_string(), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        if key.is_empty() {
            return None;
        }
        self.fields.get(key)
    }

    /// Dot-path lookup through nested documents, e.g. `"address.city"`
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Copy every entry of `fields` into the document.
    ///
    /// Invalid `id` values are skipped rather than failing the whole fill.
    pub fn fill_fields(&mut self, fields: &Fields) {
        for (key, value) in fields {
            let _ = self.set(key, value.clone());
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Object(doc.fields)
    }
}

impl From<Document> for serde_json::Value {
    fn from(doc: Document) -> Self {
        Value::Object(doc.fields).into()
    }
}

fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.to_lowercase(), lowercase_keys(v)))
                .collect(),
        ),
        Value::List(items) => Value::List(items.into_iter().map(lowercase_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_id_rejects_zero_and_nan() {
        assert!(matches!(DocumentId::new(0.0), Err(FlexError::InvalidId(_))));
        assert!(matches!(
            DocumentId::new(f64::NAN),
            Err(FlexError::InvalidId(_))
        ));
        assert!(DocumentId::new(7.0).is_ok());
    }

    #[test]
    fn test_document_id_from_non_number() {
        let err = DocumentId::from_value(&Value::from("1")).unwrap_err();
        assert!(matches!(err, FlexError::InvalidId(_)));
    }

    #[test]
    fn test_document_id_next() {
        let id = DocumentId::new(41.0).unwrap();
        assert_eq!(id.next().as_f64(), 42.0);
    }

    #[test]
    fn test_empty_document_has_no_id() {
        let doc = Document::new();
        assert!(doc.is_empty());
        assert!(doc.id().is_err());
    }

    #[test]
    fn test_missing_id() {
        let doc = Document::from_json_value(json!({"name": "Bob"})).unwrap();
        assert!(!doc.is_empty());
        assert!(!doc.has_id());
    }

    #[test]
    fn test_set_id_through_set() {
        let mut doc = Document::new();
        doc.set("id", Value::Number(3.0)).unwrap();
        assert_eq!(doc.id().unwrap().as_f64(), 3.0);

        assert!(doc.set("id", Value::Number(0.0)).is_err());
        assert!(doc.set("id", Value::from("x")).is_err());
        assert_eq!(doc.id().unwrap().as_f64(), 3.0);
    }

    #[test]
    fn test_set_empty_key() {
        let mut doc = Document::new();
        assert!(matches!(
            doc.set("", Value::Bool(true)),
            Err(FlexError::Validation(_))
        ));
    }

    #[test]
    fn test_fill_fields_skips_bad_id() {
        let mut doc = Document::new();
        let fields = Document::from_json_value(json!({"id": 0, "name": "Ana"}))
            .unwrap()
            .fields;
        doc.fill_fields(&fields);
        assert_eq!(doc.get("name"), Some(&Value::from("Ana")));
        assert!(doc.get("id").is_none());
    }

    #[test]
    fn test_get_path() {
        let doc =
            Document::from_json_value(json!({"address": {"city": "Tehran", "zip": 1}})).unwrap();
        assert_eq!(doc.get_path("address.city"), Some(&Value::from("Tehran")));
        assert!(doc.get_path("address.street").is_none());
        assert!(doc.get_path("address.city.more").is_none());
    }

    #[test]
    fn test_json_roundtrip_keeps_integer_ids() {
        let doc = Document::from_json(r#"{"id": 2, "name": "Ana"}"#).unwrap();
        let json = doc.to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["id"], json!(2));
        assert_eq!(parsed["name"], json!("Ana"));
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(Document::from_json("[1,2]").is_err());
    }

    #[test]
    fn test_from_serialize_lowercases_keys() {
        #[derive(Serialize)]
        struct Address {
            #[serde(rename = "City")]
            city: String,
        }
        #[derive(Serialize)]
        struct User {
            #[serde(rename = "Name")]
            name: String,
            #[serde(rename = "Address")]
            address: Address,
        }

        let user = User {
            name: "Bob".to_string(),
            address: Address {
                city: "Paris".to_string(),
            },
        };
        let doc = Document::from_serialize(&user).unwrap();
        assert_eq!(doc.get("name"), Some(&Value::from("Bob")));
        assert_eq!(doc.get_path("address.city"), Some(&Value::from("Paris")));
    }
}
