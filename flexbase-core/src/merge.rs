//! Partial-update merge
//!
//! `update` does not replace a document; it merges a patch into it:
//!
//! | patch value                 | result                           |
//! |-----------------------------|----------------------------------|
//! | nested doc over nested doc  | merged recursively               |
//! | `null`                      | key removed                      |
//! | `"]rm["`                    | key removed                      |
//! | key is `id`                 | ignored                          |
//! | key absent in old           | inserted as-is                   |
//! | zero value (0, "", false, []) | old value kept                 |
//! | anything else               | replaces the old value           |
//!
//! The zero-value rule means a partial update can never set an existing
//! field back to 0, "", false or []. Callers that need that must replace the
//! whole document.

use crate::document::ID_FIELD;
use crate::value::{Fields, Value};

/// Merge `patch` into `old` and return the merged value
pub fn set_not_zero(old: Value, patch: Value) -> Value {
    match (old, patch) {
        (Value::Object(old_fields), Value::Object(patch_fields)) => {
            Value::Object(merge_fields(old_fields, patch_fields))
        }
        (old, patch) => {
            if patch.is_zero() {
                old
            } else {
                patch
            }
        }
    }
}

/// Field-map form of [`set_not_zero`], used for whole documents
pub fn merge_fields(mut old: Fields, patch: Fields) -> Fields {
    for (key, value) in patch {
        if key == ID_FIELD {
            continue;
        }
        if value.is_null() || value.is_remove_sentinel() {
            old.remove(&key);
            continue;
        }
        let merged = match old.remove(&key) {
            Some(previous) => set_not_zero(previous, value),
            None => value,
        };
        old.insert(key, merged);
    }
    old
}
