// flexbase-core/src/lib.rs
// Embedded schema-less document store with background secondary indexing

pub mod config;
pub mod database;
pub mod document;
pub mod error;
pub mod executor;
pub mod index;
pub mod logging;
pub mod merge;
pub mod pipeline;
pub mod predicate;
pub mod query;
pub mod table;
pub mod value;

// Public exports
pub use config::{DatabaseConfig, QueueBound, DEFAULT_LIMIT};
pub use database::Database;
pub use document::{Document, DocumentId, ID_FIELD};
pub use error::{FlexError, Result};
pub use index::{flatten, IndexItem, IndexKey, SortedIndex};
pub use logging::{get_log_level, set_log_level, LogLevel};
pub use merge::{merge_fields, set_not_zero};
pub use pipeline::{EventKind, IndexEvent, PipelineStats};
pub use predicate::{Combinator, Predicate};
pub use query::{Order, Query, QueryKind, QueryOutput};
pub use table::Table;
pub use value::{Fields, Scalar, Value, ValueType, REMOVE_SENTINEL};
