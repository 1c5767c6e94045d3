//! Database configuration
//!
//! The only tunable with behavioral impact is the index pipeline's queue
//! bound. Producers (mutations) enqueue one event each; what happens when the
//! consumer falls behind is decided here:
//!
//! - **Unbounded** (default): the queue grows without limit and enqueue never
//!   waits. Memory is the only bound.
//! - **Bounded**: at most `capacity` events wait; producers block until the
//!   consumer frees a slot. Events are never dropped.
//!
//! # Examples
//!
//! ```rust
//! use flexbase_core::{DatabaseConfig, QueueBound};
//!
//! let config = DatabaseConfig::default()
//!     .with_queue(QueueBound::Bounded { capacity: 1024 })
//!     .with_default_limit(50);
//! assert_eq!(config.default_limit, 50);
//! ```

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;

/// Default page size for listings without an explicit limit
pub const DEFAULT_LIMIT: usize = 30;

/// Backpressure policy of the index pipeline queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBound {
    Unbounded,
    Bounded {
        /// Events that may wait before producers block (at least 1)
        capacity: usize,
    },
}

impl Default for QueueBound {
    fn default() -> Self {
        QueueBound::Unbounded
    }
}

impl QueueBound {
    pub fn capacity(&self) -> Option<usize> {
        match self {
            QueueBound::Unbounded => None,
            QueueBound::Bounded { capacity } => Some((*capacity).max(1)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub queue: QueueBound,
    /// Limit applied to listings that don't carry their own
    pub default_limit: usize,
    /// Sets the global log level on open when present
    pub log_level: Option<LogLevel>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            queue: QueueBound::default(),
            default_limit: DEFAULT_LIMIT,
            log_level: None,
        }
    }
}

impl DatabaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue(mut self, queue: QueueBound) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.queue, QueueBound::Unbounded);
        assert_eq!(config.default_limit, 30);
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_bounded_capacity_never_zero() {
        assert_eq!(QueueBound::Bounded { capacity: 0 }.capacity(), Some(1));
        assert_eq!(QueueBound::Bounded { capacity: 8 }.capacity(), Some(8));
        assert_eq!(QueueBound::Unbounded.capacity(), None);
    }

    #[test]
    fn test_config_from_json_with_defaults() {
        let config: DatabaseConfig =
            serde_json::from_str(r#"{"queue": {"bounded": {"capacity": 16}}}"#).unwrap();
        assert_eq!(config.queue, QueueBound::Bounded { capacity: 16 });
        assert_eq!(config.default_limit, DEFAULT_LIMIT);

        let config: DatabaseConfig =
            serde_json::from_str(r#"{"queue": "unbounded", "log_level": "debug"}"#).unwrap();
        assert_eq!(config.queue, QueueBound::Unbounded);
        assert_eq!(config.log_level, Some(LogLevel::Debug));
    }
}
